//! Small synthetic inputs shared by the unit tests of the valuation stages.

use crate::components::age_factors::LIFE_EXPECTANCY_COLUMNS;
use crate::components::demographics::{Harmonizer, HarmonizedDemographics, POPULATION_COLUMNS};
use crate::components::methodology::{compute_valuation_series, IncomeTable, ValuationSeries};
use mortval_core::config::DemographicParameters;
use mortval_core::labels::{country_of, EconModel, EnsembleMember, Rcp, Scenario, ValuationBase};
use mortval_core::panel::{RegionAxis, RegionYearPanel};
use mortval_core::pricing::{BaselineValuation, ReportingAdjustment};
use mortval_core::table::{KeyedTable, RowKey, Year};

pub const REFERENCE_INCOME: f64 = 50_000.0;
pub const POPULATION: f64 = 1_000_000.0;

/// Remaining life expectancy of the young, older and oldest groups.
pub const EXPECTANCY: [f64; 3] = [70.0, 20.0, 5.0];
pub const MT_EXPECTANCY: f64 = 40.0;
pub const MT_WEIGHTS: [f64; 3] = [0.5, 1.0, 0.25];

pub fn member(scenario: Scenario) -> EnsembleMember {
    EnsembleMember::new(1, Rcp::Rcp85, "CCSM4", EconModel::Low, scenario)
}

pub fn baseline() -> BaselineValuation {
    BaselineValuation {
        vsl: 10_000_000.0,
        vly: 200_000.0,
        currency_year: 2005,
    }
}

pub fn adjustment() -> ReportingAdjustment {
    ReportingAdjustment {
        reference_income: REFERENCE_INCOME,
        price_adjustment: 1.0,
    }
}

/// Constant demographics for `regions` from 2010 to 2100.
pub fn demographics(regions: &[&str], scenario: Scenario) -> HarmonizedDemographics {
    demographics_with_population(regions, scenario, |_, _| Some(POPULATION))
}

/// Demographics whose total population anchors come from `population`.
/// Years for which it returns `None` have no anchor.
pub fn demographics_with_population(
    regions: &[&str],
    scenario: Scenario,
    population: impl Fn(&str, Year) -> Option<f64>,
) -> HarmonizedDemographics {
    let mut pop = KeyedTable::new("population", &POPULATION_COLUMNS);
    let mut le = KeyedTable::new("life expectancy", &LIFE_EXPECTANCY_COLUMNS);
    let le_row = [
        EXPECTANCY[0],
        EXPECTANCY[1],
        EXPECTANCY[2],
        MT_EXPECTANCY,
        MT_WEIGHTS[0],
        MT_WEIGHTS[1],
        MT_WEIGHTS[2],
    ];
    for region in regions {
        for year in (2010..=2100).step_by(5) {
            if let Some(total) = population(*region, year) {
                pop.push(
                    RowKey::new(*region, scenario, year),
                    &[total, 0.1 * total, 0.7 * total, 0.2 * total],
                );
            }
        }
    }
    let mut countries: Vec<&str> = regions.iter().copied().map(country_of).collect();
    countries.dedup();
    for country in countries {
        for year in [2010, 2015] {
            le.push(RowKey::new(country, scenario, year), &le_row);
        }
    }
    Harmonizer::uncached(DemographicParameters::default())
        .harmonize_scenario(&pop, &le, &RegionAxis::new(regions.iter().copied()), scenario)
        .expect("fixture demographics")
}

/// Income constant in time, one value per region (or country).
pub fn income(units: &[&str], gdppc: &[f64], scenario: Scenario, base: ValuationBase) -> IncomeTable {
    let years: Vec<Year> = (2010..=2100).collect();
    let values = ndarray::Array2::from_shape_fn((units.len(), years.len()), |(r, _)| gdppc[r]);
    IncomeTable::new(scenario, base).with_model(
        EconModel::Low,
        RegionYearPanel::new(RegionAxis::new(units.iter().copied()), years, values),
    )
}

pub fn series(demographics: &HarmonizedDemographics, income: &IncomeTable) -> ValuationSeries {
    compute_valuation_series(demographics, income, &baseline(), &adjustment()).expect("fixture series")
}

/// Panel over `regions` for the default valuation window, zero except for one cell.
pub fn impulse(regions: &[&str], region: &str, year: Year, value: f64) -> RegionYearPanel {
    let mut panel = RegionYearPanel::zeros(RegionAxis::new(regions.iter().copied()), (2010..=2099).collect());
    panel.set(region, year, value).expect("impulse cell");
    panel
}

pub fn zeros(regions: &[&str]) -> RegionYearPanel {
    RegionYearPanel::zeros(RegionAxis::new(regions.iter().copied()), (2010..=2099).collect())
}
