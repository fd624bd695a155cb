//! Valuation series
//!
//! Derives the six space/time-varying valuation measures from one baseline
//! value pair and projected per-capita income. For an impact region $r$,
//! economic model $m$ and year $t$:
//!
//! $$ VSL^{flat} = VSL_0 $$
//!
//! $$ VSL^{scaled}_{r,m,t} = VSL_0 \cdot \frac{y_{r,m,t}}{\bar{y}} $$
//!
//! $$ VSL^{popavg}_{m,t} = \frac{\sum_r P_{r,t} \, VSL^{scaled}_{r,m,t}}{\sum_r P_{r,t}} $$
//!
//! where $y$ is per-capita income, $\bar{y}$ the reference income and $P$
//! population. The life-year measures follow with $VLY_0$ in place of
//! $VSL_0$. Every monetary field is finally multiplied by the reporting
//! price adjustment. Population is never price-adjusted.
//!
//! The population-averaged measures are grouped by (economic model,
//! scenario, year) only. They are stored on the region axis for convenience
//! but are constant across regions within each group.

use indexmap::IndexMap;
use mortval_core::errors::{ValuationError, ValuationResult};
use mortval_core::labels::{country_of, EconModel, LifeUnit, Scenario, ValuationBase, ValuationMeasure, Variant};
use mortval_core::panel::{year_index, RegionAxis, RegionYearPanel};
use mortval_core::pricing::{BaselineValuation, ReportingAdjustment};
use mortval_core::table::Year;
use ndarray::{s, Array3, Array4, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::components::demographics::HarmonizedDemographics;

/// Projected per-capita income of one scenario, per economic model.
///
/// Panels are keyed by impact region ([`ValuationBase::Region`]) or by
/// country code ([`ValuationBase::Country`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeTable {
    scenario: Scenario,
    base: ValuationBase,
    gdppc: IndexMap<EconModel, RegionYearPanel>,
}

impl IncomeTable {
    pub fn new(scenario: Scenario, base: ValuationBase) -> Self {
        Self {
            scenario,
            base,
            gdppc: IndexMap::new(),
        }
    }

    pub fn with_model(mut self, model: EconModel, gdppc: RegionYearPanel) -> Self {
        self.insert(model, gdppc);
        self
    }

    pub fn insert(&mut self, model: EconModel, gdppc: RegionYearPanel) {
        self.gdppc.insert(model, gdppc);
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn base(&self) -> ValuationBase {
        self.base
    }

    pub fn models(&self) -> impl Iterator<Item = EconModel> + '_ {
        self.gdppc.keys().copied()
    }

    pub fn gdppc(&self, model: EconModel) -> ValuationResult<&RegionYearPanel> {
        self.gdppc
            .get(&model)
            .ok_or_else(|| ValuationError::alignment("model", model, "no income projection"))
    }

    /// Spatial unit whose income applies to `region`.
    fn unit_of<'a>(&self, region: &'a str) -> &'a str {
        match self.base {
            ValuationBase::Region => region,
            ValuationBase::Country => country_of(region),
        }
    }
}

/// The six valuation measures plus GDP and population of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSeries {
    scenario: Scenario,
    base: ValuationBase,
    models: Vec<EconModel>,
    regions: RegionAxis,
    years: Vec<Year>,
    /// Shape (measure, model, region, year), measures in [`ValuationMeasure::ALL`] order
    measures: Array4<f64>,
    /// Shape (model, region, year)
    gdp: Array3<f64>,
    /// Shape (model, region, year)
    population: Array3<f64>,
}

impl ValuationSeries {
    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Income basis the income-scaled measures were computed on.
    pub fn base(&self) -> ValuationBase {
        self.base
    }

    pub fn models(&self) -> &[EconModel] {
        &self.models
    }

    pub fn regions(&self) -> &RegionAxis {
        &self.regions
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn model_index(&self, model: EconModel) -> ValuationResult<usize> {
        self.models
            .iter()
            .position(|m| *m == model)
            .ok_or_else(|| ValuationError::alignment("model", model, "absent from valuation series"))
    }

    /// Values of a measure for one model, shape (region, year).
    pub fn measure(&self, measure: ValuationMeasure, model: EconModel) -> ValuationResult<ArrayView2<'_, f64>> {
        let m = self.model_index(model)?;
        Ok(self.measures.slice(s![measure.index(), m, .., ..]))
    }

    /// Total GDP in reporting currency, shape (region, year).
    pub fn gdp(&self, model: EconModel) -> ValuationResult<ArrayView2<'_, f64>> {
        let m = self.model_index(model)?;
        Ok(self.gdp.index_axis(Axis(0), m))
    }

    pub fn population(&self, model: EconModel) -> ValuationResult<ArrayView2<'_, f64>> {
        let m = self.model_index(model)?;
        Ok(self.population.index_axis(Axis(0), m))
    }

    pub fn value(
        &self,
        measure: ValuationMeasure,
        model: EconModel,
        region: &str,
        year: Year,
    ) -> ValuationResult<f64> {
        let r = self.regions.require(region)?;
        let t = year_index(&self.years, year)
            .ok_or_else(|| ValuationError::alignment("year", year, "absent from valuation series"))?;
        Ok(self.measure(measure, model)?[[r, t]])
    }

    /// GDP of one model as a standalone panel.
    pub fn gdp_panel(&self, model: EconModel) -> ValuationResult<RegionYearPanel> {
        Ok(RegionYearPanel::new(
            self.regions.clone(),
            self.years.clone(),
            self.gdp(model)?.to_owned(),
        ))
    }
}

/// Compute the valuation series of one scenario.
///
/// Regions are the intersection of the demographic regions and the regions
/// for which every economic model has income (under the table's valuation
/// base); dropped regions are logged. Years are the intersection of the
/// demographic and income year axes.
///
/// # Errors
///
/// * `DataAlignment` if demographics and income belong to different
///   scenarios, or if no region or year survives the join
/// * `NumericDomain` if the reference income is not positive, or if a
///   population used for averaging is negative or sums to zero
pub fn compute_valuation_series(
    demographics: &HarmonizedDemographics,
    income: &IncomeTable,
    baseline: &BaselineValuation,
    adjustment: &ReportingAdjustment,
) -> ValuationResult<ValuationSeries> {
    let scenario = demographics.scenario();
    if income.scenario() != scenario {
        return Err(ValuationError::alignment(
            "scenario",
            income.scenario(),
            format!("income does not match demographics for {}", scenario),
        ));
    }
    if adjustment.reference_income <= 0.0 {
        return Err(ValuationError::NumericDomain(format!(
            "reference income must be positive, got {}",
            adjustment.reference_income
        )));
    }
    let models: Vec<EconModel> = income.models().collect();
    if models.is_empty() {
        return Err(ValuationError::alignment("model", "<none>", format!("no income for {}", scenario)));
    }
    log::info!(
        "Computing {} valuation series for {} ({} models)",
        income.base(),
        scenario,
        models.len()
    );

    // Inner join on regions
    let panels: Vec<&RegionYearPanel> = models
        .iter()
        .map(|m| income.gdppc(*m))
        .collect::<ValuationResult<_>>()?;
    let kept: Vec<&str> = demographics
        .regions()
        .iter()
        .filter(|r| {
            let unit = income.unit_of(r);
            panels.iter().all(|p| p.regions().contains(unit))
        })
        .collect();
    if kept.len() < demographics.regions().len() {
        log::warn!(
            "{} of {} regions have no {} income for {} and were dropped",
            demographics.regions().len() - kept.len(),
            demographics.regions().len(),
            income.base(),
            scenario
        );
    }

    let years: Vec<Year> = demographics
        .years()
        .iter()
        .copied()
        .filter(|y| panels.iter().all(|p| p.year_index(*y).is_some()))
        .collect();
    if kept.is_empty() || years.is_empty() {
        return Err(ValuationError::alignment(
            "scenario",
            scenario,
            "demographics and income share no region-years",
        ));
    }

    let regions = RegionAxis::new(kept.iter().copied());
    let shape = (models.len(), regions.len(), years.len());
    let mut measures = Array4::<f64>::zeros((ValuationMeasure::ALL.len(), shape.0, shape.1, shape.2));
    let mut gdp = Array3::<f64>::zeros(shape);
    let mut population = Array3::<f64>::zeros(shape);

    let pop_source = demographics.population();
    let demo_rows: Vec<usize> = regions
        .iter()
        .map(|r| demographics.regions().require(r))
        .collect::<ValuationResult<_>>()?;
    let demo_cols: Vec<usize> = years
        .iter()
        .map(|y| {
            year_index(demographics.years(), *y)
                .ok_or_else(|| ValuationError::alignment("year", y, "absent from demographics"))
        })
        .collect::<ValuationResult<_>>()?;

    for (m, panel) in panels.iter().enumerate() {
        let income_rows: Vec<usize> = regions
            .iter()
            .map(|r| panel.regions().require(income.unit_of(r)))
            .collect::<ValuationResult<_>>()?;
        let income_cols: Vec<usize> = years
            .iter()
            .map(|y| {
                panel
                    .year_index(*y)
                    .ok_or_else(|| ValuationError::alignment("year", y, "absent from income"))
            })
            .collect::<ValuationResult<_>>()?;

        for r in 0..regions.len() {
            for t in 0..years.len() {
                let gdppc = panel.values()[[income_rows[r], income_cols[t]]];
                let pop = pop_source[[demo_rows[r], demo_cols[t]]];
                let ratio = gdppc / adjustment.reference_income;
                population[[m, r, t]] = pop;
                gdp[[m, r, t]] = gdppc * pop;
                for unit in LifeUnit::ALL {
                    let base_value = baseline_value(baseline, *unit);
                    let flat = ValuationMeasure::new(*unit, Variant::Flat);
                    let scaled = ValuationMeasure::new(*unit, Variant::IncomeScaled);
                    measures[[flat.index(), m, r, t]] = base_value;
                    measures[[scaled.index(), m, r, t]] = base_value * ratio;
                }
            }
        }

        for unit in LifeUnit::ALL {
            let scaled = ValuationMeasure::new(*unit, Variant::IncomeScaled).index();
            let averaged = ValuationMeasure::new(*unit, Variant::PopulationAveraged).index();
            for t in 0..years.len() {
                let mean = population_weighted_mean(
                    population.slice(s![m, .., t]).iter().copied(),
                    measures.slice(s![scaled, m, .., t]).iter().copied(),
                )?;
                measures.slice_mut(s![averaged, m, .., t]).fill(mean);
            }
        }
    }

    measures.mapv_inplace(|v| v * adjustment.price_adjustment);
    gdp.mapv_inplace(|v| v * adjustment.price_adjustment);

    Ok(ValuationSeries {
        scenario,
        base: income.base(),
        models,
        regions,
        years,
        measures,
        gdp,
        population,
    })
}

fn baseline_value(baseline: &BaselineValuation, unit: LifeUnit) -> f64 {
    match unit {
        LifeUnit::StatisticalLife => baseline.vsl,
        LifeUnit::LifeYear => baseline.vly,
    }
}

/// Population-weighted mean over regions. Regions with a missing population
/// or value do not contribute; NaN if none do.
fn population_weighted_mean(
    population: impl Iterator<Item = f64>,
    values: impl Iterator<Item = f64>,
) -> ValuationResult<f64> {
    let mut weighted = 0.0;
    let mut total = 0.0;
    let mut contributors = 0usize;
    for (pop, value) in population.zip(values) {
        if !pop.is_finite() || !value.is_finite() {
            continue;
        }
        if pop < 0.0 {
            return Err(ValuationError::NumericDomain(format!(
                "negative population {} in population averaging",
                pop
            )));
        }
        weighted += pop * value;
        total += pop;
        contributors += 1;
    }
    if contributors == 0 {
        return Ok(f64::NAN);
    }
    if total <= 0.0 {
        return Err(ValuationError::NumericDomain(
            "population used for averaging sums to zero".to_string(),
        ));
    }
    Ok(weighted / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::age_factors::LIFE_EXPECTANCY_COLUMNS;
    use crate::components::demographics::{Harmonizer, POPULATION_COLUMNS};
    use approx::assert_relative_eq;
    use mortval_core::config::DemographicParameters;
    use mortval_core::table::{KeyedTable, RowKey};
    use ndarray::Array2;

    const REGIONS: [&str; 3] = ["USA.1", "USA.2", "FRA.1"];
    const POPS: [f64; 3] = [1_000.0, 3_000.0, 4_000.0];

    fn demographics() -> HarmonizedDemographics {
        let mut pop = KeyedTable::new("population", &POPULATION_COLUMNS);
        let mut le = KeyedTable::new("life expectancy", &LIFE_EXPECTANCY_COLUMNS);
        for (region, p) in REGIONS.iter().zip(POPS) {
            for year in [2015, 2020] {
                pop.push(RowKey::new(*region, Scenario::Ssp2, year), &[p, 0.0, p, 0.0]);
            }
        }
        for country in ["USA", "FRA"] {
            le.push(
                RowKey::new(country, Scenario::Ssp2, 2015),
                &[70.0, 40.0, 10.0, 50.0, 1.0, 1.0, 1.0],
            );
        }
        Harmonizer::uncached(DemographicParameters::default())
            .harmonize_scenario(&pop, &le, &RegionAxis::new(REGIONS), Scenario::Ssp2)
            .unwrap()
    }

    fn income(values: [f64; 3]) -> IncomeTable {
        let years: Vec<Year> = (2015..=2020).collect();
        let mut gdppc = Array2::zeros((3, years.len()));
        for (r, v) in values.iter().enumerate() {
            gdppc.row_mut(r).fill(*v);
        }
        IncomeTable::new(Scenario::Ssp2, ValuationBase::Region).with_model(
            EconModel::Low,
            RegionYearPanel::new(RegionAxis::new(REGIONS), years, gdppc),
        )
    }

    fn baseline() -> BaselineValuation {
        BaselineValuation {
            vsl: 10_000_000.0,
            vly: 10_000_000.0 / 50.0,
            currency_year: 2005,
        }
    }

    fn no_adjustment(reference_income: f64) -> ReportingAdjustment {
        ReportingAdjustment {
            reference_income,
            price_adjustment: 1.0,
        }
    }

    #[test]
    fn test_income_elasticity_is_unity() {
        let series = compute_valuation_series(
            &demographics(),
            &income([20_000.0, 10_000.0, 5_000.0]),
            &baseline(),
            &no_adjustment(10_000.0),
        )
        .unwrap();

        let scaled = ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::IncomeScaled);
        assert_relative_eq!(
            series.value(scaled, EconModel::Low, "USA.1", 2017).unwrap(),
            20_000_000.0
        );
        assert_relative_eq!(
            series.value(scaled, EconModel::Low, "FRA.1", 2017).unwrap(),
            5_000_000.0
        );
        let flat = ValuationMeasure::new(LifeUnit::LifeYear, Variant::Flat);
        assert_relative_eq!(
            series.value(flat, EconModel::Low, "FRA.1", 2020).unwrap(),
            200_000.0
        );
    }

    #[test]
    fn test_population_average_is_constant_across_regions() {
        let series = compute_valuation_series(
            &demographics(),
            &income([20_000.0, 10_000.0, 5_000.0]),
            &baseline(),
            &no_adjustment(10_000.0),
        )
        .unwrap();
        let averaged = ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::PopulationAveraged);
        let expected = (1_000.0 * 20e6 + 3_000.0 * 10e6 + 4_000.0 * 5e6) / 8_000.0;
        for region in REGIONS {
            assert_relative_eq!(
                series.value(averaged, EconModel::Low, region, 2018).unwrap(),
                expected,
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn test_price_adjustment_skips_population() {
        let adjustment = ReportingAdjustment {
            reference_income: 10_000.0,
            price_adjustment: 1.5,
        };
        let series = compute_valuation_series(
            &demographics(),
            &income([10_000.0, 10_000.0, 10_000.0]),
            &baseline(),
            &adjustment,
        )
        .unwrap();
        let r = series.regions().require("USA.2").unwrap();
        assert_relative_eq!(series.population(EconModel::Low).unwrap()[[r, 0]], 3_000.0);
        assert_relative_eq!(series.gdp(EconModel::Low).unwrap()[[r, 0]], 1.5 * 3_000.0 * 10_000.0);
        let flat = ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::Flat);
        assert_relative_eq!(series.value(flat, EconModel::Low, "USA.2", 2015).unwrap(), 15_000_000.0);
    }

    #[test]
    fn test_country_income_is_broadcast() {
        let years: Vec<Year> = (2015..=2020).collect();
        let gdppc = Array2::from_shape_fn((2, years.len()), |(r, _)| if r == 0 { 30_000.0 } else { 15_000.0 });
        let income = IncomeTable::new(Scenario::Ssp2, ValuationBase::Country).with_model(
            EconModel::High,
            RegionYearPanel::new(RegionAxis::new(["USA", "FRA"]), years, gdppc),
        );
        let series =
            compute_valuation_series(&demographics(), &income, &baseline(), &no_adjustment(15_000.0)).unwrap();
        let scaled = ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::IncomeScaled);
        assert_eq!(series.base(), ValuationBase::Country);
        assert_relative_eq!(series.value(scaled, EconModel::High, "USA.1", 2016).unwrap(), 20_000_000.0);
        assert_relative_eq!(series.value(scaled, EconModel::High, "USA.2", 2016).unwrap(), 20_000_000.0);
        assert_relative_eq!(series.value(scaled, EconModel::High, "FRA.1", 2016).unwrap(), 10_000_000.0);
        assert!(series.measure(scaled, EconModel::Low).is_err());
    }

    #[test]
    fn test_regions_without_income_are_dropped() {
        let years: Vec<Year> = (2015..=2020).collect();
        let income = IncomeTable::new(Scenario::Ssp2, ValuationBase::Region).with_model(
            EconModel::Low,
            RegionYearPanel::filled(RegionAxis::new(["USA.1", "FRA.1"]), years, 1.0),
        );
        let series =
            compute_valuation_series(&demographics(), &income, &baseline(), &no_adjustment(1.0)).unwrap();
        assert_eq!(series.regions(), &RegionAxis::new(["USA.1", "FRA.1"]));
    }

    #[test]
    fn test_scenario_mismatch() {
        let income = IncomeTable::new(Scenario::Ssp5, ValuationBase::Region);
        let err = compute_valuation_series(&demographics(), &income, &baseline(), &no_adjustment(1.0))
            .unwrap_err();
        assert!(matches!(err, ValuationError::DataAlignment { .. }));
    }

    #[test]
    fn test_negative_population_is_rejected() {
        let err = population_weighted_mean([1.0, -1.0].into_iter(), [1.0, 1.0].into_iter()).unwrap_err();
        assert!(matches!(err, ValuationError::NumericDomain(_)));
        assert!(population_weighted_mean([f64::NAN].into_iter(), [1.0].into_iter())
            .unwrap()
            .is_nan());
    }
}
