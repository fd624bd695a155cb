//! End-to-end checks of the valuation pipeline on a small synthetic ensemble.
//!
//! Three impact regions, constant population and life expectancy, and a
//! fake impact source that reports `batch + 1` deaths of the older group in
//! the first region in 2020.

use approx::assert_relative_eq;
use is_close::is_close;
use mortval::components::aggregate::{GcmWeights, Statistic};
use mortval::components::age_factors::LIFE_EXPECTANCY_COLUMNS;
use mortval::components::demographics::{Harmonizer, HarmonizedDemographics, MemoryCache, POPULATION_COLUMNS};
use mortval::components::methodology::{compute_valuation_series, IncomeTable, ValuationSeries};
use mortval::components::monetize::{ImpactRecord, ImpactSource, Monetizer};
use mortval::config::{DemographicParameters, MonetizationParameters};
use mortval::ensemble::{collate_global, summarize_regional, EnsembleRunner};
use mortval::errors::{ValuationError, ValuationResult};
use mortval::labels::{
    AdaptationScenario, AgeGroup, EconModel, EnsembleMember, LifeUnit, Methodology, MonetizedVariable, Quantity,
    Rcp, Scenario, ValuationBase, ValuationMeasure, Variant,
};
use mortval::panel::{RegionAxis, RegionYearPanel};
use mortval::pricing::{BaselineValuation, PriceIndex, ReportingAdjustment};
use mortval::table::{KeyedTable, RowKey, Year};
use ndarray::Array2;
use std::sync::Arc;

const REGIONS: [&str; 3] = ["AAA.1", "AAA.2", "BBB.1"];
const POPULATION: f64 = 1_000_000.0;
const REFERENCE_INCOME: f64 = 50_000.0;

fn window() -> Vec<Year> {
    (2010..=2099).collect()
}

fn sources() -> (KeyedTable, KeyedTable) {
    let mut pop = KeyedTable::new("population", &POPULATION_COLUMNS);
    for region in REGIONS {
        for year in (2010..=2100).step_by(5) {
            pop.push(
                RowKey::new(region, Scenario::Ssp3, year),
                &[POPULATION, 0.1 * POPULATION, 0.7 * POPULATION, 0.2 * POPULATION],
            );
        }
    }
    // BBB has no life expectancy of its own and is imputed from AAA and CCC.
    let mut le = KeyedTable::new("life expectancy", &LIFE_EXPECTANCY_COLUMNS);
    for (country, older) in [("AAA", 20.0), ("CCC", 30.0)] {
        for year in [2010, 2015] {
            le.push(
                RowKey::new(country, Scenario::Ssp3, year),
                &[70.0, older, 5.0, 40.0, 0.5, 1.0, 0.25],
            );
        }
    }
    (pop, le)
}

fn demographics(harmonizer: &Harmonizer) -> Arc<HarmonizedDemographics> {
    let (pop, le) = sources();
    let mut out = harmonizer
        .harmonize(&pop, &le, &RegionAxis::new(REGIONS), &[Scenario::Ssp3])
        .unwrap();
    out.remove(0)
}

fn reporting() -> ReportingAdjustment {
    let gdppc = PriceIndex::from_pairs("gdppc", [(2019, REFERENCE_INCOME)]);
    let deflator = PriceIndex::from_pairs("deflator", [(2005, 100.0), (2012, 100.0), (2019, 100.0)]);
    ReportingAdjustment::from_series(&gdppc, &deflator, 2019, 2012, 2005, 2019).unwrap()
}

fn baseline() -> BaselineValuation {
    let cpi = PriceIndex::from_pairs("CPI", [(2005, 200.0), (2020, 200.0)]);
    BaselineValuation::convert(10_000_000.0, 50.0, &cpi, 2005, 2020).unwrap()
}

/// Region income: twice the reference in AAA.1, the reference elsewhere.
fn series(demographics: &HarmonizedDemographics) -> ValuationSeries {
    let years: Vec<Year> = (2010..=2100).collect();
    let gdppc = [2.0 * REFERENCE_INCOME, REFERENCE_INCOME, REFERENCE_INCOME];
    let values = Array2::from_shape_fn((REGIONS.len(), years.len()), |(r, _)| gdppc[r]);
    let income = IncomeTable::new(Scenario::Ssp3, ValuationBase::Region).with_model(
        EconModel::Low,
        RegionYearPanel::new(RegionAxis::new(REGIONS), years, values),
    );
    compute_valuation_series(demographics, &income, &baseline(), &reporting()).unwrap()
}

struct FakeSource;

impl ImpactSource for FakeSource {
    fn load(&self, member: &EnsembleMember, adaptation: AdaptationScenario) -> ValuationResult<ImpactRecord> {
        if member.gcm == "BROKEN" {
            return Err(ValuationError::lookup(member.to_string(), "impact projections"));
        }
        let axis = RegionAxis::new(REGIONS);
        let mut record = ImpactRecord::new(member.clone(), adaptation);
        for group in AgeGroup::ALL {
            let mut deaths = RegionYearPanel::zeros(axis.clone(), window());
            if *group == AgeGroup::Older {
                deaths.set("AAA.1", 2020, (member.batch + 1) as f64)?;
            }
            record.insert(*group, deaths, RegionYearPanel::zeros(axis.clone(), window()))?;
        }
        Ok(record)
    }
}

fn members() -> Vec<EnsembleMember> {
    let mut members = Vec::new();
    for gcm in ["GCM-A", "GCM-B", "BROKEN"] {
        for batch in 0..3 {
            members.push(EnsembleMember::new(batch, Rcp::Rcp85, gcm, EconModel::Low, Scenario::Ssp3));
        }
    }
    members
}

fn vsl_deaths() -> MonetizedVariable {
    MonetizedVariable::new(Quantity::Deaths, Methodology::Vsl, Variant::IncomeScaled)
}

#[test]
fn test_imputed_country_takes_mean_life_expectancy() {
    let harmonizer = Harmonizer::uncached(DemographicParameters::default());
    let demographics = demographics(&harmonizer);
    let older = demographics.expectancy(AgeGroup::Older);
    let b = demographics.regions().require("BBB.1").unwrap();
    let a = demographics.regions().require("AAA.1").unwrap();
    assert_relative_eq!(older[[b, 5]], 25.0);
    assert_relative_eq!(older[[a, 5]], 20.0);
}

#[test]
fn test_demographics_are_cached_per_scenario() {
    let cache = Arc::new(MemoryCache::new());
    let harmonizer = Harmonizer::new(DemographicParameters::default(), cache.clone());
    let first = demographics(&harmonizer);
    let second = demographics(&harmonizer);
    assert_eq!(cache.len(), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_population_average_is_constant_across_regions() {
    let harmonizer = Harmonizer::uncached(DemographicParameters::default());
    let demographics = demographics(&harmonizer);
    let series = series(&demographics);

    let measure = ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::PopulationAveraged);
    let panel = series.measure(measure, EconModel::Low).unwrap();
    // Income ratios 2, 1, 1 with equal populations average to 4/3.
    for value in panel.iter() {
        assert!(is_close!(*value, 10_000_000.0 * 4.0 / 3.0));
    }
}

#[test]
fn test_ensemble_run_isolates_failures() {
    let harmonizer = Harmonizer::uncached(DemographicParameters::default());
    let demographics = demographics(&harmonizer);
    let series = series(&demographics);
    let monetizer = Monetizer::new(&series, &demographics, MonetizationParameters::default()).unwrap();
    let source = FakeSource;

    let outcome = EnsembleRunner::new(&source, AdaptationScenario::FullAdapt)
        .with_monetizer(Scenario::Ssp3, monetizer)
        .run(&members());

    assert_eq!(outcome.len(), 6);
    assert_eq!(outcome.failures.len(), 3);
    assert!(outcome.failures.iter().all(|f| f.member.gcm == "BROKEN"));

    for damages in &outcome.damages {
        let expected = 20_000_000.0 * (damages.member().batch + 1) as f64;
        assert_relative_eq!(damages.value(&vsl_deaths(), "AAA.1", 2020).unwrap(), expected);
        assert_relative_eq!(damages.value(&vsl_deaths(), "AAA.2", 2020).unwrap(), 0.0);
        let per_capita = MonetizedVariable::new(Quantity::Damages, Methodology::Vsl, Variant::IncomeScaled);
        assert_relative_eq!(damages.value(&per_capita, "AAA.1", 2020).unwrap(), expected / POPULATION);
    }
}

#[test]
fn test_unregistered_scenario_is_a_member_failure() {
    let source = FakeSource;
    let member = EnsembleMember::new(0, Rcp::Rcp45, "GCM-A", EconModel::Low, Scenario::Ssp5);
    let outcome = EnsembleRunner::new(&source, AdaptationScenario::FullAdapt).run(&[member]);
    assert!(outcome.is_empty());
    assert!(matches!(outcome.failures[0].error, ValuationError::DataAlignment { .. }));
}

#[test]
fn test_regional_summary() {
    let harmonizer = Harmonizer::uncached(DemographicParameters::default());
    let demographics = demographics(&harmonizer);
    let series = series(&demographics);
    let monetizer = Monetizer::new(&series, &demographics, MonetizationParameters::default()).unwrap();
    let source = FakeSource;
    let outcome = EnsembleRunner::new(&source, AdaptationScenario::FullAdapt)
        .with_monetizer(Scenario::Ssp3, monetizer)
        .run(&members());

    let weights = GcmWeights::from_pairs([("GCM-A", 1.0), ("GCM-B", 3.0)]).unwrap();
    let statistics = Statistic::parse_all(&["mean", "q0", "q50", "q100"]).unwrap();
    let summaries = summarize_regional(&outcome, &weights, &statistics).unwrap();
    assert_eq!(summaries.len(), 1);

    let summary = &summaries[0];
    assert_eq!(summary.members, 6);
    assert_eq!(summary.excluded.len(), 3);

    let get = |statistic| summary.table.value(&vsl_deaths(), statistic, "AAA.1", 2020).unwrap();
    assert_relative_eq!(get(Statistic::Mean), 40_000_000.0, max_relative = 1e-12);
    assert_relative_eq!(get(Statistic::Quantile(0.0)), 20_000_000.0);
    assert_relative_eq!(get(Statistic::Quantile(0.5)), 40_000_000.0);
    assert_relative_eq!(get(Statistic::Quantile(1.0)), 60_000_000.0);

    let gdp = series.gdp_panel(EconModel::Low).unwrap();
    let summary = summaries.into_iter().next().unwrap().with_gdp(&gdp).unwrap();
    let a = summary.table.regions().require("AAA.1").unwrap();
    assert_relative_eq!(summary.table.gdp().unwrap()[[a, 0]], 2.0 * REFERENCE_INCOME * POPULATION);
}

#[test]
fn test_slice_without_survivors_fails_the_summary() {
    let harmonizer = Harmonizer::uncached(DemographicParameters::default());
    let demographics = demographics(&harmonizer);
    let series = series(&demographics);
    let monetizer = Monetizer::new(&series, &demographics, MonetizationParameters::default()).unwrap();
    let source = FakeSource;

    let mut members = members();
    members.push(EnsembleMember::new(0, Rcp::Rcp45, "BROKEN", EconModel::Low, Scenario::Ssp3));
    let outcome = EnsembleRunner::new(&source, AdaptationScenario::FullAdapt)
        .with_monetizer(Scenario::Ssp3, monetizer)
        .run(&members);
    assert_eq!(outcome.len(), 6);
    assert_eq!(outcome.failures.len(), 4);

    let weights = GcmWeights::from_pairs([("GCM-A", 1.0), ("GCM-B", 1.0)]).unwrap();
    let err = summarize_regional(&outcome, &weights, &[Statistic::Mean]).unwrap_err();
    assert_eq!(
        err,
        ValuationError::alignment("slice", "rcp45/low/SSP3", "all 1 members failed")
    );
}

#[test]
fn test_summary_of_empty_outcome() {
    let outcome = mortval::ensemble::EnsembleOutcome::default();
    let weights = GcmWeights::from_pairs([("GCM-A", 1.0)]).unwrap();
    assert!(matches!(
        summarize_regional(&outcome, &weights, &[Statistic::Mean]),
        Err(ValuationError::DataAlignment { .. })
    ));
}

#[test]
fn test_global_collation() {
    let harmonizer = Harmonizer::uncached(DemographicParameters::default());
    let demographics = demographics(&harmonizer);
    let series = series(&demographics);
    let monetizer = Monetizer::new(&series, &demographics, MonetizationParameters::default()).unwrap();
    let source = FakeSource;
    let outcome = EnsembleRunner::new(&source, AdaptationScenario::FullAdapt)
        .with_monetizer(Scenario::Ssp3, monetizer)
        .run(&members());

    let global = collate_global(&outcome).unwrap();
    assert_eq!(global.rows.len(), 6 * window().len());
    assert_eq!(global.columns.last().map(String::as_str), Some("gdp"));

    let deaths = global.column(&vsl_deaths().to_string()).unwrap();
    let total: f64 = deaths.iter().sum();
    // 2 climate models, batches contribute 1 + 2 + 3 deaths each.
    assert_relative_eq!(total, 2.0 * 6.0 * 20_000_000.0, max_relative = 1e-12);

    let gdp = global.column("gdp").unwrap();
    assert_relative_eq!(gdp[0], 4.0 * REFERENCE_INCOME * POPULATION, max_relative = 1e-12);
}

#[test]
fn test_configured_statistics_summarize_the_ensemble() {
    let harmonizer = Harmonizer::uncached(DemographicParameters::default());
    let demographics = demographics(&harmonizer);
    let series = series(&demographics);
    let monetizer = Monetizer::new(&series, &demographics, MonetizationParameters::default()).unwrap();
    let source = FakeSource;
    let outcome = EnsembleRunner::new(&source, AdaptationScenario::FullAdapt)
        .with_monetizer(Scenario::Ssp3, monetizer)
        .run(&members());

    let config = mortval::config::ValuationConfig::default();
    let statistics = Statistic::parse_all(&config.aggregation.statistics).unwrap();
    let weights = GcmWeights::from_pairs([("GCM-A", 0.5), ("GCM-B", 0.5)]).unwrap();
    let summaries = summarize_regional(&outcome, &weights, &statistics).unwrap();

    let names = summaries[0].table.column_names();
    assert_eq!(names.len(), 27 * 8);
    assert!(names.contains(&format!("{}_q05", vsl_deaths())));
    assert!(names.contains(&format!("{}_mean", vsl_deaths())));
}
