//! Demographic harmonization
//!
//! Turns quinquennial population (by impact region) and life-expectancy
//! (by country) sources into annual series for every impact region.
//!
//! # What This Component Does
//!
//! 1. Extends life-expectancy anchors to the terminal year (2100 by default)
//!    by repeating the closest prior anchor of each country.
//! 2. Imputes countries that are absent from the life-expectancy source at
//!    the reference year with the cross-sectional mean of all present
//!    countries of the same scenario and year.
//! 3. Joins population anchors (years on the anchor cadence) with the
//!    country's life-expectancy anchors.
//! 4. Interpolates every field linearly to annual resolution, independently
//!    within each (region, scenario) series.
//!
//! Imputation uses scenario/year means rather than a neighbouring country.
//! That is a modelling policy, not a numerical fallback.
//!
//! Harmonizing is expensive and its result is immutable, so the
//! [`Harmonizer`] consults an injectable [`DemographicsCache`] first.

use crate::components::age_factors::{
    expectancy_column, mt_column, EXPECTANCY_MT_REFERENCE, LIFE_EXPECTANCY_COLUMNS,
};
use indexmap::IndexMap;
use mortval_core::config::DemographicParameters;
use mortval_core::errors::{ValuationError, ValuationResult};
use mortval_core::interpolate::fill_linear;
use mortval_core::labels::{country_of, AgeGroup, Scenario};
use mortval_core::panel::{year_index, RegionAxis, RegionYearPanel};
use mortval_core::table::{KeyedTable, Year};
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

pub const POP_TOTAL: &str = "pop";
pub const POP_YOUNG: &str = "pop0to4";
pub const POP_OLDER: &str = "pop5to64";
pub const POP_OLDEST: &str = "pop65plus";

/// Columns required in the population source.
pub const POPULATION_COLUMNS: [&str; 4] = [POP_TOTAL, POP_YOUNG, POP_OLDER, POP_OLDEST];

/// A harmonized demographic field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DemographicField {
    Population = 0,
    PopulationYoung = 1,
    PopulationOlder = 2,
    PopulationOldest = 3,
    ExpectancyYoung = 4,
    ExpectancyOlder = 5,
    ExpectancyOldest = 6,
    ExpectancyMtReference = 7,
    MtYoung = 8,
    MtOlder = 9,
    MtOldest = 10,
}

impl DemographicField {
    pub const ALL: [DemographicField; 11] = [
        DemographicField::Population,
        DemographicField::PopulationYoung,
        DemographicField::PopulationOlder,
        DemographicField::PopulationOldest,
        DemographicField::ExpectancyYoung,
        DemographicField::ExpectancyOlder,
        DemographicField::ExpectancyOldest,
        DemographicField::ExpectancyMtReference,
        DemographicField::MtYoung,
        DemographicField::MtOlder,
        DemographicField::MtOldest,
    ];

    /// Source column the field is read from.
    pub fn column(&self) -> &'static str {
        match self {
            DemographicField::Population => POP_TOTAL,
            DemographicField::PopulationYoung => POP_YOUNG,
            DemographicField::PopulationOlder => POP_OLDER,
            DemographicField::PopulationOldest => POP_OLDEST,
            DemographicField::ExpectancyYoung => expectancy_column(AgeGroup::Young),
            DemographicField::ExpectancyOlder => expectancy_column(AgeGroup::Older),
            DemographicField::ExpectancyOldest => expectancy_column(AgeGroup::Oldest),
            DemographicField::ExpectancyMtReference => EXPECTANCY_MT_REFERENCE,
            DemographicField::MtYoung => mt_column(AgeGroup::Young),
            DemographicField::MtOlder => mt_column(AgeGroup::Older),
            DemographicField::MtOldest => mt_column(AgeGroup::Oldest),
        }
    }

    pub fn expectancy(group: AgeGroup) -> Self {
        match group {
            AgeGroup::Young => DemographicField::ExpectancyYoung,
            AgeGroup::Older => DemographicField::ExpectancyOlder,
            AgeGroup::Oldest => DemographicField::ExpectancyOldest,
        }
    }

    pub fn mt_weight(group: AgeGroup) -> Self {
        match group {
            AgeGroup::Young => DemographicField::MtYoung,
            AgeGroup::Older => DemographicField::MtOlder,
            AgeGroup::Oldest => DemographicField::MtOldest,
        }
    }

    pub fn population(group: AgeGroup) -> Self {
        match group {
            AgeGroup::Young => DemographicField::PopulationYoung,
            AgeGroup::Older => DemographicField::PopulationOlder,
            AgeGroup::Oldest => DemographicField::PopulationOldest,
        }
    }
}

/// Annual population and life-expectancy series for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonizedDemographics {
    scenario: Scenario,
    regions: RegionAxis,
    years: Vec<Year>,
    /// Shape (field, region, year)
    data: Array3<f64>,
}

impl HarmonizedDemographics {
    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn regions(&self) -> &RegionAxis {
        &self.regions
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }

    /// Values of one field, shape (region, year).
    pub fn field(&self, field: DemographicField) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), field as usize)
    }

    /// One field as a standalone panel.
    pub fn panel(&self, field: DemographicField) -> RegionYearPanel {
        RegionYearPanel::new(
            self.regions.clone(),
            self.years.clone(),
            self.field(field).to_owned(),
        )
    }

    pub fn value(&self, field: DemographicField, region: &str, year: Year) -> ValuationResult<f64> {
        let r = self.regions.require(region)?;
        let t = year_index(&self.years, year)
            .ok_or_else(|| ValuationError::alignment("year", year, "not covered by demographics"))?;
        Ok(self.data[[field as usize, r, t]])
    }

    pub fn population(&self) -> ArrayView2<'_, f64> {
        self.field(DemographicField::Population)
    }

    /// Remaining life expectancy of an age group.
    pub fn expectancy(&self, group: AgeGroup) -> ArrayView2<'_, f64> {
        self.field(DemographicField::expectancy(group))
    }

    /// Remaining life expectancy anchoring the Murphy-Topel life-years.
    pub fn mt_reference_expectancy(&self) -> ArrayView2<'_, f64> {
        self.field(DemographicField::ExpectancyMtReference)
    }

    /// Murphy-Topel weight of an age group.
    pub fn mt_weight(&self, group: AgeGroup) -> ArrayView2<'_, f64> {
        self.field(DemographicField::mt_weight(group))
    }
}

/// Storage for harmonized demographics, keyed by scenario.
///
/// A cache is only valid for the sources it was filled from.
pub trait DemographicsCache: Send + Sync {
    fn load(&self, scenario: Scenario) -> ValuationResult<Option<Arc<HarmonizedDemographics>>>;

    fn store(&self, demographics: Arc<HarmonizedDemographics>) -> ValuationResult<()>;
}

/// Cache that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl DemographicsCache for NoCache {
    fn load(&self, _scenario: Scenario) -> ValuationResult<Option<Arc<HarmonizedDemographics>>> {
        Ok(None)
    }

    fn store(&self, _demographics: Arc<HarmonizedDemographics>) -> ValuationResult<()> {
        Ok(())
    }
}

/// In-process cache shared between threads.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Scenario, Arc<HarmonizedDemographics>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DemographicsCache for MemoryCache {
    fn load(&self, scenario: Scenario) -> ValuationResult<Option<Arc<HarmonizedDemographics>>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ValuationError::Cache(e.to_string()))?;
        Ok(entries.get(&scenario).cloned())
    }

    fn store(&self, demographics: Arc<HarmonizedDemographics>) -> ValuationResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ValuationError::Cache(e.to_string()))?;
        entries.insert(demographics.scenario(), demographics);
        Ok(())
    }
}

/// Builds [`HarmonizedDemographics`] from raw sources, through a cache.
pub struct Harmonizer {
    parameters: DemographicParameters,
    cache: Arc<dyn DemographicsCache>,
}

impl Harmonizer {
    pub fn new(parameters: DemographicParameters, cache: Arc<dyn DemographicsCache>) -> Self {
        Self { parameters, cache }
    }

    /// Harmonizer without caching.
    pub fn uncached(parameters: DemographicParameters) -> Self {
        Self::new(parameters, Arc::new(NoCache))
    }

    pub fn parameters(&self) -> &DemographicParameters {
        &self.parameters
    }

    /// Harmonize every requested scenario, reusing cached results.
    ///
    /// `population_source` is keyed by impact region, `life_expectancy_source`
    /// by country code.
    pub fn harmonize(
        &self,
        population_source: &KeyedTable,
        life_expectancy_source: &KeyedTable,
        regions: &RegionAxis,
        scenarios: &[Scenario],
    ) -> ValuationResult<Vec<Arc<HarmonizedDemographics>>> {
        scenarios
            .iter()
            .map(|scenario| -> ValuationResult<Arc<HarmonizedDemographics>> {
                if let Some(cached) = self.cache.load(*scenario)? {
                    log::debug!("Using cached demographics for {}", scenario);
                    return Ok(cached);
                }
                let harmonized = Arc::new(self.harmonize_scenario(
                    population_source,
                    life_expectancy_source,
                    regions,
                    *scenario,
                )?);
                self.cache.store(harmonized.clone())?;
                Ok(harmonized)
            })
            .collect()
    }

    /// Harmonize a single scenario without consulting the cache.
    ///
    /// # Errors
    ///
    /// * `Schema` if a population or life-expectancy column is absent
    /// * `DataAlignment` if the scenario has no life-expectancy or population data
    pub fn harmonize_scenario(
        &self,
        population_source: &KeyedTable,
        life_expectancy_source: &KeyedTable,
        regions: &RegionAxis,
        scenario: Scenario,
    ) -> ValuationResult<HarmonizedDemographics> {
        let pop_columns = population_source.columns(&POPULATION_COLUMNS)?;
        let le_columns = life_expectancy_source.columns(&LIFE_EXPECTANCY_COLUMNS)?;
        log::info!("Harmonizing demographics for {}", scenario);

        let mut life_expectancy = anchors_by_unit(life_expectancy_source, &le_columns, scenario, |_| true);
        if life_expectancy.is_empty() {
            return Err(ValuationError::alignment(
                "scenario",
                scenario,
                format!("no rows in {}", life_expectancy_source.name()),
            ));
        }
        extend_to_terminal_year(&mut life_expectancy, self.parameters.terminal_year);
        self.impute_missing_countries(&mut life_expectancy, regions, scenario);

        let step = self.parameters.anchor_step;
        let population = anchors_by_unit(population_source, &pop_columns, scenario, |year| {
            year.rem_euclid(step) == 0
        });

        let kept: Vec<&str> = regions.iter().filter(|r| population.contains_key(*r)).collect();
        if kept.len() < regions.len() {
            log::warn!(
                "{} of {} regions have no population anchors for {} and were dropped",
                regions.len() - kept.len(),
                regions.len(),
                scenario
            );
        }
        let first_year = kept
            .iter()
            .filter_map(|r| population.get(*r).and_then(|a| a.keys().next().copied()))
            .min()
            .ok_or_else(|| {
                ValuationError::alignment(
                    "scenario",
                    scenario,
                    format!("no population anchors in {}", population_source.name()),
                )
            })?;
        let last_year = self.parameters.terminal_year.max(
            kept.iter()
                .filter_map(|r| population.get(*r).and_then(|a| a.keys().next_back().copied()))
                .max()
                .unwrap_or(first_year),
        );
        let years: Vec<Year> = (first_year..=last_year).collect();
        let axis = RegionAxis::new(kept.iter().copied());

        let mut data = Array3::from_elem(
            (DemographicField::ALL.len(), axis.len(), years.len()),
            f64::NAN,
        );
        let mut leading_gaps = 0usize;
        let mut series = vec![f64::NAN; years.len()];

        for (r, region) in axis.iter().enumerate() {
            let empty = BTreeMap::new();
            let pop_anchors = population.get(region).unwrap_or(&empty);
            let le_anchors = life_expectancy.get(country_of(region)).unwrap_or(&empty);

            for (f, field) in DemographicField::ALL.iter().enumerate() {
                let (anchors, column) = if f < POPULATION_COLUMNS.len() {
                    (pop_anchors, f)
                } else {
                    (le_anchors, f - POPULATION_COLUMNS.len())
                };
                series.fill(f64::NAN);
                for (year, values) in anchors {
                    if let Some(t) = year_index(&years, *year) {
                        series[t] = values[column];
                    }
                }
                let unfilled = fill_linear(&mut series);
                if unfilled > 0 {
                    leading_gaps += 1;
                    log::debug!(
                        "{} of {} has {} leading years without anchors",
                        field.column(),
                        region,
                        unfilled
                    );
                }
                data.index_axis_mut(Axis(0), f)
                    .row_mut(r)
                    .iter_mut()
                    .zip(series.iter())
                    .for_each(|(d, s)| *d = *s);
            }
        }

        if leading_gaps > 0 {
            log::warn!(
                "{} region series of {} start before their first anchor and are missing there",
                leading_gaps,
                scenario
            );
        }

        Ok(HarmonizedDemographics {
            scenario,
            regions: axis,
            years,
            data,
        })
    }

    /// Give every country absent at the reference year the scenario/year mean
    /// of every country with a value in that year.
    fn impute_missing_countries(
        &self,
        life_expectancy: &mut IndexMap<String, BTreeMap<Year, Vec<f64>>>,
        regions: &RegionAxis,
        scenario: Scenario,
    ) {
        let reference_year = self.parameters.imputation_reference_year;
        let mut absent: Vec<String> = Vec::new();
        for region in regions.iter() {
            let country = country_of(region);
            let present = life_expectancy
                .get(country)
                .map(|a| a.contains_key(&reference_year))
                .unwrap_or(false);
            if !present && !absent.iter().any(|c| c == country) {
                absent.push(country.to_string());
            }
        }
        if absent.is_empty() {
            return;
        }

        let mut sums: BTreeMap<Year, (Vec<f64>, usize)> = BTreeMap::new();
        for anchors in life_expectancy.values() {
            for (year, values) in anchors {
                let entry = sums
                    .entry(*year)
                    .or_insert_with(|| (vec![0.0; values.len()], 0));
                entry.0.iter_mut().zip(values).for_each(|(s, v)| *s += v);
                entry.1 += 1;
            }
        }
        let means: BTreeMap<Year, Vec<f64>> = sums
            .into_iter()
            .map(|(year, (sum, n))| (year, sum.into_iter().map(|s| s / n as f64).collect()))
            .collect();

        log::warn!(
            "Imputing life expectancy of {} countries for {} from scenario/year means: {}",
            absent.len(),
            scenario,
            absent.join(", ")
        );
        for country in absent {
            life_expectancy.insert(country, means.clone());
        }
    }
}

/// Rows of `scenario` grouped by unit, then year. Later rows win on duplicates.
fn anchors_by_unit(
    table: &KeyedTable,
    columns: &[&[f64]],
    scenario: Scenario,
    keep_year: impl Fn(Year) -> bool,
) -> IndexMap<String, BTreeMap<Year, Vec<f64>>> {
    let mut out: IndexMap<String, BTreeMap<Year, Vec<f64>>> = IndexMap::new();
    for (row, key) in table.keys().iter().enumerate() {
        if key.scenario != scenario || !keep_year(key.year) {
            continue;
        }
        let values = columns.iter().map(|c| c[row]).collect();
        out.entry(key.unit.clone()).or_default().insert(key.year, values);
    }
    out
}

/// Repeat the closest prior anchor of every unit at `terminal_year`.
fn extend_to_terminal_year(anchors: &mut IndexMap<String, BTreeMap<Year, Vec<f64>>>, terminal_year: Year) {
    for series in anchors.values_mut() {
        if series.contains_key(&terminal_year) {
            continue;
        }
        if let Some(values) = series.range(..terminal_year).next_back().map(|(_, v)| v.clone()) {
            series.insert(terminal_year, values);
        }
    }
}
