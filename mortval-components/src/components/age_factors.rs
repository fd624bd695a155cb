//! Age adjustment factors
//!
//! Derives, for every (country, scenario, year) observation, the remaining
//! life expectancy of each coarse age group and the Murphy-Topel weights that
//! value a life-year differently depending on the age at which it is lost.
//!
//! # Remaining life expectancy
//!
//! Source data gives, for each of 21 five-year age bins, the survival ratio
//! $s_b$ into the next bin. Expectancy is built from the oldest bin down:
//!
//! $$ E_{100+} = 5 s_{100+} \qquad E_b = 5 s_b + s_b E_{b+1} $$
//!
//! Rows repeated for the same key (one per sex) are averaged. Bin
//! expectancies are then weighted by the population share of each bin within
//! its coarse group (5-64 and 65+) and shifted by 2.5 years to the bin
//! midpoint. The young group is the single 0-4 bin.
//!
//! # Murphy-Topel weights
//!
//! An external age profile of the relative value of a life-year is averaged
//! over sexes and within each five-year bin, then divided by its maximum
//! (conventionally reached in the 25-29 bin). Weights for the working-age and
//! elderly groups are the population-share-weighted bin factors; the young
//! group receives the 0-4 bin factor directly.

use indexmap::IndexMap;
use mortval_core::errors::{ValuationError, ValuationResult};
use mortval_core::labels::AgeGroup;
use mortval_core::table::{KeyedTable, RowKey};
use serde::{Deserialize, Serialize};

/// Number of five-year age bins (0-4 through 100+).
pub const AGE_BINS: usize = 21;

/// Width of an age bin in years.
const BIN_WIDTH: f64 = 5.0;

/// Shift from the start of a bin to its midpoint.
const MIDPOINT_SHIFT: f64 = 2.5;

/// Bin whose expectancy anchors the Murphy-Topel life-years (25-29).
const MT_REFERENCE_BIN: usize = 5;

pub const EXPECTANCY_YOUNG: &str = "expectancy_young";
pub const EXPECTANCY_OLDER: &str = "expectancy_older";
pub const EXPECTANCY_OLDEST: &str = "expectancy_oldest";
pub const EXPECTANCY_MT_REFERENCE: &str = "expectancy_25_29_mt";
pub const MT_YOUNG: &str = "mt_young";
pub const MT_OLDER: &str = "mt_older";
pub const MT_OLDEST: &str = "mt_oldest";

/// Columns of the life-expectancy source consumed by the demographic harmonizer.
pub const LIFE_EXPECTANCY_COLUMNS: [&str; 7] = [
    EXPECTANCY_YOUNG,
    EXPECTANCY_OLDER,
    EXPECTANCY_OLDEST,
    EXPECTANCY_MT_REFERENCE,
    MT_YOUNG,
    MT_OLDER,
    MT_OLDEST,
];

/// Label of an age bin, e.g. `25_29` or `100plus`.
pub fn bin_label(bin: usize) -> String {
    if bin + 1 == AGE_BINS {
        "100plus".to_string()
    } else {
        format!("{}_{}", bin * 5, bin * 5 + 4)
    }
}

/// Coarse age group a bin belongs to.
pub fn bin_group(bin: usize) -> AgeGroup {
    match bin {
        0 => AgeGroup::Young,
        1..=12 => AgeGroup::Older,
        _ => AgeGroup::Oldest,
    }
}

/// Bin containing an age in years.
pub fn bin_of_age(age: u32) -> usize {
    ((age / 5) as usize).min(AGE_BINS - 1)
}

/// Column holding the remaining life expectancy of `group`.
pub fn expectancy_column(group: AgeGroup) -> &'static str {
    match group {
        AgeGroup::Young => EXPECTANCY_YOUNG,
        AgeGroup::Older => EXPECTANCY_OLDER,
        AgeGroup::Oldest => EXPECTANCY_OLDEST,
    }
}

/// Column holding the Murphy-Topel weight of `group`.
pub fn mt_column(group: AgeGroup) -> &'static str {
    match group {
        AgeGroup::Young => MT_YOUNG,
        AgeGroup::Older => MT_OLDER,
        AgeGroup::Oldest => MT_OLDEST,
    }
}

fn ratio_columns() -> Vec<String> {
    (0..AGE_BINS).map(|b| format!("ratio{}", bin_label(b))).collect()
}

fn population_columns() -> Vec<String> {
    (0..AGE_BINS).map(|b| format!("Population{}", bin_label(b))).collect()
}

/// One row of the relative value-of-life-year profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub age: u32,
    pub males: f64,
    pub females: f64,
}

/// Age-specific relative value of a life-year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MurphyTopelProfile {
    entries: Vec<ProfileEntry>,
}

impl MurphyTopelProfile {
    pub fn new(entries: Vec<ProfileEntry>) -> Self {
        Self { entries }
    }

    /// Normalized factor for every age bin.
    ///
    /// # Errors
    ///
    /// * `Schema` if some bin has no profile entry
    /// * `NumericDomain` if the maximum bin value is not positive
    pub fn bin_factors(&self) -> ValuationResult<[f64; AGE_BINS]> {
        let mut sums = [0.0; AGE_BINS];
        let mut counts = [0usize; AGE_BINS];
        for entry in &self.entries {
            let bin = bin_of_age(entry.age);
            sums[bin] += (entry.males + entry.females) / 2.0;
            counts[bin] += 1;
        }

        let mut means = [0.0; AGE_BINS];
        for bin in 0..AGE_BINS {
            if counts[bin] == 0 {
                return Err(ValuationError::schema(
                    format!("ages {}", bin_label(bin)),
                    "Murphy-Topel profile",
                ));
            }
            means[bin] = sums[bin] / counts[bin] as f64;
        }

        let max = means.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max <= 0.0 || !max.is_finite() {
            return Err(ValuationError::NumericDomain(format!(
                "Murphy-Topel profile maximum must be positive, got {}",
                max
            )));
        }
        Ok(means.map(|m| m / max))
    }
}

/// Life expectancy and Murphy-Topel weights per (country, scenario, year).
///
/// The underlying table has the [`LIFE_EXPECTANCY_COLUMNS`] and is the
/// life-expectancy source of the demographic harmonizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeAdjustmentFactors {
    table: KeyedTable,
}

impl AgeAdjustmentFactors {
    /// Wrap an existing life-expectancy table, checking its columns.
    pub fn from_table(table: KeyedTable) -> ValuationResult<Self> {
        table.columns(&LIFE_EXPECTANCY_COLUMNS)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &KeyedTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Remaining life expectancy of `group` for `row`.
    pub fn expectancy(&self, group: AgeGroup, row: usize) -> ValuationResult<f64> {
        self.table.value(expectancy_column(group), row)
    }

    /// Murphy-Topel weight of `group` for `row`.
    pub fn mt_weight(&self, group: AgeGroup, row: usize) -> ValuationResult<f64> {
        self.table.value(mt_column(group), row)
    }
}

/// Derive age adjustment factors from survival ratios, population by age and
/// a Murphy-Topel profile.
///
/// Only keys present in both `survival_ratios` and `age_population` are kept.
///
/// # Errors
///
/// * `Schema` if a ratio or population column is absent
/// * `NumericDomain` if a coarse group has zero population
pub fn compute_age_adjustment_factors(
    survival_ratios: &KeyedTable,
    age_population: &KeyedTable,
    profile: &MurphyTopelProfile,
) -> ValuationResult<AgeAdjustmentFactors> {
    let ratio_names = ratio_columns();
    let ratio_refs: Vec<&str> = ratio_names.iter().map(|s| s.as_str()).collect();
    let ratios = survival_ratios.columns(&ratio_refs)?;

    let pop_names = population_columns();
    let pop_refs: Vec<&str> = pop_names.iter().map(|s| s.as_str()).collect();
    age_population.columns(&pop_refs)?;

    let factors = profile.bin_factors()?;

    // Expectancy per row, then averaged over repeated keys (sexes)
    let expectancy_names: Vec<String> = (0..AGE_BINS)
        .map(|b| format!("expectancy_{}", bin_label(b)))
        .collect();
    let expectancy_refs: Vec<&str> = expectancy_names.iter().map(|s| s.as_str()).collect();
    let mut per_row = KeyedTable::new("life expectancy by bin", &expectancy_refs);
    let mut row_ratios = [0.0; AGE_BINS];
    for (row, key) in survival_ratios.keys().iter().enumerate() {
        for (bin, column) in ratios.iter().enumerate() {
            row_ratios[bin] = column[row];
        }
        per_row.push(key.clone(), &expectancy_from_ratios(&row_ratios));
    }
    let expectancy = per_row.mean_by_key();

    let population = age_population.sum_by_key();
    let population_rows: IndexMap<&RowKey, usize> = population
        .keys()
        .iter()
        .enumerate()
        .map(|(i, k)| (k, i))
        .collect();
    let pop_columns = population.columns(&pop_refs)?;
    let expectancy_columns = expectancy.columns(&expectancy_refs)?;

    let mut out = KeyedTable::new("life expectancy and Murphy-Topel factors", &LIFE_EXPECTANCY_COLUMNS);
    let mut dropped = 0usize;
    for (row, key) in expectancy.keys().iter().enumerate() {
        let Some(&pop_row) = population_rows.get(key) else {
            dropped += 1;
            continue;
        };

        let bin_pop: Vec<f64> = pop_columns.iter().map(|c| c[pop_row]).collect();
        let bin_expectancy: Vec<f64> = expectancy_columns.iter().map(|c| c[row]).collect();

        let older = group_shares(&bin_pop, AgeGroup::Older, key)?;
        let oldest = group_shares(&bin_pop, AgeGroup::Oldest, key)?;

        out.push(
            key.clone(),
            &[
                bin_expectancy[0] + MIDPOINT_SHIFT,
                weighted(&older, &bin_expectancy) + MIDPOINT_SHIFT,
                weighted(&oldest, &bin_expectancy) + MIDPOINT_SHIFT,
                bin_expectancy[MT_REFERENCE_BIN] + MIDPOINT_SHIFT,
                factors[0],
                weighted(&older, &factors),
                weighted(&oldest, &factors),
            ],
        );
    }

    if dropped > 0 {
        log::warn!(
            "{} survival keys have no matching population row and were dropped",
            dropped
        );
    }
    log::info!("Derived age adjustment factors for {} keys", out.len());

    AgeAdjustmentFactors::from_table(out)
}

/// Share-weighted sum of per-bin values.
fn weighted(shares: &[(usize, f64)], values: &[f64]) -> f64 {
    shares.iter().map(|(bin, share)| share * values[*bin]).sum()
}

/// Remaining life expectancy at the start of every bin.
fn expectancy_from_ratios(ratios: &[f64; AGE_BINS]) -> [f64; AGE_BINS] {
    let mut expectancy = [0.0; AGE_BINS];
    let last = AGE_BINS - 1;
    expectancy[last] = ratios[last] * BIN_WIDTH;
    for bin in (0..last).rev() {
        expectancy[bin] = ratios[bin] * BIN_WIDTH + ratios[bin] * expectancy[bin + 1];
    }
    expectancy
}

/// Population share of every bin of `group` within that group.
fn group_shares(
    bin_population: &[f64],
    group: AgeGroup,
    key: &RowKey,
) -> ValuationResult<Vec<(usize, f64)>> {
    let bins: Vec<usize> = (0..AGE_BINS).filter(|b| bin_group(*b) == group).collect();
    let total: f64 = bins.iter().map(|b| bin_population[*b]).sum();
    if total <= 0.0 {
        return Err(ValuationError::NumericDomain(format!(
            "{} population of {}/{}/{} must be positive, got {}",
            group, key.unit, key.scenario, key.year, total
        )));
    }
    Ok(bins
        .into_iter()
        .map(|b| (b, bin_population[b] / total))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mortval_core::labels::Scenario;

    fn flat_profile() -> MurphyTopelProfile {
        MurphyTopelProfile::new(
            (0..=104)
                .map(|age| ProfileEntry {
                    age,
                    // Peaks in the 25-29 bin
                    males: if (25..30).contains(&age) { 2.0 } else { 1.0 },
                    females: if (25..30).contains(&age) { 2.0 } else { 1.0 },
                })
                .collect(),
        )
    }

    fn survival(unit: &str, ratio: f64) -> KeyedTable {
        let names = ratio_columns();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut table = KeyedTable::new("survival", &refs);
        table.push(RowKey::new(unit, Scenario::Ssp3, 2015), &[ratio; AGE_BINS]);
        table
    }

    fn population(unit: &str, values: [f64; AGE_BINS]) -> KeyedTable {
        let names = population_columns();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut table = KeyedTable::new("population", &refs);
        table.push(RowKey::new(unit, Scenario::Ssp3, 2015), &values);
        table
    }

    #[test]
    fn test_bin_labels() {
        assert_eq!(bin_label(0), "0_4");
        assert_eq!(bin_label(5), "25_29");
        assert_eq!(bin_label(20), "100plus");
        assert_eq!(bin_of_age(104), 20);
        assert_eq!(bin_group(12), AgeGroup::Older);
        assert_eq!(bin_group(13), AgeGroup::Oldest);
    }

    #[test]
    fn test_expectancy_recursion() {
        let mut ratios = [0.0; AGE_BINS];
        ratios[20] = 0.5;
        ratios[19] = 1.0;
        let e = expectancy_from_ratios(&ratios);
        assert_relative_eq!(e[20], 2.5);
        assert_relative_eq!(e[19], 5.0 + 2.5);
        assert_relative_eq!(e[18], 0.0);
    }

    #[test]
    fn test_profile_factors_normalized_on_peak() {
        let factors = flat_profile().bin_factors().unwrap();
        assert_relative_eq!(factors[5], 1.0);
        assert_relative_eq!(factors[0], 0.5);
    }

    #[test]
    fn test_profile_missing_bin() {
        let profile = MurphyTopelProfile::new(vec![ProfileEntry {
            age: 30,
            males: 1.0,
            females: 1.0,
        }]);
        assert!(matches!(
            profile.bin_factors(),
            Err(ValuationError::Schema { .. })
        ));
    }

    #[test]
    fn test_young_factor_is_single_bin() {
        let factors = compute_age_adjustment_factors(
            &survival("USA", 1.0),
            &population("USA", [1.0; AGE_BINS]),
            &flat_profile(),
        )
        .unwrap();
        let young = factors.mt_weight(AgeGroup::Young, 0).unwrap();
        assert_relative_eq!(young, flat_profile().bin_factors().unwrap()[0]);
    }

    #[test]
    fn test_group_weighting() {
        // Survival ratio of one everywhere: E[b] = 5 * (21 - b)
        let mut pop = [0.0; AGE_BINS];
        pop[0] = 10.0;
        pop[1] = 1.0; // 5-9
        pop[5] = 3.0; // 25-29
        pop[13] = 2.0; // 65-69
        let factors =
            compute_age_adjustment_factors(&survival("USA", 1.0), &population("USA", pop), &flat_profile())
                .unwrap();

        let older = 0.25 * 5.0 * 20.0 + 0.75 * 5.0 * 16.0 + 2.5;
        assert_relative_eq!(factors.expectancy(AgeGroup::Older, 0).unwrap(), older);
        assert_relative_eq!(factors.expectancy(AgeGroup::Oldest, 0).unwrap(), 5.0 * 8.0 + 2.5);
        assert_relative_eq!(factors.expectancy(AgeGroup::Young, 0).unwrap(), 5.0 * 21.0 + 2.5);
        assert_relative_eq!(factors.table().value(EXPECTANCY_MT_REFERENCE, 0).unwrap(), 5.0 * 16.0 + 2.5);
        assert_relative_eq!(factors.mt_weight(AgeGroup::Older, 0).unwrap(), 0.25 * 0.5 + 0.75 * 1.0);
        assert_relative_eq!(factors.mt_weight(AgeGroup::Oldest, 0).unwrap(), 0.5);
    }

    #[test]
    fn test_sexes_are_averaged() {
        let mut table = survival("USA", 1.0);
        table.push(RowKey::new("USA", Scenario::Ssp3, 2015), &[0.0; AGE_BINS]);
        let factors =
            compute_age_adjustment_factors(&table, &population("USA", [1.0; AGE_BINS]), &flat_profile())
                .unwrap();
        assert_eq!(factors.len(), 1);
        assert_relative_eq!(
            factors.expectancy(AgeGroup::Young, 0).unwrap(),
            5.0 * 21.0 / 2.0 + 2.5
        );
    }

    #[test]
    fn test_zero_group_population() {
        let mut pop = [1.0; AGE_BINS];
        for p in pop.iter_mut().skip(13) {
            *p = 0.0;
        }
        let err = compute_age_adjustment_factors(&survival("USA", 1.0), &population("USA", pop), &flat_profile())
            .unwrap_err();
        assert!(matches!(err, ValuationError::NumericDomain(_)));
    }

    #[test]
    fn test_missing_ratio_column() {
        let table = KeyedTable::new("survival", &["ratio0_4"]);
        let err = compute_age_adjustment_factors(&table, &population("USA", [1.0; AGE_BINS]), &flat_profile())
            .unwrap_err();
        assert!(matches!(err, ValuationError::Schema { ref column, .. } if column == "ratio5_9"));
    }

    #[test]
    fn test_unmatched_keys_are_dropped() {
        let factors = compute_age_adjustment_factors(
            &survival("USA", 1.0),
            &population("FRA", [1.0; AGE_BINS]),
            &flat_profile(),
        )
        .unwrap();
        assert!(factors.is_empty());
    }
}
