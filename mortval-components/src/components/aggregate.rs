//! Weighted ensemble statistics
//!
//! Collapses the ensemble dimension (climate model × Monte Carlo draw) of
//! monetized damages into weighted means and quantiles, independently for
//! every (region, year, variable) cell. Each member carries the weight of
//! its climate model; weights are relative and need not sum to one.
//!
//! Quantiles are read off the weighted empirical CDF without interpolation.
//! With values sorted ascending (ties keep ensemble order) and normalized
//! cumulative weights $F_i = \sum_{j \le i} w_j / \sum_j w_j$, the
//! $p$-quantile is the first value with $F_i \ge p$.

use indexmap::IndexMap;
use mortval_core::errors::{ValuationError, ValuationResult};
use mortval_core::labels::MonetizedVariable;
use mortval_core::panel::{RegionAxis, RegionYearPanel};
use mortval_core::table::Year;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::components::monetize::MonetizedDamage;

/// A requested summary statistic.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Statistic {
    /// Weighted arithmetic mean
    Mean,
    /// Weighted quantile at a fraction in `[0, 1]`
    Quantile(f64),
}

impl Statistic {
    /// Parse every label, failing on the first invalid one.
    pub fn parse_all<S: AsRef<str>>(labels: &[S]) -> ValuationResult<Vec<Statistic>> {
        labels.iter().map(|l| l.as_ref().parse()).collect()
    }
}

impl FromStr for Statistic {
    type Err = ValuationError;

    /// Accepts `mean`, `qNN` (`q05` is 0.05, `q5` is 0.5, `q100` is 1) or a bare fraction.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValuationError::Config(format!("'{}' is not a valid statistic", s));
        if s == "mean" {
            return Ok(Statistic::Mean);
        }
        let fraction = match s.strip_prefix('q') {
            Some("100") => 1.0,
            Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
                format!("0.{}", digits).parse::<f64>().map_err(|_| invalid())?
            }
            Some(_) => return Err(invalid()),
            None => s.parse::<f64>().map_err(|_| invalid())?,
        };
        if !(0.0..=1.0).contains(&fraction) {
            return Err(invalid());
        }
        Ok(Statistic::Quantile(fraction))
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Mean => f.write_str("mean"),
            Statistic::Quantile(p) if *p == 1.0 => f.write_str("q100"),
            Statistic::Quantile(p) if *p == 0.0 => f.write_str("q0"),
            Statistic::Quantile(p) => {
                let text = p.to_string();
                match text.strip_prefix("0.") {
                    Some(digits) => write!(f, "q{}", digits),
                    None => f.write_str(&text),
                }
            }
        }
    }
}

/// Relative weight of each climate model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GcmWeights {
    weights: IndexMap<String, f64>,
}

impl GcmWeights {
    /// # Errors
    ///
    /// `NumericDomain` if a weight is negative or not finite.
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> ValuationResult<Self> {
        let weights: IndexMap<String, f64> = pairs.into_iter().map(|(k, w)| (k.into(), w)).collect();
        let out = Self { weights };
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> ValuationResult<()> {
        match self.weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            Some((gcm, w)) => Err(ValuationError::NumericDomain(format!(
                "weight of {} must be non-negative, got {}",
                gcm, w
            ))),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, gcm: &str) -> ValuationResult<f64> {
        self.weights
            .get(gcm)
            .copied()
            .ok_or_else(|| ValuationError::alignment("gcm", gcm, "no weight supplied"))
    }
}

/// Finite values of one cell sorted ascending, with their normalized CDF.
#[derive(Debug, Clone)]
pub struct WeightedSample {
    values: Vec<f64>,
    cdf: Vec<f64>,
    mean: f64,
}

impl WeightedSample {
    /// Build a sample, dropping non-finite values together with their weights.
    ///
    /// Returns `Ok(None)` if no finite value remains.
    ///
    /// # Errors
    ///
    /// `NumericDomain` if a weight is negative or the retained weights sum to zero.
    pub fn new(values: &[f64], weights: &[f64]) -> ValuationResult<Option<Self>> {
        assert_eq!(values.len(), weights.len(), "values and weights must have the same length");
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(values.len());
        for (v, w) in values.iter().zip(weights) {
            if *w < 0.0 || w.is_nan() {
                return Err(ValuationError::NumericDomain(format!(
                    "ensemble weights must be non-negative, got {}",
                    w
                )));
            }
            if v.is_finite() {
                pairs.push((*v, *w));
            }
        }
        if pairs.is_empty() {
            return Ok(None);
        }
        let total: f64 = pairs.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(ValuationError::NumericDomain(
                "ensemble weights sum to zero".to_string(),
            ));
        }
        let mean = pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total;

        // Stable: equal values keep ensemble order
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        let mut cumulative = 0.0;
        let cdf = pairs
            .iter()
            .map(|(_, w)| {
                cumulative += w;
                cumulative / total
            })
            .collect();
        Ok(Some(Self {
            values: pairs.into_iter().map(|(v, _)| v).collect(),
            cdf,
            mean,
        }))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Smallest value whose normalized cumulative weight reaches `p`.
    pub fn quantile(&self, p: f64) -> f64 {
        let i = self.cdf.partition_point(|c| *c < p);
        self.values[i.min(self.values.len() - 1)]
    }

    pub fn statistic(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::Mean => self.mean(),
            Statistic::Quantile(p) => self.quantile(p),
        }
    }
}

/// Weighted mean of the finite values. NaN if there are none.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> ValuationResult<f64> {
    Ok(WeightedSample::new(values, weights)?.map_or(f64::NAN, |s| s.mean()))
}

/// Weighted quantile of the finite values. NaN if there are none.
pub fn weighted_quantile(values: &[f64], weights: &[f64], p: f64) -> ValuationResult<f64> {
    Ok(WeightedSample::new(values, weights)?.map_or(f64::NAN, |s| s.quantile(p)))
}

/// Ensemble statistics indexed by (region, year), one column per
/// (variable, statistic) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTable {
    regions: RegionAxis,
    years: Vec<Year>,
    columns: Vec<(MonetizedVariable, Statistic)>,
    /// Shape (column, region, year)
    values: Array3<f64>,
    gdp: Option<Array2<f64>>,
}

impl AggregatedTable {
    pub fn regions(&self) -> &RegionAxis {
        &self.regions
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn columns(&self) -> &[(MonetizedVariable, Statistic)] {
        &self.columns
    }

    /// Column names, e.g. `monetized_damages_vly_income_scaled_q50`.
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(v, s)| format!("{}_{}", v, s))
            .collect()
    }

    pub fn column(&self, variable: &MonetizedVariable, statistic: Statistic) -> ValuationResult<ArrayView2<'_, f64>> {
        let i = self
            .columns
            .iter()
            .position(|(v, s)| v == variable && *s == statistic)
            .ok_or_else(|| ValuationError::lookup(format!("{}_{}", variable, statistic), "aggregated table"))?;
        Ok(self.values.index_axis(Axis(0), i))
    }

    pub fn value(
        &self,
        variable: &MonetizedVariable,
        statistic: Statistic,
        region: &str,
        year: Year,
    ) -> ValuationResult<f64> {
        let r = self.regions.require(region)?;
        let t = mortval_core::panel::year_index(&self.years, year)
            .ok_or_else(|| ValuationError::alignment("year", year, "absent from aggregated table"))?;
        Ok(self.column(variable, statistic)?[[r, t]])
    }

    pub fn gdp(&self) -> Option<ArrayView2<'_, f64>> {
        self.gdp.as_ref().map(|g| g.view())
    }

    /// Join a GDP panel as an extra column.
    ///
    /// # Errors
    ///
    /// `DataAlignment` if a region or year of the table is missing from `gdp`.
    pub fn with_gdp(mut self, gdp: &RegionYearPanel) -> ValuationResult<Self> {
        let mut joined = Array2::<f64>::zeros((self.regions.len(), self.years.len()));
        for (r, region) in self.regions.iter().enumerate() {
            for (t, year) in self.years.iter().enumerate() {
                joined[[r, t]] = gdp.get(region, *year)?;
            }
        }
        self.gdp = Some(joined);
        Ok(self)
    }
}

/// Collapse an ensemble of monetized damages into weighted statistics.
///
/// Every member must share the regions, years and variables of the first.
/// Cells are reduced in parallel; each reduction is sequential.
///
/// # Errors
///
/// * `DataAlignment` if the ensemble is empty, members disagree on their
///   axes, a climate model has no weight, or a cell has no finite value
/// * `NumericDomain` if the weights of a cell sum to zero
pub fn aggregate(
    ensemble: &[&MonetizedDamage],
    weights: &GcmWeights,
    statistics: &[Statistic],
) -> ValuationResult<AggregatedTable> {
    let Some(first) = ensemble.first() else {
        return Err(ValuationError::alignment(
            "ensemble",
            "<empty>",
            "no surviving ensemble members to aggregate",
        ));
    };
    if statistics.is_empty() {
        return Err(ValuationError::Config("no statistics requested".to_string()));
    }
    for member in ensemble.iter().skip(1) {
        if member.regions() != first.regions() || member.years() != first.years() {
            return Err(ValuationError::alignment(
                "member",
                member.member(),
                "region or year axis differs from the rest of the ensemble",
            ));
        }
        if member.variables() != first.variables() {
            return Err(ValuationError::alignment(
                "member",
                member.member(),
                "monetized variables differ from the rest of the ensemble",
            ));
        }
    }
    let member_weights: Vec<f64> = ensemble
        .iter()
        .map(|m| weights.get(&m.member().gcm))
        .collect::<ValuationResult<_>>()?;

    let n_variables = first.variables().len();
    let (n_regions, n_years) = (first.regions().len(), first.years().len());
    log::info!(
        "Aggregating {} members over {} regions, {} years and {} variables",
        ensemble.len(),
        n_regions,
        n_years,
        n_variables
    );

    let cells: Vec<Vec<f64>> = (0..n_regions * n_years)
        .into_par_iter()
        .map(|cell| -> ValuationResult<Vec<f64>> {
            let (r, t) = (cell / n_years, cell % n_years);
            let mut column = vec![0.0; ensemble.len()];
            let mut out = Vec::with_capacity(n_variables * statistics.len());
            for v in 0..n_variables {
                for (slot, member) in column.iter_mut().zip(ensemble) {
                    *slot = member.values()[[v, r, t]];
                }
                let sample = WeightedSample::new(&column, &member_weights)?.ok_or_else(|| {
                    ValuationError::alignment(
                        "region",
                        first.regions().label(r),
                        format!("no surviving member for {} in {}", first.variables()[v], first.years()[t]),
                    )
                })?;
                out.extend(statistics.iter().map(|s| sample.statistic(*s)));
            }
            Ok(out)
        })
        .collect::<ValuationResult<_>>()?;

    let columns: Vec<(MonetizedVariable, Statistic)> = first
        .variables()
        .iter()
        .flat_map(|v| statistics.iter().map(move |s| (*v, *s)))
        .collect();
    let mut values = Array3::<f64>::zeros((columns.len(), n_regions, n_years));
    for (cell, stats) in cells.into_iter().enumerate() {
        let (r, t) = (cell / n_years, cell % n_years);
        for (c, value) in stats.into_iter().enumerate() {
            values[[c, r, t]] = value;
        }
    }

    Ok(AggregatedTable {
        regions: first.regions().clone(),
        years: first.years().to_vec(),
        columns,
        values,
        gdp: None,
    })
}
