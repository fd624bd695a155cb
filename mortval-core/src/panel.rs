//! Region × year panels
//!
//! Most quantities in the pipeline are indexed by impact region and year.
//! A [`RegionYearPanel`] stores them as a dense `ndarray` matrix with ordered
//! labels on both axes, in the same way a grid timeseries stores one column
//! per spatial box.
//!
//! ```rust
//! use mortval_core::panel::{RegionAxis, RegionYearPanel};
//!
//! let regions = RegionAxis::new(["USA.1", "FRA.2"]);
//! let mut panel = RegionYearPanel::zeros(regions, vec![2020, 2021]);
//! panel.set("FRA.2", 2021, 4.0).unwrap();
//! assert_eq!(panel.get("FRA.2", 2021).unwrap(), 4.0);
//! assert_eq!(panel.sum_over_regions(), vec![0.0, 4.0]);
//! ```

use crate::errors::{ValuationError, ValuationResult};
use crate::table::Year;
use indexmap::IndexSet;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Ordered set of impact region (or country) labels.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegionAxis {
    labels: IndexSet<String>,
}

// Axes are equal only if their labels come in the same order.
impl PartialEq for RegionAxis {
    fn eq(&self, other: &Self) -> bool {
        self.labels.iter().eq(other.labels.iter())
    }
}

impl Eq for RegionAxis {}

impl RegionAxis {
    /// Build an axis from labels. Duplicates are kept once, in first-seen order.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.get_index_of(label)
    }

    /// Like [`Self::index_of`] but reports a missing label as an alignment error.
    pub fn require(&self, label: &str) -> ValuationResult<usize> {
        self.index_of(label)
            .ok_or_else(|| ValuationError::alignment("region", label, "not present on the region axis"))
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|s| s.as_str())
    }
}

/// Index of `year` within an ordered list of years.
pub fn year_index(years: &[Year], year: Year) -> Option<usize> {
    years.binary_search(&year).ok()
}

/// Dense matrix of values indexed by (region, year).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionYearPanel {
    regions: RegionAxis,
    years: Vec<Year>,
    values: Array2<f64>,
}

impl RegionYearPanel {
    /// Create a panel from existing values with shape `(regions, years)`.
    ///
    /// # Panics
    ///
    /// Panics if the shape of `values` does not match the axes or if `years`
    /// is not strictly increasing.
    pub fn new(regions: RegionAxis, years: Vec<Year>, values: Array2<f64>) -> Self {
        assert_eq!(
            values.dim(),
            (regions.len(), years.len()),
            "Panel values must have shape (regions, years)"
        );
        assert!(
            years.windows(2).all(|w| w[0] < w[1]),
            "Panel years must be strictly increasing"
        );
        Self {
            regions,
            years,
            values,
        }
    }

    pub fn zeros(regions: RegionAxis, years: Vec<Year>) -> Self {
        Self::filled(regions, years, 0.0)
    }

    pub fn filled(regions: RegionAxis, years: Vec<Year>, value: f64) -> Self {
        let values = Array2::from_elem((regions.len(), years.len()), value);
        Self::new(regions, years, values)
    }

    pub fn regions(&self) -> &RegionAxis {
        &self.regions
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    pub fn year_index(&self, year: Year) -> Option<usize> {
        year_index(&self.years, year)
    }

    pub fn get(&self, region: &str, year: Year) -> ValuationResult<f64> {
        let (r, t) = self.locate(region, year)?;
        Ok(self.values[[r, t]])
    }

    pub fn set(&mut self, region: &str, year: Year, value: f64) -> ValuationResult<()> {
        let (r, t) = self.locate(region, year)?;
        self.values[[r, t]] = value;
        Ok(())
    }

    /// Time series of one region.
    pub fn region_series(&self, region: &str) -> ValuationResult<ArrayView1<'_, f64>> {
        let r = self.regions.require(region)?;
        Ok(self.values.row(r))
    }

    /// Sum across regions for every year.
    pub fn sum_over_regions(&self) -> Vec<f64> {
        self.values.sum_axis(ndarray::Axis(0)).to_vec()
    }

    /// Restrict the panel to the years within `[first, last]`.
    pub fn select_years(&self, first: Year, last: Year) -> RegionYearPanel {
        let keep: Vec<usize> = self
            .years
            .iter()
            .enumerate()
            .filter(|(_, y)| **y >= first && **y <= last)
            .map(|(i, _)| i)
            .collect();
        let years = keep.iter().map(|&i| self.years[i]).collect();
        let values = self.values.select(ndarray::Axis(1), &keep);
        RegionYearPanel::new(self.regions.clone(), years, values)
    }

    /// Check that another panel shares both axes with this one.
    pub fn ensure_aligned(&self, other: &RegionYearPanel, context: &str) -> ValuationResult<()> {
        if self.years != other.years {
            return Err(ValuationError::alignment(
                "year",
                format!("{:?}..{:?}", other.years.first(), other.years.last()),
                format!("year axis differs from the reference panel in {}", context),
            ));
        }
        if self.regions != other.regions {
            let label = other
                .regions
                .iter()
                .find(|r| !self.regions.contains(r))
                .or_else(|| self.regions.iter().find(|r| !other.regions.contains(r)))
                .unwrap_or("<ordering>");
            return Err(ValuationError::alignment(
                "region",
                label,
                format!("region axis differs from the reference panel in {}", context),
            ));
        }
        Ok(())
    }

    fn locate(&self, region: &str, year: Year) -> ValuationResult<(usize, usize)> {
        let r = self.regions.require(region)?;
        let t = self
            .year_index(year)
            .ok_or_else(|| ValuationError::alignment("year", year, "not present on the year axis"))?;
        Ok((r, t))
    }
}
