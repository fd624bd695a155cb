//! Rescaling of social cost of carbon estimates to an alternative baseline VSL
//!
//! Valuation uses a unit income elasticity, so an SCC computed with one
//! baseline VSL converts to another baseline by a constant factor:
//!
//! $$ SCC_{alt} = SCC \cdot \frac{VSL_{alt}}{VSL} \cdot \frac{y_{current}}{y_{alt}} $$
//!
//! where the income ratio moves the denominator of the income scaling to
//! the year the alternative VSL was estimated for. The defaults convert
//! from the U.S. EPA VSL to Ashenfelter and Greenstone (2002).

use indexmap::IndexMap;
use mortval_core::errors::{ValuationError, ValuationResult};
use serde::{Deserialize, Serialize};

/// Parameters of the alternative-VSL conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlternativeVslScaling {
    /// Ratio of the alternative VSL to the baseline VSL.
    ///
    /// Default: 0.2613994
    pub vsl_ratio: f64,

    /// Per-capita income of the baseline VSL's reference year (2005 dollars).
    ///
    /// Default: 50286.84 (2019)
    pub income_current: f64,

    /// Per-capita income of the alternative VSL's reference year (2005 dollars).
    ///
    /// Default: 28224.61 (1984)
    pub income_alternative: f64,

    /// Label column identifying the VSL an estimate was computed with.
    ///
    /// Default: vsl_value
    pub tag_column: String,

    /// Tag of the rows that are converted.
    ///
    /// Default: epa
    pub source_tag: String,

    /// Tag given to the converted rows.
    ///
    /// Default: ag02
    pub target_tag: String,

    /// Numeric columns copied without scaling.
    ///
    /// Default: discrate, rcp, age_adjustment, heterogeneity, time_cut
    pub excluded_columns: Vec<String>,
}

impl Default for AlternativeVslScaling {
    fn default() -> Self {
        Self {
            vsl_ratio: 0.2613994,
            income_current: 50286.84,
            income_alternative: 28224.61,
            tag_column: "vsl_value".to_string(),
            source_tag: "epa".to_string(),
            target_tag: "ag02".to_string(),
            excluded_columns: ["discrate", "rcp", "age_adjustment", "heterogeneity", "time_cut"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl AlternativeVslScaling {
    /// Multiplicative factor applied to every scaled column.
    pub fn factor(&self) -> ValuationResult<f64> {
        if self.income_alternative <= 0.0 {
            return Err(ValuationError::NumericDomain(format!(
                "alternative income must be positive, got {}",
                self.income_alternative
            )));
        }
        Ok(self.vsl_ratio * self.income_current / self.income_alternative)
    }

    /// Append a converted copy of every source-tagged row.
    ///
    /// # Errors
    ///
    /// * `Schema` if the tag column is absent
    /// * `NumericDomain` if the alternative income is not positive
    pub fn apply(&self, table: &SccTable) -> ValuationResult<SccTable> {
        let factor = self.factor()?;
        let tags = table.labels(&self.tag_column)?;
        let rows: Vec<usize> = tags
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == self.source_tag)
            .map(|(i, _)| i)
            .collect();
        log::info!(
            "Rescaling {} '{}' SCC rows to '{}' (factor {:.6})",
            rows.len(),
            self.source_tag,
            self.target_tag,
            factor
        );

        let mut out = table.clone();
        for (name, values) in out.labels.iter_mut() {
            let appended: Vec<String> = if *name == self.tag_column {
                rows.iter().map(|_| self.target_tag.clone()).collect()
            } else {
                rows.iter().map(|&r| values[r].clone()).collect()
            };
            values.extend(appended);
        }
        for (name, values) in out.numbers.iter_mut() {
            let scale = if self.excluded_columns.contains(name) { 1.0 } else { factor };
            let appended: Vec<f64> = rows.iter().map(|&r| values[r] * scale).collect();
            values.extend(appended);
        }
        out.len += rows.len();
        Ok(out)
    }
}

/// Table of SCC estimates with text label columns and numeric columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SccTable {
    labels: IndexMap<String, Vec<String>>,
    numbers: IndexMap<String, Vec<f64>>,
    len: usize,
}

impl SccTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text column. The first column fixes the number of rows.
    pub fn with_labels<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> ValuationResult<Self> {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        self.check_len(&name, values.len())?;
        self.labels.insert(name, values);
        Ok(self)
    }

    /// Add a numeric column. The first column fixes the number of rows.
    pub fn with_numbers(mut self, name: impl Into<String>, values: Vec<f64>) -> ValuationResult<Self> {
        let name = name.into();
        self.check_len(&name, values.len())?;
        self.numbers.insert(name, values);
        Ok(self)
    }

    fn check_len(&mut self, name: &str, len: usize) -> ValuationResult<()> {
        if self.labels.is_empty() && self.numbers.is_empty() {
            self.len = len;
            return Ok(());
        }
        if len != self.len {
            return Err(ValuationError::alignment(
                "column",
                name,
                format!("has {} rows, table has {}", len, self.len),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn labels(&self, name: &str) -> ValuationResult<&[String]> {
        self.labels
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| ValuationError::schema(name, "SCC table"))
    }

    pub fn numbers(&self, name: &str) -> ValuationResult<&[f64]> {
        self.numbers
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| ValuationError::schema(name, "SCC table"))
    }
}
