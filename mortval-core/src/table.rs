//! Long-format source tables keyed by (unit, scenario, year)
//!
//! External demographic sources arrive as long tables: one row per spatial
//! unit (impact region or country), scenario and year, with any number of
//! named float columns. [`KeyedTable`] keeps that shape and resolves columns
//! by name, so that a column missing from a source surfaces as a
//! [`ValuationError::Schema`] rather than as a silently absent field.

use crate::errors::{ValuationError, ValuationResult};
use crate::labels::Scenario;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Calendar year.
pub type Year = i32;

/// Row key of a long-format table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    /// Impact region or country code
    pub unit: String,
    pub scenario: Scenario,
    pub year: Year,
}

impl RowKey {
    pub fn new(unit: impl Into<String>, scenario: Scenario, year: Year) -> Self {
        Self {
            unit: unit.into(),
            scenario,
            year,
        }
    }
}

/// Column-oriented long table.
///
/// Keys may repeat (for example one row per sex); the grouping helpers
/// collapse repeated keys explicitly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeyedTable {
    name: String,
    keys: Vec<RowKey>,
    columns: IndexMap<String, Vec<f64>>,
}

impl KeyedTable {
    /// Create an empty table with the given columns.
    ///
    /// `name` identifies the source in error messages.
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            columns: columns.iter().map(|c| (c.to_string(), Vec::new())).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a row. Values are given in column order.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the number of columns.
    pub fn push(&mut self, key: RowKey, values: &[f64]) {
        assert_eq!(
            values.len(),
            self.columns.len(),
            "Row length must match the number of columns of {}",
            self.name
        );
        self.keys.push(key);
        for (column, value) in self.columns.values_mut().zip(values) {
            column.push(*value);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|c| c.as_str())
    }

    /// Get a column by name.
    ///
    /// Returns a schema error if the column does not exist.
    pub fn column(&self, name: &str) -> ValuationResult<&[f64]> {
        self.columns
            .get(name)
            .map(|c| c.as_slice())
            .ok_or_else(|| ValuationError::schema(name, &self.name))
    }

    /// Resolve several columns at once, failing on the first missing one.
    pub fn columns<'a>(&'a self, names: &[&str]) -> ValuationResult<Vec<&'a [f64]>> {
        names.iter().map(|n| self.column(n)).collect()
    }

    /// Value of `column` at `row`.
    pub fn value(&self, column: &str, row: usize) -> ValuationResult<f64> {
        Ok(self.column(column)?[row])
    }

    /// Row indices grouped by key, in first-seen key order.
    pub fn group_rows(&self) -> IndexMap<RowKey, Vec<usize>> {
        let mut groups: IndexMap<RowKey, Vec<usize>> = IndexMap::new();
        for (row, key) in self.keys.iter().enumerate() {
            groups.entry(key.clone()).or_default().push(row);
        }
        groups
    }

    /// Collapse repeated keys by averaging every column.
    pub fn mean_by_key(&self) -> KeyedTable {
        self.collapse_by_key(|values| values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Collapse repeated keys by summing every column.
    pub fn sum_by_key(&self) -> KeyedTable {
        self.collapse_by_key(|values| values.iter().sum())
    }

    fn collapse_by_key(&self, reduce: impl Fn(&[f64]) -> f64) -> KeyedTable {
        let names: Vec<&str> = self.column_names().collect();
        let mut out = KeyedTable::new(self.name.clone(), &names);
        let mut buffer = Vec::new();
        for (key, rows) in self.group_rows() {
            let row: Vec<f64> = self
                .columns
                .values()
                .map(|column| {
                    buffer.clear();
                    buffer.extend(rows.iter().map(|&r| column[r]));
                    reduce(&buffer)
                })
                .collect();
            out.push(key, &row);
        }
        out
    }
}
