//! Currency-year conversion and the baseline life valuation
//!
//! Two independent price conversions happen in the pipeline:
//!
//! 1. The externally chosen reference VSL is converted from its own currency
//!    year into the currency year of the income projections
//!    ([`BaselineValuation::convert`]).
//! 2. Every monetary output is converted once, at the end of the valuation
//!    series calculation, into the reporting currency year
//!    ([`ReportingAdjustment::price_adjustment`]).

use crate::errors::{ValuationError, ValuationResult};
use crate::table::Year;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Year-indexed price or inflation index (CPI, GDP deflator, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceIndex {
    name: String,
    values: BTreeMap<Year, f64>,
}

impl PriceIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn from_pairs(name: impl Into<String>, pairs: impl IntoIterator<Item = (Year, f64)>) -> Self {
        Self {
            name: name.into(),
            values: pairs.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, year: Year, value: f64) {
        self.values.insert(year, value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index value for `year`.
    pub fn get(&self, year: Year) -> ValuationResult<f64> {
        self.values
            .get(&year)
            .copied()
            .ok_or_else(|| ValuationError::lookup(format!("year {}", year), &self.name))
    }

    /// Multiplicative factor converting `from`-year currency into `to`-year currency.
    pub fn ratio(&self, to: Year, from: Year) -> ValuationResult<f64> {
        let numerator = self.get(to)?;
        let denominator = self.get(from)?;
        if denominator <= 0.0 {
            return Err(ValuationError::NumericDomain(format!(
                "{} value for {} must be positive, got {}",
                self.name, from, denominator
            )));
        }
        Ok(numerator / denominator)
    }
}

/// Baseline statistical-life and life-year values in a fixed currency year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineValuation {
    /// Value of a statistical life
    pub vsl: f64,
    /// Value of a life-year
    pub vly: f64,
    /// Currency year of both values
    pub currency_year: Year,
}

impl BaselineValuation {
    /// Convert a reference VSL into the target currency year and derive the
    /// value of a life-year.
    ///
    /// $$ VSL_{target} = VSL_{ref} \cdot \frac{P(target)}{P(ref)} \qquad VLY = \frac{VSL_{target}}{LE_{ref}} $$
    ///
    /// where $LE_{ref}$ is the remaining life expectancy of the population the
    /// reference VSL was estimated on.
    ///
    /// # Errors
    ///
    /// * `Lookup` if either year is missing from `price_index`
    /// * `NumericDomain` if the reference life expectancy is not positive
    pub fn convert(
        vsl_reference_value: f64,
        reference_life_expectancy: f64,
        price_index: &PriceIndex,
        target_year: Year,
        reference_year: Year,
    ) -> ValuationResult<Self> {
        if reference_life_expectancy <= 0.0 {
            return Err(ValuationError::NumericDomain(format!(
                "reference life expectancy must be positive, got {}",
                reference_life_expectancy
            )));
        }
        let vsl = vsl_reference_value * price_index.ratio(target_year, reference_year)?;
        log::info!(
            "Baseline VSL {:.0} ({}) converted to {:.0} ({})",
            vsl_reference_value,
            reference_year,
            vsl,
            target_year
        );
        Ok(Self {
            vsl,
            vly: vsl / reference_life_expectancy,
            currency_year: target_year,
        })
    }
}

/// Reference income for income scaling and the final price adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportingAdjustment {
    /// Per-capita income the baseline VSL corresponds to, in projection currency
    pub reference_income: f64,
    /// Factor converting projection currency into reporting currency
    pub price_adjustment: f64,
}

impl ReportingAdjustment {
    /// Derive the adjustment from a real per-capita income series and a GDP deflator.
    ///
    /// `gdppc` is expressed in `deflator_base_year` currency. The reference
    /// income is the value for `income_year`, rebased to `projection_year`
    /// currency; the price adjustment converts `projection_year` currency to
    /// `reporting_year` currency.
    pub fn from_series(
        gdppc: &PriceIndex,
        deflator: &PriceIndex,
        income_year: Year,
        deflator_base_year: Year,
        projection_year: Year,
        reporting_year: Year,
    ) -> ValuationResult<Self> {
        let reference_income =
            gdppc.get(income_year)? * deflator.ratio(projection_year, deflator_base_year)?;
        let price_adjustment = deflator.ratio(reporting_year, projection_year)?;
        if reference_income <= 0.0 {
            return Err(ValuationError::NumericDomain(format!(
                "reference income must be positive, got {}",
                reference_income
            )));
        }
        Ok(Self {
            reference_income,
            price_adjustment,
        })
    }
}
