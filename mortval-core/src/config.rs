//! Run configuration
//!
//! Every constant the valuation depends on is a field of one of the
//! parameter structs below. Each struct provides defaults matching the
//! published mortality valuation, and all of them can be overridden from a
//! TOML document:
//!
//! ```rust
//! use mortval_core::config::ValuationConfig;
//!
//! let config = ValuationConfig::from_toml_str(
//!     r#"
//!     [baseline]
//!     vsl_reference_value = 10000000.0
//!
//!     [monetization]
//!     oldest_cohort_correction = true
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.baseline.vsl_reference_value, 10_000_000.0);
//! assert_eq!(config.baseline.reference_life_expectancy, 47.2);
//! assert!(config.monetization.oldest_cohort_correction);
//! ```

use crate::errors::{ValuationError, ValuationResult};
use crate::labels::ValuationBase;
use crate::pricing::{BaselineValuation, PriceIndex, ReportingAdjustment};
use crate::table::Year;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the reference statistical-life value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParameters {
    /// Reference value of a statistical life, in `reference_currency_year` currency.
    ///
    /// Default: 9,900,000 (U.S. EPA, 2011 dollars)
    pub vsl_reference_value: f64,

    /// Remaining life expectancy (years) of the population behind the reference VSL.
    ///
    /// Default: 47.2 years
    pub reference_life_expectancy: f64,

    /// Currency year of `vsl_reference_value`.
    ///
    /// Default: 2011
    pub reference_currency_year: Year,

    /// Currency year of the income projections.
    ///
    /// Default: 2005
    pub target_currency_year: Year,
}

impl Default for BaselineParameters {
    fn default() -> Self {
        Self {
            vsl_reference_value: 9_900_000.0,
            reference_life_expectancy: 47.2,
            reference_currency_year: 2011,
            target_currency_year: 2005,
        }
    }
}

impl BaselineParameters {
    /// Baseline VSL and VLY in the target currency year.
    pub fn baseline(&self, price_index: &PriceIndex) -> ValuationResult<BaselineValuation> {
        BaselineValuation::convert(
            self.vsl_reference_value,
            self.reference_life_expectancy,
            price_index,
            self.target_currency_year,
            self.reference_currency_year,
        )
    }
}

/// Parameters of the reference income and reporting currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingParameters {
    /// Year whose per-capita income the baseline VSL is scaled against.
    ///
    /// Default: 2019
    pub income_year: Year,

    /// Currency year of the real per-capita income series.
    ///
    /// Default: 2012
    pub deflator_base_year: Year,

    /// Currency year of the income projections.
    ///
    /// Default: 2005
    pub projection_currency_year: Year,

    /// Currency year all monetary outputs are reported in.
    ///
    /// Default: 2019
    pub reporting_currency_year: Year,
}

impl Default for ReportingParameters {
    fn default() -> Self {
        Self {
            income_year: 2019,
            deflator_base_year: 2012,
            projection_currency_year: 2005,
            reporting_currency_year: 2019,
        }
    }
}

impl ReportingParameters {
    pub fn adjustment(&self, gdppc: &PriceIndex, deflator: &PriceIndex) -> ValuationResult<ReportingAdjustment> {
        ReportingAdjustment::from_series(
            gdppc,
            deflator,
            self.income_year,
            self.deflator_base_year,
            self.projection_currency_year,
            self.reporting_currency_year,
        )
    }
}

/// Parameters of the demographic harmonization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographicParameters {
    /// Year at which life-expectancy coverage is checked for missing countries.
    ///
    /// Default: 2015
    pub imputation_reference_year: Year,

    /// Final year of the harmonized series.
    ///
    /// Default: 2100
    pub terminal_year: Year,

    /// Spacing (years) between observed anchors.
    ///
    /// Default: 5
    pub anchor_step: Year,
}

impl Default for DemographicParameters {
    fn default() -> Self {
        Self {
            imputation_reference_year: 2015,
            terminal_year: 2100,
            anchor_step: 5,
        }
    }
}

/// Parameters of the damage monetization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonetizationParameters {
    /// Rescale the oldest cohort's life-years by `oldest_cohort_ratio`.
    ///
    /// Default: false
    pub oldest_cohort_correction: bool,

    /// Ratio applied to the oldest cohort's life-years when the correction is enabled.
    ///
    /// Default: 3.901 / 9.657
    pub oldest_cohort_ratio: f64,

    /// Income basis used to value deaths. Costs always use impact-region income.
    ///
    /// Default: region
    pub death_valuation_base: ValuationBase,

    /// First projection year that is valued.
    ///
    /// Default: 2010
    pub first_year: Year,

    /// Last projection year that is valued.
    ///
    /// Default: 2099
    pub last_year: Year,

    /// Scale converting raw adaptation-cost magnitudes into currency.
    ///
    /// Default: 1e-5
    pub costs_scale: f64,
}

impl Default for MonetizationParameters {
    fn default() -> Self {
        Self {
            oldest_cohort_correction: false,
            oldest_cohort_ratio: 3.901 / 9.657,
            death_valuation_base: ValuationBase::Region,
            first_year: 2010,
            last_year: 2099,
            costs_scale: 1.0 / 100_000.0,
        }
    }
}

/// Parameters of the ensemble aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationParameters {
    /// Statistics to compute, as `mean` or `qNN` labels.
    ///
    /// Default: mean, q05, q17, q25, q50, q75, q83, q95
    pub statistics: Vec<String>,
}

impl Default for AggregationParameters {
    fn default() -> Self {
        Self {
            statistics: ["mean", "q05", "q17", "q25", "q50", "q75", "q83", "q95"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    pub baseline: BaselineParameters,
    pub reporting: ReportingParameters,
    pub demographics: DemographicParameters,
    pub monetization: MonetizationParameters,
    pub aggregation: AggregationParameters,
}

impl ValuationConfig {
    pub fn from_toml_str(source: &str) -> ValuationResult<Self> {
        let config: ValuationConfig =
            toml::from_str(source).map_err(|e| ValuationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ValuationResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ValuationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> ValuationResult<String> {
        toml::to_string(self).map_err(|e| ValuationError::Config(e.to_string()))
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> ValuationResult<()> {
        if self.baseline.reference_life_expectancy <= 0.0 {
            return Err(ValuationError::Config(
                "baseline.reference_life_expectancy must be positive".to_string(),
            ));
        }
        if self.demographics.anchor_step <= 0 {
            return Err(ValuationError::Config(
                "demographics.anchor_step must be positive".to_string(),
            ));
        }
        if self.monetization.first_year > self.monetization.last_year {
            return Err(ValuationError::Config(format!(
                "monetization.first_year ({}) is after last_year ({})",
                self.monetization.first_year, self.monetization.last_year
            )));
        }
        if self.aggregation.statistics.is_empty() {
            return Err(ValuationError::Config(
                "aggregation.statistics must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValuationConfig::default();
        assert_eq!(config.baseline.vsl_reference_value, 9_900_000.0);
        assert_eq!(config.reporting.reporting_currency_year, 2019);
        assert_eq!(config.demographics.terminal_year, 2100);
        assert!((config.monetization.oldest_cohort_ratio - 0.40395).abs() < 1e-4);
        assert_eq!(config.aggregation.statistics.len(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_baseline_from_parameters() {
        let cpi = PriceIndex::from_pairs("CPI", [(2005, 195.3), (2011, 224.939)]);
        let baseline = BaselineParameters::default().baseline(&cpi).unwrap();
        assert_eq!(baseline.currency_year, 2005);
        assert!((baseline.vsl - 9_900_000.0 * 195.3 / 224.939).abs() < 1e-6);
        assert!((baseline.vly - baseline.vsl / 47.2).abs() < 1e-9);
    }

    #[test]
    fn test_reporting_from_parameters() {
        let gdppc = PriceIndex::from_pairs("gdppc", [(2019, 58_000.0)]);
        let deflator = PriceIndex::from_pairs("deflator", [(2005, 80.0), (2012, 100.0), (2019, 110.0)]);
        let adjustment = ReportingParameters::default().adjustment(&gdppc, &deflator).unwrap();
        assert!((adjustment.reference_income - 58_000.0 * 0.8).abs() < 1e-9);
        assert!((adjustment.price_adjustment - 110.0 / 80.0).abs() < 1e-12);

        let missing = PriceIndex::from_pairs("deflator", [(2005, 80.0)]);
        assert!(matches!(
            ReportingParameters::default().adjustment(&gdppc, &missing),
            Err(ValuationError::Lookup { .. })
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ValuationConfig::default();
        let text = config.to_toml_string().unwrap();
        let restored = ValuationConfig::from_toml_str(&text).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_death_base_from_toml() {
        let config = ValuationConfig::from_toml_str(
            "[monetization]\ndeath_valuation_base = \"country\"\n",
        )
        .unwrap();
        assert_eq!(config.monetization.death_valuation_base, ValuationBase::Country);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ValuationConfig::from_toml_str("[monetization]\nfirst_year = 2100\nlast_year = 2000\n"),
            Err(ValuationError::Config(_))
        ));
        assert!(matches!(
            ValuationConfig::from_toml_str("[monetization]\ndeath_valuation_base = \"planet\"\n"),
            Err(ValuationError::Config(_))
        ));
    }

    #[test]
    fn test_json_serialization() {
        let params = MonetizationParameters::default();
        let json = serde_json::to_string(&params).unwrap();
        let restored: MonetizationParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(params, restored);
    }
}
