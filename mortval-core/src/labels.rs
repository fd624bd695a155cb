//! Closed label sets for every dimension of the valuation pipeline
//!
//! Scenario, model and methodology selectors arrive as text at the boundary
//! (column names, directory components, configuration files). They are
//! parsed once into these enums so that unsupported combinations fail at
//! construction time instead of falling through a string comparison.
//!
//! ```rust
//! use mortval_core::labels::{AgeGroup, EconModel, Scenario};
//!
//! let ssp: Scenario = "SSP3".parse().unwrap();
//! assert_eq!(ssp, Scenario::Ssp3);
//! assert_eq!(EconModel::Low.long_name(), "IIASA GDP");
//! assert_eq!(AgeGroup::ALL.len(), 3);
//! ```

use crate::errors::ValuationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a fieldless enum whose variants carry a fixed text label.
///
/// Generates `ALL`, `label()`, `Display`, `FromStr` and serde support keyed
/// on the label.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Text label used in tables and variable names.
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Position of the variant within [`Self::ALL`].
            pub fn index(&self) -> usize {
                *self as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = ValuationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(ValuationError::Config(format!(
                        "'{}' is not a valid {}; expected one of [{}]",
                        other,
                        stringify!($name),
                        [$($label),+].join(", ")
                    ))),
                }
            }
        }
    };
}

labelled_enum! {
    /// Shared socioeconomic pathway.
    Scenario {
        Ssp1 => "SSP1",
        Ssp2 => "SSP2",
        Ssp3 => "SSP3",
        Ssp4 => "SSP4",
        Ssp5 => "SSP5",
    }
}

labelled_enum! {
    /// Economic growth model used to project income.
    EconModel {
        /// IIASA GDP projections
        Low => "low",
        /// OECD Env-Growth projections
        High => "high",
    }
}

impl EconModel {
    /// Name of the economic model as it appears in published datasets.
    pub fn long_name(&self) -> &'static str {
        match self {
            EconModel::Low => "IIASA GDP",
            EconModel::High => "OECD Env-Growth",
        }
    }
}

labelled_enum! {
    /// Representative concentration pathway.
    Rcp {
        Rcp45 => "rcp45",
        Rcp85 => "rcp85",
    }
}

labelled_enum! {
    /// Coarse age groups over which impacts are projected.
    AgeGroup {
        /// Ages 0-4
        Young => "young",
        /// Ages 5-64
        Older => "older",
        /// Ages 65 and over
        Oldest => "oldest",
    }
}

labelled_enum! {
    /// Adaptation assumption of a projection run.
    AdaptationScenario {
        FullAdapt => "fulladapt",
        IncAdapt => "incadapt",
        HistClim => "histclim",
        Costs => "costs",
    }
}

labelled_enum! {
    /// Spatial resolution of the income used to scale a valuation.
    ValuationBase {
        /// Impact-region income
        Region => "region",
        /// Country income broadcast onto impact regions
        Country => "country",
    }
}

impl ValuationBase {
    /// Description used in variable attributes.
    pub fn describe(&self) -> &'static str {
        match self {
            ValuationBase::Region => "IR-year",
            ValuationBase::Country => "country-year",
        }
    }
}

labelled_enum! {
    /// Unit over which a life is valued.
    LifeUnit {
        /// Value of a statistical life
        StatisticalLife => "vsl",
        /// Value of a life-year
        LifeYear => "vly",
    }
}

labelled_enum! {
    /// How a baseline value varies over space and time.
    Variant {
        /// Unique across space and time
        Flat => "flat",
        /// Scaled by the ratio of local to reference income
        IncomeScaled => "income_scaled",
        /// Income-scaled value collapsed across regions by population weighting
        PopulationAveraged => "population_averaged",
    }
}

labelled_enum! {
    /// Valuation methodology applied to a physical impact.
    Methodology {
        /// Deaths valued at the statistical life
        Vsl => "vsl",
        /// Life-years lost valued at the life-year
        Vly => "vly",
        /// Life-years lost valued with age-heterogeneous Murphy-Topel weights
        MurphyTopel => "mt",
    }
}

impl Methodology {
    /// Unit of the valuation series the methodology draws from.
    pub fn life_unit(&self) -> LifeUnit {
        match self {
            Methodology::Vsl => LifeUnit::StatisticalLife,
            Methodology::Vly | Methodology::MurphyTopel => LifeUnit::LifeYear,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Methodology::Vsl => "value of statistical life",
            Methodology::Vly => "value-of-life-year",
            Methodology::MurphyTopel => "murphy-topel heterogeneous valuation of life year",
        }
    }
}

labelled_enum! {
    /// Monetized quantity.
    Quantity {
        Deaths => "deaths",
        Costs => "costs",
        /// Deaths plus costs, per capita
        Damages => "damages",
    }
}

/// One of the six space/time-varying valuation measures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValuationMeasure {
    pub unit: LifeUnit,
    pub variant: Variant,
}

impl ValuationMeasure {
    pub const ALL: [ValuationMeasure; 6] = [
        ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::Flat),
        ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::IncomeScaled),
        ValuationMeasure::new(LifeUnit::StatisticalLife, Variant::PopulationAveraged),
        ValuationMeasure::new(LifeUnit::LifeYear, Variant::Flat),
        ValuationMeasure::new(LifeUnit::LifeYear, Variant::IncomeScaled),
        ValuationMeasure::new(LifeUnit::LifeYear, Variant::PopulationAveraged),
    ];

    pub const fn new(unit: LifeUnit, variant: Variant) -> Self {
        Self { unit, variant }
    }

    /// Position of the measure within [`Self::ALL`].
    pub fn index(&self) -> usize {
        self.unit.index() * Variant::ALL.len() + self.variant.index()
    }

    /// Field name, e.g. `vsl_income_scaled`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.unit, self.variant)
    }
}

impl fmt::Display for ValuationMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.unit, self.variant)
    }
}

/// Name of a monetized output, e.g. `monetized_deaths_vly_income_scaled`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonetizedVariable {
    pub quantity: Quantity,
    pub methodology: Methodology,
    pub variant: Variant,
}

impl MonetizedVariable {
    pub const fn new(quantity: Quantity, methodology: Methodology, variant: Variant) -> Self {
        Self {
            quantity,
            methodology,
            variant,
        }
    }

    /// Every (quantity, methodology, variant) combination.
    pub fn all() -> Vec<MonetizedVariable> {
        let mut out = Vec::with_capacity(27);
        for quantity in Quantity::ALL {
            for methodology in Methodology::ALL {
                for variant in Variant::ALL {
                    out.push(Self::new(*quantity, *methodology, *variant));
                }
            }
        }
        out
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MonetizedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "monetized_{}_{}_{}",
            self.quantity, self.methodology, self.variant
        )
    }
}

impl FromStr for MonetizedVariable {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonetizedVariable::all()
            .into_iter()
            .find(|v| v.to_string() == s)
            .ok_or_else(|| ValuationError::Config(format!("'{}' is not a monetized variable", s)))
    }
}

/// Coordinates of one Monte Carlo ensemble member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub batch: u32,
    pub rcp: Rcp,
    /// Climate model identifier
    pub gcm: String,
    pub model: EconModel,
    pub scenario: Scenario,
}

impl EnsembleMember {
    pub fn new(batch: u32, rcp: Rcp, gcm: impl Into<String>, model: EconModel, scenario: Scenario) -> Self {
        Self {
            batch,
            rcp,
            gcm: gcm.into(),
            model,
            scenario,
        }
    }
}

impl fmt::Display for EnsembleMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch{}/{}/{}/{}/{}",
            self.batch, self.rcp, self.gcm, self.model, self.scenario
        )
    }
}

/// Country code of an impact region: the first three characters of its key.
pub fn country_of(region: &str) -> &str {
    match region.char_indices().nth(3) {
        Some((idx, _)) => &region[..idx],
        None => region,
    }
}
