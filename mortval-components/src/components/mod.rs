pub mod age_factors;
pub mod aggregate;
pub mod demographics;
pub mod methodology;
pub mod monetize;

#[cfg(test)]
pub(crate) mod fixtures;

pub use age_factors::{
    compute_age_adjustment_factors, AgeAdjustmentFactors, MurphyTopelProfile, ProfileEntry,
};
pub use aggregate::{aggregate, AggregatedTable, GcmWeights, Statistic, WeightedSample};
pub use demographics::{
    DemographicField, DemographicsCache, Harmonizer, HarmonizedDemographics, MemoryCache, NoCache,
};
pub use methodology::{compute_valuation_series, IncomeTable, ValuationSeries};
pub use monetize::{
    AgeImpacts, DamageOutput, GlobalDamages, ImpactRecord, ImpactSource, MonetizedDamage, Monetizer,
    OutputGranularity, ProjectedImpacts, VariableAttributes, VariableSelection,
};
