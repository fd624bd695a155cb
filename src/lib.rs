//! Monetization of projected climate mortality impacts
//!
//! Converts projected deaths and adaptation costs into monetized damages
//! using value-of-statistical-life and value-of-life-year methodologies, and
//! summarizes a Monte Carlo ensemble of those damages with climate-model
//! weighted statistics.
//!
//! The building blocks live in two member crates, re-exported here:
//! - `mortval-core`: errors, dimension labels, tables and panels, price
//!   conversion, configuration
//! - `mortval-components`: demographic harmonization, valuation series,
//!   monetization and aggregation
//!
//! This crate adds the ensemble orchestration ([`ensemble`]) and the
//! rescaling of SCC estimates to an alternative baseline VSL ([`scc`]).

pub mod ensemble;
pub mod scc;

pub use mortval_components::components;
pub use mortval_core::{config, errors, interpolate, labels, panel, pricing, table};
