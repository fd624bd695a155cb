//! Core types for valuing projected mortality impacts of climate change
//!
//! This crate holds the pieces shared by every valuation stage:
//!
//! - [`labels`]: closed label sets for scenarios, models, age groups and methodologies
//! - [`table`]: long-format source tables with named columns
//! - [`panel`]: region × year panels backed by `ndarray`
//! - [`interpolate`]: linear interpolation of quinquennial series
//! - [`pricing`]: price indices, the baseline VSL/VLY and the reporting adjustment
//! - [`config`]: TOML-backed run configuration

pub mod config;
pub mod interpolate;
pub mod labels;
pub mod panel;
pub mod pricing;
pub mod table;

pub mod errors;
