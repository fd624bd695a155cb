//! Valuation stages of the mortality damage pipeline
//!
//! Stages are ordered leaf-first:
//! - `demographics`: annual population and life-expectancy series per impact region
//! - `age_factors`: life-expectancy and Murphy-Topel weights by age group
//! - `methodology`: VSL/VLY valuation series from a baseline value and income
//! - `monetize`: monetized deaths, costs and per-capita damages per ensemble member
//! - `aggregate`: weighted ensemble means and quantiles

pub mod components;
