//! Parallel monetization of a Monte Carlo ensemble
//!
//! Every ensemble member is loaded and monetized independently on the rayon
//! pool. A failing member is logged, recorded in a shared [`FailureLog`] and
//! left out of the outcome; the rest of the ensemble continues. The shared
//! valuation inputs are only read while members run.
//!
//! Aggregation is a barrier: [`summarize_regional`] and [`collate_global`]
//! take the finished [`EnsembleOutcome`].

use indexmap::IndexMap;
use mortval_components::components::aggregate::{aggregate, AggregatedTable, GcmWeights, Statistic};
use mortval_components::components::monetize::{ImpactSource, MonetizedDamage, Monetizer, VariableSelection};
use mortval_core::errors::{ValuationError, ValuationResult};
use mortval_core::labels::{AdaptationScenario, EconModel, EnsembleMember, MonetizedVariable, Rcp, Scenario};
use mortval_core::panel::RegionYearPanel;
use mortval_core::table::Year;
use ndarray::Array2;
use rayon::prelude::*;
use std::fmt;
use std::sync::Mutex;

/// A member that was excluded from the ensemble, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberFailure {
    pub member: EnsembleMember,
    pub error: ValuationError,
}

/// Append-only record of failed members, shared between workers.
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: Mutex<Vec<MemberFailure>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, member: EnsembleMember, error: ValuationError) {
        log::error!("Excluding {}: {}", member, error);
        let failure = MemberFailure { member, error };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(failure),
            Err(poisoned) => poisoned.into_inner().push(failure),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entries(self) -> Vec<MemberFailure> {
        match self.entries.into_inner() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Monetized members and the members that were excluded.
#[derive(Debug, Clone, Default)]
pub struct EnsembleOutcome {
    pub damages: Vec<MonetizedDamage>,
    pub failures: Vec<MemberFailure>,
}

impl EnsembleOutcome {
    pub fn len(&self) -> usize {
        self.damages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.damages.is_empty()
    }
}

/// Runs the monetization of ensemble members in parallel.
pub struct EnsembleRunner<'a, S: ImpactSource> {
    source: &'a S,
    monetizers: IndexMap<Scenario, Monetizer<'a>>,
    adaptation: AdaptationScenario,
    selection: VariableSelection,
}

impl<'a, S: ImpactSource> EnsembleRunner<'a, S> {
    pub fn new(source: &'a S, adaptation: AdaptationScenario) -> Self {
        Self {
            source,
            monetizers: IndexMap::new(),
            adaptation,
            selection: VariableSelection::All,
        }
    }

    /// Register the monetizer used for members of `scenario`.
    pub fn with_monetizer(mut self, scenario: Scenario, monetizer: Monetizer<'a>) -> Self {
        self.monetizers.insert(scenario, monetizer);
        self
    }

    /// Keep only some monetized variables of every member.
    pub fn with_selection(mut self, selection: VariableSelection) -> Self {
        self.selection = selection;
        self
    }

    fn run_member(&self, member: &EnsembleMember) -> ValuationResult<MonetizedDamage> {
        let monetizer = self.monetizers.get(&member.scenario).ok_or_else(|| {
            ValuationError::alignment("scenario", member.scenario, "no valuation inputs registered")
        })?;
        let impacts = self.source.load(member, self.adaptation)?;
        let damages = monetizer.monetize(&impacts)?;
        match &self.selection {
            VariableSelection::All => Ok(damages),
            selection => damages.select(selection),
        }
    }

    /// Monetize every member. Failures never abort the run.
    pub fn run(&self, members: &[EnsembleMember]) -> EnsembleOutcome {
        log::info!(
            "Monetizing {} ensemble members ({})",
            members.len(),
            self.adaptation
        );
        let failures = FailureLog::new();
        let damages: Vec<MonetizedDamage> = members
            .par_iter()
            .filter_map(|member| match self.run_member(member) {
                Ok(damages) => {
                    log::debug!("Finished {}", member);
                    Some(damages)
                }
                Err(error) => {
                    failures.record(member.clone(), error);
                    None
                }
            })
            .collect();

        let failures = failures.into_entries();
        if !failures.is_empty() {
            log::warn!(
                "{} of {} ensemble members were excluded",
                failures.len(),
                members.len()
            );
        }
        EnsembleOutcome { damages, failures }
    }
}

/// Ensemble members that are aggregated together.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnsembleSlice {
    pub rcp: Rcp,
    pub model: EconModel,
    pub scenario: Scenario,
}

impl EnsembleSlice {
    pub fn of(member: &EnsembleMember) -> Self {
        Self {
            rcp: member.rcp,
            model: member.model,
            scenario: member.scenario,
        }
    }
}

impl fmt::Display for EnsembleSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.rcp, self.model, self.scenario)
    }
}

/// Aggregated statistics of one slice, with the members left out of it.
#[derive(Debug, Clone)]
pub struct RegionalSummary {
    pub slice: EnsembleSlice,
    pub members: usize,
    pub table: AggregatedTable,
    pub excluded: Vec<MemberFailure>,
}

impl RegionalSummary {
    /// Join the GDP of the slice's economic model to the table.
    pub fn with_gdp(mut self, gdp: &RegionYearPanel) -> ValuationResult<Self> {
        self.table = self.table.with_gdp(gdp)?;
        Ok(self)
    }
}

/// Aggregate every (RCP, economic model, scenario) slice of an outcome over
/// climate models and batches.
///
/// Slices are taken from both the monetized and the failed members.
///
/// # Errors
///
/// * `DataAlignment` if the outcome is empty, or if every member of some
///   slice failed
/// * Aggregation errors, including `DataAlignment` when a member's climate
///   model has no weight
pub fn summarize_regional(
    outcome: &EnsembleOutcome,
    weights: &GcmWeights,
    statistics: &[Statistic],
) -> ValuationResult<Vec<RegionalSummary>> {
    let mut slices: IndexMap<EnsembleSlice, Vec<&MonetizedDamage>> = IndexMap::new();
    for damages in &outcome.damages {
        slices
            .entry(EnsembleSlice::of(damages.member()))
            .or_default()
            .push(damages);
    }
    for failure in &outcome.failures {
        slices.entry(EnsembleSlice::of(&failure.member)).or_default();
    }
    if slices.is_empty() {
        return Err(ValuationError::alignment("ensemble", "<empty>", "no members to summarize"));
    }
    if let Some((slice, _)) = slices.iter().find(|(_, members)| members.is_empty()) {
        let failed = outcome
            .failures
            .iter()
            .filter(|f| EnsembleSlice::of(&f.member) == *slice)
            .count();
        return Err(ValuationError::alignment(
            "slice",
            slice,
            format!("all {} members failed", failed),
        ));
    }

    slices
        .into_iter()
        .map(|(slice, members)| -> ValuationResult<RegionalSummary> {
            let table = aggregate(&members, weights, statistics)?;
            let excluded: Vec<MemberFailure> = outcome
                .failures
                .iter()
                .filter(|f| EnsembleSlice::of(&f.member) == slice)
                .cloned()
                .collect();
            if !excluded.is_empty() {
                log::warn!(
                    "{:?}: aggregated {} members, {} excluded",
                    slice,
                    members.len(),
                    excluded.len()
                );
            }
            Ok(RegionalSummary {
                slice,
                members: members.len(),
                table,
                excluded,
            })
        })
        .collect()
}

/// Global damages of every member stacked into one long table.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalCollation {
    /// Variable columns followed by `gdp`
    pub columns: Vec<String>,
    pub rows: Vec<(EnsembleMember, Year)>,
    /// Shape (row, column)
    pub values: Array2<f64>,
}

impl GlobalCollation {
    pub fn column(&self, name: &str) -> ValuationResult<Vec<f64>> {
        let c = self
            .columns
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ValuationError::schema(name, "global collation"))?;
        Ok(self.values.column(c).to_vec())
    }
}

/// Sum each member over regions and stack the results by (member, year).
///
/// # Errors
///
/// `DataAlignment` if the outcome is empty or members carry different variables.
pub fn collate_global(outcome: &EnsembleOutcome) -> ValuationResult<GlobalCollation> {
    let Some(first) = outcome.damages.first() else {
        return Err(ValuationError::alignment("ensemble", "<empty>", "nothing to collate"));
    };
    let variables: Vec<MonetizedVariable> = first.variables().to_vec();
    let mut columns: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
    columns.push("gdp".to_string());

    let globals: Vec<_> = outcome.damages.par_iter().map(|d| d.global()).collect();
    let n_rows: usize = globals.iter().map(|g| g.years.len()).sum();
    let mut values = Array2::<f64>::zeros((n_rows, columns.len()));
    let mut rows = Vec::with_capacity(n_rows);

    for global in &globals {
        if global.variables != variables {
            return Err(ValuationError::alignment(
                "member",
                &global.member,
                "monetized variables differ from the rest of the ensemble",
            ));
        }
        for (t, year) in global.years.iter().enumerate() {
            let row = rows.len();
            for v in 0..variables.len() {
                values[[row, v]] = global.values[[v, t]];
            }
            values[[row, variables.len()]] = global.gdp[t];
            rows.push((global.member.clone(), *year));
        }
    }

    Ok(GlobalCollation {
        columns,
        rows,
        values,
    })
}
