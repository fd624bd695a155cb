//! Damage monetization
//!
//! Values the projected deaths and adaptation costs of one ensemble member.
//! For every age group $g$, with impact magnitude $x$ (deaths or costs):
//!
//! $$ LY_g = x \cdot LE_g \cdot s_g \qquad MT_g = x \cdot LE_{25-29} \cdot s_g $$
//!
//! where $s_g$ is the oldest-cohort correction (1 unless enabled for the
//! oldest group). For each variant $v$ of the valuation series:
//!
//! $$ D^{vsl}_v = x \cdot VSL_v \qquad D^{vly}_v = LY_g \cdot VLY_v \qquad D^{mt}_v = MT_g \cdot w^{mt}_g \cdot VLY_v $$
//!
//! Damages are monetized deaths plus monetized costs, divided by total
//! population. All three quantities are summed over age groups.
//!
//! Deaths are valued with the income basis selected by
//! [`MonetizationParameters::death_valuation_base`]; adaptation costs are
//! always valued with impact-region income.

use indexmap::IndexMap;
use mortval_core::config::MonetizationParameters;
use mortval_core::errors::{ValuationError, ValuationResult};
use mortval_core::labels::{
    AdaptationScenario, AgeGroup, EnsembleMember, LifeUnit, Methodology, MonetizedVariable, Quantity,
    ValuationBase, ValuationMeasure, Variant,
};
use mortval_core::panel::{year_index, RegionAxis, RegionYearPanel};
use mortval_core::table::Year;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::components::demographics::HarmonizedDemographics;
use crate::components::methodology::ValuationSeries;

/// Net deaths and scaled adaptation costs of one age group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeImpacts {
    pub deaths: RegionYearPanel,
    pub costs: RegionYearPanel,
}

/// Raw projection outputs of one age group, before netting.
#[derive(Debug, Clone)]
pub struct ProjectedImpacts {
    /// Death levels under the adaptation scenario
    pub levels: RegionYearPanel,
    /// Death levels under the historical-climate counterfactual
    pub histclim_levels: RegionYearPanel,
    /// Upper-bound adaptation costs, unscaled
    pub costs_upper_bound: RegionYearPanel,
}

/// Impacts of one ensemble member under one adaptation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    member: EnsembleMember,
    adaptation: AdaptationScenario,
    groups: IndexMap<AgeGroup, AgeImpacts>,
}

impl ImpactRecord {
    pub fn new(member: EnsembleMember, adaptation: AdaptationScenario) -> Self {
        Self {
            member,
            adaptation,
            groups: IndexMap::new(),
        }
    }

    /// Add the impacts of an age group. All panels must share axes.
    pub fn insert(&mut self, group: AgeGroup, deaths: RegionYearPanel, costs: RegionYearPanel) -> ValuationResult<()> {
        deaths.ensure_aligned(&costs, &format!("{} costs of {}", group, self.member))?;
        if let Some((_, existing)) = self.groups.first() {
            existing
                .deaths
                .ensure_aligned(&deaths, &format!("{} deaths of {}", group, self.member))?;
        }
        self.groups.insert(group, AgeImpacts { deaths, costs });
        Ok(())
    }

    /// Net the projection against the historical-climate counterfactual and
    /// scale adaptation costs, restricted to the configured year window.
    pub fn from_projection(
        member: EnsembleMember,
        adaptation: AdaptationScenario,
        projections: &[(AgeGroup, ProjectedImpacts)],
        parameters: &MonetizationParameters,
    ) -> ValuationResult<Self> {
        let mut record = Self::new(member, adaptation);
        let (first, last) = (parameters.first_year, parameters.last_year);
        for (group, projection) in projections {
            let levels = projection.levels.select_years(first, last);
            let histclim = projection.histclim_levels.select_years(first, last);
            levels.ensure_aligned(&histclim, &format!("{} histclim levels", group))?;

            let mut deaths = levels;
            *deaths.values_mut() -= histclim.values();

            let mut costs = projection.costs_upper_bound.select_years(first, last);
            costs.values_mut().mapv_inplace(|c| c * parameters.costs_scale);

            record.insert(*group, deaths, costs)?;
        }
        Ok(record)
    }

    pub fn member(&self) -> &EnsembleMember {
        &self.member
    }

    pub fn adaptation(&self) -> AdaptationScenario {
        self.adaptation
    }

    pub fn groups(&self) -> impl Iterator<Item = (&AgeGroup, &AgeImpacts)> {
        self.groups.iter()
    }

    pub fn get(&self, group: AgeGroup) -> Option<&AgeImpacts> {
        self.groups.get(&group)
    }
}

/// Loads the impacts of an ensemble member.
pub trait ImpactSource: Send + Sync {
    fn load(&self, member: &EnsembleMember, adaptation: AdaptationScenario) -> ValuationResult<ImpactRecord>;
}

/// Metadata attached to a monetized variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableAttributes {
    pub long_title: String,
    pub units: String,
    pub source: String,
    pub death_basis: ValuationBase,
    pub cost_basis: ValuationBase,
}

impl VariableAttributes {
    pub fn describe(variable: &MonetizedVariable, death_basis: ValuationBase) -> Self {
        let cost_basis = ValuationBase::Region;
        let scale = match variable.variant {
            Variant::Flat => "flat",
            Variant::IncomeScaled => "scaled",
            Variant::PopulationAveraged => "popavg",
        };
        let (long_title, units, source) = match variable.quantity {
            Quantity::Damages => (
                format!(
                    "monetized mortality damages (monetized deaths + costs) using {} {}-income mortality \
                     valuation methodology, based on {} income for costs and on {} income for deaths",
                    variable.methodology.describe(),
                    scale,
                    cost_basis.describe(),
                    death_basis.describe()
                ),
                "2019 USD per capita",
                "montecarlo simulation of impacts, VSL, pop and life expectancy data",
            ),
            quantity => {
                let basis = match quantity {
                    Quantity::Deaths => death_basis,
                    _ => cost_basis,
                };
                (
                    format!(
                        "monetized mortality {} using {} and {}-{}-income mortality valuation methodology",
                        quantity,
                        variable.methodology.describe(),
                        basis.describe(),
                        scale
                    ),
                    "2019 USD",
                    "montecarlo simulation of impacts, VSL and life expectancy data",
                )
            }
        };
        Self {
            long_title,
            units: units.to_string(),
            source: source.to_string(),
            death_basis,
            cost_basis,
        }
    }
}

/// Which monetized variables a regional output keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableSelection {
    All,
    Methodology(Methodology),
    Variant(Variant),
    Named(Vec<MonetizedVariable>),
}

impl VariableSelection {
    pub fn keeps(&self, variable: &MonetizedVariable) -> bool {
        match self {
            VariableSelection::All => true,
            VariableSelection::Methodology(m) => variable.methodology == *m,
            VariableSelection::Variant(v) => variable.variant == *v,
            VariableSelection::Named(names) => names.contains(variable),
        }
    }
}

/// Spatial resolution of a monetization output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputGranularity {
    Regional { selection: VariableSelection },
    Global,
}

/// Monetized damages of one member, summed over age groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetizedDamage {
    member: EnsembleMember,
    adaptation: AdaptationScenario,
    death_basis: ValuationBase,
    regions: RegionAxis,
    years: Vec<Year>,
    variables: Vec<MonetizedVariable>,
    /// Shape (variable, region, year)
    values: Array3<f64>,
    /// Shape (region, year)
    population: Array2<f64>,
    /// Shape (region, year)
    gdp: Array2<f64>,
}

impl MonetizedDamage {
    pub fn member(&self) -> &EnsembleMember {
        &self.member
    }

    pub fn adaptation(&self) -> AdaptationScenario {
        self.adaptation
    }

    pub fn regions(&self) -> &RegionAxis {
        &self.regions
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn variables(&self) -> &[MonetizedVariable] {
        &self.variables
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn population(&self) -> ArrayView2<'_, f64> {
        self.population.view()
    }

    pub fn gdp(&self) -> ArrayView2<'_, f64> {
        self.gdp.view()
    }

    pub fn variable(&self, variable: &MonetizedVariable) -> ValuationResult<ArrayView2<'_, f64>> {
        let i = self
            .variables
            .iter()
            .position(|v| v == variable)
            .ok_or_else(|| ValuationError::lookup(variable, format!("monetized damages of {}", self.member)))?;
        Ok(self.values.index_axis(Axis(0), i))
    }

    pub fn value(&self, variable: &MonetizedVariable, region: &str, year: Year) -> ValuationResult<f64> {
        let r = self.regions.require(region)?;
        let t = year_index(&self.years, year)
            .ok_or_else(|| ValuationError::alignment("year", year, "absent from monetized damages"))?;
        Ok(self.variable(variable)?[[r, t]])
    }

    pub fn attributes(&self, variable: &MonetizedVariable) -> VariableAttributes {
        VariableAttributes::describe(variable, self.death_basis)
    }

    /// Keep only the selected variables.
    pub fn select(&self, selection: &VariableSelection) -> ValuationResult<MonetizedDamage> {
        let keep: Vec<usize> = self
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| selection.keeps(v))
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(ValuationError::Config(format!(
                "variable selection {:?} keeps no monetized variable",
                selection
            )));
        }
        Ok(MonetizedDamage {
            variables: keep.iter().map(|&i| self.variables[i]).collect(),
            values: self.values.select(Axis(0), &keep),
            ..self.clone()
        })
    }

    /// Sum every variable and GDP over regions. Missing values are skipped.
    pub fn global(&self) -> GlobalDamages {
        let nan_sum = |view: ArrayView2<'_, f64>| -> Vec<f64> {
            view.axis_iter(Axis(1))
                .map(|col| col.iter().filter(|v| v.is_finite()).sum::<f64>())
                .collect()
        };
        let values = Array2::from_shape_fn((self.variables.len(), self.years.len()), |(i, t)| {
            self.values
                .index_axis(Axis(0), i)
                .column(t)
                .iter()
                .filter(|v| v.is_finite())
                .sum::<f64>()
        });
        GlobalDamages {
            member: self.member.clone(),
            adaptation: self.adaptation,
            years: self.years.clone(),
            variables: self.variables.clone(),
            values,
            gdp: nan_sum(self.gdp.view()),
        }
    }

    pub fn into_output(self, granularity: &OutputGranularity) -> ValuationResult<DamageOutput> {
        match granularity {
            OutputGranularity::Regional { selection: VariableSelection::All } => Ok(DamageOutput::Regional(self)),
            OutputGranularity::Regional { selection } => Ok(DamageOutput::Regional(self.select(selection)?)),
            OutputGranularity::Global => Ok(DamageOutput::Global(self.global())),
        }
    }
}

/// Monetized damages of one member summed over regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDamages {
    pub member: EnsembleMember,
    pub adaptation: AdaptationScenario,
    pub years: Vec<Year>,
    pub variables: Vec<MonetizedVariable>,
    /// Shape (variable, year)
    pub values: Array2<f64>,
    pub gdp: Vec<f64>,
}

/// Output of [`MonetizedDamage::into_output`].
#[derive(Debug, Clone, PartialEq)]
pub enum DamageOutput {
    Regional(MonetizedDamage),
    Global(GlobalDamages),
}

/// Monetizes impact records against shared valuation inputs.
///
/// The valuation series and demographics are read-only and can be shared by
/// any number of workers.
#[derive(Debug, Clone)]
pub struct Monetizer<'a> {
    region_series: &'a ValuationSeries,
    country_series: Option<&'a ValuationSeries>,
    demographics: &'a HarmonizedDemographics,
    parameters: MonetizationParameters,
}

/// Row/column positions of the output axes within an input.
struct AxisMap {
    rows: Vec<usize>,
    cols: Vec<usize>,
}

impl AxisMap {
    fn new(
        regions: &RegionAxis,
        years: &[Year],
        source_regions: &RegionAxis,
        source_years: &[Year],
        source: &str,
    ) -> ValuationResult<Self> {
        let rows = regions
            .iter()
            .map(|r| {
                source_regions
                    .index_of(r)
                    .ok_or_else(|| ValuationError::alignment("region", r, format!("absent from {}", source)))
            })
            .collect::<ValuationResult<_>>()?;
        let cols = years
            .iter()
            .map(|y| {
                year_index(source_years, *y)
                    .ok_or_else(|| ValuationError::alignment("year", y, format!("absent from {}", source)))
            })
            .collect::<ValuationResult<_>>()?;
        Ok(Self { rows, cols })
    }

    fn at(&self, view: &ArrayView2<'_, f64>, r: usize, t: usize) -> f64 {
        view[[self.rows[r], self.cols[t]]]
    }
}

impl<'a> Monetizer<'a> {
    /// # Errors
    ///
    /// * `Config` if `region_series` is not based on impact-region income
    /// * `DataAlignment` if the inputs belong to different scenarios
    pub fn new(
        region_series: &'a ValuationSeries,
        demographics: &'a HarmonizedDemographics,
        parameters: MonetizationParameters,
    ) -> ValuationResult<Self> {
        if region_series.base() != ValuationBase::Region {
            return Err(ValuationError::Config(
                "adaptation costs require a region-income valuation series".to_string(),
            ));
        }
        if region_series.scenario() != demographics.scenario() {
            return Err(ValuationError::alignment(
                "scenario",
                demographics.scenario(),
                format!("demographics do not match valuation series for {}", region_series.scenario()),
            ));
        }
        Ok(Self {
            region_series,
            country_series: None,
            demographics,
            parameters,
        })
    }

    /// Provide the country-income series used when deaths are valued on country income.
    pub fn with_country_series(mut self, series: &'a ValuationSeries) -> ValuationResult<Self> {
        if series.base() != ValuationBase::Country {
            return Err(ValuationError::Config(
                "country valuation series must be based on country income".to_string(),
            ));
        }
        if series.scenario() != self.region_series.scenario() {
            return Err(ValuationError::alignment(
                "scenario",
                series.scenario(),
                "country valuation series does not match region series",
            ));
        }
        self.country_series = Some(series);
        Ok(self)
    }

    pub fn parameters(&self) -> &MonetizationParameters {
        &self.parameters
    }

    fn death_series(&self) -> ValuationResult<&'a ValuationSeries> {
        match self.parameters.death_valuation_base {
            ValuationBase::Region => Ok(self.region_series),
            ValuationBase::Country => self.country_series.ok_or_else(|| {
                ValuationError::Config("deaths valued on country income but no country series given".to_string())
            }),
        }
    }

    fn cohort_scalar(&self, group: AgeGroup) -> f64 {
        if group == AgeGroup::Oldest && self.parameters.oldest_cohort_correction {
            self.parameters.oldest_cohort_ratio
        } else {
            1.0
        }
    }

    /// Monetize one impact record.
    ///
    /// # Errors
    ///
    /// * `DataAlignment` if an age group is missing from the record, or if the
    ///   record's scenario or economic model, or any of its regions or years,
    ///   is missing from the valuation inputs
    /// * `NumericDomain` if a population used to normalize damages is missing
    ///   or not positive
    pub fn monetize(&self, impacts: &ImpactRecord) -> ValuationResult<MonetizedDamage> {
        let member = impacts.member();
        let scenario = self.region_series.scenario();
        if member.scenario != scenario {
            return Err(ValuationError::alignment(
                "scenario",
                member.scenario,
                format!("valuation inputs are for {}", scenario),
            ));
        }
        let model = member.model;
        let death_series = self.death_series()?;

        if let Some(missing) = AgeGroup::ALL.iter().find(|g| impacts.get(**g).is_none()) {
            return Err(ValuationError::alignment(
                "age",
                missing,
                format!("no impacts for {}", member),
            ));
        }
        let Some((_, first)) = impacts.groups().next() else {
            return Err(ValuationError::alignment("age", "<none>", format!("no impacts for {}", member)));
        };
        let first_year = self.parameters.first_year;
        let last_year = self.parameters.last_year;
        let regions = first.deaths.regions().clone();
        let years: Vec<Year> = first
            .deaths
            .years()
            .iter()
            .copied()
            .filter(|y| *y >= first_year && *y <= last_year)
            .collect();

        let region_map = AxisMap::new(
            &regions,
            &years,
            self.region_series.regions(),
            self.region_series.years(),
            "region valuation series",
        )?;
        let death_map = AxisMap::new(
            &regions,
            &years,
            death_series.regions(),
            death_series.years(),
            "death valuation series",
        )?;
        let demo_map = AxisMap::new(
            &regions,
            &years,
            self.demographics.regions(),
            self.demographics.years(),
            "demographics",
        )?;
        let impact_cols: Vec<usize> = years
            .iter()
            .map(|y| first.deaths.year_index(*y).unwrap_or_default())
            .collect();

        let population = self.region_series.population(model)?;
        let gdp = self.region_series.gdp(model)?;

        let variables = MonetizedVariable::all();
        let index_of = |q: Quantity, m: Methodology, v: Variant| {
            (q.index() * Methodology::ALL.len() + m.index()) * Variant::ALL.len() + v.index()
        };
        let (n_regions, n_years) = (regions.len(), years.len());
        let mut values = Array3::<f64>::zeros((variables.len(), n_regions, n_years));

        for (group, group_impacts) in impacts.groups() {
            let group = *group;
            let scalar = self.cohort_scalar(group);
            let expectancy = self.demographics.expectancy(group);
            let mt_expectancy = self.demographics.mt_reference_expectancy();
            let mt_weight = self.demographics.mt_weight(group);

            for (quantity, panel, series, map) in [
                (Quantity::Deaths, &group_impacts.deaths, death_series, &death_map),
                (Quantity::Costs, &group_impacts.costs, self.region_series, &region_map),
            ] {
                for variant in Variant::ALL {
                    let vsl = series.measure(ValuationMeasure::new(LifeUnit::StatisticalLife, *variant), model)?;
                    let vly = series.measure(ValuationMeasure::new(LifeUnit::LifeYear, *variant), model)?;
                    for r in 0..n_regions {
                        for t in 0..n_years {
                            let x = panel.values()[[r, impact_cols[t]]];
                            let life_years = x * demo_map.at(&expectancy, r, t) * scalar;
                            let mt_years = x * demo_map.at(&mt_expectancy, r, t) * scalar;
                            let vly_value = map.at(&vly, r, t);

                            values[[index_of(quantity, Methodology::Vsl, *variant), r, t]] +=
                                x * map.at(&vsl, r, t);
                            values[[index_of(quantity, Methodology::Vly, *variant), r, t]] +=
                                life_years * vly_value;
                            values[[index_of(quantity, Methodology::MurphyTopel, *variant), r, t]] +=
                                mt_years * demo_map.at(&mt_weight, r, t) * vly_value;
                        }
                    }
                }
            }
        }

        let mut pop_out = Array2::<f64>::zeros((n_regions, n_years));
        let mut gdp_out = Array2::<f64>::zeros((n_regions, n_years));
        for r in 0..n_regions {
            for t in 0..n_years {
                let pop = region_map.at(&population, r, t);
                if pop.is_nan() || pop <= 0.0 {
                    return Err(ValuationError::NumericDomain(format!(
                        "population {} for {} in {} is not positive",
                        pop,
                        regions.label(r),
                        years[t]
                    )));
                }
                pop_out[[r, t]] = pop;
                gdp_out[[r, t]] = region_map.at(&gdp, r, t);
                for methodology in Methodology::ALL {
                    for variant in Variant::ALL {
                        let deaths = values[[index_of(Quantity::Deaths, *methodology, *variant), r, t]];
                        let costs = values[[index_of(Quantity::Costs, *methodology, *variant), r, t]];
                        values[[index_of(Quantity::Damages, *methodology, *variant), r, t]] = (deaths + costs) / pop;
                    }
                }
            }
        }

        log::debug!("Monetized {} ({})", member, impacts.adaptation());
        Ok(MonetizedDamage {
            member: member.clone(),
            adaptation: impacts.adaptation(),
            death_basis: death_series.base(),
            regions,
            years,
            variables,
            values,
            population: pop_out,
            gdp: gdp_out,
        })
    }
}
