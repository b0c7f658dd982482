//! The `simulate` entry point of an exported model.
//!
//! A [`Simulator`] owns its state vector, parameter buffer and trajectory
//! cache and reuses them across calls. Calls on one instance take `&mut self`
//! and are therefore serialized; separate instances (see [`Simulator::fork`])
//! share nothing mutable and can run on different threads.

use std::borrow::Cow;
use std::sync::Arc;

use diffsol::{
    error::{DiffsolError, OdeSolverError},
    ode_solver::method::OdeSolverMethod,
    OdeBuilder, OdeSolverStopReason,
};
use nalgebra::{DMatrix, DVector};

use super::derivative::{Backend, Derivative};
use super::error::RuntimeError;
use super::problem::ReactionProblem;
use super::records::{Initial, Observable, Parameter};

type M = DMatrix<f64>;

pub const RTOL: f64 = 1e-6;
pub const ATOL: f64 = 1e-9;
pub const H0: f64 = 1e-3;

/// Integrator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub rtol: f64,
    pub atol: f64,
    /// Initial step size
    pub h0: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rtol: RTOL,
            atol: ATOL,
            h0: H0,
        }
    }
}

/// One named column per observable, one row per timepoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservableTable {
    names: Vec<String>,
    values: DMatrix<f64>,
}

impl ObservableTable {
    fn new(rows: usize, observables: &[Observable]) -> Self {
        Self {
            names: observables.iter().map(|o| o.name.clone()).collect(),
            values: DMatrix::zeros(rows, observables.len()),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `(timepoints, observables)` matrix.
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Trajectory of the observable called `name`.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.names.iter().position(|n| n == name)?;
        Some(self.values.column(index).iter().copied().collect())
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationStatus {
    /// Every requested timepoint was reached.
    Complete,
    /// The integrator stopped early. Rows `0..completed_rows` are valid, later
    /// rows hold whatever the buffers contained before the call.
    Failed {
        completed_rows: usize,
        /// Time of the last valid row
        time: f64,
        reason: String,
    },
}

impl IntegrationStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, IntegrationStatus::Complete)
    }

    /// Number of valid rows out of `total`.
    pub fn valid_rows(&self, total: usize) -> usize {
        match self {
            IntegrationStatus::Complete => total,
            IntegrationStatus::Failed { completed_rows, .. } => *completed_rows,
        }
    }
}

/// Result of [`Simulator::simulate`].
///
/// With `view == true` both tables borrow the simulator's cache, otherwise
/// they are independent copies.
#[derive(Debug, Clone)]
pub struct SimulationOutput<'a> {
    /// `(timepoints, species)` trajectory
    pub species: Cow<'a, DMatrix<f64>>,
    pub observables: Cow<'a, ObservableTable>,
    pub status: IntegrationStatus,
}

impl SimulationOutput<'_> {
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Whether the tables alias the simulator's buffers.
    pub fn is_view(&self) -> bool {
        matches!(self.species, Cow::Borrowed(_))
    }
}

#[derive(Debug, Clone)]
struct TrajectoryCache {
    y: DMatrix<f64>,
    yobs: ObservableTable,
}

impl TrajectoryCache {
    fn new(rows: usize, num_species: usize, observables: &[Observable]) -> Self {
        Self {
            y: DMatrix::zeros(rows, num_species),
            yobs: ObservableTable::new(rows, observables),
        }
    }
}

pub struct Simulator {
    y0: DVector<f64>,
    ydot: DVector<f64>,
    sim_param_values: DVector<f64>,
    parameters: Box<[Parameter]>,
    observables: Box<[Observable]>,
    initial_conditions: Box<[Initial]>,
    cache: Option<TrajectoryCache>,
    rhs: Arc<dyn Derivative>,
    settings: SolverSettings,
}

impl Simulator {
    /// Allocate the buffers of a model with `num_species` species.
    ///
    /// Fails when an observable or initial condition refers to a species or
    /// parameter that does not exist, or an observable's species and
    /// coefficients differ in length.
    pub fn new(
        num_species: usize,
        parameters: Box<[Parameter]>,
        observables: Box<[Observable]>,
        initial_conditions: Box<[Initial]>,
        rhs: Arc<dyn Derivative>,
    ) -> Result<Self, RuntimeError> {
        for obs in observables.iter() {
            if obs.species.len() != obs.coefficients.len() {
                return Err(RuntimeError::InvalidRecord(format!(
                    "observable '{}' has {} species but {} coefficients",
                    obs.name,
                    obs.species.len(),
                    obs.coefficients.len()
                )));
            }
            if let Some(s) = obs.species.iter().find(|&&s| s >= num_species) {
                return Err(RuntimeError::InvalidRecord(format!(
                    "observable '{}' refers to species {} of {}",
                    obs.name, s, num_species
                )));
            }
        }
        for ic in initial_conditions.iter() {
            if ic.species_index >= num_species || ic.param_index >= parameters.len() {
                return Err(RuntimeError::InvalidRecord(format!(
                    "initial condition ({}, {}) is out of range",
                    ic.param_index, ic.species_index
                )));
            }
        }

        let num_parameters = parameters.len();
        Ok(Self {
            y0: DVector::zeros(num_species),
            ydot: DVector::zeros(num_species),
            sim_param_values: DVector::zeros(num_parameters),
            parameters,
            observables,
            initial_conditions,
            cache: None,
            rhs,
            settings: SolverSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// A new simulator with the same configuration and right-hand side but
    /// its own buffers.
    pub fn fork(&self) -> Self {
        Self {
            y0: DVector::zeros(self.y0.len()),
            ydot: DVector::zeros(self.ydot.len()),
            sim_param_values: DVector::zeros(self.sim_param_values.len()),
            parameters: self.parameters.clone(),
            observables: self.observables.clone(),
            initial_conditions: self.initial_conditions.clone(),
            cache: None,
            rhs: Arc::clone(&self.rhs),
            settings: self.settings,
        }
    }

    pub fn num_species(&self) -> usize {
        self.y0.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn observables(&self) -> &[Observable] {
        &self.observables
    }

    pub fn initial_conditions(&self) -> &[Initial] {
        &self.initial_conditions
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn backend(&self) -> Backend {
        self.rhs.backend()
    }

    /// Parameter values used by the last `simulate` call.
    pub fn sim_param_values(&self) -> &[f64] {
        self.sim_param_values.as_slice()
    }

    /// Initial state of the last `simulate` call.
    pub fn y0(&self) -> &[f64] {
        self.y0.as_slice()
    }

    /// Cached species and observable tables of the last `simulate` call.
    pub fn trajectory(&self) -> Option<(&DMatrix<f64>, &ObservableTable)> {
        self.cache.as_ref().map(|c| (&c.y, &c.yobs))
    }

    /// Evaluate the right-hand side into the scratch buffer.
    pub fn ode_rhs(&mut self, t: f64, y: &[f64], p: &[f64]) -> Result<&[f64], RuntimeError> {
        if y.len() != self.ydot.len() {
            return Err(RuntimeError::StateLength {
                expected: self.ydot.len(),
                found: y.len(),
            });
        }
        if p.len() != self.parameters.len() {
            return Err(RuntimeError::ParameterLength {
                expected: self.parameters.len(),
                found: p.len(),
            });
        }
        self.rhs.evaluate(t, y, p, self.ydot.as_mut_slice());
        Ok(self.ydot.as_slice())
    }

    /// Integrate the model over `tspan`.
    ///
    /// `param_values` overrides the nominal parameter values and must have one
    /// entry per parameter. `tspan` must be non-empty and non-decreasing. On a
    /// validation error nothing is modified.
    ///
    /// The trajectory buffers are kept between calls and only reallocated when
    /// `tspan.len()` changes. With `view` the returned tables borrow them.
    pub fn simulate(
        &mut self,
        tspan: &[f64],
        param_values: Option<&[f64]>,
        view: bool,
    ) -> Result<SimulationOutput<'_>, RuntimeError> {
        if let Some(values) = param_values {
            if values.len() != self.parameters.len() {
                return Err(RuntimeError::ParameterLength {
                    expected: self.parameters.len(),
                    found: values.len(),
                });
            }
        }
        validate_tspan(tspan)?;

        match param_values {
            Some(values) => self.sim_param_values.copy_from_slice(values),
            None => {
                for (dst, p) in self.sim_param_values.iter_mut().zip(self.parameters.iter()) {
                    *dst = p.value;
                }
            }
        }
        self.y0.fill(0.0);
        for ic in self.initial_conditions.iter() {
            self.y0[ic.species_index] = self.sim_param_values[ic.param_index];
        }

        let rows = tspan.len();
        let num_species = self.y0.len();
        let stale = self.cache.as_ref().map_or(true, |c| c.y.nrows() != rows);
        if stale {
            // the old buffers are released only after the new ones exist
            self.cache = Some(TrajectoryCache::new(rows, num_species, &self.observables));
        }
        let cache = self
            .cache
            .get_or_insert_with(|| TrajectoryCache::new(rows, num_species, &self.observables));

        let status = integrate(
            &self.rhs,
            &self.settings,
            &self.sim_param_values,
            &self.y0,
            tspan,
            &mut cache.y,
        )?;
        derive_observables(
            &self.observables,
            &cache.y,
            &mut cache.yobs.values,
            status.valid_rows(rows),
        );

        let cache: &TrajectoryCache = cache;
        let output = if view {
            SimulationOutput {
                species: Cow::Borrowed(&cache.y),
                observables: Cow::Borrowed(&cache.yobs),
                status,
            }
        } else {
            SimulationOutput {
                species: Cow::Owned(cache.y.clone()),
                observables: Cow::Owned(cache.yobs.clone()),
                status,
            }
        };
        Ok(output)
    }
}

fn validate_tspan(tspan: &[f64]) -> Result<(), RuntimeError> {
    let first = tspan.first().ok_or(RuntimeError::EmptyTimeSpan)?;
    if !first.is_finite() {
        return Err(RuntimeError::TimeSpanOrder { index: 0 });
    }
    for (i, pair) in tspan.windows(2).enumerate() {
        // also rejects NaN
        if !(pair[1] >= pair[0]) || !pair[1].is_finite() {
            return Err(RuntimeError::TimeSpanOrder { index: i + 1 });
        }
    }
    Ok(())
}

/// Fill `y` row by row; row 0 is `y0`, row `i` the state at `tspan[i]`.
fn integrate(
    rhs: &Arc<dyn Derivative>,
    settings: &SolverSettings,
    params: &DVector<f64>,
    y0: &DVector<f64>,
    tspan: &[f64],
    y: &mut DMatrix<f64>,
) -> Result<IntegrationStatus, RuntimeError> {
    let num_species = y0.len();
    for (s, value) in y0.iter().enumerate() {
        y[(0, s)] = *value;
    }
    if num_species == 0 || tspan.len() == 1 {
        return Ok(IntegrationStatus::Complete);
    }

    let problem = OdeBuilder::<M>::new()
        .atol(vec![settings.atol; num_species])
        .rtol(settings.rtol)
        .t0(tspan[0])
        .h0(settings.h0)
        .p(params.as_slice().to_vec())
        .build_from_eqn(ReactionProblem::new(
            Arc::clone(rhs),
            params.as_slice(),
            y0.as_slice(),
        ))
        .map_err(|e| RuntimeError::Solver(e.to_string()))?;
    let mut solver = problem
        .bdf::<diffsol::NalgebraLU<f64>>()
        .map_err(|e| RuntimeError::Solver(e.to_string()))?;

    for row in 1..tspan.len() {
        let failed = |reason: String| IntegrationStatus::Failed {
            completed_rows: row,
            time: tspan[row - 1],
            reason,
        };
        match solver.set_stop_time(tspan[row]) {
            Ok(_) => loop {
                match solver.step() {
                    Ok(OdeSolverStopReason::InternalTimestep) => continue,
                    Ok(OdeSolverStopReason::TstopReached) => break,
                    Ok(reason) => {
                        return Ok(failed(format!("unexpected stop reason {:?}", reason)))
                    }
                    Err(err) => return Ok(failed(err.to_string())),
                }
            },
            // repeated timepoint, the state is already there
            Err(DiffsolError::OdeSolverError(OdeSolverError::StopTimeAtCurrentTime)) => {}
            Err(err) => return Ok(failed(err.to_string())),
        }
        let state = solver.state().y;
        for s in 0..num_species {
            y[(row, s)] = state[s];
        }
    }
    Ok(IntegrationStatus::Complete)
}

fn derive_observables(
    observables: &[Observable],
    y: &DMatrix<f64>,
    yobs: &mut DMatrix<f64>,
    rows: usize,
) {
    for (col, obs) in observables.iter().enumerate() {
        for r in 0..rows {
            let mut acc = 0.0;
            for (s, c) in obs.terms() {
                acc += c * y[(r, s)];
            }
            yobs[(r, col)] = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay;

    impl Derivative for Decay {
        fn evaluate(&self, _t: f64, y: &[f64], p: &[f64], ydot: &mut [f64]) {
            ydot[0] = -p[0] * y[0];
            ydot[1] = p[0] * y[0];
        }

        fn backend(&self) -> Backend {
            Backend::Interpreted
        }
    }

    fn simulator() -> Simulator {
        Simulator::new(
            2,
            Box::new([Parameter::new("k", 0.5), Parameter::new("A_0", 2.0)]),
            Box::new([Observable::new("total", vec![0, 1], vec![1.0, 1.0])]),
            Box::new([Initial::new(1, 0)]),
            Arc::new(Decay),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_records() {
        let bad_obs = Simulator::new(
            1,
            Box::new([]),
            Box::new([Observable::new("x", vec![1], vec![1.0])]),
            Box::new([]),
            Arc::new(Decay),
        );
        assert!(matches!(bad_obs, Err(RuntimeError::InvalidRecord(_))));

        let bad_ic = Simulator::new(
            2,
            Box::new([Parameter::new("k", 1.0)]),
            Box::new([]),
            Box::new([Initial::new(1, 0)]),
            Arc::new(Decay),
        );
        assert!(matches!(bad_ic, Err(RuntimeError::InvalidRecord(_))));
    }

    #[test]
    fn test_tspan_validation() {
        let mut sim = simulator();
        assert!(matches!(
            sim.simulate(&[], None, false),
            Err(RuntimeError::EmptyTimeSpan)
        ));
        assert!(matches!(
            sim.simulate(&[0.0, 2.0, 1.0], None, false),
            Err(RuntimeError::TimeSpanOrder { index: 2 })
        ));
        assert!(matches!(
            sim.simulate(&[0.0, f64::NAN], None, false),
            Err(RuntimeError::TimeSpanOrder { index: 1 })
        ));
        assert!(sim.trajectory().is_none());
    }

    #[test]
    fn test_single_timepoint_is_initial_state() {
        let mut sim = simulator();
        let out = sim.simulate(&[3.0], None, false).unwrap();
        assert!(out.is_complete());
        assert_eq!(out.species.shape(), (1, 2));
        assert_eq!(out.species[(0, 0)], 2.0);
        assert_eq!(out.observables.column("total"), Some(vec![2.0]));
    }

    #[test]
    fn test_conservation() {
        let mut sim = simulator();
        let out = sim.simulate(&[0.0, 1.0, 1.0, 4.0], None, false).unwrap();
        assert!(out.is_complete());
        for r in 0..4 {
            approx::assert_relative_eq!(out.observables.values()[(r, 0)], 2.0, epsilon = 1e-6);
        }
        approx::assert_relative_eq!(out.species[(1, 0)], out.species[(2, 0)]);
        approx::assert_relative_eq!(
            out.species[(3, 0)],
            2.0 * (-2.0f64).exp(),
            max_relative = 1e-4
        );
    }

    #[test]
    fn test_ode_rhs_checks_lengths() {
        let mut sim = simulator();
        assert_eq!(sim.ode_rhs(0.0, &[1.0, 0.0], &[0.5, 2.0]).unwrap(), &[-0.5, 0.5]);
        assert!(sim.ode_rhs(0.0, &[1.0], &[0.5, 2.0]).is_err());
        assert!(sim.ode_rhs(0.0, &[1.0, 0.0], &[0.5]).is_err());
    }

    #[test]
    fn test_fork_has_fresh_buffers() {
        let mut sim = simulator();
        sim.simulate(&[0.0, 1.0], None, true).unwrap();
        let fork = sim.fork();
        assert!(fork.trajectory().is_none());
        assert_eq!(fork.parameters(), sim.parameters());
        assert_eq!(fork.backend(), Backend::Interpreted);
    }
}
