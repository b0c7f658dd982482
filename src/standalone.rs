//! In-process counterpart of an exported program
//!
//! [`StandaloneModel`] runs the same translation as [`crate::CodeGenerator`]
//! and drives the same runtime harness, without writing or compiling a
//! program first.

use std::sync::Arc;

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::ExportError;
use crate::model::Model;
use crate::runtime::{
    native, Backend, Derivative, InterpretedRhs, NativeRhs, ObservableTable, RuntimeError,
    SimulationOutput, Simulator, SolverSettings,
};
use crate::translate::{TranslatedModel, Translator};

/// How the right-hand side is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Native when [`native::use_fast_path`] says so, interpreted otherwise
    #[default]
    Auto,
    Native,
    Interpreted,
}

/// One trajectory of an ensemble run
#[derive(Debug, Clone)]
pub struct EnsembleMember {
    pub species: DMatrix<f64>,
    pub observables: ObservableTable,
    pub complete: bool,
}

pub struct StandaloneModel {
    translated: TranslatedModel,
    equations: String,
    simulator: Simulator,
}

impl StandaloneModel {
    pub fn build(model: &Model, backend: BackendChoice) -> Result<Self, ExportError> {
        let translated = Translator::new(model).translate_all()?;
        let equations = translated.code();
        let (ns, np) = (translated.num_species(), translated.num_parameters());

        let native = match backend {
            BackendChoice::Auto => native::use_fast_path()?,
            BackendChoice::Native => true,
            BackendChoice::Interpreted => false,
        };
        let rhs: Arc<dyn Derivative> = if native {
            Arc::new(NativeRhs::build(&equations, ns, np)?)
        } else {
            Arc::new(InterpretedRhs::parse(&equations, ns, np)?)
        };
        log::debug!("model '{}' uses the {:?} backend", translated.name, rhs.backend());

        let simulator = Simulator::new(
            ns,
            translated.parameters.clone().into_boxed_slice(),
            translated.observables.clone().into_boxed_slice(),
            translated.initial_conditions.clone().into_boxed_slice(),
            rhs,
        )?;
        Ok(Self {
            translated,
            equations,
            simulator,
        })
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.simulator = self.simulator.with_settings(settings);
        self
    }

    pub fn simulate(
        &mut self,
        tspan: &[f64],
        param_values: Option<&[f64]>,
        view: bool,
    ) -> Result<SimulationOutput<'_>, RuntimeError> {
        self.simulator.simulate(tspan, param_values, view)
    }

    pub fn ode_rhs(&mut self, t: f64, y: &[f64], p: &[f64]) -> Result<&[f64], RuntimeError> {
        self.simulator.ode_rhs(t, y, p)
    }

    /// Run one simulation per parameter set, in parallel
    ///
    /// Each worker uses its own fork of the simulator. Results are in the
    /// order of `param_sets`.
    pub fn simulate_ensemble(
        &self,
        tspan: &[f64],
        param_sets: &[Vec<f64>],
    ) -> Result<Vec<EnsembleMember>, RuntimeError> {
        log::debug!(
            "simulating {} parameter sets of '{}'",
            param_sets.len(),
            self.translated.name
        );
        param_sets
            .par_iter()
            .map_init(
                || self.simulator.fork(),
                |sim, params| -> Result<EnsembleMember, RuntimeError> {
                    let out = sim.simulate(tspan, Some(params.as_slice()), true)?;
                    Ok(EnsembleMember {
                        complete: out.is_complete(),
                        species: out.species.into_owned(),
                        observables: out.observables.into_owned(),
                    })
                },
            )
            .collect()
    }

    pub fn backend(&self) -> Backend {
        self.simulator.backend()
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn translated(&self) -> &TranslatedModel {
        &self.translated
    }

    /// The equation text shared with exported programs
    pub fn equations(&self) -> &str {
        &self.equations
    }
}
