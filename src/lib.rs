//! Export reaction-network ODE models as standalone simulators.
//!
//! A [`Model`] lists species, parameters, observables, initial conditions and
//! one ODE right-hand side per species. [`CodeGenerator`] turns it into the
//! text of a self-contained Rust program whose `Model::simulate(tspan,
//! param_values, view)` integrates the system with a stiff BDF solver and
//! returns species and observable trajectories.
//!
//! ```ignore
//! use crnexport::prelude::*;
//!
//! let (model, doc) = load_model_file("robertson.json")?;
//! let mut generator = CodeGenerator::new(&model);
//! if let Some(doc) = doc {
//!     generator = generator.with_docstring(doc);
//! }
//! let program = generator.generate()?;
//! println!("{}", program.code);
//! ```
//!
//! [`StandaloneModel`] runs the same simulator in-process.

pub mod codegen;
pub mod error;
pub mod model;
pub mod runtime;
pub mod standalone;
pub mod translate;

pub use codegen::{CodeGenerator, GeneratedProgram};
pub use error::ExportError;
pub use model::{
    load_model_file, InitialCondition, Model, ModelFile, ObservableDef, ParameterDef, Validator,
};
pub use standalone::{BackendChoice, EnsembleMember, StandaloneModel};
pub use translate::{equations_code, TranslatedEquation, TranslatedModel, Translator};

pub mod prelude {
    pub use crate::codegen::{CodeGenerator, GeneratedProgram};
    pub use crate::error::ExportError;
    pub use crate::model::{load_model_file, Model, ModelFile};
    pub use crate::runtime::{
        Backend, IntegrationStatus, ObservableTable, RuntimeError, SimulationOutput, Simulator,
        SolverSettings,
    };
    pub use crate::standalone::{BackendChoice, StandaloneModel};
    pub use crate::translate::Translator;
}
