//! Simulator runtime.
//!
//! These modules are used in-process by [`crate::standalone`] and are also
//! copied verbatim into every exported program (see [`SOURCES`]). They must
//! therefore only depend on `std`, `nalgebra`, `diffsol` and `libloading`,
//! and refer to each other through `super::`.

pub mod derivative;
pub mod error;
pub mod expr;
pub mod harness;
pub mod interp;
pub mod native;
pub mod problem;
pub mod records;

pub use derivative::{Backend, Derivative};
pub use error::RuntimeError;
pub use harness::{IntegrationStatus, ObservableTable, SimulationOutput, Simulator, SolverSettings};
pub use interp::InterpretedRhs;
pub use native::NativeRhs;
pub use records::{Initial, Observable, Parameter};

/// Module name and source text of each runtime module, in emission order.
pub const SOURCES: &[(&str, &str)] = &[
    ("error", include_str!("error.rs")),
    ("expr", include_str!("expr.rs")),
    ("records", include_str!("records.rs")),
    ("derivative", include_str!("derivative.rs")),
    ("interp", include_str!("interp.rs")),
    ("native", include_str!("native.rs")),
    ("problem", include_str!("problem.rs")),
    ("harness", include_str!("harness.rs")),
];

/// Dependencies an exported program needs, as `Cargo.toml` lines.
pub const DEPENDENCIES: &[&str] = &[
    "diffsol = \"0.5.3\"",
    "libloading = \"0.8.6\"",
    "nalgebra = \"0.33.0\"",
];
