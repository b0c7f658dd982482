//! Emission units of an exported program
//!
//! Each function renders one self-contained section of the program text.
//! [`super::CodeGenerator`] concatenates them in declaration order.

use crate::runtime::{Initial, Observable, Parameter, DEPENDENCIES, SOURCES};
use crate::translate::TranslatedModel;

/// `//!` docstring lines followed by the provenance comment
pub fn header(docstring: &str, model_name: &str) -> String {
    let mut out = String::new();
    for line in docstring.trim_end().lines() {
        // a lone CR is rejected inside doc comments
        let line = line.replace('\r', " ");
        let line = line.trim_end();
        if line.is_empty() {
            out.push_str("//!\n");
        } else {
            out.push_str("//! ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push('\n');
    out.push_str(&format!("// exported from model '{}'\n", model_name));
    out
}

/// Docstring used when the caller supplies none
pub fn default_docstring(model: &TranslatedModel) -> String {
    format!(
        "Simulator for the reaction network '{}'.\n\n\
         {} species, {} parameters, {} observables.\n\n\
         `Model::new()` builds the simulator and `Model::simulate(tspan, param_values, view)`\n\
         integrates it over `tspan`.",
        model.name,
        model.num_species(),
        model.num_parameters(),
        model.observables.len()
    )
}

/// Crate attributes, the dependency note and the imports of the embedded runtime
pub fn preamble() -> String {
    let mut out = String::new();
    out.push_str("//\n// Build as a binary crate with these dependencies:\n//\n//     [dependencies]\n");
    for dep in DEPENDENCIES {
        out.push_str("//     ");
        out.push_str(dep);
        out.push('\n');
    }
    out.push_str(
        r#"//
// The native fast path additionally needs `rustc` at run time; set
// CRNEXPORT_DISABLE_NATIVE to always use the interpreted path.

#![allow(dead_code, unused_imports, clippy::all)]

use std::sync::Arc;

use runtime::derivative::Derivative;
use runtime::error::RuntimeError;
use runtime::harness::{SimulationOutput, Simulator, SolverSettings};
use runtime::interp::InterpretedRhs;
use runtime::native::NativeRhs;
use runtime::records::{Initial, Observable, Parameter};
"#,
    );
    out
}

/// The load-time capability probe
pub fn capability_probe() -> String {
    r#"
/// Whether the native fast path works in this process.
///
/// The first call compiles and loads a tiny library; the answer is cached.
/// Only a failure to compile yields `Ok(false)`, anything else is an error.
pub fn use_fast_path() -> Result<bool, RuntimeError> {
    runtime::native::use_fast_path()
}
"#
    .to_string()
}

fn parameter_literal(p: &Parameter) -> String {
    format!("Parameter::new({:?}, {:?})", p.name, p.value)
}

fn observable_literal(o: &Observable) -> String {
    format!(
        "Observable::new({:?}, vec!{:?}, vec!{:?})",
        o.name, o.species, o.coefficients
    )
}

fn initial_literal(ic: &Initial) -> String {
    format!("Initial::new({}, {})", ic.param_index, ic.species_index)
}

fn boxed_slice(ty: &str, binding: &str, items: &[String]) -> String {
    if items.is_empty() {
        return format!(
            "        let {}: Box<[{}]> = Vec::new().into_boxed_slice();\n",
            binding, ty
        );
    }
    let mut out = format!("        let {}: Box<[{}]> = Box::new([\n", binding, ty);
    for item in items {
        out.push_str("            ");
        out.push_str(item);
        out.push_str(",\n");
    }
    out.push_str("        ]);\n");
    out
}

/// Model constants, the species listing and the `Model` container
pub fn container(model: &TranslatedModel) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\npub const NUM_SPECIES: usize = {};\npub const NUM_PARAMETERS: usize = {};\n\
         pub const NUM_OBSERVABLES: usize = {};\npub const NUM_INITIAL_CONDITIONS: usize = {};\n",
        model.num_species(),
        model.num_parameters(),
        model.observables.len(),
        model.initial_conditions.len()
    ));

    out.push_str("\n// Species:\n");
    for (i, name) in model.species.iter().enumerate() {
        out.push_str(&format!("//   {:>3}: {}\n", i, name.replace(['\n', '\r'], " ")));
    }

    out.push_str(
        r#"
pub struct Model {
    simulator: Simulator,
}

impl Model {
    pub fn new() -> Result<Self, RuntimeError> {
"#,
    );
    let parameters: Vec<_> = model.parameters.iter().map(parameter_literal).collect();
    let observables: Vec<_> = model.observables.iter().map(observable_literal).collect();
    let initials: Vec<_> = model.initial_conditions.iter().map(initial_literal).collect();
    out.push_str(&boxed_slice("Parameter", "parameters", &parameters));
    out.push_str(&boxed_slice("Observable", "observables", &observables));
    out.push_str(&boxed_slice("Initial", "initial_conditions", &initials));
    out.push_str(
        r#"        let rhs: Arc<dyn Derivative> = if use_fast_path()? {
            Arc::new(ode_rhs_native()?)
        } else {
            Arc::new(ode_rhs_interpreted()?)
        };
        let simulator = Simulator::new(
            NUM_SPECIES,
            parameters,
            observables,
            initial_conditions,
            rhs,
        )?;
        Ok(Self { simulator })
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.simulator = self.simulator.with_settings(settings);
        self
    }

    /// Integrate over `tspan`, see [`Simulator::simulate`].
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

    pub fn parameters(&self) -> &[Parameter] {
        self.simulator.parameters()
    }

    pub fn observables(&self) -> &[Observable] {
        self.simulator.observables()
    }

    pub fn initial_conditions(&self) -> &[Initial] {
        self.simulator.initial_conditions()
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }
}
"#,
    );
    out
}

/// The two derivative routines, each embedding `equations` verbatim
pub fn derivative_routines(equations: &str) -> String {
    format!(
        r##"
fn ode_rhs_native() -> Result<NativeRhs, RuntimeError> {{
    NativeRhs::build(
        r#"
{equations}"#,
        NUM_SPECIES,
        NUM_PARAMETERS,
    )
}}

fn ode_rhs_interpreted() -> Result<InterpretedRhs, RuntimeError> {{
    InterpretedRhs::parse(
        r#"
{equations}"#,
        NUM_SPECIES,
        NUM_PARAMETERS,
    )
}}
"##,
        equations = equations
    )
}

/// Drop the `#[cfg(test)]` module at the end of a runtime source file
pub fn strip_tests(source: &str) -> &str {
    let end = source.find("\n#[cfg(test)]").unwrap_or(source.len());
    source[..end].trim_end()
}

/// The runtime modules, reproduced from this crate
pub fn harness() -> String {
    let mut out = format!(
        "\n// Runtime of crnexport {}, reproduced verbatim.\nmod runtime {{\n",
        env!("CARGO_PKG_VERSION")
    );
    for (name, source) in SOURCES {
        out.push_str(&format!("pub mod {} {{\n", name));
        out.push_str(strip_tests(source));
        out.push_str(&format!("\n}} // mod {}\n\n", name));
    }
    out.push_str("} // mod runtime\n");
    out
}

/// A `main` printing the observables over `0..=100` as CSV
pub fn entry_point() -> String {
    r#"
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut model = Model::new()?;
    let tspan: Vec<f64> = (0..=100).map(f64::from).collect();
    let output = model.simulate(&tspan, None, true)?;
    if !output.is_complete() {
        eprintln!("integration stopped early: {:?}", output.status);
    }
    let rows = output.status.valid_rows(tspan.len());
    let observables = output.observables.names();
    if observables.is_empty() {
        let header: Vec<String> = (0..NUM_SPECIES).map(|i| format!("__s{}", i)).collect();
        println!("time,{}", header.join(","));
        for r in 0..rows {
            let row: Vec<String> = output.species.row(r).iter().map(|v| v.to_string()).collect();
            println!("{},{}", tspan[r], row.join(","));
        }
    } else {
        println!("time,{}", observables.join(","));
        let values = output.observables.values();
        for r in 0..rows {
            let row: Vec<String> = values.row(r).iter().map(|v| v.to_string()).collect();
            println!("{},{}", tspan[r], row.join(","));
        }
    }
    Ok(())
}
"#
    .to_string()
}
