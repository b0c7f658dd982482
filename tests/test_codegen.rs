//! Structure of exported programs.

use std::path::PathBuf;

use crnexport::codegen::strip_tests;
use crnexport::runtime::SOURCES;
use crnexport::*;

fn robertson() -> (Model, Option<String>) {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/robertson.json");
    load_model_file(path).unwrap()
}

#[test]
fn export_is_byte_identical_across_runs() {
    let (model, doc) = robertson();
    let doc = doc.unwrap();
    let first = CodeGenerator::new(&model).with_docstring(doc.clone()).generate().unwrap();
    let reloaded = robertson().0;
    let second = CodeGenerator::new(&reloaded).with_docstring(doc).generate().unwrap();
    assert_eq!(first, second);
}

#[test]
fn header_uses_the_file_docstring() {
    let (model, doc) = robertson();
    let program = CodeGenerator::new(&model)
        .with_docstring(doc.unwrap())
        .generate()
        .unwrap();
    let mut lines = program.code.lines();
    assert_eq!(lines.next(), Some("//! Robertson's stiff chemical kinetics problem."));
    assert_eq!(lines.next(), Some("//!"));
    assert_eq!(lines.next(), Some("//!     A -> B          k1"));
    assert!(program.code.contains("\n// exported from model 'robertson'\n"));
}

#[test]
fn equations_are_embedded_verbatim_in_both_routines() {
    let (model, _) = robertson();
    let program = CodeGenerator::new(&model).generate().unwrap();
    assert_eq!(
        program.equations,
        "ydot[0] = -p[0] * y[0] + p[2] * y[1] * y[2];\n\
         ydot[1] = p[0] * y[0] - p[1] * pow(y[1], 2.0) - p[2] * y[1] * y[2];\n\
         ydot[2] = p[1] * pow(y[1], 2.0);\n"
    );
    let literal = format!("r#\"\n{}\"#", program.equations);
    let positions: Vec<_> = program.code.match_indices(&literal).map(|(i, _)| i).collect();
    assert_eq!(positions.len(), 2);
    let native = program.code.find("fn ode_rhs_native()").unwrap();
    let interpreted = program.code.find("fn ode_rhs_interpreted()").unwrap();
    assert!(native < positions[0] && positions[0] < interpreted && interpreted < positions[1]);
}

#[test]
fn records_are_baked_in_as_literals() {
    let (model, _) = robertson();
    let code = CodeGenerator::new(&model).generate().unwrap().code;
    assert!(code.contains("pub const NUM_SPECIES: usize = 3;"));
    assert!(code.contains("pub const NUM_PARAMETERS: usize = 6;"));
    assert!(code.contains("            Parameter::new(\"k1\", 0.04),\n"));
    assert!(code.contains("            Parameter::new(\"k2\", 30000000.0),\n"));
    assert!(code.contains("            Observable::new(\"B_total\", vec![1], vec![1.0]),\n"));
    assert!(code.contains("            Initial::new(3, 0),\n"));
    assert!(code.contains("//     0: A()\n"));
    assert_eq!(code.matches("Parameter::new(").count(), 6);
    assert_eq!(code.matches("Initial::new(").count(), 3);
}

#[test]
fn runtime_is_reproduced_without_tests() {
    let (model, _) = robertson();
    let code = CodeGenerator::new(&model).generate().unwrap().code;
    for (name, source) in SOURCES {
        assert!(code.contains(&format!("pub mod {} {{\n", name)), "{}", name);
        assert!(code.contains(strip_tests(source)), "{}", name);
    }
    assert!(!code.contains("#[cfg(test)]"));
    assert!(code.contains("pub fn use_fast_path() -> Result<bool, RuntimeError> {"));
    assert!(code.contains("\nfn main() -> Result<(), Box<dyn std::error::Error>> {"));
}

#[test]
fn program_without_records() {
    let model = Model {
        name: "bare".into(),
        species: vec!["X".into()],
        parameters: vec![],
        observables: vec![],
        initial_conditions: vec![],
        odes: vec!["-__s0".into()],
    };
    let program = CodeGenerator::new(&model).generate().unwrap();
    assert_eq!(program.num_parameters, 0);
    assert!(program
        .code
        .contains("let parameters: Box<[Parameter]> = Vec::new().into_boxed_slice();"));
    assert!(program
        .code
        .contains("let observables: Box<[Observable]> = Vec::new().into_boxed_slice();"));
}

#[test]
fn robertson_runs_in_process() {
    let (model, _) = robertson();
    let mut sim = StandaloneModel::build(&model, BackendChoice::Interpreted).unwrap();
    let tspan = [0.0, 0.4, 4.0, 40.0];
    let out = sim.simulate(&tspan, None, false).unwrap();
    assert!(out.is_complete());
    for r in 0..tspan.len() {
        let total: f64 = out.species.row(r).iter().sum();
        approx::assert_relative_eq!(total, 1.0, epsilon = 1e-5);
    }
    // reference values at t = 40
    approx::assert_relative_eq!(out.species[(3, 0)], 0.7158, max_relative = 1e-3);
}
