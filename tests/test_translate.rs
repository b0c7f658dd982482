//! Translation of species markers and parameter names into array slots.

use std::error::Error;

use crnexport::runtime::expr::{Expr, ParseError};
use crnexport::*;

fn model(num_species: usize, params: &[&str], odes: &[&str]) -> Model {
    Model {
        name: "synthetic".into(),
        species: (0..num_species).map(|i| format!("S{}", i)).collect(),
        parameters: params
            .iter()
            .enumerate()
            .map(|(i, name)| ParameterDef {
                name: name.to_string(),
                value: i as f64 + 1.0,
            })
            .collect(),
        observables: vec![],
        initial_conditions: vec![],
        odes: odes.iter().map(|s| s.to_string()).collect(),
    }
}

/// Collect the state and parameter slots referenced by an expression, in order
fn slots(expr: &Expr) -> (Vec<usize>, Vec<usize>) {
    let mut states = Vec::new();
    let mut params = Vec::new();
    expr.visit(&mut |node: &Expr| match node {
        Expr::State(i) => states.push(*i),
        Expr::Param(j) => params.push(*j),
        _ => {}
    });
    (states, params)
}

#[test]
fn every_marker_maps_to_its_own_slot() {
    let n = 13;
    let odes: Vec<String> = (0..n).map(|i| format!("__s{}", i)).collect();
    let odes: Vec<&str> = odes.iter().map(|s| s.as_str()).collect();
    let m = model(n, &[], &odes);
    let translated = Translator::new(&m).translate_all().unwrap();
    for (i, eq) in translated.equations.iter().enumerate() {
        assert_eq!(eq.code, format!("ydot[{}] = y[{}];", i, i));
        assert_eq!(slots(&eq.expr).0, vec![i]);
    }
}

#[test]
fn mixed_markers_and_prefixed_names() {
    let m = model(
        13,
        &["k1", "k10", "k1a", "k12"],
        &["0"; 13],
    );
    let tr = Translator::new(&m);
    let expr = tr
        .translate_expr("k1*__s1 + k10*__s10 - k1a*__s12 + k12*__s1*__s12 + k1", 0)
        .unwrap();
    let (states, params) = slots(&expr);
    assert_eq!(states, vec![1, 10, 12, 1, 12]);
    assert_eq!(params, vec![0, 1, 2, 3, 0]);
    assert_eq!(
        expr.to_string(),
        "p[0] * y[1] + p[1] * y[10] - p[2] * y[12] + p[3] * y[1] * y[12] + p[0]"
    );
}

#[test]
fn whitespace_and_power_spellings() {
    let m = model(2, &["kf"], &["0", "0"]);
    let tr = Translator::new(&m);
    let a = tr.translate_expr("kf*__s0**2*__s1", 0).unwrap();
    let b = tr.translate_expr("  kf * __s0 ^ 2 * __s1 ", 0).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_string(), "p[0] * pow(y[0], 2.0) * y[1]");
}

#[test]
fn translated_text_is_accepted_by_the_interpreter() {
    let m = model(
        3,
        &["k1", "k2", "t"],
        &["-k1*__s0 + k2*__s1*t", "k1*__s0 - (k2 + 1)/(__s1 + 1)", "min(__s0, __s1)^0.5"],
    );
    let translated = Translator::new(&m).translate_all().unwrap();
    let code = translated.code();
    assert!(runtime::InterpretedRhs::parse(&code, 3, 3).is_ok());
    assert_eq!(code.lines().count(), 3);
}

#[test]
fn errors_are_attributed_to_the_species() {
    let m = model(2, &["k1"], &["k1*__s0", "k1*__s1 + kx"]);
    let err = Translator::new(&m).translate_all().unwrap_err();
    assert_eq!(err.species(), Some(1));
    assert_eq!(err.to_string(), "Unknown symbol 'kx' in ODE for species 1");
}

#[test]
fn model_errors_come_before_translation() {
    let m = model(2, &["k1", "k1"], &["k1*__s0", "0"]);
    assert!(matches!(
        Translator::new(&m).translate_all(),
        Err(ExportError::DuplicateParameter { .. })
    ));
}

#[test]
fn syntax_errors_keep_the_parse_error_as_source() {
    let m = model(2, &["k1"], &["k1*__s0", "k1 * (__s1"]);
    let err = Translator::new(&m).translate_all().unwrap_err();
    assert_eq!(err.species(), Some(1));
    let source = err
        .source()
        .and_then(|e| e.downcast_ref::<ParseError>())
        .unwrap();
    assert_eq!(source.pos, 10);
    assert!(source.found.is_none());
}
