//! Rewriting of model ODEs into positional array accesses
//!
//! Every ODE expression is parsed into an [`Expr`] tree and rewritten in two
//! passes. The species pass turns each marker `__s<N>` into the state slot
//! `y[N]`; the parameter pass then turns each parameter name into `p[j]` and
//! the free variable `t` into the integration time. Both passes match whole
//! tokens of the tree, so `__s1` never touches `__s12` and `k1` never touches
//! `k10` or `k1a`.
//!
//! A parameter called `t` takes precedence over the time variable.

use std::collections::HashMap;

use crate::error::ExportError;
use crate::model::Model;
use crate::runtime::expr::{parse_expr, Expr, Function};
use crate::runtime::{Initial, Observable, Parameter};

/// The rewritten right-hand side of one species
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedEquation {
    pub species: usize,
    pub expr: Expr,
    /// `ydot[species] = <expr>;`
    pub code: String,
}

impl TranslatedEquation {
    fn new(species: usize, expr: Expr) -> Self {
        let code = format!("ydot[{}] = {};", species, expr);
        Self {
            species,
            expr,
            code,
        }
    }
}

/// Everything the generator needs to know about a model
#[derive(Debug, Clone)]
pub struct TranslatedModel {
    pub name: String,
    pub species: Vec<String>,
    pub equations: Vec<TranslatedEquation>,
    pub parameters: Vec<Parameter>,
    pub observables: Vec<Observable>,
    pub initial_conditions: Vec<Initial>,
}

impl TranslatedModel {
    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// The equation text shared by both derivative paths
    pub fn code(&self) -> String {
        equations_code(&self.equations)
    }
}

/// One `ydot[i] = ...;` line per equation
pub fn equations_code(equations: &[TranslatedEquation]) -> String {
    let mut code = String::new();
    for eq in equations {
        code.push_str(&eq.code);
        code.push('\n');
    }
    code
}

pub struct Translator<'a> {
    model: &'a Model,
    parameters: HashMap<&'a str, usize>,
}

impl<'a> Translator<'a> {
    pub fn new(model: &'a Model) -> Self {
        let parameters = model
            .parameters
            .iter()
            .enumerate()
            .map(|(j, p)| (p.name.as_str(), j))
            .collect();
        Self { model, parameters }
    }

    /// Translate one expression, attributing errors to `species`
    pub fn translate_expr(&self, src: &str, species: usize) -> Result<Expr, ExportError> {
        let expr =
            parse_expr(src).map_err(|source| ExportError::InvalidExpression { species, source })?;
        let expr = self.substitute_species(expr, species)?;
        self.substitute_parameters(expr, species)
    }

    /// Translate the ODE of one species
    pub fn translate_equation(&self, species: usize) -> Result<TranslatedEquation, ExportError> {
        let src = self.model.odes.get(species).ok_or_else(|| {
            ExportError::species_index("equation", species, self.model.odes.len())
        })?;
        let expr = self.translate_expr(src, species)?;
        let eq = TranslatedEquation::new(species, expr);
        log::trace!("{} => {}", src, eq.code);
        Ok(eq)
    }

    /// Validate the model, translate every ODE and collect the records
    pub fn translate_all(&self) -> Result<TranslatedModel, ExportError> {
        self.model.validate()?;
        let equations = (0..self.model.odes.len())
            .map(|i| self.translate_equation(i))
            .collect::<Result<Vec<_>, _>>()?;

        let parameters = self
            .model
            .parameters
            .iter()
            .map(|p| Parameter::new(p.name.clone(), p.value))
            .collect();
        let observables = self
            .model
            .observables
            .iter()
            .map(|o| Observable::new(o.name.clone(), o.species.clone(), o.coefficients.clone()))
            .collect();
        let initial_conditions = self
            .model
            .initial_conditions
            .iter()
            .map(|ic| Initial::new(ic.parameter, ic.species))
            .collect();

        log::debug!(
            "translated {} equations of model '{}'",
            equations.len(),
            self.model.name
        );
        Ok(TranslatedModel {
            name: self.model.name.clone(),
            species: self.model.species.clone(),
            equations,
            parameters,
            observables,
            initial_conditions,
        })
    }

    fn substitute_species(&self, expr: Expr, species: usize) -> Result<Expr, ExportError> {
        let num_species = self.model.num_species();
        expr.rewrite::<ExportError, _>(&mut |node| match node {
            Expr::Species(index) if index < num_species => Ok(Expr::State(index)),
            Expr::Species(index) => Err(ExportError::SpeciesOutOfRange {
                index,
                species,
                num_species,
            }),
            // raw slots would bypass the model's names
            Expr::Index { array, index } => Err(ExportError::unknown_symbol(
                format!("{}[{}]", array, index),
                species,
            )),
            Expr::Number(v) if !v.is_finite() => Err(ExportError::NonFiniteNumber { species }),
            Expr::Call { name, args } => {
                let func = Function::from_name(&name).ok_or_else(|| {
                    ExportError::UnknownFunction {
                        name: name.clone(),
                        species,
                    }
                })?;
                if func.arity() != args.len() {
                    return Err(ExportError::WrongArity {
                        name,
                        expected: func.arity(),
                        found: args.len(),
                        species,
                    });
                }
                Ok(Expr::Call { name, args })
            }
            other => Ok(other),
        })
    }

    fn substitute_parameters(&self, expr: Expr, species: usize) -> Result<Expr, ExportError> {
        expr.rewrite::<ExportError, _>(&mut |node| match node {
            Expr::Ident(name) => match self.parameters.get(name.as_str()) {
                Some(&j) => Ok(Expr::Param(j)),
                None if name == "t" => Ok(Expr::Time),
                None => Err(ExportError::unknown_symbol(name, species)),
            },
            other => Ok(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterDef;

    fn model(num_species: usize, params: &[&str]) -> Model {
        Model {
            name: "test".into(),
            species: (0..num_species).map(|i| format!("S{}", i)).collect(),
            parameters: params
                .iter()
                .map(|name| ParameterDef {
                    name: name.to_string(),
                    value: 1.0,
                })
                .collect(),
            observables: vec![],
            initial_conditions: vec![],
            odes: vec!["0".into(); num_species],
        }
    }

    fn translate(m: &Model, src: &str) -> Result<String, ExportError> {
        Translator::new(m).translate_expr(src, 0).map(|e| e.to_string())
    }

    #[test]
    fn test_multi_digit_species_markers() {
        let m = model(13, &[]);
        assert_eq!(translate(&m, "__s1 + __s12").unwrap(), "y[1] + y[12]");
        assert_eq!(translate(&m, "__s12*__s1 - __s10").unwrap(), "y[12] * y[1] - y[10]");
        assert_eq!(translate(&m, "__s0").unwrap(), "y[0]");
    }

    #[test]
    fn test_parameter_prefixes() {
        let m = model(1, &["k1", "k10", "k1a"]);
        assert_eq!(
            translate(&m, "k1*__s0 + k10 - k1a/k1").unwrap(),
            "p[0] * y[0] + p[1] - p[2] / p[0]"
        );
    }

    #[test]
    fn test_parameter_resembling_marker() {
        let m = model(2, &["__s01", "s1"]);
        assert_eq!(translate(&m, "__s01*__s1 + s1").unwrap(), "p[0] * y[1] + p[1]");
    }

    #[test]
    fn test_time_and_functions() {
        let m = model(1, &["k"]);
        assert_eq!(
            translate(&m, "exp(-k*t)*__s0**2").unwrap(),
            "exp(-p[0] * t) * pow(y[0], 2.0)"
        );
        let shadow = model(1, &["t"]);
        assert_eq!(translate(&shadow, "t*__s0").unwrap(), "p[0] * y[0]");
    }

    #[test]
    fn test_no_references_is_unchanged() {
        let m = model(1, &["k"]);
        let src = "2*(3 + 4.5) - sqrt(2)";
        let tree = parse_expr(src).unwrap();
        assert_eq!(Translator::new(&m).translate_expr(src, 0).unwrap(), tree);
    }

    #[test]
    fn test_errors_name_species_and_symbol() {
        let m = model(2, &["k1"]);
        let tr = Translator::new(&m);
        assert!(matches!(
            tr.translate_expr("k2*__s0", 1),
            Err(ExportError::UnknownSymbol { name, species: 1 }) if name == "k2"
        ));
        assert!(matches!(
            tr.translate_expr("__s2", 0),
            Err(ExportError::SpeciesOutOfRange { index: 2, .. })
        ));
        assert!(matches!(
            tr.translate_expr("y[0]", 0),
            Err(ExportError::UnknownSymbol { .. })
        ));
        assert!(matches!(
            tr.translate_expr("gamma(__s0)", 0),
            Err(ExportError::UnknownFunction { .. })
        ));
        assert!(matches!(
            tr.translate_expr("pow(__s0)", 0),
            Err(ExportError::WrongArity { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            tr.translate_expr("1e999*__s0", 0),
            Err(ExportError::NonFiniteNumber { .. })
        ));
        assert!(matches!(
            tr.translate_expr("k1 *", 0),
            Err(ExportError::InvalidExpression { species: 0, .. })
        ));
    }

    #[test]
    fn test_translate_all() {
        let mut m = model(2, &["k1", "A_0"]);
        m.odes = vec!["-k1*__s0".into(), "k1*__s0".into()];
        m.initial_conditions = vec![crate::model::InitialCondition {
            species: 0,
            parameter: 1,
        }];
        let translated = Translator::new(&m).translate_all().unwrap();
        assert_eq!(
            translated.code(),
            "ydot[0] = -p[0] * y[0];\nydot[1] = p[0] * y[0];\n"
        );
        assert_eq!(translated.initial_conditions, vec![Initial::new(1, 0)]);
        assert_eq!(translated.parameters[1], Parameter::new("A_0", 1.0));
    }
}
