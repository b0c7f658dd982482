//! Structural checks on a [`Model`]

use std::collections::HashSet;

use crate::error::ExportError;
use crate::model::Model;
use crate::runtime::expr::{is_identifier, species_marker};

/// Validator for reaction-network models
///
/// Cross-references inside the ODE expressions are resolved, and checked,
/// by the translator.
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, model: &Model) -> Result<(), ExportError> {
        self.validate_name(model)?;
        self.validate_equation_count(model)?;
        self.validate_parameters(model)?;
        self.validate_observables(model)?;
        self.validate_initial_conditions(model)?;
        Ok(())
    }

    fn validate_name(&self, model: &Model) -> Result<(), ExportError> {
        // the name ends up in a line comment
        if model.name.trim().is_empty() || model.name.contains(['\n', '\r']) {
            return Err(ExportError::InvalidModelName(model.name.clone()));
        }
        Ok(())
    }

    fn validate_equation_count(&self, model: &Model) -> Result<(), ExportError> {
        if model.odes.len() != model.species.len() {
            return Err(ExportError::EquationCount {
                species: model.species.len(),
                odes: model.odes.len(),
            });
        }
        Ok(())
    }

    fn validate_parameters(&self, model: &Model) -> Result<(), ExportError> {
        let mut seen = HashSet::new();
        for param in &model.parameters {
            if !is_identifier(&param.name) {
                return Err(ExportError::invalid_parameter_name(
                    &param.name,
                    "not an identifier",
                ));
            }
            if species_marker(&param.name).is_some() {
                return Err(ExportError::invalid_parameter_name(
                    &param.name,
                    "reserved for species markers",
                ));
            }
            if !param.value.is_finite() {
                return Err(ExportError::NonFiniteParameter {
                    name: param.name.clone(),
                    value: param.value,
                });
            }
            if !seen.insert(param.name.as_str()) {
                return Err(ExportError::DuplicateParameter {
                    name: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_observables(&self, model: &Model) -> Result<(), ExportError> {
        let num_species = model.num_species();
        for obs in &model.observables {
            if obs.species.len() != obs.coefficients.len() {
                return Err(ExportError::ObservableShape {
                    name: obs.name.clone(),
                    species: obs.species.len(),
                    coefficients: obs.coefficients.len(),
                });
            }
            if obs.coefficients.iter().any(|c| !c.is_finite()) {
                return Err(ExportError::NonFiniteCoefficient {
                    name: obs.name.clone(),
                });
            }
            if let Some(&index) = obs.species.iter().find(|&&s| s >= num_species) {
                return Err(ExportError::species_index(
                    format!("observable '{}'", obs.name),
                    index,
                    num_species,
                ));
            }
        }
        Ok(())
    }

    fn validate_initial_conditions(&self, model: &Model) -> Result<(), ExportError> {
        for (i, ic) in model.initial_conditions.iter().enumerate() {
            if ic.species >= model.num_species() {
                return Err(ExportError::species_index(
                    format!("initial condition {}", i),
                    ic.species,
                    model.num_species(),
                ));
            }
            if ic.parameter >= model.num_parameters() {
                return Err(ExportError::parameter_index(
                    format!("initial condition {}", i),
                    ic.parameter,
                    model.num_parameters(),
                ));
            }
        }
        Ok(())
    }
}
