//! Reaction-network models and the JSON files they are read from
//!
//! A model file is a JSON document with a required `model` object and an
//! optional `doc` string:
//!
//! ```json
//! {
//!     "doc": "Robertson's stiff chemical kinetics problem",
//!     "model": {
//!         "name": "robertson",
//!         "species": ["A", "B", "C"],
//!         "parameters": [{ "name": "k1", "value": 0.04 }],
//!         "observables": [{ "name": "A_total", "species": [0], "coefficients": [1.0] }],
//!         "initial_conditions": [{ "species": 0, "parameter": 0 }],
//!         "odes": ["-k1*__s0", "k1*__s0", "0"]
//!     }
//! }
//! ```
//!
//! ODE expressions refer to species through the positional marker `__s<N>`,
//! to parameters by name and to the integration time as `t`.

mod validation;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExportError;

pub use validation::Validator;

/// A named parameter with its nominal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub value: f64,
}

/// A linear combination of species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableDef {
    pub name: String,
    /// Species indices
    pub species: Vec<usize>,
    /// One coefficient per entry of `species`
    pub coefficients: Vec<f64>,
}

/// Species `species` starts at the value of parameter `parameter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCondition {
    pub species: usize,
    pub parameter: usize,
}

/// A fully resolved reaction-network ODE model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    pub name: String,

    /// Species names, in index order (documentation only)
    pub species: Vec<String>,

    #[serde(default)]
    pub parameters: Vec<ParameterDef>,

    #[serde(default)]
    pub observables: Vec<ObservableDef>,

    #[serde(default)]
    pub initial_conditions: Vec<InitialCondition>,

    /// One right-hand side expression per species
    pub odes: Vec<String>,
}

impl Model {
    /// Parse a bare model from a JSON string
    pub fn from_str(json: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Index of the parameter called `name`
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Check the structural invariants, see [`Validator`]
    pub fn validate(&self) -> Result<(), ExportError> {
        Validator::new().validate(self)
    }
}

/// The contents of a model file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelFile {
    /// Description used as the header of the exported program
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Model>,
}

impl ModelFile {
    pub fn from_str(json: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Read a model file, checking that it exists, has a `.json` extension and
/// defines a `model`
pub fn load_model_file(path: impl AsRef<Path>) -> Result<(Model, Option<String>), ExportError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ExportError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(ExportError::WrongExtension {
            path: path.to_path_buf(),
        });
    }

    let text = fs::read_to_string(path)?;
    let file = ModelFile::from_str(&text)?;
    let model = file.model.ok_or_else(|| ExportError::MissingModel {
        path: path.to_path_buf(),
    })?;
    log::debug!(
        "loaded model '{}' from {} ({} species, {} parameters)",
        model.name,
        path.display(),
        model.num_species(),
        model.num_parameters()
    );
    Ok((model, file.doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECAY: &str = r#"{
        "name": "decay",
        "species": ["A", "B", "C"],
        "parameters": [
            { "name": "k1", "value": 0.3 },
            { "name": "k2", "value": 0.1 },
            { "name": "A_0", "value": 1.0 }
        ],
        "observables": [{ "name": "A_total", "species": [0], "coefficients": [1.0] }],
        "initial_conditions": [{ "species": 0, "parameter": 2 }],
        "odes": ["-k1*__s0 + k2*__s1", "k1*__s0 - k2*__s1 - k2*__s1", "k2*__s1"]
    }"#;

    #[test]
    fn test_parse_model() {
        let model = Model::from_str(DECAY).unwrap();
        assert_eq!(model.num_species(), 3);
        assert_eq!(model.parameter_index("A_0"), Some(2));
        assert_eq!(model.initial_conditions[0].parameter, 2);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_optional_sections_default_to_empty() {
        let model = Model::from_str(r#"{"name": "m", "species": ["A"], "odes": ["0"]}"#).unwrap();
        assert!(model.parameters.is_empty());
        assert!(model.observables.is_empty());
        assert!(model.initial_conditions.is_empty());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Model::from_str(r#"{"name": "m", "species": [], "odes": [], "rules": []}"#);
        assert!(matches!(result, Err(ExportError::Json(_))));
    }

    #[test]
    fn test_model_file_without_model() {
        let file = ModelFile::from_str(r#"{"doc": "nothing here"}"#).unwrap();
        assert_eq!(file.doc.as_deref(), Some("nothing here"));
        assert!(file.model.is_none());
    }

    #[test]
    fn test_load_model_file_checks() {
        let dir = std::env::temp_dir().join(format!("crnexport-load-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let missing = dir.join("missing.json");
        assert!(matches!(
            load_model_file(&missing),
            Err(ExportError::FileNotFound { .. })
        ));

        let wrong = dir.join("model.txt");
        fs::write(&wrong, "{}").unwrap();
        assert!(matches!(
            load_model_file(&wrong),
            Err(ExportError::WrongExtension { .. })
        ));

        let empty = dir.join("empty.json");
        fs::write(&empty, r#"{"doc": "x"}"#).unwrap();
        assert!(matches!(
            load_model_file(&empty),
            Err(ExportError::MissingModel { .. })
        ));

        let good = dir.join("decay.json");
        fs::write(&good, format!(r#"{{"doc": "Decay chain", "model": {}}}"#, DECAY)).unwrap();
        let (model, doc) = load_model_file(&good).unwrap();
        assert_eq!(model.name, "decay");
        assert_eq!(doc.as_deref(), Some("Decay chain"));

        fs::remove_dir_all(&dir).unwrap();
    }
}
