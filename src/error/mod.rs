//! Errors raised while loading, validating, translating and exporting models

use std::path::PathBuf;

use thiserror::Error;

use crate::runtime::expr::ParseError;
use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum ExportError {
    // ─────────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The model file does not exist
    #[error("Model file '{}' does not exist", path.display())]
    FileNotFound { path: PathBuf },

    /// The model file is not a `.json` file
    #[error("Model file '{}' must have a .json extension", path.display())]
    WrongExtension { path: PathBuf },

    /// The model file has no `model` key
    #[error("Model file '{}' does not define a 'model'", path.display())]
    MissingModel { path: PathBuf },

    /// Failed to parse JSON
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────────────────
    // Structural Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Model name that cannot be embedded in a comment
    #[error("Invalid model name {0:?}")]
    InvalidModelName(String),

    /// One ODE per species is required
    #[error("Model has {species} species but {odes} ODEs")]
    EquationCount { species: usize, odes: usize },

    /// Duplicate parameter name
    #[error("Duplicate parameter name: '{name}'")]
    DuplicateParameter { name: String },

    /// Parameter name that is not a plain identifier or collides with a species marker
    #[error("Invalid parameter name '{name}': {reason}")]
    InvalidParameterName { name: String, reason: String },

    /// Parameter value that is not a finite number
    #[error("Parameter '{name}' has non-finite value {value}")]
    NonFiniteParameter { name: String, value: f64 },

    /// Observable whose species and coefficient lists differ in length
    #[error("Observable '{name}' has {species} species but {coefficients} coefficients")]
    ObservableShape {
        name: String,
        species: usize,
        coefficients: usize,
    },

    /// Observable coefficient that is not a finite number
    #[error("Observable '{name}' has a non-finite coefficient")]
    NonFiniteCoefficient { name: String },

    /// Record pointing at a species that does not exist
    #[error("{context} refers to species {index}, but the model has {num_species}")]
    SpeciesIndexOutOfRange {
        context: String,
        index: usize,
        num_species: usize,
    },

    /// Record pointing at a parameter that does not exist
    #[error("{context} refers to parameter {index}, but the model has {num_parameters}")]
    ParameterIndexOutOfRange {
        context: String,
        index: usize,
        num_parameters: usize,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Expression Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// ODE text that does not parse
    #[error("Invalid expression in ODE for species {species}: {source}")]
    InvalidExpression { species: usize, source: ParseError },

    /// Name that is neither a parameter nor the time variable
    #[error("Unknown symbol '{name}' in ODE for species {species}")]
    UnknownSymbol { name: String, species: usize },

    /// Species marker with an index past the last species
    #[error("Species marker __s{index} in ODE for species {species} is out of range ({num_species} species)")]
    SpeciesOutOfRange {
        index: usize,
        species: usize,
        num_species: usize,
    },

    /// Call to a function outside the builtin set
    #[error("Unknown function '{name}' in ODE for species {species}")]
    UnknownFunction { name: String, species: usize },

    /// Builtin called with the wrong number of arguments
    #[error("Function '{name}' takes {expected} argument(s), got {found} in ODE for species {species}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
        species: usize,
    },

    /// Literal that overflows to infinity
    #[error("Non-finite number in ODE for species {species}")]
    NonFiniteNumber { species: usize },

    // ─────────────────────────────────────────────────────────────────────────
    // Runtime Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ExportError {
    /// Create an unknown symbol error
    pub fn unknown_symbol(name: impl Into<String>, species: usize) -> Self {
        Self::UnknownSymbol {
            name: name.into(),
            species,
        }
    }

    /// Create an invalid parameter name error
    pub fn invalid_parameter_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameterName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a species index error for a record
    pub fn species_index(context: impl Into<String>, index: usize, num_species: usize) -> Self {
        Self::SpeciesIndexOutOfRange {
            context: context.into(),
            index,
            num_species,
        }
    }

    /// Create a parameter index error for a record
    pub fn parameter_index(
        context: impl Into<String>,
        index: usize,
        num_parameters: usize,
    ) -> Self {
        Self::ParameterIndexOutOfRange {
            context: context.into(),
            index,
            num_parameters,
        }
    }

    /// The species whose ODE caused the error, if any
    pub fn species(&self) -> Option<usize> {
        match self {
            Self::InvalidExpression { species, .. }
            | Self::UnknownSymbol { species, .. }
            | Self::SpeciesOutOfRange { species, .. }
            | Self::UnknownFunction { species, .. }
            | Self::WrongArity { species, .. }
            | Self::NonFiniteNumber { species } => Some(*species),
            _ => None,
        }
    }
}
