//! Errors raised by the simulator runtime.
//!
//! This module is embedded in every exported program, so it only depends on
//! the standard library.

use std::fmt;
use std::io;

use super::expr::ParseError;

#[derive(Debug)]
pub enum RuntimeError {
    /// `param_values` does not match the number of declared parameters
    ParameterLength { expected: usize, found: usize },
    /// A state or derivative vector has the wrong length
    StateLength { expected: usize, found: usize },
    /// `simulate` was called without timepoints
    EmptyTimeSpan,
    /// `tspan[index]` is smaller than its predecessor (or not a number)
    TimeSpanOrder { index: usize },
    /// A record references a species or parameter that does not exist
    InvalidRecord(String),
    /// The equation text could not be parsed
    Syntax(ParseError),
    /// The equation text parsed but is not a valid right-hand side
    Equation(String),
    /// The native compiler is missing or rejected the generated source
    Compile { message: String },
    /// A compiled library could not be loaded or lacks the expected symbol
    Load(String),
    /// The ODE solver could not be set up
    Solver(String),
    Io(io::Error),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::ParameterLength { expected, found } => write!(
                f,
                "param_values must have length {} (got {})",
                expected, found
            ),
            RuntimeError::StateLength { expected, found } => write!(
                f,
                "state vector must have length {} (got {})",
                expected, found
            ),
            RuntimeError::EmptyTimeSpan => write!(f, "tspan must contain at least one timepoint"),
            RuntimeError::TimeSpanOrder { index } => write!(
                f,
                "tspan must be non-decreasing, violated at index {}",
                index
            ),
            RuntimeError::InvalidRecord(msg) => write!(f, "invalid model record: {}", msg),
            RuntimeError::Syntax(err) => write!(f, "invalid equation text: {}", err),
            RuntimeError::Equation(msg) => write!(f, "invalid equation: {}", msg),
            RuntimeError::Compile { message } => write!(f, "cannot compile: {}", message),
            RuntimeError::Load(msg) => write!(f, "cannot load native library: {}", msg),
            RuntimeError::Solver(msg) => write!(f, "ODE solver error: {}", msg),
            RuntimeError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Syntax(err) => Some(err),
            RuntimeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RuntimeError {
    fn from(err: io::Error) -> Self {
        RuntimeError::Io(err)
    }
}

impl From<ParseError> for RuntimeError {
    fn from(err: ParseError) -> Self {
        RuntimeError::Syntax(err)
    }
}
