//! Generation of standalone simulator programs
//!
//! [`CodeGenerator`] translates a [`Model`] and assembles a single Rust source
//! file around the translated equations. The program contains the model's
//! records as literals, two derivative routines sharing the same equation
//! text (native fast path and interpreted fallback), the runtime modules of
//! this crate and, optionally, a `main` that prints a CSV of the
//! observables.
//!
//! Generation is deterministic: the same model always yields the same text.

mod units;

use std::fs;
use std::path::Path;

use crate::error::ExportError;
use crate::model::Model;
use crate::translate::Translator;

pub use units::strip_tests;

/// An exported program
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProgram {
    /// The complete program text
    pub code: String,

    /// The `ydot[i] = ...;` lines embedded in both derivative routines
    pub equations: String,

    pub model_name: String,
    pub num_species: usize,
    pub num_parameters: usize,
    pub num_observables: usize,
}

impl GeneratedProgram {
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        fs::write(path.as_ref(), &self.code)?;
        log::info!(
            "wrote simulator for '{}' to {}",
            self.model_name,
            path.as_ref().display()
        );
        Ok(())
    }
}

/// Code generator for reaction-network models
pub struct CodeGenerator<'a> {
    model: &'a Model,
    docstring: Option<String>,
    entry_point: bool,
}

impl<'a> CodeGenerator<'a> {
    /// Create a new code generator for a model
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            docstring: None,
            entry_point: true,
        }
    }

    /// Use `doc` verbatim as the program's header docstring
    pub fn with_docstring(mut self, doc: impl Into<String>) -> Self {
        self.docstring = Some(doc.into());
        self
    }

    /// Whether to emit a `main` function (on by default)
    pub fn with_entry_point(mut self, entry_point: bool) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Translate the model and assemble the program text
    pub fn generate(&self) -> Result<GeneratedProgram, ExportError> {
        let translated = Translator::new(self.model).translate_all()?;
        // rendered once, embedded twice
        let equations = translated.code();
        let docstring = match &self.docstring {
            Some(doc) => doc.clone(),
            None => units::default_docstring(&translated),
        };

        let mut code = String::new();
        code.push_str(&units::header(&docstring, &translated.name));
        code.push_str(&units::preamble());
        code.push_str(&units::capability_probe());
        code.push_str(&units::container(&translated));
        code.push_str(&units::derivative_routines(&equations));
        if self.entry_point {
            code.push_str(&units::entry_point());
        }
        code.push_str(&units::harness());

        log::debug!(
            "generated {} bytes for model '{}'",
            code.len(),
            translated.name
        );
        Ok(GeneratedProgram {
            code,
            equations,
            model_name: translated.name.clone(),
            num_species: translated.num_species(),
            num_parameters: translated.num_parameters(),
            num_observables: translated.observables.len(),
        })
    }
}
