//! Configuration records baked into a model.
//!
//! Instances are built once when a model is constructed and never change
//! afterwards.

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A named linear combination of species.
///
/// `species` and `coefficients` are co-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Observable {
    pub name: String,
    pub species: Vec<usize>,
    pub coefficients: Vec<f64>,
}

impl Observable {
    pub fn new(name: impl Into<String>, species: Vec<usize>, coefficients: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            species,
            coefficients,
        }
    }

    /// Iterate over `(species index, coefficient)` pairs.
    pub fn terms(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.species
            .iter()
            .copied()
            .zip(self.coefficients.iter().copied())
    }
}

/// Species `species_index` starts at the value of parameter `param_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Initial {
    pub param_index: usize,
    pub species_index: usize,
}

impl Initial {
    pub fn new(param_index: usize, species_index: usize) -> Self {
        Self {
            param_index,
            species_index,
        }
    }
}
