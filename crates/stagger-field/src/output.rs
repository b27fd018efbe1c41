//! Named data vectors a field contributes to one output step.

use indexmap::IndexMap;

/// Output contributions gathered from the fields for one accepted step.
///
/// Names are kept in insertion order. Adding a name twice replaces the
/// earlier vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldOutput {
    vectors: IndexMap<String, Vec<f64>>,
}

impl FieldOutput {
    /// Empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a named vector.
    pub fn add_data_vector(&mut self, name: impl Into<String>, data: Vec<f64>) {
        self.vectors.insert(name.into(), data);
    }

    /// Vector registered under `name`.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.vectors.get(name).map(Vec::as_slice)
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vectors.keys().map(String::as_str)
    }

    /// `(name, data)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.vectors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether no vector was added.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
