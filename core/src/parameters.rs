use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form parameter map attached to events and collections.
///
/// Keys are kept in sorted order so iteration is reproducible.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    strings: BTreeMap<String, Vec<String>>,
    ints: BTreeMap<String, Vec<i32>>,
    floats: BTreeMap<String, Vec<f64>>,
}

impl Parameters {
    /// Creates an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the string values stored under `key`.
    pub fn set_strings(&mut self, key: impl Into<String>, values: Vec<String>) {
        let _ = self.strings.insert(key.into(), values);
    }

    /// Replaces the integer values stored under `key`.
    pub fn set_ints(&mut self, key: impl Into<String>, values: Vec<i32>) {
        let _ = self.ints.insert(key.into(), values);
    }

    /// Replaces the float values stored under `key`.
    pub fn set_floats(&mut self, key: impl Into<String>, values: Vec<f64>) {
        let _ = self.floats.insert(key.into(), values);
    }

    /// String values stored under `key`.
    #[must_use]
    pub fn strings(&self, key: &str) -> Option<&[String]> {
        self.strings.get(key).map(Vec::as_slice)
    }

    /// Integer values stored under `key`.
    #[must_use]
    pub fn ints(&self, key: &str) -> Option<&[i32]> {
        self.ints.get(key).map(Vec::as_slice)
    }

    /// Float values stored under `key`.
    #[must_use]
    pub fn floats(&self, key: &str) -> Option<&[f64]> {
        self.floats.get(key).map(Vec::as_slice)
    }

    /// First integer stored under `key`.
    #[must_use]
    pub fn int(&self, key: &str) -> Option<i32> {
        self.ints(key).and_then(|values| values.first().copied())
    }

    /// Iterates over all string entries in key order.
    pub fn string_entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.strings.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Iterates over all integer entries in key order.
    pub fn int_entries(&self) -> impl Iterator<Item = (&str, &[i32])> {
        self.ints.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Iterates over all float entries in key order.
    pub fn float_entries(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.floats.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Reports whether no entry of any type is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.ints.is_empty() && self.floats.is_empty()
    }
}
