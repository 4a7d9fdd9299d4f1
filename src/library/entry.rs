// src/library/entry.rs
use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::LibraryError;
use crate::spectrum::Spectrum;

/// A reference spectrum with its catalogue metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub spectrum: Spectrum,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub identifier: String,
}

impl LibraryEntry {
    pub fn new(name: impl Into<String>, spectrum: Spectrum) -> Self {
        let name = name.into();
        Self {
            identifier: name.clone(),
            name,
            spectrum,
            url: String::new(),
        }
    }
}

/// Reference spectra keyed by a stable id, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Library {
    entries: IndexMap<String, LibraryEntry>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&LibraryEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LibraryEntry)> {
        self.entries.iter()
    }

    /// Inserts under `key`, returning the entry it replaced.
    pub fn insert(&mut self, key: impl Into<String>, entry: LibraryEntry) -> Option<LibraryEntry> {
        self.entries.insert(key.into(), entry)
    }

    /// Stores `spectrum` under its trimmed name, replacing any entry with the
    /// same key. Returns the key, or `None` for a blank name.
    pub fn add_spectrum(&mut self, name: &str, spectrum: Spectrum) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let replaced = self.insert(name, LibraryEntry::new(name, spectrum)).is_some();
        info!(
            "spectrum '{name}' {} (total n: {})",
            if replaced { "replaced in the library" } else { "added to the library" },
            self.len()
        );
        Some(name.to_string())
    }

    pub fn remove(&mut self, key: &str) -> Result<LibraryEntry, LibraryError> {
        let entry = self
            .entries
            .shift_remove(key)
            .ok_or_else(|| LibraryError::UnknownEntry(key.to_string()))?;
        info!("spectrum '{key}' removed, remaining: {}", self.len());
        Ok(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// `(display name, key)` pairs sorted by display name.
    pub fn display_names(&self) -> Vec<(&str, &str)> {
        let mut names: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.name.as_str(), key.as_str()))
            .collect();
        names.sort();
        names
    }

    /// Entries whose name contains `query`, ignoring case.
    pub fn find_by_name(&self, query: &str) -> Vec<(&String, &LibraryEntry)> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|(_, entry)| entry.name.to_lowercase().contains(&needle))
            .collect()
    }
}

impl FromIterator<(String, LibraryEntry)> for Library {
    fn from_iter<T: IntoIterator<Item = (String, LibraryEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum() -> Spectrum {
        Spectrum::from_pixels(vec![1.0, 2.0, 3.0])
    }

    #[test]
    fn add_replaces_by_name_and_keeps_order() {
        let mut lib = Library::new();
        assert_eq!(lib.add_spectrum("  Toluene ", spectrum()).as_deref(), Some("Toluene"));
        lib.add_spectrum("Acetone", spectrum());
        lib.add_spectrum("Toluene", Spectrum::from_pixels(vec![9.0]));
        assert_eq!(lib.len(), 2);
        assert_eq!(lib.iter().next().map(|(k, _)| k.as_str()), Some("Toluene"));
        assert_eq!(lib.get("Toluene").unwrap().spectrum.len(), 1);
        assert!(lib.add_spectrum("   ", spectrum()).is_none());
    }

    #[test]
    fn lookup_is_case_insensitive_substring() {
        let mut lib = Library::new();
        lib.add_spectrum("Sodium Nitrate", spectrum());
        lib.add_spectrum("Calcite", spectrum());
        let hits = lib.find_by_name("nitr");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.name, "Sodium Nitrate");
        assert_eq!(lib.display_names()[0].0, "Calcite");
    }

    #[test]
    fn remove_unknown_key_errors() {
        let mut lib = Library::new();
        lib.add_spectrum("Calcite", spectrum());
        assert!(matches!(lib.remove("quartz"), Err(LibraryError::UnknownEntry(_))));
        assert!(lib.remove("Calcite").is_ok());
        assert!(lib.is_empty());
    }
}
