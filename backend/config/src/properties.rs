//! Flat property snapshot handed to plugins.
//!
//! Keys are dotted names (`plugbus.plugin.dag.setup`). A property marked
//! final keeps its value for the lifetime of the snapshot.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator for list-valued properties.
pub const LIST_DELIMITER: char = ',';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("property '{key}' is final and cannot be overridden")]
    FinalOverride { key: String },

    #[error("property '{key}' has value '{value}' which is not a valid {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub value: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    entries: BTreeMap<String, PropertyEntry>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, keeping any description already attached to it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ConfigError> {
        self.put(key.into(), value.into(), false)
    }

    /// Set `key` and lock it against later overrides.
    pub fn set_final(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ConfigError> {
        self.put(key.into(), value.into(), true)
    }

    fn put(&mut self, key: String, value: String, is_final: bool) -> Result<(), ConfigError> {
        match self.entries.get_mut(&key) {
            Some(entry) if entry.is_final => Err(ConfigError::FinalOverride { key }),
            Some(entry) => {
                entry.value = value;
                entry.is_final = is_final;
                Ok(())
            }
            None => {
                self.entries.insert(key, PropertyEntry { value, is_final, description: None });
                Ok(())
            }
        }
    }

    /// Attach a human-readable description to an existing key.
    pub fn describe(&mut self, key: &str, description: impl Into<String>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.description = Some(description.into());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn entry(&self, key: &str) -> Option<&PropertyEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_final(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.is_final)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyEntry> {
        self.entries.remove(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(raw) = self.get(key) else { return Ok(None) };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(invalid(key, raw, "boolean")),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.parse(key, "unsigned integer")
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.parse(key, "integer")
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        self.parse(key, "number")
    }

    fn parse<T: FromStr>(&self, key: &str, expected: &'static str) -> Result<Option<T>, ConfigError> {
        let Some(raw) = self.get(key) else { return Ok(None) };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(key, raw, expected))
    }

    /// Split a list-valued property. Blank items are dropped, order is kept.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(split_list).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| {
                (k.into(), PropertyEntry { value: v.into(), is_final: false, description: None })
            })
            .collect();
        Self { entries }
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn invalid(key: &str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_property_rejects_override() {
        let mut conf = Configuration::new();
        conf.set_final("plugbus.plugin.dag.setup", "audit").unwrap();
        let err = conf.set("plugbus.plugin.dag.setup", "other").unwrap_err();
        assert_eq!(err, ConfigError::FinalOverride { key: "plugbus.plugin.dag.setup".into() });
        assert_eq!(conf.get("plugbus.plugin.dag.setup"), Some("audit"));
    }

    #[test]
    fn list_parsing_trims_and_drops_blanks() {
        let conf: Configuration = [("k", " a, b ,,c ,")].into_iter().collect();
        assert_eq!(conf.get_list("k"), vec!["a", "b", "c"]);
        assert!(conf.get_list("missing").is_empty());
    }

    #[test]
    fn typed_getters() {
        let conf: Configuration = [("n", "42"), ("neg", "-3"), ("flag", "TRUE"), ("bad", "x")]
            .into_iter()
            .collect();
        assert_eq!(conf.get_u64("n").unwrap(), Some(42));
        assert_eq!(conf.get_i64("neg").unwrap(), Some(-3));
        assert_eq!(conf.get_bool("flag").unwrap(), Some(true));
        assert_eq!(conf.get_u64("missing").unwrap(), None);
        assert!(matches!(
            conf.get_u64("bad"),
            Err(ConfigError::InvalidValue { expected: "unsigned integer", .. })
        ));
    }

    #[test]
    fn describe_keeps_value() {
        let mut conf = Configuration::new();
        conf.set("a", "1").unwrap();
        assert!(conf.describe("a", "first"));
        assert!(!conf.describe("b", "missing"));
        conf.set("a", "2").unwrap();
        let entry = conf.entry("a").unwrap();
        assert_eq!(entry.value, "2");
        assert_eq!(entry.description.as_deref(), Some("first"));
    }
}
