//! Station configuration entities.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DomainError, DomainResult, StationState};

// ============================================================================
// Station Config
// ============================================================================

/// Configuration and lifecycle state of one known station.
///
/// Field names follow the JSON documents the coordinator publishes
/// (`station_name`, `short_name`, `station_alias`, `station_state`, ...).
/// The full source document is kept in `document` so fields this type does
/// not model are not lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Unique station name, the registry key.
    #[serde(rename = "station_name", default)]
    pub name: String,

    #[serde(default)]
    pub short_name: String,

    /// Alternate unique names.
    #[serde(rename = "station_alias", default)]
    pub aliases: BTreeSet<String>,

    #[serde(rename = "station_state", default)]
    pub state: StationState,

    #[serde(default)]
    pub station_type: i64,

    #[serde(default)]
    pub request_port: u32,

    #[serde(default)]
    pub worker_in_port: u32,

    #[serde(default)]
    pub worker_out_port: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Last-known JSON document this config was parsed from.
    #[serde(skip)]
    pub document: Value,
}

impl StationConfig {
    /// Creates a bare config with the short name defaulted to the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            short_name: name.clone(),
            name,
            aliases: BTreeSet::new(),
            state: StationState::None,
            station_type: 0,
            request_port: 0,
            worker_in_port: 0,
            worker_out_port: 0,
            description: None,
            caption: None,
            document: Value::Null,
        }
    }

    #[must_use]
    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Parses a single station document.
    ///
    /// The document must be a non-empty JSON object. A missing
    /// `station_name` is filled from `fallback_name`; a missing short name
    /// defaults to the station name. Blank aliases are dropped.
    pub fn from_json(fallback_name: &str, json: &str) -> DomainResult<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_document(fallback_name, "empty document"));
        }
        if !trimmed.starts_with('{') {
            return Err(DomainError::invalid_document(
                fallback_name,
                "document is not a JSON object",
            ));
        }

        let value: Value = serde_json::from_str(trimmed).map_err(|e| DomainError::ParseError {
            field: "station config".to_string(),
            reason: e.to_string(),
        })?;

        Self::from_value(fallback_name, value)
    }

    /// Builds a config from an already parsed JSON value.
    pub fn from_value(fallback_name: &str, value: Value) -> DomainResult<Self> {
        if !value.is_object() {
            return Err(DomainError::invalid_document(
                fallback_name,
                "document is not a JSON object",
            ));
        }

        let mut config: StationConfig =
            serde_json::from_value(value.clone()).map_err(|e| DomainError::ParseError {
                field: "station config".to_string(),
                reason: e.to_string(),
            })?;

        config.document = value;
        config.normalize(fallback_name);

        if config.name.is_empty() {
            return Err(DomainError::invalid_document(
                fallback_name,
                "station_name is missing",
            ));
        }
        Ok(config)
    }

    fn normalize(&mut self, fallback_name: &str) {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            self.name = fallback_name.trim().to_string();
        }
        self.short_name = self.short_name.trim().to_string();
        if self.short_name.is_empty() {
            self.short_name = self.name.clone();
        }
        self.aliases = std::mem::take(&mut self.aliases)
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
    }

    /// Every name this station answers to: name, short name, aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(std::iter::once(self.short_name.as_str()))
            .chain(self.aliases.iter().map(String::as_str))
            .filter(|n| !n.is_empty())
    }

    /// Returns true if `candidate` equals the name, short name or any alias
    /// (ASCII case-insensitive).
    pub fn answers_to(&self, candidate: &str) -> bool {
        self.names().any(|n| n.eq_ignore_ascii_case(candidate))
    }

    /// Returns the first of `other`'s names this station also answers to.
    pub fn shared_name<'a>(&self, other: &'a StationConfig) -> Option<&'a str> {
        other.names().find(|n| self.answers_to(n))
    }
}

// ============================================================================
// Station Document
// ============================================================================

/// API documentation attached to a station.
///
/// Documents authored locally (`is_local`) take precedence over documents
/// discovered through the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDocument {
    #[serde(default)]
    pub is_local: bool,

    pub body: Value,
}

impl StationDocument {
    pub fn local(body: Value) -> Self {
        Self {
            is_local: true,
            body,
        }
    }

    pub fn remote(body: Value) -> Self {
        Self {
            is_local: false,
            body,
        }
    }

    /// Parses a document pushed by the coordinator.
    ///
    /// Anything arriving over the monitor stream is remote, whatever the
    /// payload claims.
    pub fn from_remote_json(station: &str, json: &str) -> DomainResult<Self> {
        let body: Value = serde_json::from_str(json).map_err(|e| DomainError::ParseError {
            field: format!("document for {station}"),
            reason: e.to_string(),
        })?;
        if !body.is_object() {
            return Err(DomainError::invalid_document(
                station,
                "document is not a JSON object",
            ));
        }
        Ok(Self::remote(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_full_document() {
        let json = r#"{
            "station_name": "UserCenter",
            "short_name": "user",
            "station_alias": ["uc", "users"],
            "station_state": 1,
            "station_type": 4,
            "request_port": 9001,
            "worker_in_port": 9002,
            "worker_out_port": 9003,
            "caption": "User center",
            "request_in": 42
        }"#;

        let config = StationConfig::from_json("ignored", json).unwrap();
        assert_eq!(config.name, "UserCenter");
        assert_eq!(config.short_name, "user");
        assert_eq!(config.aliases.len(), 2);
        assert_eq!(config.state, StationState::Run);
        assert_eq!(config.request_port, 9001);
        assert_eq!(config.caption.as_deref(), Some("User center"));
        // Unmodelled fields survive in the raw document
        assert_eq!(config.document["request_in"], 42);
    }

    #[test]
    fn test_from_json_defaults() {
        let config = StationConfig::from_json("Api", r#"{"station_alias": ["", " a "]}"#).unwrap();
        assert_eq!(config.name, "Api");
        assert_eq!(config.short_name, "Api");
        assert_eq!(config.aliases.iter().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(config.state, StationState::None);
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(matches!(
            StationConfig::from_json("x", ""),
            Err(DomainError::InvalidDocument { .. })
        ));
        assert!(matches!(
            StationConfig::from_json("x", "[1,2]"),
            Err(DomainError::InvalidDocument { .. })
        ));
        assert!(matches!(
            StationConfig::from_json("x", "{not json"),
            Err(DomainError::ParseError { .. })
        ));
    }

    #[test]
    fn test_answers_to_is_case_insensitive() {
        let config = StationConfig::new("Order").with_short_name("ord").with_alias("sales");
        assert!(config.answers_to("order"));
        assert!(config.answers_to("ORD"));
        assert!(config.answers_to("Sales"));
        assert!(!config.answers_to("billing"));
    }

    #[test]
    fn test_shared_name() {
        let a = StationConfig::new("A").with_short_name("a1");
        let b = StationConfig::new("B").with_alias("A1");
        assert_eq!(a.shared_name(&b), Some("A1"));
        assert_eq!(a.shared_name(&StationConfig::new("C")), None);
    }

    #[test]
    fn test_remote_document_is_never_local() {
        let doc = StationDocument::from_remote_json("api", r#"{"is_local": true}"#).unwrap();
        assert!(!doc.is_local);
        assert!(StationDocument::from_remote_json("api", "42").is_err());
    }
}
