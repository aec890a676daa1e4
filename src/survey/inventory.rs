//! The host inventory document.
//!
//! The document is kept as a `serde_json::Value` so that every field the
//! survey does not own (and the order of the hosts) survives the round trip.
//! Only the result fields, or the error marker, are ever written.

use serde_json::{Map, Value};

use crate::survey::error::ConfigError;
use crate::survey::vcs::VcsResult;

pub const VCS_SYSTEM_FIELD: &str = "vcs_system";
pub const CURRENT_BRANCH_FIELD: &str = "current_branch";
pub const CURRENT_REVISION_FIELD: &str = "current_revision";
pub const SURVEY_ERROR_FIELD: &str = "survey_error";

/// Typed view of one entry under `hosts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    document: Value,
}

impl Inventory {
    /// Wrap a parsed document, checking that it has a `hosts` object.
    pub fn from_value(document: Value) -> Result<Self, ConfigError> {
        match document.get("hosts") {
            Some(Value::Object(_)) => Ok(Self { document }),
            _ => Err(ConfigError::MissingHosts),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.document
    }

    pub fn into_value(self) -> Value {
        self.document
    }

    fn hosts(&self) -> Option<&Map<String, Value>> {
        self.document.get("hosts").and_then(Value::as_object)
    }

    fn host_mut(&mut self, name: &str) -> Option<&mut Map<String, Value>> {
        self.document
            .get_mut("hosts")
            .and_then(Value::as_object_mut)
            .and_then(|hosts| hosts.get_mut(name))
            .and_then(Value::as_object_mut)
    }

    pub fn len(&self) -> usize {
        self.hosts().map_or(0, Map::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in document order.
    ///
    /// Every entry is validated up front, so a malformed document is
    /// rejected before any host is contacted.
    pub fn host_entries(&self) -> Result<Vec<(String, HostEntry)>, ConfigError> {
        let Some(hosts) = self.hosts() else {
            return Err(ConfigError::MissingHosts);
        };
        hosts
            .iter()
            .map(|(name, raw)| parse_entry(name, raw).map(|entry| (name.clone(), entry)))
            .collect()
    }

    /// Record a successful inspection. The three result fields are written
    /// and any error marker from an earlier run is removed.
    pub fn record_result(&mut self, name: &str, result: &VcsResult) {
        let Ok(Value::Object(fields)) = serde_json::to_value(result) else {
            return;
        };
        if let Some(entry) = self.host_mut(name) {
            entry.shift_remove(SURVEY_ERROR_FIELD);
            entry.extend(fields);
        }
    }

    /// Record why a host could not be inspected. Result fields from an
    /// earlier run are removed so they are not mistaken for current ones.
    pub fn record_error(&mut self, name: &str, message: &str) {
        if let Some(entry) = self.host_mut(name) {
            for field in [VCS_SYSTEM_FIELD, CURRENT_BRANCH_FIELD, CURRENT_REVISION_FIELD] {
                entry.shift_remove(field);
            }
            entry.insert(
                SURVEY_ERROR_FIELD.to_string(),
                Value::String(message.to_string()),
            );
        }
    }
}

fn parse_entry(name: &str, raw: &Value) -> Result<HostEntry, ConfigError> {
    for field in ["host", "user"] {
        if !raw.get(field).is_some_and(Value::is_string) {
            return Err(ConfigError::InvalidHostEntry {
                name: name.to_string(),
                field,
            });
        }
    }
    // Optional fields of the wrong type are ignored rather than fatal
    let optional = |field: &str| raw.get(field).and_then(Value::as_str).map(str::to_string);

    Ok(HostEntry {
        host: optional("host").unwrap_or_default(),
        user: optional("user").unwrap_or_default(),
        password: optional("password"),
        key: optional("key"),
    })
}
