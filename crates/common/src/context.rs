//! Versioned business context carried by a workflow run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current schema version written into new envelopes.
pub const CONTEXT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around the opaque run context payload.
///
/// Activities read and mutate named fields of the payload; the schema
/// version lets readers tolerate forward-compatible additions without
/// losing type safety on the fields they know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEnvelope {
    pub schema_version: u32,
    pub payload: Value,
}

impl ContextEnvelope {
    /// Creates an envelope around the given payload at the current version.
    pub fn new(payload: Value) -> Self {
        Self {
            schema_version: CONTEXT_SCHEMA_VERSION,
            payload,
        }
    }

    /// Creates an envelope with an empty object payload.
    pub fn empty() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.as_object().and_then(|map| map.get(key))
    }

    /// Returns the string value stored under `key`, if any.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// A non-object payload is replaced by an object first.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if !self.payload.is_object() {
            self.payload = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.payload.as_object_mut() {
            map.insert(key.into(), value);
        }
    }

    /// Merges the keys of an object `other` into the payload.
    ///
    /// Shallow merge: existing keys are overwritten. Non-object values
    /// are ignored, so a malformed signal payload cannot clobber the
    /// whole context.
    pub fn merge(&mut self, other: Value) {
        if let Value::Object(entries) = other {
            for (key, value) in entries {
                self.set(key, value);
            }
        }
    }
}

impl Default for ContextEnvelope {
    fn default() -> Self {
        Self::empty()
    }
}
