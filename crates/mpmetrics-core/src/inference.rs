//! Inference failure normalization.
//!
//! Model code may fail with any status hint and either a plain string or a
//! structured body. The HTTP layer only ever sees a 4xx/5xx status and a flat
//! string map; anything else is remapped to 500 with an explanatory key.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::{MetricsError, Result};

/// Key holding the plain-string form of a raw message.
pub const MESSAGE_KEY: &str = "message";

/// Key added when the raw status had to be remapped.
pub const BACKEND_MESSAGE_KEY: &str = "qwak_backend_message";

/// Status used when the raw status is outside 4xx/5xx.
pub const FALLBACK_STATUS: u16 = 500;

/// Raw message payload handed over by the failing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    Text(String),
    Map(BTreeMap<String, String>),
}

impl From<&str> for RawMessage {
    fn from(s: &str) -> Self {
        RawMessage::Text(s.to_string())
    }
}

impl From<String> for RawMessage {
    fn from(s: String) -> Self {
        RawMessage::Text(s)
    }
}

impl From<BTreeMap<String, String>> for RawMessage {
    fn from(m: BTreeMap<String, String>) -> Self {
        RawMessage::Map(m)
    }
}

impl RawMessage {
    /// Build from a dynamic JSON value: a string or an object of strings.
    pub fn from_json(v: &Value) -> Result<Self> {
        match v {
            Value::String(s) => Ok(RawMessage::Text(s.clone())),
            Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (k, v) in obj {
                    let s = v.as_str().ok_or_else(|| {
                        MetricsError::TypeMismatch(format!(
                            "message value for key {k:?} must be a string, got {v}"
                        ))
                    })?;
                    map.insert(k.clone(), s.to_string());
                }
                Ok(RawMessage::Map(map))
            }
            other => Err(MetricsError::TypeMismatch(format!(
                "message must be a string or a mapping, got {other}"
            ))),
        }
    }

    fn into_map(self) -> BTreeMap<String, String> {
        match self {
            RawMessage::Text(s) => BTreeMap::from([(MESSAGE_KEY.to_string(), s)]),
            RawMessage::Map(m) => m,
        }
    }
}

/// Map a raw status hint and message to an HTTP-compatible pair.
pub fn normalize(
    raw_status: i64,
    raw_message: impl Into<RawMessage>,
) -> (u16, BTreeMap<String, String>) {
    let mut message = raw_message.into().into_map();
    match u16::try_from(raw_status) {
        Ok(status) if (400..=599).contains(&status) => (status, message),
        _ => {
            message.insert(
                BACKEND_MESSAGE_KEY.to_string(),
                format!("Invalid status code. Given value: {raw_status}. Supported: 4xx, 5xx"),
            );
            (FALLBACK_STATUS, message)
        }
    }
}

/// A normalized inference failure, ready to be rendered as an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceException {
    #[serde(skip)]
    status_code: u16,
    #[serde(flatten)]
    message: BTreeMap<String, String>,
}

impl InferenceException {
    pub fn new(raw_status: i64, raw_message: impl Into<RawMessage>) -> Self {
        let (status_code, message) = normalize(raw_status, raw_message);
        Self {
            status_code,
            message,
        }
    }

    /// Dynamic entry point for untyped callers (e.g. values decoded from a
    /// model runner's error payload).
    pub fn from_json(raw_status: &Value, raw_message: &Value) -> Result<Self> {
        let status = raw_status.as_i64().ok_or_else(|| {
            MetricsError::TypeMismatch(format!("status must be an integer, got {raw_status}"))
        })?;
        Ok(Self::new(status, RawMessage::from_json(raw_message)?))
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn message(&self) -> &BTreeMap<String, String> {
        &self.message
    }

    /// JSON body for the error response.
    pub fn to_json(&self) -> Value {
        // A string map always serializes.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for InferenceException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inference failed with status {}", self.status_code)?;
        if let Some(m) = self.message.get(MESSAGE_KEY) {
            write!(f, ": {m}")?;
        }
        Ok(())
    }
}

impl std::error::Error for InferenceException {}
