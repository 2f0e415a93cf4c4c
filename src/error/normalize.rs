//! Error normalization.
//!
//! Backends answer failures in several shapes: `{message}`, `{error}`,
//! `{detail}`, or `{errors: {field: [msgs]}}`, sometimes inside a
//! `{success: false, ...}` envelope. Everything is folded into one
//! `NormalizedError` here.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{ApiError, ErrorKind};

/// Field-level validation messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Uniform error handed to callers.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NormalizedError {
    /// Human-readable message.
    pub message: String,
    /// HTTP status, `None` when no response was received.
    pub status: Option<u16>,
    /// Backend error code, or a synthetic code for transport failures.
    pub code: Option<String>,
    /// Per-field validation messages.
    pub details: Option<FieldErrors>,
    pub kind: ErrorKind,
    /// The attempt failure this was derived from.
    #[source]
    pub original: Arc<ApiError>,
}

/// Fields extracted from an error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFields {
    pub message: String,
    pub code: Option<String>,
    pub details: Option<FieldErrors>,
}

/// Extract message, code and details from an error body.
///
/// Message is the first string among `detail`, `message`, `error`; code comes
/// from `code` or `type`; details from an `errors` object. Bodies that are not
/// JSON objects yield `fallback` as the message.
pub fn normalize_body(body: &str, fallback: &str) -> ErrorFields {
    let object = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => object,
        _ => {
            return ErrorFields {
                message: fallback.to_string(),
                code: None,
                details: None,
            }
        }
    };

    let message = ["detail", "message", "error"]
        .iter()
        .find_map(|key| non_empty_str(&object, key))
        .unwrap_or(fallback)
        .to_string();

    let code = ["code", "type"].iter().find_map(|key| match object.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    let details = match object.get("errors") {
        Some(Value::Object(fields)) => Some(field_errors(fields)),
        _ => None,
    };

    ErrorFields {
        message,
        code,
        details,
    }
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

fn field_errors(fields: &Map<String, Value>) -> FieldErrors {
    fields
        .iter()
        .filter_map(|(field, value)| {
            let messages = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                _ => return None,
            };
            Some((field.clone(), messages))
        })
        .collect()
}

/// Convert a terminal attempt failure into the caller-facing shape.
pub fn normalize(err: ApiError) -> NormalizedError {
    let kind = err.kind();
    let status = err.status().map(|s| s.as_u16());
    let transport_message = err.to_string();

    let fields = match &err {
        ApiError::Status { body, .. } => normalize_body(body, &transport_message),
        ApiError::Rejected { message, body, .. } => {
            let mut fields = normalize_body(body, message);
            if fields.message.is_empty() {
                fields.message = transport_message;
            }
            fields
        }
        _ => ErrorFields {
            message: transport_message,
            code: Some(kind.code().to_string()),
            details: None,
        },
    };

    NormalizedError {
        message: fields.message,
        status,
        code: fields.code,
        details: fields.details,
        kind,
        original: Arc::new(err),
    }
}

impl NormalizedError {
    /// Messages for a single field, if the backend reported any.
    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.details.as_ref()?.get(name).map(Vec::as_slice)
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication | ErrorKind::Authorization)
    }
}
