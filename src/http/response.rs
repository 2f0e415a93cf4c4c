//! Response decoding.
//!
//! # Responsibilities
//! - Carry the raw status, headers and body of an attempt
//! - Resolve the backend's two success shapes once, at the boundary
//!
//! # Design Decisions
//! - `{success, data, message}` and flat payloads resolve to one enum, not
//!   optional chaining in every caller
//! - A `success` flag alone does not make a body an envelope
//! - `success: false` on a 2xx is a rejection, not a value
//! - Empty bodies decode as JSON `null`, so `()` and `Option<T>` work for 204

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// Status, headers and body of one attempt.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// The two success body shapes the backend produces.
///
/// A body is `Wrapped` only when it carries a boolean `success` together with
/// a `data` key, or `success: false`. Any other object, including a flat
/// payload that happens to have `success: true`, is `Flat`.
#[derive(Debug)]
pub enum Envelope<T> {
    Wrapped {
        success: bool,
        data: Option<T>,
        message: Option<String>,
    },
    Flat(T),
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut map = match value {
            Value::Object(map) => map,
            other => return serde_json::from_value(other).map(Envelope::Flat),
        };

        let Some(success) = map.get("success").and_then(Value::as_bool) else {
            return serde_json::from_value(Value::Object(map)).map(Envelope::Flat);
        };
        let message = map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);

        if !success {
            return Ok(Envelope::Wrapped {
                success,
                data: None,
                message,
            });
        }

        if let Some(data) = map.remove("data") {
            let data = match data {
                Value::Null => None,
                data => Some(serde_json::from_value(data)?),
            };
            return Ok(Envelope::Wrapped {
                success,
                data,
                message,
            });
        }

        // `{"success": true, "message": "..."}` acknowledges without a payload.
        let acknowledgement = map.keys().all(|k| k == "success" || k == "message");
        match serde_json::from_value(Value::Object(map)) {
            Ok(flat) => Ok(Envelope::Flat(flat)),
            Err(_) if acknowledgement => Ok(Envelope::Wrapped {
                success,
                data: None,
                message,
            }),
            Err(e) => Err(e),
        }
    }
}

/// Decode a success body into `T`.
pub fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ApiError> {
    let decode_error = |e: serde_json::Error| {
        tracing::debug!(%status, error = %e, "Response body did not match the expected shape");
        ApiError::Decode(e.to_string())
    };

    let value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).map_err(decode_error)?
    };

    match Envelope::from_value(value).map_err(decode_error)? {
        Envelope::Wrapped {
            success: false,
            message,
            ..
        } => Err(ApiError::Rejected {
            status,
            message: message.unwrap_or_else(|| "Request was not successful".to_string()),
            body: body.to_string(),
        }),
        Envelope::Wrapped {
            data: Some(data), ..
        } => Ok(data),
        Envelope::Wrapped { data: None, .. } => {
            serde_json::from_value(Value::Null).map_err(decode_error)
        }
        Envelope::Flat(data) => Ok(data),
    }
}
