//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Check that paths and URLs are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the client

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("api.base_url '{0}' is not a valid http(s) URL")]
    InvalidBaseUrl(String),

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("retries.base_delay_ms ({base}) exceeds retries.max_delay_ms ({max})")]
    DelayRange { base: u64, max: u64 },

    #[error("{field} '{value}' must start with '/'")]
    RelativePath { field: &'static str, value: String },

    #[error("observability.request_id_header '{0}' is not a valid header name")]
    InvalidHeaderName(String),
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.api.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::InvalidBaseUrl(config.api.base_url.clone())),
    }

    if config.api.timeout_ms == 0 {
        errors.push(ValidationError::MustBePositive("api.timeout_ms"));
    }
    if config.api.connect_timeout_ms == 0 {
        errors.push(ValidationError::MustBePositive("api.connect_timeout_ms"));
    }

    if config.retries.enabled {
        if config.retries.base_delay_ms == 0 {
            errors.push(ValidationError::MustBePositive("retries.base_delay_ms"));
        }
        if config.retries.base_delay_ms > config.retries.max_delay_ms {
            errors.push(ValidationError::DelayRange {
                base: config.retries.base_delay_ms,
                max: config.retries.max_delay_ms,
            });
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.enabled {
        if breaker.failure_threshold == 0 {
            errors.push(ValidationError::MustBePositive("circuit_breaker.failure_threshold"));
        }
        if breaker.reset_timeout_ms == 0 {
            errors.push(ValidationError::MustBePositive("circuit_breaker.reset_timeout_ms"));
        }
        if breaker.half_open_max_successes == 0 {
            errors.push(ValidationError::MustBePositive(
                "circuit_breaker.half_open_max_successes",
            ));
        }
    }

    let auth = &config.auth;
    for (field, value) in [
        ("auth.refresh_path", &auth.refresh_path),
        ("auth.login_path", &auth.login_path),
        ("auth.logout_path", &auth.logout_path),
    ] {
        check_path(field, value, &mut errors);
    }
    for prefix in &auth.public_prefixes {
        check_path("auth.public_prefixes", prefix, &mut errors);
    }

    let header = &config.observability.request_id_header;
    if reqwest::header::HeaderName::from_bytes(header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName(header.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_path(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if !value.starts_with('/') {
        errors.push(ValidationError::RelativePath {
            field,
            value: value.to_string(),
        });
    }
}
