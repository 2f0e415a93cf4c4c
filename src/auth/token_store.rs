//! Access/refresh token storage.
//!
//! The current record sits behind an `ArcSwapOption`, so a refresh replaces
//! both tokens and the expiry in one swap and readers never see a half-written
//! pair.

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::auth::persistence::{MemoryPersistence, TokenPersistence};

/// Default safety margin before expiry.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// The stored credential pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of `access_token` in Unix milliseconds, if known.
    pub expires_at: Option<u64>,
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token pair as returned by login and refresh endpoints.
///
/// Backends disagree on casing and naming, so every spelling seen in the
/// wild is accepted.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    #[serde(alias = "access_token", alias = "access", alias = "token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token", alias = "refresh")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default, alias = "expires_in")]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Holds the current credential pair and persists it.
pub struct TokenStore {
    current: ArcSwapOption<TokenRecord>,
    persistence: Box<dyn TokenPersistence>,
    expiry_margin: Duration,
}

impl TokenStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self::with_persistence(MemoryPersistence)
    }

    /// Store backed by `persistence`, starting from whatever it holds.
    pub fn with_persistence(persistence: impl TokenPersistence + 'static) -> Self {
        let initial = match persistence.load() {
            Ok(record) => record.map(Arc::new),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable persisted tokens");
                None
            }
        };

        Self {
            current: ArcSwapOption::new(initial),
            persistence: Box::new(persistence),
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
        }
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.load().as_ref().map(|r| r.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current
            .load()
            .as_ref()
            .map(|r| r.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.current
            .load()
            .as_ref()
            .and_then(|r| r.expires_at)
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
    }

    pub fn snapshot(&self) -> Option<Arc<TokenRecord>> {
        self.current.load_full()
    }

    /// Replace both tokens. No expiry is recorded.
    pub fn set_tokens(&self, access: impl Into<String>, refresh: impl Into<String>) {
        self.set_record(TokenRecord {
            access_token: access.into(),
            refresh_token: refresh.into(),
            expires_at: None,
        });
    }

    /// Replace both tokens, with the access token valid for `expires_in`.
    pub fn set_tokens_expiring(
        &self,
        access: impl Into<String>,
        refresh: impl Into<String>,
        expires_in: Duration,
    ) {
        self.set_record(TokenRecord {
            access_token: access.into(),
            refresh_token: refresh.into(),
            expires_at: Some(unix_millis(SystemTime::now() + expires_in)),
        });
    }

    /// Store a pair from a login or refresh response.
    ///
    /// A response without a refresh token keeps the current one.
    pub fn apply_pair(&self, pair: &TokenPair) {
        let refresh = pair
            .refresh_token
            .clone()
            .or_else(|| self.refresh_token())
            .unwrap_or_default();

        match pair.expires_in {
            Some(secs) => self.set_tokens_expiring(
                pair.access_token.clone(),
                refresh,
                Duration::from_secs(secs),
            ),
            None => self.set_tokens(pair.access_token.clone(), refresh),
        }
    }

    pub fn set_record(&self, record: TokenRecord) {
        if let Err(e) = self.persistence.save(&record) {
            tracing::warn!(error = %e, "Failed to persist tokens");
        }
        self.current.store(Some(Arc::new(record)));
    }

    /// True when no expiry is known or `now` is within the safety margin of it.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match self.current.load().as_ref().and_then(|r| r.expires_at) {
            Some(expires_at) => unix_millis(now + self.expiry_margin) >= expires_at,
            None => true,
        }
    }

    /// Remove all credential state.
    pub fn clear_tokens(&self) {
        self.current.store(None);
        if let Err(e) = self.persistence.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted tokens");
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_tokens", &self.current.load().is_some())
            .field("expiry_margin", &self.expiry_margin)
            .finish()
    }
}
