//! Bearer credential attachment and refresh-on-401.
//!
//! # Responsibilities
//! - Attach `Authorization: Bearer <token>` to non-public requests
//! - Refresh the token pair when a request is rejected with 401
//! - Clear credentials when the refresh itself is rejected
//!
//! # Design Decisions
//! - Credentials only go to the API base URL's origin
//! - Public endpoints are matched by path prefix on segment boundaries
//! - A caller-supplied Authorization header is never overwritten
//! - Refreshes are serialized; a waiter whose token was already rotated by
//!   another request skips the network call
//! - The refresh call bypasses the pipeline and the breaker so a failing
//!   refresh cannot recurse

use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::session::SessionProvider;
use crate::auth::token_store::{TokenPair, TokenStore};
use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::http::middleware::RequestLayer;
use crate::http::request::{join_url, OutgoingRequest};
use crate::http::response::decode_body;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Attaches credentials and performs token refresh.
pub struct AuthInterceptor {
    tokens: Arc<TokenStore>,
    session: Option<Arc<dyn SessionProvider>>,
    public_prefixes: Vec<String>,
    refresh_path: String,
    refresh_lock: Mutex<()>,
}

impl AuthInterceptor {
    pub fn new(config: &AuthConfig, tokens: Arc<TokenStore>) -> Self {
        Self {
            tokens,
            session: None,
            public_prefixes: config.public_prefixes.clone(),
            refresh_path: config.refresh_path.clone(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Read tokens from `session` instead of the token store.
    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Whether `path` is exempt from credential attachment.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes
            .iter()
            .any(|prefix| matches_prefix(path, prefix))
    }

    /// Token to send: the session's when one is active, else the store's.
    pub fn current_token(&self) -> Option<String> {
        match &self.session {
            Some(session) => session.access_token(),
            None => self.tokens.access_token(),
        }
    }

    /// Whether a 401 on `path` can be answered with a refresh.
    pub fn can_refresh(&self, path: &str) -> bool {
        !self.is_public(path) && self.tokens.refresh_token().is_some()
    }

    /// Refresh after a 401, clearing all credentials if the refresh fails.
    ///
    /// Returns true when the original request should be replayed.
    pub async fn recover_from_unauthorized(
        &self,
        http: &reqwest::Client,
        base_url: &str,
        stale_token: Option<&str>,
        deadline: Duration,
    ) -> bool {
        match self.refresh(http, base_url, stale_token, deadline).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, clearing credentials");
                self.tokens.clear_tokens();
                false
            }
        }
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// `stale_token` is the access token the failed request carried. If the
    /// store already holds a different one, another request refreshed while
    /// this one waited and nothing is sent.
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        base_url: &str,
        stale_token: Option<&str>,
        deadline: Duration,
    ) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.tokens.access_token();
        if let (Some(stale), Some(current)) = (stale_token, current.as_deref()) {
            if stale != current {
                tracing::debug!("Token already rotated by a concurrent refresh");
                metrics::record_token_refresh("shared");
                return Ok(());
            }
        }

        let refresh_token = self
            .tokens
            .refresh_token()
            .ok_or_else(|| ApiError::InvalidRequest("no refresh token stored".into()))?;
        let url = join_url(base_url, &self.refresh_path)?;

        tracing::debug!(url = %url, "Refreshing access token");

        let result = with_deadline(deadline, async {
            let response = http
                .post(url)
                .json(&RefreshRequest {
                    refresh_token: &refresh_token,
                })
                .send()
                .await
                .map_err(|e| ApiError::from_transport(&e))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ApiError::from_transport(&e))?;

            if !status.is_success() {
                return Err(ApiError::Status { status, body });
            }
            decode_body::<TokenPair>(status, &body)
        })
        .await;

        match result {
            Ok(pair) => {
                self.tokens.apply_pair(&pair);
                metrics::record_token_refresh("success");
                tracing::info!("Access token refreshed");
                Ok(())
            }
            Err(e) => {
                metrics::record_token_refresh("failure");
                Err(e)
            }
        }
    }
}

impl RequestLayer for AuthInterceptor {
    fn on_request(&self, request: &mut OutgoingRequest) -> Result<(), ApiError> {
        if !request.same_origin
            || self.is_public(&request.path)
            || request.headers.contains_key(AUTHORIZATION)
        {
            return Ok(());
        }

        let Some(token) = self.current_token() else {
            return Ok(());
        };

        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ApiError::InvalidRequest("access token is not a valid header value".into()))?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
        request.credential = Some(token);
        Ok(())
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("public_prefixes", &self.public_prefixes)
            .field("refresh_path", &self.refresh_path)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/') || rest.starts_with('?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::StaticSession;
    use crate::http::request::RequestContext;
    use reqwest::Method;

    fn interceptor() -> AuthInterceptor {
        let tokens = Arc::new(TokenStore::new());
        tokens.set_tokens("stored", "refresh");
        AuthInterceptor::new(&AuthConfig::default(), tokens)
    }

    fn outgoing(path: &str) -> OutgoingRequest {
        let ctx = RequestContext::new(Method::GET, path);
        OutgoingRequest::from_context(&ctx, "https://api.shop.test/v1", 1).unwrap()
    }

    #[test]
    fn test_public_prefixes_respect_segment_boundaries() {
        let auth = interceptor();
        assert!(auth.is_public("/products"));
        assert!(auth.is_public("/products/42"));
        assert!(auth.is_public("/auth/login"));
        assert!(!auth.is_public("/products-admin"));
        assert!(!auth.is_public("/orders"));
    }

    #[test]
    fn test_attaches_bearer_to_private_paths() {
        let auth = interceptor();
        let mut request = outgoing("/orders");
        auth.on_request(&mut request).unwrap();

        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer stored");
        assert_eq!(request.credential.as_deref(), Some("stored"));
    }

    #[test]
    fn test_skips_public_paths() {
        let auth = interceptor();
        let mut request = outgoing("/categories/shoes");
        auth.on_request(&mut request).unwrap();
        assert!(request.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_foreign_origin_gets_no_credentials() {
        let auth = interceptor();
        for path in [
            "https://tracking.carrier.test/parcels/9",
            "http://api.shop.test/v1/orders",
        ] {
            let mut request = outgoing(path);
            auth.on_request(&mut request).unwrap();
            assert!(request.headers.get(AUTHORIZATION).is_none(), "{path}");
            assert!(request.credential.is_none());
        }
    }

    #[test]
    fn test_relative_public_path_without_slash() {
        let auth = interceptor();
        let mut request = outgoing("products/1");
        auth.on_request(&mut request).unwrap();
        assert!(request.headers.get(AUTHORIZATION).is_none());

        let mut request = outgoing("orders/1");
        auth.on_request(&mut request).unwrap();
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer stored");
    }

    #[test]
    fn test_keeps_existing_authorization() {
        let auth = interceptor();
        let mut request = outgoing("/orders");
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer caller"));
        auth.on_request(&mut request).unwrap();
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer caller");
    }

    #[test]
    fn test_session_token_wins_over_store() {
        let auth = interceptor().with_session(Arc::new(StaticSession("session".into())));
        let mut request = outgoing("/seller/dashboard");
        auth.on_request(&mut request).unwrap();
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer session");
    }

    #[test]
    fn test_no_token_means_no_header() {
        let auth = AuthInterceptor::new(&AuthConfig::default(), Arc::new(TokenStore::new()));
        let mut request = outgoing("/orders");
        auth.on_request(&mut request).unwrap();
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert!(!auth.can_refresh("/orders"));
    }

    #[test]
    fn test_refresh_not_offered_for_public_paths() {
        let auth = interceptor();
        assert!(auth.can_refresh("/cart"));
        assert!(!auth.can_refresh("/auth/login"));
    }
}
