//! The storefront API client.
//!
//! # Responsibilities
//! - Own the HTTP transport, token store, breaker and retry policy
//! - Drive each logical request through the pipeline, the breaker and retries
//! - Answer a 401 with one refresh-and-replay
//! - Hand callers decoded payloads or a `NormalizedError`
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → proactive refresh (token near expiry)
//!     → loop per attempt:
//!         OutgoingRequest → pipeline.prepare
//!         → breaker(endpoint key) → deadline + cancellation → transport
//!         → pipeline.complete
//!         → 401: refresh once, replay
//!         → transient + idempotent: back off, retry
//!     → decode_body / normalize
//! ```
//!
//! # Design Decisions
//! - One client type; server-side use plugs in a `SessionProvider`
//! - Every dependency is passed in through the builder, nothing is global
//! - The correlation id and the breaker key are fixed per logical request
//! - Credentials and refresh only apply to the base URL's origin
//! - Only network errors, timeouts and 5xx count against the breaker

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthInterceptor, FilePersistence, SessionProvider, TokenPair, TokenStore};
use crate::config::ClientConfig;
use crate::error::{normalize, ApiError, NormalizedError};
use crate::http::middleware::{
    JsonHeadersLayer, Pipeline, RequestLayer, ResponseLayer, StatusLayer, TraceLayer,
};
use crate::http::request::{OutgoingRequest, RequestContext, RequestIdLayer};
use crate::http::response::{decode_body, RawResponse};
use crate::observability::metrics;
use crate::resilience::timeouts::{cancellable, sleep_unless_cancelled, with_deadline};
use crate::resilience::{CircuitBreaker, RetryPolicy};

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    pipeline: Pipeline,
    auth: Arc<AuthInterceptor>,
    tokens: Arc<TokenStore>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

/// Resilient client for the storefront REST API.
///
/// Cheap to clone; clones share tokens, breaker state and connections.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

/// Assembles an `ApiClient` from configuration and optional collaborators.
pub struct ApiClientBuilder {
    config: ClientConfig,
    tokens: Option<Arc<TokenStore>>,
    breaker: Option<Arc<CircuitBreaker>>,
    session: Option<Arc<dyn SessionProvider>>,
    request_layers: Vec<Arc<dyn RequestLayer>>,
    response_layers: Vec<Arc<dyn ResponseLayer>>,
    http: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            tokens: None,
            breaker: None,
            session: None,
            request_layers: Vec::new(),
            response_layers: Vec::new(),
            http: None,
        }
    }

    /// Share a token store with other clients.
    pub fn token_store(mut self, tokens: Arc<TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Share breaker state with other clients.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Take access tokens from a per-request session instead of the store.
    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Runs after the built-in request layers.
    pub fn request_layer(mut self, layer: Arc<dyn RequestLayer>) -> Self {
        self.request_layers.push(layer);
        self
    }

    /// Runs after the status check and before tracing.
    pub fn response_layer(mut self, layer: Arc<dyn ResponseLayer>) -> Self {
        self.response_layers.push(layer);
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .connect_timeout(config.api.connect_timeout())
                .build()
                .map_err(|e| ApiError::InvalidRequest(format!("failed to build HTTP client: {e}")))?,
        };

        let tokens = self.tokens.unwrap_or_else(|| {
            let store = match &config.auth.token_file {
                Some(path) => TokenStore::with_persistence(FilePersistence::new(path)),
                None => TokenStore::new(),
            };
            Arc::new(store.with_expiry_margin(config.auth.expiry_margin()))
        });

        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(&config.circuit_breaker)));

        let mut auth = AuthInterceptor::new(&config.auth, tokens.clone());
        if let Some(session) = self.session {
            auth = auth.with_session(session);
        }
        let auth = Arc::new(auth);

        let header = config
            .observability
            .request_id_header
            .parse()
            .map_err(|_| {
                ApiError::InvalidRequest(format!(
                    "invalid request id header '{}'",
                    config.observability.request_id_header
                ))
            })?;

        let mut pipeline = Pipeline::new()
            .with_request_layer(Arc::new(RequestIdLayer::new(header)))
            .with_request_layer(Arc::new(JsonHeadersLayer::new(&config.api.user_agent)?))
            .with_request_layer(auth.clone());
        for layer in self.request_layers {
            pipeline = pipeline.with_request_layer(layer);
        }
        pipeline = pipeline.with_response_layer(Arc::new(StatusLayer));
        for layer in self.response_layers {
            pipeline = pipeline.with_response_layer(layer);
        }
        pipeline = pipeline.with_response_layer(Arc::new(TraceLayer));

        let retry = RetryPolicy::new(&config.retries);

        tracing::debug!(
            base_url = %config.api.base_url,
            max_retries = retry.max_retries(),
            breaker = config.circuit_breaker.enabled,
            "API client ready"
        );

        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                config,
                pipeline,
                auth,
                tokens,
                breaker,
                retry,
            }),
        })
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        ApiClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, NormalizedError> {
        self.send(RequestContext::new(Method::GET, path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, NormalizedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::POST, path, body).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, NormalizedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PUT, path, body).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, NormalizedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PATCH, path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, NormalizedError> {
        self.send(RequestContext::new(Method::DELETE, path)).await
    }

    async fn send_json<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, NormalizedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let ctx = RequestContext::new(method, path)
            .with_json(body)
            .map_err(normalize)?;
        self.send(ctx).await
    }

    /// Execute `ctx` and decode the payload, unwrapping a success envelope.
    pub async fn send<T: DeserializeOwned>(&self, ctx: RequestContext) -> Result<T, NormalizedError> {
        let response = self.send_raw(ctx).await?;
        decode_body(response.status, &response.body).map_err(normalize)
    }

    /// Execute `ctx` and return the undecoded 2xx response.
    pub async fn send_raw(&self, ctx: RequestContext) -> Result<RawResponse, NormalizedError> {
        self.run(ctx).await.map_err(normalize)
    }

    /// Exchange credentials for a token pair and store it.
    pub async fn login<B: Serialize + ?Sized>(&self, credentials: &B) -> Result<TokenPair, NormalizedError> {
        let pair: TokenPair = self.post(&self.inner.config.auth.login_path, credentials).await?;
        self.inner.tokens.apply_pair(&pair);
        tracing::info!("Logged in");
        Ok(pair)
    }

    /// Tell the backend to revoke the session, then drop local tokens.
    ///
    /// Local tokens are cleared even when the backend call fails.
    pub async fn logout(&self) -> Result<(), NormalizedError> {
        let body = serde_json::json!({ "refreshToken": self.inner.tokens.refresh_token() });
        let result = self
            .post::<serde_json::Value, _>(&self.inner.config.auth.logout_path, &body)
            .await;
        self.inner.tokens.clear_tokens();
        tracing::info!(remote_ok = result.is_ok(), "Logged out");
        result.map(|_| ())
    }

    async fn run(&self, mut ctx: RequestContext) -> Result<RawResponse, ApiError> {
        let inner = &self.inner;
        let base_url = inner.config.api.base_url.as_str();
        let endpoint = ctx.endpoint(base_url)?;
        let key = endpoint.key.clone();
        let deadline = ctx.timeout.unwrap_or_else(|| inner.config.api.timeout());

        if endpoint.same_origin {
            self.refresh_ahead(&key, deadline).await;
        }

        let mut attempt = 0;
        let mut retries = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            attempt += 1;

            let mut outgoing = OutgoingRequest::from_context(&ctx, base_url, attempt)?;
            inner.pipeline.prepare(&mut outgoing)?;

            let result = inner
                .breaker
                .execute_with(
                    &key,
                    || async {
                        let outcome = cancellable(
                            ctx.cancel.as_ref(),
                            with_deadline(deadline, transmit(&inner.http, &outgoing)),
                        )
                        .await;
                        inner.pipeline.complete(&outgoing, outcome)
                    },
                    ApiError::trips_breaker,
                )
                .await;

            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if err.status() == Some(StatusCode::UNAUTHORIZED)
                && !ctx.auth_replayed
                && outgoing.same_origin
                && !ctx.headers.contains_key(AUTHORIZATION)
                && inner.auth.can_refresh(&key)
            {
                ctx.auth_replayed = true;
                let replay = inner
                    .auth
                    .recover_from_unauthorized(
                        &inner.http,
                        base_url,
                        outgoing.credential.as_deref(),
                        deadline,
                    )
                    .await;
                if replay {
                    tracing::debug!(request_id = %ctx.request_id, path = %key, "Replaying with refreshed token");
                    continue;
                }
                return Err(err);
            }

            if inner.retry.should_retry(&ctx.method, &err, retries) && !ctx.is_cancelled() {
                retries += 1;
                let delay = inner.retry.delay_for(retries);
                tracing::info!(
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    path = %key,
                    retry = retries,
                    max_retries = inner.retry.max_retries(),
                    ?delay,
                    error = %err,
                    "Retrying request"
                );
                metrics::record_retry(ctx.method.as_str(), retry_reason(&err));
                sleep_unless_cancelled(ctx.cancel.as_ref(), delay).await?;
                continue;
            }

            if let ApiError::CircuitOpen { retry_in, .. } = &err {
                tracing::warn!(path = %key, ?retry_in, "Circuit open, failing fast");
            }
            return Err(err);
        }
    }

    /// Refresh before sending when the stored token is known to be expiring.
    async fn refresh_ahead(&self, path: &str, deadline: Duration) {
        let inner = &self.inner;
        if !inner.config.auth.proactive_refresh
            || inner.auth.is_public(path)
            || inner.tokens.expires_at().is_none()
            || !inner.tokens.is_expired()
            || inner.tokens.refresh_token().is_none()
        {
            return;
        }

        let stale = inner.tokens.access_token();
        if let Err(e) = inner
            .auth
            .refresh(&inner.http, &inner.config.api.base_url, stale.as_deref(), deadline)
            .await
        {
            tracing::warn!(error = %e, "Proactive token refresh failed");
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.api.base_url)
            .field("pipeline", &self.inner.pipeline)
            .field("retry", &self.inner.retry)
            .finish()
    }
}

async fn transmit(http: &reqwest::Client, request: &OutgoingRequest) -> Result<RawResponse, ApiError> {
    let mut builder = http
        .request(request.method.clone(), request.url.clone())
        .headers(request.headers.clone());
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let response = builder
        .send()
        .await
        .map_err(|e| ApiError::from_transport(&e))?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::from_transport(&e))?;

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

fn retry_reason(err: &ApiError) -> &'static str {
    match err {
        ApiError::Network(_) => "network",
        ApiError::Timeout(_) => "timeout",
        ApiError::Status { status, .. } if status.is_server_error() => "server_error",
        ApiError::Status { .. } => "status",
        _ => "other",
    }
}
