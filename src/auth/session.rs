//! Credential source for request-handling (server) contexts.
//!
//! When the client runs inside a server that renders pages for a signed-in
//! user, the access token belongs to that user's session rather than to the
//! process-wide token store.

/// Supplies the access token of the active session.
pub trait SessionProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl<F> SessionProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// A session with a fixed token.
#[derive(Clone)]
pub struct StaticSession(pub String);

impl SessionProvider for StaticSession {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl std::fmt::Debug for StaticSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticSession(<redacted>)")
    }
}
