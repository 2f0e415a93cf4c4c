//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! login / refresh response
//!     → token_store.rs (atomic swap of the token pair)
//!     → persistence.rs (memory or JSON file)
//!
//! Outgoing request:
//!     → interceptor.rs (attach bearer from session.rs or the store)
//!
//! 401 response:
//!     → interceptor.rs (refresh once, replay, or clear credentials)
//! ```

pub mod interceptor;
pub mod persistence;
pub mod session;
pub mod token_store;

pub use interceptor::AuthInterceptor;
pub use persistence::{FilePersistence, MemoryPersistence, TokenPersistence, TokenStoreError};
pub use session::{SessionProvider, StaticSession};
pub use token_store::{TokenPair, TokenRecord, TokenStore};
