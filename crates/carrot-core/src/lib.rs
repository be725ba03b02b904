//! Offline-tolerant signed-request client for the Carrot game-services
//! backend.
//!
//! Games report achievements, scores, and social actions through a
//! [`CarrotSession`]. Every call is persisted to a local `SQLite`-backed
//! queue before any network attempt, signed with HMAC-SHA256 over a canonical
//! request string, and replayed automatically (when the backend was
//! unreachable or the user was not yet authorized) once the session becomes
//! [`AuthStatus::Ready`].
//!
//! # Example
//!
//! ```rust,no_run
//! use carrot_core::{CarrotSession, SessionConfig};
//! use secrecy::SecretString;
//!
//! # fn example() -> Result<(), carrot_core::CarrotError> {
//! let config = SessionConfig::new("my-app-id", SecretString::from("app-secret".to_string()))
//!     .with_cache_path("/data/carrot.db");
//! let session = CarrotSession::new(config, "player-123")?;
//!
//! session.subscribe(|status| println!("auth status: {status}"));
//!
//! // Queued durably even while offline; sent once validation succeeds.
//! session.post_achievement("first_blood")?;
//! session.validate_user("facebook-access-token")?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
mod sign;
pub mod session;
pub mod transport;

pub use auth::{AuthStatus, Response, SubscriptionId};
pub use cache::{CacheError, CachedRequest, RequestCache};
pub use config::{HttpConfig, SessionConfig};
pub use error::CarrotError;
pub use session::{CarrotSession, ViralObject};
pub use transport::{HttpTransport, Transport, TransportError, WireReply, WireRequest};
