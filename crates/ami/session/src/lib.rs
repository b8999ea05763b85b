//! # AMI Session - Event dispatch and session health
//!
//! Owns the manager connection for the life of the process and keeps it
//! usable.
//!
//! ## Key Components
//!
//! - [`EventDispatcher`]: the single dispatch point. Standing filters see
//!   every event; action-scoped filters are keyed by correlation id
//! - [`Session`]: connection, dispatch point and login state
//! - [`SessionHealthMonitor`]: login validation, event-reader liveness,
//!   idle `Ping` probing and reconnect
//! - [`resilience`]: exponential backoff and a circuit breaker bounding
//!   reconnect attempts
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ami_protocol::{AmiClient, ClientConfig};
//! use ami_session::{Credentials, Session, SessionConfig, SessionHealthMonitor};
//!
//! # async fn example() -> ami_session::SessionResult<()> {
//! let client = Arc::new(AmiClient::new(ClientConfig::default()));
//! let session = Arc::new(Session::new(client));
//! let monitor = SessionHealthMonitor::new(
//!     session,
//!     Credentials::new("exporter", "secret"),
//!     SessionConfig::default(),
//! );
//!
//! monitor.login().await?;
//! let outcome = monitor.ensure_healthy().await?;
//! println!("session available: {}", outcome.is_available());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod resilience;
pub mod session;

pub use config::{Credentials, ReconnectConfig, SessionConfig};
pub use dispatch::{CompletionHandle, EventDispatcher};
pub use error::{SessionError, SessionResult};
pub use health::{HealthOutcome, RecoveryReason, SessionHealthMonitor};
pub use session::Session;
