//! # AMI Protocol - Asterisk Manager Interface client
//!
//! Wire format and async client for the Asterisk Manager Interface.
//!
//! ## Key Components
//!
//! - [`Event`], [`Response`], [`ActionRequest`]: message types
//! - [`codec`]: block framing (`Key: Value` lines, blank-line terminated)
//! - [`AmiConnection`]: the connection contract the rest of the exporter
//!   depends on
//! - [`AmiClient`]: TCP implementation with a background event reader
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ami_protocol::{AmiClient, AmiConnection, ClientConfig, Event};
//!
//! # async fn example() -> ami_protocol::ProtocolResult<()> {
//! let client = AmiClient::new(ClientConfig::default());
//! client.add_event_listener(Arc::new(|event: &Event| {
//!     println!("{}", event.name());
//! }));
//! client.connect().await?;
//! client.login("exporter", "secret").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod message;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{AmiClient, ClientConfig};
pub use connection::{AmiConnection, EventListener, ListenerId, ListenerSet};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{ActionId, ActionRequest, Event, Response, ResponseStatus, ACTION_ID_KEY};
