//! Flowcast observer client.
//!
//! A [`ConnectionManager`] keeps one connection to the hub for a workflow
//! and retries with bounded backoff. An [`Observer`] pairs it with an
//! [`ExecutionTracker`] that folds incoming frames into the current
//! execution snapshot.

pub mod backoff;
pub mod config;
pub mod error;
pub mod manager;
pub mod observer;
pub mod tracker;

pub use backoff::{Reconnect, ReconnectPolicy, ReconnectState};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use manager::{ClientEvent, ConnectionManager, ConnectionState};
pub use observer::{Observer, Snapshot};
pub use tracker::ExecutionTracker;
