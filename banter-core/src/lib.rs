//! Banter chat core.
//!
//! The messaging subsystem behind the Banter application: chat aggregates
//! with denormalized previews and unread counters, per-(message, user)
//! delivery/read tracking, notification fan-out with per-chat mutes, and a
//! two-phase attachment pipeline. State lives in an abstract document store
//! and every mutation is pushed to connected clients through the realtime
//! [`hub::Hub`] as fire-and-forget events; the store stays authoritative.

pub mod error;
pub mod events;
pub mod hub;
pub mod limits;
pub mod models;
pub mod services;
pub mod sink;
pub mod store;

pub use error::{Error, Result};
pub use events::ServerEvent;
pub use hub::Hub;
pub use services::Core;
