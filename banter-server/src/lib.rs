//! Banter realtime gateway.
//!
//! Exposes the connection handler and configuration so integration tests can
//! drive a real server.

mod commands;
mod config;
mod connection;

pub use commands::ClientCommand;
pub use config::{Config, SeedUser};
pub use connection::{handle_command, handle_connection};
