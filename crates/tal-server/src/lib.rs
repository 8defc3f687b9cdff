//! HTTP server for the Ticket Audit Ledger.
//!
//! Exposes the ledger over a small JSON API: append, list, lookup by id or
//! subject, chain verification, flagged discrepancies, and the notification
//! inbox. Also owns the
//! TOML configuration shared with the `tal` binary.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{ConfigError, LedgerConfig, ServerConfig, SimulationConfig, TalConfig};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::TalServer;
