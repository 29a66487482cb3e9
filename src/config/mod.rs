//! Configuration management
//!
//! Handles declaration-time settings (the index-check escape hatch) and
//! Postgres connection profiles.

pub mod connections;
pub mod settings;

pub use connections::{ConnectionConfig, SslMode};
pub use settings::{SKIP_INDEX_CHECK_ENV, Settings, load_settings};
