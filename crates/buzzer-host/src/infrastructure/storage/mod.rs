//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform-appropriate directory (or an explicit `--config` path), writes it
//! back when asked, and falls back to defaults when the file does not exist
//! yet.

pub mod config;
