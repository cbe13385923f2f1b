//! # Cellauth Config
//!
//! Configuration for a cell's authentication core: the cell's URL and
//! signing key, token lifetimes, and the settings used to fetch and cache
//! other cells' public keys.
//!
//! Configurations can be built in code, or loaded from JSON, TOML (feature
//! `toml`, on by default) or environment variables. Every loading path ends
//! in [`CellConfig::validate`].

mod config;

pub use config::{try_load_default_config, CellConfig, CellConfigBuilder, ConfigError};
