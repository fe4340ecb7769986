//! Configuration module for the M4B assembler
//!
//! Handles loading configuration from TOML files and environment variable overrides.

pub mod config;

pub use config::*;
