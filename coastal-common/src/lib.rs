//! Coastal Common - Shared configuration, errors, and logging for the
//! Coastal disaster-preparedness services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup
//! - Small utility functions used across Coastal services

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    AdminConfig, CityConfig, Config, ObservabilityConfig, ProviderConfig, SecretsConfig,
    ServerConfig, StorageConfig,
};
pub use error::{Error, Result};
