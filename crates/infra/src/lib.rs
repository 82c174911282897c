//! # Receptionist Infrastructure
//!
//! Wiring around the authentication core in `receptionist-common`.
//!
//! This crate contains:
//! - Configuration loading (environment, JSON and TOML files)
//! - Tracing subscriber setup
//! - The authenticated backend API client
//!
//! ## Architecture
//! - Depends on `receptionist-common` for the session manager
//! - Contains the process-level "impure" code (env, files, HTTP)

pub mod api;
pub mod config;
pub mod logging;

pub use api::{AccessTokenProvider, ApiClient, ApiClientConfig, ApiError};
pub use config::{AppConfig, ConfigError, IdentitySettings};
pub use logging::{init_tracing, LogFormat};
