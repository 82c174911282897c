//! Backend API access
//!
//! HTTP client for the Receptionist backend. Requests are authenticated
//! with the access token held by the session manager.
//!
//! # Architecture
//!
//! - [`AccessTokenProvider`] decouples the client from the session manager
//! - Status codes map onto [`ApiError`] with retry metadata
//! - A session that needs an interactive login surfaces as
//!   [`ApiError::LoginRequired`], never retried

pub mod auth;
pub mod client;
pub mod errors;

pub use auth::AccessTokenProvider;
pub use client::{ApiClient, ApiClientBuilder, ApiClientConfig};
pub use errors::{ApiError, ApiErrorCategory};
