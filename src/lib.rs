//! HTTP Basic authentication gateway.
//!
//! One protected resource sits behind [`host_api::middleware::auth_gate`],
//! which checks credentials with an injected
//! [`credentials::CredentialValidator`]. The server runs either in the
//! foreground or under a supervisor that drives the lifecycle in
//! [`service`].

pub mod config;
pub mod credentials;
mod error;
pub mod host_api;
pub mod service;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
