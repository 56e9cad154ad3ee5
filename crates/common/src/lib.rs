//! Common utilities and types shared across the secured booster test crates.

#![warn(clippy::pedantic)]

/// Module for SSO client configuration (template loading and substitution)
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for OAuth 2.0 password-grant token acquisition
pub mod token_client;
