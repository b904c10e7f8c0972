//! Credential Store Client for agentexec.
//!
//! Per-user OAuth token bundles: persistence goes through the core
//! `CredentialStore` trait, renewal through a [`TokenRefresher`].
//! Tools only see the `CredentialProvider` contract.

pub mod oauth;
pub mod scopes;
pub mod service;

pub use oauth::{GoogleOAuthClient, TokenGrant, TokenRefresher};
pub use service::{CredentialService, NewToken, display_name};

/// Service key under which Google tokens are stored.
pub const GOOGLE_SERVICE: &str = "google";
