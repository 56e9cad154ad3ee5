//! Secret types for keeping passwords and tokens out of logs.
//!
//! This module re-exports types from the [`secrecy`] crate and adds
//! [`UserCredentials`], the username/password pair handed to the identity
//! provider during the password grant.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that holds one is safe to pass to `{:?}` or to tracing fields.
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, UserCredentials};
//!
//! let alice = UserCredentials::new("alice", "hunter2");
//!
//! // Debug output never contains the password
//! assert!(!format!("{alice:?}").contains("hunter2"));
//!
//! // Reading the password is always explicit
//! assert_eq!(alice.password().expose_secret(), "hunter2");
//! ```
//!
//! Use `SecretString` for:
//! - User passwords
//! - OAuth client secrets
//! - Access and refresh tokens

pub use secrecy::{ExposeSecret, SecretString};

/// Resource-owner credentials for the OAuth 2.0 password grant.
#[derive(Clone)]
pub struct UserCredentials {
    username: String,
    password: SecretString,
}

impl UserCredentials {
    /// Create credentials from a username and a plain password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// The username sent to the identity provider.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password, still wrapped.
    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = UserCredentials::new("alice", "hunter2");
        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("alice"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_credentials_expose_password() {
        let creds = UserCredentials::new("admin", "admin-pass");
        assert_eq!(creds.username(), "admin");
        assert_eq!(creds.password().expose_secret(), "admin-pass");
    }

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let secret = SecretString::from("eyJhbGciOiJSUzI1NiJ9.payload.sig");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("eyJhbGciOiJSUzI1NiJ9"));
    }

    #[test]
    fn test_deserialize_client_secret() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Credentials {
            secret: SecretString,
        }

        let json = r#"{"secret": "1daa57a2-b60e-468b"}"#;
        let creds: Credentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.secret.expose_secret(), "1daa57a2-b60e-468b");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("1daa57a2"));
    }

    #[test]
    fn test_clone_keeps_password() {
        let creds = UserCredentials::new("alice", "password");
        let cloned = creds.clone();
        assert_eq!(cloned.password().expose_secret(), "password");
    }
}
