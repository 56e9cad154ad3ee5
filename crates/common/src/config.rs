//! SSO client configuration.
//!
//! The identity provider client is described by a Keycloak adapter document
//! (`keycloak.json`). Its `auth-server-url` is not known until the SSO route
//! has been resolved, so the document is a template: string values may carry
//! `${name}` or `${name:default}` placeholders, filled from a substitution map
//! the caller passes in.

use crate::secret::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::Path;
use thiserror::Error;

/// Placeholder used for the resolved identity provider URL.
pub const SSO_AUTH_SERVER_URL: &str = "sso.auth.server.url";

/// Errors raised while loading the SSO client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SSO client configuration not found at {0}")]
    TemplateNotFound(String),

    #[error("Failed to read SSO client configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SSO client configuration: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("No substitution for placeholder ${{{0}}}")]
    UnresolvedPlaceholder(String),

    #[error("Invalid SSO client configuration field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Confidential client credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientCredentials {
    /// Client secret; absent for public clients.
    #[serde(default)]
    pub secret: Option<SecretString>,
}

/// Keycloak adapter configuration for the probing client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SsoClientConfig {
    /// Realm the test users live in
    pub realm: String,
    /// Base URL of the identity provider, e.g. `https://sso.example.com/auth`
    pub auth_server_url: String,
    /// OAuth client ID
    pub resource: String,
    #[serde(default)]
    pub credentials: ClientCredentials,
    #[serde(default)]
    pub ssl_required: Option<String>,
}

impl SsoClientConfig {
    /// Parse a configuration template, substituting placeholders from `substitutions`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnresolvedPlaceholder` when a placeholder has no
    /// substitution and no default, `ConfigError::InvalidJson` for malformed
    /// documents, and `ConfigError::InvalidField` for empty required fields.
    pub fn from_template<S: BuildHasher>(
        template: &str,
        substitutions: &HashMap<String, String, S>,
    ) -> Result<Self, ConfigError> {
        let mut document: serde_json::Value = serde_json::from_str(template)?;
        substitute_values(&mut document, substitutions)?;

        let config: Self = serde_json::from_value(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration template from disk.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TemplateNotFound` when `path` does not exist, plus
    /// everything [`SsoClientConfig::from_template`] can return.
    pub fn load<S: BuildHasher>(
        path: &Path,
        substitutions: &HashMap<String, String, S>,
    ) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::TemplateNotFound(path.display().to_string()));
        }

        let template = std::fs::read_to_string(path)?;
        Self::from_template(&template, substitutions)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("realm", &self.realm),
            ("resource", &self.resource),
            ("auth-server-url", &self.auth_server_url),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidField {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if !self.auth_server_url.starts_with("http://")
            && !self.auth_server_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidField {
                field: "auth-server-url",
                reason: format!("not an http(s) URL: {}", self.auth_server_url),
            });
        }

        Ok(())
    }

    /// The OAuth client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.resource
    }

    /// Realm base URL, which is also the token issuer.
    #[must_use]
    pub fn realm_url(&self) -> String {
        format!(
            "{}/realms/{}",
            self.auth_server_url.trim_end_matches('/'),
            self.realm
        )
    }

    /// OpenID-Connect token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url())
    }

    /// OpenID-Connect JWKS endpoint.
    #[must_use]
    pub fn jwks_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.realm_url())
    }
}

/// Walk a JSON document and substitute placeholders in every string value.
fn substitute_values<S: BuildHasher>(
    value: &mut serde_json::Value,
    substitutions: &HashMap<String, String, S>,
) -> Result<(), ConfigError> {
    match value {
        serde_json::Value::String(s) => {
            *s = substitute_placeholders(s, substitutions)?;
        }
        serde_json::Value::Array(items) => {
            for item in items {
                substitute_values(item, substitutions)?;
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                substitute_values(item, substitutions)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Replace `${name}` and `${name:default}` placeholders in `input`.
///
/// An unterminated `${` is copied through unchanged.
///
/// # Errors
///
/// Returns `ConfigError::UnresolvedPlaceholder` for a placeholder with neither a
/// substitution nor a default.
pub fn substitute_placeholders<S: BuildHasher>(
    input: &str,
    substitutions: &HashMap<String, String, S>,
) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((before, after_open)) = rest.split_once("${") {
        output.push_str(before);

        let Some((expression, after_close)) = after_open.split_once('}') else {
            output.push_str("${");
            output.push_str(after_open);
            return Ok(output);
        };

        let (name, default) = match expression.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (expression, None),
        };

        match (substitutions.get(name), default) {
            (Some(value), _) => output.push_str(value),
            (None, Some(default)) => output.push_str(default),
            (None, None) => return Err(ConfigError::UnresolvedPlaceholder(name.to_string())),
        }

        rest = after_close;
    }

    output.push_str(rest);
    Ok(output)
}
