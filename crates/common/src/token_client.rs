//! OAuth 2.0 Resource-Owner Password Credentials token client.
//!
//! Exchanges a username and password for an access token at the identity
//! provider's OpenID-Connect token endpoint. Every call builds its own HTTP
//! client, and tokens are handed to the caller as-is: nothing is cached,
//! refreshed or retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::config::SsoClientConfig;
//! use common::secret::UserCredentials;
//! use common::token_client::{TokenClient, TokenClientConfig, TrustPolicy};
//!
//! let sso = SsoClientConfig::from_template(template, &substitutions)?;
//! let client = TokenClient::new(TokenClientConfig::new(sso, TrustPolicy::AcceptSelfSigned));
//!
//! let token = client
//!     .obtain_access_token(&UserCredentials::new("alice", "password"))
//!     .await?;
//! let header = format!("Bearer {}", token.secret().expose_secret());
//! ```
//!
//! # Security
//!
//! - Passwords, client secrets and tokens are `SecretString` (never logged)
//! - Relaxed TLS verification must be requested through [`TrustPolicy`]
//! - Error bodies are truncated before they are stored in errors

use crate::config::SsoClientConfig;
use crate::secret::{ExposeSecret, SecretString, UserCredentials};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of characters of an error body kept in errors.
const MAX_ERROR_BODY_CHARS: usize = 256;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the identity provider.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// HTTP transport error (connect, TLS, timeout).
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Credentials rejected by the identity provider (401, 400).
    #[error("Authentication rejected with status {status}: {body}")]
    AuthenticationRejected { status: u16, body: String },

    /// Any other non-success status.
    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// Response parsing failed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TokenError {
    /// HTTP status returned by the identity provider, if the request got that far.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            TokenError::AuthenticationRejected { status, .. }
            | TokenError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// How the client treats the identity provider's TLS certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Verify the certificate chain and hostname.
    VerifyCertificates,

    /// Accept any certificate. Only for test environments with self-signed
    /// certificates.
    AcceptSelfSigned,
}

/// Configuration for the token client.
#[derive(Debug, Clone)]
pub struct TokenClientConfig {
    /// SSO client configuration (endpoints, client ID, client secret).
    pub sso: SsoClientConfig,

    /// TLS trust policy for the identity provider.
    pub trust: TrustPolicy,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl TokenClientConfig {
    /// Create a new configuration with the default timeout.
    ///
    /// The trust policy has no default and must always be chosen explicitly.
    #[must_use]
    pub fn new(sso: SsoClientConfig, trust: TrustPolicy) -> Self {
        Self {
            sso,
            trust,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

// =============================================================================
// Token Types
// =============================================================================

/// An access token issued for one test case.
#[derive(Clone)]
pub struct AccessToken {
    token: SecretString,
    token_type: String,
    expires_in: u64,
    expires_at: DateTime<Utc>,
    refresh_token: Option<SecretString>,
    scope: Option<String>,
}

impl AccessToken {
    /// Wrap an already issued bearer token valid for `expires_in` seconds from now.
    #[must_use]
    pub fn bearer(token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            token: SecretString::from(token.into()),
            token_type: default_token_type(),
            expires_in,
            expires_at: expiry_from_now(expires_in),
            refresh_token: None,
            scope: None,
        }
    }

    /// The bearer credential.
    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.token
    }

    /// Token type as reported by the identity provider (usually `Bearer`).
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Lifetime in seconds, as reported at issuance.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Absolute expiry computed from `expires_in` at issuance.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Refresh token, when the identity provider issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    /// Granted scopes.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth 2.0 token response from the identity provider.
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for OAuthTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

fn expiry_from_now(expires_in: u64) -> DateTime<Utc> {
    let lifetime = i64::try_from(expires_in).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(lifetime)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl From<OAuthTokenResponse> for AccessToken {
    fn from(response: OAuthTokenResponse) -> Self {
        Self {
            token: SecretString::from(response.access_token),
            token_type: response.token_type,
            expires_in: response.expires_in,
            expires_at: expiry_from_now(response.expires_in),
            refresh_token: response.refresh_token.map(SecretString::from),
            scope: response.scope,
        }
    }
}

/// OAuth 2.0 error response (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// JWKS (JSON Web Key Set) response.
#[derive(Debug, Deserialize, Clone)]
pub struct JwksResponse {
    pub keys: Vec<JwkKey>,
}

impl JwksResponse {
    /// Find a key by its key ID.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&JwkKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// A single JWK (JSON Web Key).
#[derive(Debug, Deserialize, Clone)]
pub struct JwkKey {
    pub kty: String,
    pub kid: String,
    pub alg: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
}

// =============================================================================
// Token Client
// =============================================================================

/// Client for the identity provider's token and key endpoints.
#[derive(Debug, Clone)]
pub struct TokenClient {
    config: TokenClientConfig,
}

impl TokenClient {
    /// Create a new token client.
    #[must_use]
    pub fn new(config: TokenClientConfig) -> Self {
        Self { config }
    }

    /// SSO client configuration in use.
    #[must_use]
    pub fn sso(&self) -> &SsoClientConfig {
        &self.config.sso
    }

    /// Trust policy in use.
    #[must_use]
    pub fn trust_policy(&self) -> TrustPolicy {
        self.config.trust
    }

    /// Build a per-call HTTP client honouring the trust policy.
    fn http_client(&self) -> Result<reqwest::Client, TokenError> {
        let builder = reqwest::Client::builder()
            .timeout(self.config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT);

        let builder = match self.config.trust {
            TrustPolicy::VerifyCertificates => builder,
            TrustPolicy::AcceptSelfSigned => builder.danger_accept_invalid_certs(true),
        };

        builder
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))
    }

    /// Obtain an access token with the password grant.
    ///
    /// # Errors
    ///
    /// - `TokenError::AuthenticationRejected` - invalid credentials (401, 400)
    /// - `TokenError::RequestFailed` - any other non-success status
    /// - `TokenError::HttpError` - transport failure
    /// - `TokenError::InvalidResponse` - malformed token response
    #[instrument(skip_all, fields(username = %credentials.username()))]
    pub async fn obtain_access_token(
        &self,
        credentials: &UserCredentials,
    ) -> Result<AccessToken, TokenError> {
        let url = self.config.sso.token_endpoint();
        let client_id = self.config.sso.client_id();

        debug!(
            target: "common.token_client",
            client_id = %client_id,
            url = %url,
            "Requesting token from identity provider"
        );

        let mut form_body = vec![
            ("grant_type", "password"),
            ("username", credentials.username()),
            ("password", credentials.password().expose_secret()),
            ("client_id", client_id),
        ];
        if let Some(secret) = &self.config.sso.credentials.secret {
            form_body.push(("client_secret", secret.expose_secret()));
        }

        let response = self
            .http_client()?
            .post(&url)
            .form(&form_body)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "common.token_client", error = %e, "HTTP request failed");
                TokenError::HttpError(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
                warn!(target: "common.token_client", error = %e, "Failed to parse token response");
                TokenError::InvalidResponse(e.to_string())
            })?;

            if token_response.access_token.is_empty() {
                return Err(TokenError::InvalidResponse(
                    "Empty access_token in token response".into(),
                ));
            }

            debug!(
                target: "common.token_client",
                expires_in_secs = token_response.expires_in,
                "Token acquired successfully"
            );

            return Ok(AccessToken::from(token_response));
        }

        let body = read_error_body(response).await;

        if status.as_u16() == 401 || status.as_u16() == 400 {
            warn!(
                target: "common.token_client",
                status = %status,
                "Authentication rejected by identity provider"
            );
            Err(TokenError::AuthenticationRejected {
                status: status.as_u16(),
                body,
            })
        } else {
            warn!(
                target: "common.token_client",
                status = %status,
                "Unexpected response from identity provider"
            );
            Err(TokenError::RequestFailed {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Fetch the realm's JSON Web Key Set.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::RequestFailed` for non-success statuses,
    /// `TokenError::HttpError` for transport failures, and
    /// `TokenError::InvalidResponse` for malformed key sets.
    #[instrument(skip_all)]
    pub async fn fetch_jwks(&self) -> Result<JwksResponse, TokenError> {
        let url = self.config.sso.jwks_endpoint();

        let response = self
            .http_client()?
            .get(&url)
            .send()
            .await
            .map_err(|e| TokenError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(TokenError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<JwksResponse>()
            .await
            .map_err(|e| TokenError::InvalidResponse(e.to_string()))
    }
}

/// Read an error body for diagnostics, preferring the OAuth error fields.
async fn read_error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_else(|e| {
        trace!(target: "common.token_client", error = %e, "Failed to read error response body");
        "<failed to read body>".to_string()
    });

    let summary = match serde_json::from_str::<OAuthErrorResponse>(&body) {
        Ok(OAuthErrorResponse {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(OAuthErrorResponse { error, .. }) => error,
        Err(_) => body,
    };

    truncate(&summary, MAX_ERROR_BODY_CHARS)
}

fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() > max_chars {
        let kept: String = input.chars().take(max_chars).collect();
        format!("{kept}...[truncated]")
    } else {
        input.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::config::SSO_AUTH_SERVER_URL;
    use std::collections::HashMap;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/auth/realms/master/protocol/openid-connect/token";
    const CERTS_PATH: &str = "/auth/realms/master/protocol/openid-connect/certs";

    fn sso_config(base_url: &str, secret: Option<&str>) -> SsoClientConfig {
        let credentials = match secret {
            Some(s) => format!(r#", "credentials": {{"secret": "{s}"}}"#),
            None => String::new(),
        };
        let template = format!(
            r#"{{"realm": "master", "auth-server-url": "${{{SSO_AUTH_SERVER_URL}}}", "resource": "demoapp"{credentials}}}"#
        );
        let vars = HashMap::from([(SSO_AUTH_SERVER_URL.to_string(), format!("{base_url}/auth"))]);
        SsoClientConfig::from_template(&template, &vars).unwrap()
    }

    fn test_client(base_url: &str) -> TokenClient {
        TokenClient::new(TokenClientConfig::new(
            sso_config(base_url, Some("client-secret")),
            TrustPolicy::AcceptSelfSigned,
        ))
    }

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    #[test]
    fn test_config_defaults() {
        let config = TokenClientConfig::new(
            sso_config("http://localhost:8080", None),
            TrustPolicy::VerifyCertificates,
        );

        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.trust, TrustPolicy::VerifyCertificates);
    }

    #[test]
    fn test_config_builder() {
        let config = TokenClientConfig::new(
            sso_config("http://localhost:8080", None),
            TrustPolicy::AcceptSelfSigned,
        )
        .with_http_timeout(Duration::from_secs(3));

        assert_eq!(config.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_debug_redacts_client_secret() {
        let config = TokenClientConfig::new(
            sso_config("http://localhost:8080", Some("super-secret-value")),
            TrustPolicy::AcceptSelfSigned,
        );

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-value"));
    }

    // =========================================================================
    // Token Acquisition Tests
    // =========================================================================

    #[tokio::test]
    async fn test_obtain_access_token_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=alice"))
            .and(body_string_contains("password=password"))
            .and(body_string_contains("client_id=demoapp"))
            .and(body_string_contains("client_secret=client-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "alice-token",
                "token_type": "bearer",
                "expires_in": 300,
                "refresh_expires_in": 1800,
                "refresh_token": "alice-refresh",
                "scope": "profile email"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let before = Utc::now();
        let token = client
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .unwrap();

        assert_eq!(token.secret().expose_secret(), "alice-token");
        assert_eq!(token.token_type(), "bearer");
        assert_eq!(token.expires_in(), 300);
        assert!(token.expires_at() >= before + chrono::Duration::seconds(300));
        assert!(!token.is_expired_at(Utc::now()));
        assert_eq!(
            token.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("alice-refresh".to_string())
        );
        assert_eq!(token.scope(), Some("profile email"));
    }

    #[tokio::test]
    async fn test_public_client_omits_client_secret() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "public-token",
                "expires_in": 60
            })))
            .mount(&mock_server)
            .await;

        let client = TokenClient::new(TokenClientConfig::new(
            sso_config(&mock_server.uri(), None),
            TrustPolicy::VerifyCertificates,
        ));
        let token = client
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .unwrap();

        assert_eq!(token.token_type(), "Bearer");

        let requests = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(!body.contains("client_secret"));
    }

    #[tokio::test]
    async fn test_401_authentication_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid user credentials"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let err = client
            .obtain_access_token(&UserCredentials::new("alice", "bad"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        match err {
            TokenError::AuthenticationRejected { body, .. } => {
                assert_eq!(body, "invalid_grant: Invalid user credentials");
            }
            other => panic!("expected AuthenticationRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_400_is_authentication_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "unauthorized_client"
            })))
            .mount(&mock_server)
            .await;

        let err = test_client(&mock_server.uri())
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TokenError::AuthenticationRejected { status: 400, ref body } if body == "unauthorized_client"
        ));
    }

    #[tokio::test]
    async fn test_500_is_request_failed_and_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = test_client(&mock_server.uri())
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_invalid_json_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let err = test_client(&mock_server.uri())
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .unwrap_err();

        assert!(matches!(err, TokenError::InvalidResponse(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_empty_access_token_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "",
                "expires_in": 300
            })))
            .mount(&mock_server)
            .await;

        let err = test_client(&mock_server.uri())
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .unwrap_err();

        assert!(matches!(err, TokenError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        // Port 1 is never listening in test environments
        let client = test_client("http://127.0.0.1:1");

        let err = client
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .unwrap_err();

        assert!(matches!(err, TokenError::HttpError(_)));
        assert_eq!(err.status(), None);
    }

    // =========================================================================
    // TLS Trust Policy Tests
    // =========================================================================

    /// Start an HTTPS token endpoint serving a freshly generated self-signed
    /// certificate. Returns its base URL.
    async fn start_self_signed_token_endpoint() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio_rustls::rustls::crypto::ring;
        use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
        use tokio_rustls::rustls::ServerConfig;
        use tokio_rustls::TlsAcceptor;

        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        ));
        let server_config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![certified.cert.der().clone()], key)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    // Verifying clients abort the handshake
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };

                    let mut request = Vec::new();
                    let mut buf = [0u8; 4096];
                    while !request_complete(&request) {
                        match tls.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let body = r#"{"access_token":"tls-token","token_type":"bearer","expires_in":60}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = tls.write_all(response.as_bytes()).await;
                    let _ = tls.shutdown().await;
                });
            }
        });

        format!("https://{addr}")
    }

    /// Whether `request` holds the full headers and a body of `content-length` bytes.
    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((headers, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };

        let content_length = headers
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        body.len() >= content_length
    }

    #[tokio::test]
    async fn test_accept_self_signed_trusts_unknown_certificate() {
        let base_url = start_self_signed_token_endpoint().await;
        let client = TokenClient::new(TokenClientConfig::new(
            sso_config(&base_url, None),
            TrustPolicy::AcceptSelfSigned,
        ));

        let token = client
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .expect("self-signed certificate should be accepted");

        assert_eq!(token.secret().expose_secret(), "tls-token");
        assert_eq!(token.expires_in(), 60);
    }

    #[tokio::test]
    async fn test_verify_certificates_rejects_self_signed() {
        let base_url = start_self_signed_token_endpoint().await;
        let client = TokenClient::new(TokenClientConfig::new(
            sso_config(&base_url, None),
            TrustPolicy::VerifyCertificates,
        ));

        let err = client
            .obtain_access_token(&UserCredentials::new("alice", "password"))
            .await
            .expect_err("self-signed certificate should be rejected");

        assert!(matches!(err, TokenError::HttpError(_)), "got {err:?}");
        assert_eq!(err.status(), None);
    }

    // =========================================================================
    // JWKS Tests
    // =========================================================================

    #[tokio::test]
    async fn test_fetch_jwks() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{
                    "kid": "rsa-key-1",
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1Wl",
                    "e": "AQAB"
                }]
            })))
            .mount(&mock_server)
            .await;

        let jwks = test_client(&mock_server.uri()).fetch_jwks().await.unwrap();

        let key = jwks.find("rsa-key-1").expect("key should be present");
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.alg.as_deref(), Some("RS256"));
        assert_eq!(key.key_use.as_deref(), Some("sig"));
        assert_eq!(key.e.as_deref(), Some("AQAB"));
        assert!(jwks.find("missing").is_none());
    }

    #[tokio::test]
    async fn test_fetch_jwks_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let err = test_client(&mock_server.uri())
            .fetch_jwks()
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    // =========================================================================
    // Security Tests
    // =========================================================================

    #[test]
    fn test_oauth_response_debug_redacts_tokens() {
        let response = OAuthTokenResponse {
            access_token: "super-secret-access-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 300,
            refresh_token: Some("super-secret-refresh".to_string()),
            scope: Some("profile".to_string()),
        };

        let debug_str = format!("{response:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super-secret-access-token"));
        assert!(!debug_str.contains("super-secret-refresh"));
        assert!(debug_str.contains("300"));
    }

    #[test]
    fn test_access_token_debug_redacts() {
        let token = AccessToken::from(OAuthTokenResponse {
            access_token: "eyJhbGciOiJSUzI1NiJ9.claims.sig".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 60,
            refresh_token: None,
            scope: None,
        });

        let debug_str = format!("{token:?}");
        assert!(!debug_str.contains("eyJhbGciOiJSUzI1NiJ9"));
        assert!(debug_str.contains("Bearer"));
    }

    #[test]
    fn test_access_token_expiry() {
        let token = AccessToken::from(OAuthTokenResponse {
            access_token: "t".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 60,
            refresh_token: None,
            scope: None,
        });

        assert!(!token.is_expired_at(Utc::now()));
        assert!(token.is_expired_at(Utc::now() + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_bearer_constructor() {
        let token = AccessToken::bearer("pre-issued", 120);

        assert_eq!(token.secret().expose_secret(), "pre-issued");
        assert_eq!(token.token_type(), "Bearer");
        assert_eq!(token.expires_in(), 120);
        assert!(token.refresh_token().is_none());
        assert!(token.scope().is_none());
    }

    #[test]
    fn test_truncate_long_body() {
        let long = "x".repeat(300);
        let truncated = truncate(&long, MAX_ERROR_BODY_CHARS);
        assert!(truncated.ends_with("...[truncated]"));
        assert!(truncated.len() < long.len());
        assert_eq!(truncate("short", MAX_ERROR_BODY_CHARS), "short");
    }

    #[test]
    fn test_token_error_display() {
        let err = TokenError::AuthenticationRejected {
            status: 401,
            body: "invalid_grant".to_string(),
        };
        assert!(err.to_string().contains("401"));

        let err = TokenError::HttpError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));

        let err = TokenError::Configuration("bad config".to_string());
        assert!(err.to_string().contains("bad config"));
    }
}
