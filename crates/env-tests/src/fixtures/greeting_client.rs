//! Greeting service client fixture.
//!
//! Calls the secured application's greeting endpoint with a bearer token and
//! its unauthenticated root for liveness. A fresh HTTP client is built for
//! every call so no connection outlives the request that opened it.

use common::secret::ExposeSecret;
use common::token_client::AccessToken;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Path of the secured greeting endpoint.
pub const GREETING_PATH: &str = "/api/greeting";

/// Query parameter carrying the caller-chosen name.
pub const NAME_PARAM: &str = "name";

/// Request timeout for application calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length for error body in error messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Regex pattern for JWT tokens (header.payload.signature).
static JWT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]*)?").unwrap()
});

/// Regex pattern for Bearer tokens in text.
static BEARER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").unwrap());

/// Sanitize an error response body before it lands in an error or a log.
///
/// Bearer credentials go first so "Bearer <JWT>" is replaced as a whole, then
/// standalone JWTs; the result is cut at `MAX_ERROR_BODY_LEN` on a char boundary.
fn sanitize_error_body(body: &str) -> String {
    let sanitized = BEARER_PATTERN.replace_all(body, "[BEARER_REDACTED]");
    let sanitized = JWT_PATTERN.replace_all(&sanitized, "[JWT_REDACTED]");

    if sanitized.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...[truncated]", &sanitized[..cut])
    } else {
        sanitized.into_owned()
    }
}

/// Greeting client errors.
#[derive(Debug, Error)]
pub enum GreetingClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl GreetingClientError {
    /// HTTP status of the failed call, if the application answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            GreetingClientError::RequestFailed { status, .. } => Some(*status),
            GreetingClientError::HttpError(e) => e.status().map(|s| s.as_u16()),
            GreetingClientError::JsonError(_) => None,
        }
    }
}

/// Greeting returned by the application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Greeting {
    #[serde(default)]
    pub id: Option<u64>,
    pub content: String,
}

/// Client for the secured greeting application.
#[derive(Debug, Clone)]
pub struct GreetingClient {
    base_url: String,
}

impl GreetingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http_client() -> Result<Client, GreetingClientError> {
        Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
    }

    /// Fetch a greeting, optionally personalised with `from`.
    ///
    /// Sends `GET /api/greeting[?name=<from>]` with `Authorization: Bearer <token>`.
    pub async fn greeting(
        &self,
        token: &AccessToken,
        from: Option<&str>,
    ) -> Result<Greeting, GreetingClientError> {
        let url = format!("{}{}", self.base_url, GREETING_PATH);

        let mut request = Self::http_client()?
            .get(&url)
            .bearer_auth(token.secret().expose_secret());
        if let Some(name) = from {
            request = request.query(&[(NAME_PARAM, name)]);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(
                target: "env_tests.greeting",
                status = %status,
                "Greeting request failed"
            );
            return Err(GreetingClientError::RequestFailed {
                status: status.as_u16(),
                body: sanitize_error_body(&body),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Unauthenticated `GET /`; true only for an exact 200.
    ///
    /// Transport errors are reported as "not live" rather than as errors.
    pub async fn check_liveness(&self) -> bool {
        let url = format!("{}/", self.base_url);

        let client = match Self::http_client() {
            Ok(client) => client,
            Err(e) => {
                debug!(target: "env_tests.greeting", error = %e, "Failed to build HTTP client");
                return false;
            }
        };

        match client.get(&url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(target: "env_tests.greeting", error = %e, "Liveness request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_greeting_sends_bearer_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(GREETING_PATH))
            .and(header("authorization", "Bearer alice-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "content": "Hello, World!"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = GreetingClient::new(mock_server.uri());
        let greeting = client
            .greeting(&AccessToken::bearer("alice-token", 300), None)
            .await
            .expect("greeting should succeed");

        assert_eq!(greeting.id, Some(1));
        assert_eq!(greeting.content, "Hello, World!");

        let requests = mock_server.received_requests().await.expect("recorded");
        assert_eq!(requests[0].url.query(), None, "no name parameter expected");
    }

    #[tokio::test]
    async fn test_greeting_with_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(GREETING_PATH))
            .and(query_param(NAME_PARAM, "Scott"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "Hello, Scott!"
            })))
            .mount(&mock_server)
            .await;

        let client = GreetingClient::new(format!("{}/", mock_server.uri()));
        let greeting = client
            .greeting(&AccessToken::bearer("alice-token", 300), Some("Scott"))
            .await
            .expect("greeting should succeed");

        assert_eq!(greeting.id, None);
        assert!(greeting.content.contains("Hello, Scott!"));
    }

    #[tokio::test]
    async fn test_greeting_forbidden_exposes_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(GREETING_PATH))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string("Forbidden for Bearer eyJhbGc.eyJzdWI.sig"),
            )
            .mount(&mock_server)
            .await;

        let client = GreetingClient::new(mock_server.uri());
        let err = client
            .greeting(&AccessToken::bearer("admin-token", 300), None)
            .await
            .expect_err("admin should be forbidden");

        assert_eq!(err.status(), Some(403));
        let message = err.to_string();
        assert!(message.contains("[BEARER_REDACTED]"));
        assert!(!message.contains("eyJzdWI"));
    }

    #[tokio::test]
    async fn test_greeting_invalid_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(GREETING_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&mock_server)
            .await;

        let err = GreetingClient::new(mock_server.uri())
            .greeting(&AccessToken::bearer("alice-token", 300), None)
            .await
            .expect_err("html is not a greeting");

        assert!(matches!(err, GreetingClientError::JsonError(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_liveness_requires_exact_200() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(204))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = GreetingClient::new(mock_server.uri());
        assert!(!client.check_liveness().await, "204 is not live");
        assert!(client.check_liveness().await, "200 is live");
    }

    #[tokio::test]
    async fn test_liveness_unreachable_is_false() {
        let client = GreetingClient::new("http://127.0.0.1:1");
        assert!(!client.check_liveness().await);
    }

    #[test]
    fn test_sanitize_removes_jwt() {
        let body = "token eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJhbGljZSJ9.c2ln rejected";
        let sanitized = sanitize_error_body(body);
        assert_eq!(sanitized, "token [JWT_REDACTED] rejected");
    }

    #[test]
    fn test_sanitize_truncates_long_body() {
        let body = "é".repeat(300);
        let sanitized = sanitize_error_body(&body);
        assert!(sanitized.ends_with("...[truncated]"));
        assert!(sanitized.len() <= MAX_ERROR_BODY_LEN + "...[truncated]".len());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = GreetingClient::new("http://app.apps.test/");
        assert_eq!(client.base_url(), "http://app.apps.test");
    }
}
