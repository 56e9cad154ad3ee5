//! Probe configuration loaded from environment variables.
//!
//! Every setting has a default matching the secured booster's OpenShift
//! template, so a plain `cargo test -p env-tests --features all` against a
//! project where the booster and SSO server are installed needs no variables.

use common::token_client::TrustPolicy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default route name of the SSO server.
pub const DEFAULT_SSO_ROUTE: &str = "secure-sso";

/// Default route name of the secured application.
pub const DEFAULT_APP_ROUTE: &str = "wfswarm-rest-http-secured";

/// Default upper bound on the liveness wait.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(300);

/// Default upper bound on the rollout wait.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ProbeConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// URL scheme for a resolved route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Build a base URL for `host` with this scheme.
    pub fn url_for(&self, host: &str) -> String {
        format!("{}://{}", self.as_str(), host.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Cluster CLI binary (`oc` or `kubectl`)
    pub cluster_cli: String,
    /// Namespace/project; `None` uses the CLI's current context
    pub namespace: Option<String>,
    /// Manifest applied on setup and deleted on teardown
    pub manifest: Option<PathBuf>,
    /// Workload watched with `rollout status`
    pub workload: String,
    pub sso_route: String,
    pub app_route: String,
    pub sso_scheme: Scheme,
    pub app_scheme: Scheme,
    /// SSO client configuration template; `None` uses the bundled `keycloak.json`
    pub sso_config_path: Option<PathBuf>,
    pub trust: TrustPolicy,
    pub liveness_timeout: Duration,
    pub readiness_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            cluster_cli: "oc".to_string(),
            namespace: None,
            manifest: None,
            workload: format!("dc/{DEFAULT_APP_ROUTE}"),
            sso_route: DEFAULT_SSO_ROUTE.to_string(),
            app_route: DEFAULT_APP_ROUTE.to_string(),
            sso_scheme: Scheme::Https,
            app_scheme: Scheme::Http,
            sso_config_path: None,
            trust: TrustPolicy::AcceptSelfSigned,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }
}

impl ProbeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ProbeConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ProbeConfigError> {
        let defaults = Self::default();

        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let trust = match get("BOOSTER_TLS_VERIFY") {
            Some(v) => {
                if parse_bool("BOOSTER_TLS_VERIFY", &v)? {
                    TrustPolicy::VerifyCertificates
                } else {
                    TrustPolicy::AcceptSelfSigned
                }
            }
            None => defaults.trust,
        };

        Ok(Self {
            cluster_cli: get("BOOSTER_CLUSTER_CLI").unwrap_or(defaults.cluster_cli),
            namespace: get("BOOSTER_NAMESPACE"),
            manifest: get("BOOSTER_MANIFEST").map(PathBuf::from),
            workload: get("BOOSTER_WORKLOAD").unwrap_or(defaults.workload),
            sso_route: get("BOOSTER_SSO_ROUTE").unwrap_or(defaults.sso_route),
            app_route: get("BOOSTER_APP_ROUTE").unwrap_or(defaults.app_route),
            sso_scheme: get("BOOSTER_SSO_SCHEME")
                .map(|v| parse_scheme("BOOSTER_SSO_SCHEME", &v))
                .transpose()?
                .unwrap_or(defaults.sso_scheme),
            app_scheme: get("BOOSTER_APP_SCHEME")
                .map(|v| parse_scheme("BOOSTER_APP_SCHEME", &v))
                .transpose()?
                .unwrap_or(defaults.app_scheme),
            sso_config_path: get("BOOSTER_SSO_CONFIG").map(PathBuf::from),
            trust,
            liveness_timeout: get("BOOSTER_LIVENESS_TIMEOUT_SECS")
                .map(|v| parse_secs("BOOSTER_LIVENESS_TIMEOUT_SECS", &v))
                .transpose()?
                .unwrap_or(defaults.liveness_timeout),
            readiness_timeout: get("BOOSTER_READINESS_TIMEOUT_SECS")
                .map(|v| parse_secs("BOOSTER_READINESS_TIMEOUT_SECS", &v))
                .transpose()?
                .unwrap_or(defaults.readiness_timeout),
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ProbeConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ProbeConfigError::InvalidValue {
            var,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_scheme(var: &'static str, value: &str) -> Result<Scheme, ProbeConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "http" => Ok(Scheme::Http),
        "https" => Ok(Scheme::Https),
        other => Err(ProbeConfigError::InvalidValue {
            var,
            reason: format!("expected http or https, got '{}'", other),
        }),
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ProbeConfigError> {
    let secs: u64 = value
        .parse()
        .map_err(|e| ProbeConfigError::InvalidValue {
            var,
            reason: format!("expected seconds: {}", e),
        })?;

    if secs == 0 {
        return Err(ProbeConfigError::InvalidValue {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(Duration::from_secs(secs))
}
