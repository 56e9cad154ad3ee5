//! Token-gated HTTP probe.
//!
//! The probe ties the pieces together: it finds the SSO server and the
//! application through their routes, builds a token client for the SSO
//! realm, deploys the application, and waits until it answers before handing
//! control to the test. Each test case then obtains its own token and calls
//! the greeting endpoint through the probe.

use crate::cluster::{CliCluster, ClusterError, ClusterOps};
use crate::config::{ProbeConfig, ProbeConfigError};
use crate::eventual::{poll_until, ConsistencyCategory};
use crate::fixtures::greeting_client::{Greeting, GreetingClient, GreetingClientError};
use common::config::{ConfigError, SsoClientConfig, SSO_AUTH_SERVER_URL};
use common::secret::UserCredentials;
use common::token_client::{AccessToken, TokenClient, TokenClientConfig, TokenError};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// SSO client configuration template shipped with the tests.
pub const BUNDLED_SSO_CONFIG: &str = include_str!("../resources/keycloak.json");

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid probe configuration: {0}")]
    Config(#[from] ProbeConfigError),

    #[error("Failed to load SSO client configuration: {0}")]
    SsoConfig(#[from] ConfigError),

    #[error("Cluster operation failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Application at {url} did not become live: {message}")]
    Liveness { url: String, message: String },
}

/// A deployed, live application plus a token client for its SSO realm.
pub struct TokenGatedProbe<C: ClusterOps> {
    cluster: C,
    token_client: TokenClient,
    greeting_client: GreetingClient,
    sso_url: String,
}

impl<C: ClusterOps> std::fmt::Debug for TokenGatedProbe<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGatedProbe")
            .field("sso_url", &self.sso_url)
            .field("application_url", &self.greeting_client.base_url())
            .field("trust", &self.token_client.trust_policy())
            .finish()
    }
}

/// Load configuration from the environment and set up against the real cluster.
pub async fn setup_from_env() -> Result<TokenGatedProbe<CliCluster>, ProbeError> {
    let config = ProbeConfig::from_env()?;
    TokenGatedProbe::setup(CliCluster::from_config(&config), &config).await
}

/// Load the SSO client template and point it at `sso_url`.
pub fn load_sso_config(config: &ProbeConfig, sso_url: &str) -> Result<SsoClientConfig, ConfigError> {
    let substitutions = HashMap::from([(SSO_AUTH_SERVER_URL.to_string(), sso_url.to_string())]);

    match &config.sso_config_path {
        Some(path) => SsoClientConfig::load(path, &substitutions),
        None => SsoClientConfig::from_template(BUNDLED_SSO_CONFIG, &substitutions),
    }
}

impl<C: ClusterOps> TokenGatedProbe<C> {
    /// Resolve routes, deploy, and block until the application is live.
    ///
    /// A missing SSO route fails before anything is deployed. Any failure
    /// after deployment started triggers a cleanup before the error is returned.
    #[instrument(skip_all)]
    pub async fn setup(cluster: C, config: &ProbeConfig) -> Result<Self, ProbeError> {
        let sso_host = cluster.resolve_route_host(&config.sso_route).await?;
        let sso_url = format!("{}/auth", config.sso_scheme.url_for(&sso_host));

        let sso = load_sso_config(config, &sso_url)?;
        let token_client = TokenClient::new(TokenClientConfig::new(sso, config.trust));

        info!(
            target: "env_tests.probe",
            sso_url = %sso_url,
            trust = ?config.trust,
            "SSO server resolved"
        );

        match Self::bring_up_application(&cluster, config).await {
            Ok(greeting_client) => {
                info!(
                    target: "env_tests.probe",
                    application_url = %greeting_client.base_url(),
                    "Application is live"
                );
                Ok(Self {
                    cluster,
                    token_client,
                    greeting_client,
                    sso_url,
                })
            }
            Err(e) => {
                warn!(target: "env_tests.probe", error = %e, "Setup failed, cleaning up");
                if let Err(cleanup_error) = cluster.cleanup().await {
                    warn!(
                        target: "env_tests.probe",
                        error = %cleanup_error,
                        "Cleanup after failed setup also failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn bring_up_application(
        cluster: &C,
        config: &ProbeConfig,
    ) -> Result<GreetingClient, ProbeError> {
        cluster.deploy_application().await?;
        cluster
            .await_application_readiness(config.readiness_timeout)
            .await?;

        let app_host = cluster.resolve_route_host(&config.app_route).await?;
        let greeting_client = GreetingClient::new(config.app_scheme.url_for(&app_host));

        let policy = ConsistencyCategory::ApplicationLiveness
            .policy()
            .with_timeout(config.liveness_timeout);

        poll_until(policy, || greeting_client.check_liveness())
            .await
            .map_err(|message| ProbeError::Liveness {
                url: greeting_client.base_url().to_string(),
                message,
            })?;

        Ok(greeting_client)
    }

    /// Identity provider base URL (`.../auth`).
    pub fn sso_url(&self) -> &str {
        &self.sso_url
    }

    /// Application base URL.
    pub fn application_url(&self) -> &str {
        self.greeting_client.base_url()
    }

    pub fn token_client(&self) -> &TokenClient {
        &self.token_client
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Obtain a fresh access token for `user`. Never cached.
    pub async fn obtain_token(&self, user: &UserCredentials) -> Result<AccessToken, TokenError> {
        self.token_client.obtain_access_token(user).await
    }

    /// Call the greeting endpoint with `token`, optionally passing `from` as the name.
    pub async fn fetch_greeting(
        &self,
        token: &AccessToken,
        from: Option<&str>,
    ) -> Result<Greeting, GreetingClientError> {
        self.greeting_client.greeting(token, from).await
    }

    /// Unauthenticated liveness check.
    pub async fn check_liveness(&self) -> bool {
        self.greeting_client.check_liveness().await
    }

    /// Release everything setup deployed.
    #[instrument(skip_all)]
    pub async fn teardown(self) -> Result<(), ProbeError> {
        self.cluster.cleanup().await?;
        info!(target: "env_tests.probe", "Teardown complete");
        Ok(())
    }
}
