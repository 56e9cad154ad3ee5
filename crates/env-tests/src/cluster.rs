//! Cluster collaborator: deployment, readiness, routes and cleanup.
//!
//! The tests never talk to the Kubernetes API directly. Everything goes
//! through the cluster CLI (`oc` by default, `kubectl` works for the same
//! subcommands) behind the [`ClusterOps`] trait so the probe can be exercised
//! against [`mock::MockCluster`] without a cluster.

use crate::config::ProbeConfig;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Cluster collaborator errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Couldn't find route {name}")]
    RouteNotFound { name: String },

    #[error("Cluster CLI '{program}' not available: {source}")]
    CliUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Manifest not found: {0}")]
    ManifestNotFound(PathBuf),
}

/// Operations the probe needs from the cluster.
#[async_trait::async_trait]
pub trait ClusterOps: Send + Sync {
    /// Create or update the application's resources.
    async fn deploy_application(&self) -> Result<(), ClusterError>;

    /// Wait until the application's workload has rolled out.
    async fn await_application_readiness(&self, timeout: Duration) -> Result<(), ClusterError>;

    /// Resolve the externally reachable host of a route.
    async fn resolve_route_host(&self, name: &str) -> Result<String, ClusterError>;

    /// Delete everything `deploy_application` created.
    async fn cleanup(&self) -> Result<(), ClusterError>;
}

#[async_trait::async_trait]
impl<T: ClusterOps + ?Sized> ClusterOps for std::sync::Arc<T> {
    async fn deploy_application(&self) -> Result<(), ClusterError> {
        (**self).deploy_application().await
    }

    async fn await_application_readiness(&self, timeout: Duration) -> Result<(), ClusterError> {
        (**self).await_application_readiness(timeout).await
    }

    async fn resolve_route_host(&self, name: &str) -> Result<String, ClusterError> {
        (**self).resolve_route_host(name).await
    }

    async fn cleanup(&self) -> Result<(), ClusterError> {
        (**self).cleanup().await
    }
}

/// [`ClusterOps`] backed by the `oc`/`kubectl` command line.
#[derive(Debug, Clone)]
pub struct CliCluster {
    program: String,
    namespace: Option<String>,
    manifest: Option<PathBuf>,
    workload: String,
}

impl CliCluster {
    pub fn new(
        program: impl Into<String>,
        namespace: Option<String>,
        manifest: Option<PathBuf>,
        workload: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            namespace,
            manifest,
            workload: workload.into(),
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            config.cluster_cli.clone(),
            config.namespace.clone(),
            config.manifest.clone(),
            config.workload.clone(),
        )
    }

    fn with_namespace(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(ns) = &self.namespace {
            args.push("-n".to_string());
            args.push(ns.clone());
        }
        args
    }

    fn apply_args(&self, manifest: &std::path::Path) -> Vec<String> {
        self.with_namespace(vec![
            "apply".to_string(),
            "-f".to_string(),
            manifest.display().to_string(),
        ])
    }

    fn rollout_args(&self, timeout: Duration) -> Vec<String> {
        self.with_namespace(vec![
            "rollout".to_string(),
            "status".to_string(),
            self.workload.clone(),
            format!("--timeout={}s", timeout.as_secs().max(1)),
        ])
    }

    fn route_args(&self, name: &str) -> Vec<String> {
        self.with_namespace(vec![
            "get".to_string(),
            "route".to_string(),
            name.to_string(),
            "-o".to_string(),
            "jsonpath={.spec.host}".to_string(),
        ])
    }

    fn delete_args(&self, manifest: &std::path::Path) -> Vec<String> {
        self.with_namespace(vec![
            "delete".to_string(),
            "-f".to_string(),
            manifest.display().to_string(),
            "--ignore-not-found".to_string(),
        ])
    }

    async fn run(&self, args: &[String]) -> Result<Output, ClusterError> {
        debug!(
            target: "env_tests.cluster",
            program = %self.program,
            args = ?args,
            "Running cluster CLI"
        );

        Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| ClusterError::CliUnavailable {
                program: self.program.clone(),
                source,
            })
    }

    async fn run_checked(&self, args: &[String]) -> Result<Output, ClusterError> {
        let output = self.run(args).await?;

        if !output.status.success() {
            return Err(ClusterError::CommandFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait::async_trait]
impl ClusterOps for CliCluster {
    #[instrument(skip_all)]
    async fn deploy_application(&self) -> Result<(), ClusterError> {
        let Some(manifest) = &self.manifest else {
            info!(
                target: "env_tests.cluster",
                "No manifest configured, assuming application is already deployed"
            );
            return Ok(());
        };

        if !manifest.exists() {
            return Err(ClusterError::ManifestNotFound(manifest.clone()));
        }

        self.run_checked(&self.apply_args(manifest)).await?;
        info!(target: "env_tests.cluster", manifest = %manifest.display(), "Application deployed");
        Ok(())
    }

    #[instrument(skip_all, fields(workload = %self.workload))]
    async fn await_application_readiness(&self, timeout: Duration) -> Result<(), ClusterError> {
        self.run_checked(&self.rollout_args(timeout)).await?;
        info!(target: "env_tests.cluster", workload = %self.workload, "Application rolled out");
        Ok(())
    }

    #[instrument(skip_all, fields(route = %name))]
    async fn resolve_route_host(&self, name: &str) -> Result<String, ClusterError> {
        let output = self.run(&self.route_args(name)).await?;
        let command = format!("{} get route {}", self.program, name);
        interpret_route_lookup(
            name,
            &command,
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    #[instrument(skip_all)]
    async fn cleanup(&self) -> Result<(), ClusterError> {
        let Some(manifest) = &self.manifest else {
            return Ok(());
        };

        self.run_checked(&self.delete_args(manifest)).await?;
        info!(
            target: "env_tests.cluster",
            manifest = %manifest.display(),
            "Application resources deleted"
        );
        Ok(())
    }
}

/// Turn the output of `get route <name> -o jsonpath={.spec.host}` into a host.
fn interpret_route_lookup(
    name: &str,
    command: &str,
    success: bool,
    stdout: &str,
    stderr: &str,
) -> Result<String, ClusterError> {
    if !success {
        if stderr.contains("NotFound") || stderr.contains("not found") {
            return Err(ClusterError::RouteNotFound {
                name: name.to_string(),
            });
        }
        return Err(ClusterError::CommandFailed {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    let host = stdout.trim().to_string();
    if host.is_empty() {
        warn!(target: "env_tests.cluster", route = %name, "Route has no host assigned");
        return Err(ClusterError::RouteNotFound {
            name: name.to_string(),
        });
    }

    Ok(host)
}

/// Mock cluster for testing the probe without a cluster.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock cluster with static routes.
    #[derive(Debug, Default)]
    pub struct MockCluster {
        routes: HashMap<String, String>,
        fail_deploy: bool,
        deploy_count: AtomicUsize,
        readiness_count: AtomicUsize,
        cleanup_count: AtomicUsize,
    }

    impl MockCluster {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a route resolving to `host`.
        pub fn with_route(mut self, name: impl Into<String>, host: impl Into<String>) -> Self {
            self.routes.insert(name.into(), host.into());
            self
        }

        /// Make `deploy_application` fail.
        pub fn failing_deploy(mut self) -> Self {
            self.fail_deploy = true;
            self
        }

        pub fn deploy_count(&self) -> usize {
            self.deploy_count.load(Ordering::SeqCst)
        }

        pub fn readiness_count(&self) -> usize {
            self.readiness_count.load(Ordering::SeqCst)
        }

        pub fn cleanup_count(&self) -> usize {
            self.cleanup_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ClusterOps for MockCluster {
        async fn deploy_application(&self) -> Result<(), ClusterError> {
            self.deploy_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_deploy {
                return Err(ClusterError::CommandFailed {
                    command: "mock apply".to_string(),
                    stderr: "mock deploy failure".to_string(),
                });
            }
            Ok(())
        }

        async fn await_application_readiness(
            &self,
            _timeout: Duration,
        ) -> Result<(), ClusterError> {
            self.readiness_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn resolve_route_host(&self, name: &str) -> Result<String, ClusterError> {
            self.routes
                .get(name)
                .cloned()
                .ok_or_else(|| ClusterError::RouteNotFound {
                    name: name.to_string(),
                })
        }

        async fn cleanup(&self) -> Result<(), ClusterError> {
            self.cleanup_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
