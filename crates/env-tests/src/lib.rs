//! Environment Integration Test Suite
//!
//! This crate probes the secured REST booster running on an OpenShift cluster.
//! Tests resolve the SSO server and the application through their routes,
//! obtain tokens with the OAuth2 password grant, and check that the greeting
//! endpoint enforces authentication and authorization.
//!
//! # Features
//!
//! - `smoke`: Route resolution and liveness of an already deployed booster (30s)
//! - `flows`: Deploy, wait for liveness, run the secured greeting scenarios, tear down (5min+)
//! - `all`: Enable all test categories
//!
//! # Prerequisites
//!
//! 1. Logged in to the cluster: `oc login ...` (or `kubectl` with `BOOSTER_CLUSTER_CLI=kubectl`)
//! 2. SSO server deployed with a `secure-sso` route
//! 3. `BOOSTER_MANIFEST` pointing at the application manifest, or the booster already deployed
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs 0 env-tests (no default features)
//! cargo test
//!
//! # Smoke tests only (30s)
//! cargo test -p env-tests --features smoke
//!
//! # Full suite against a namespace
//! BOOSTER_NAMESPACE=booster BOOSTER_MANIFEST=target/openshift.yml \
//!     cargo test -p env-tests --features all
//! ```

pub mod cluster;
pub mod config;
pub mod eventual;
pub mod fixtures;
pub mod probe;

pub use probe::{setup_from_env, ProbeError, TokenGatedProbe};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to info for this crate and `common`. Safe to
/// call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("env_tests=info,common=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
