//! P0 Smoke Tests: Cluster Health
//!
//! These tests validate that the SSO server and the already deployed booster
//! are reachable through their routes. The flow tests depend on these passing.

#![cfg(feature = "smoke")]

use env_tests::cluster::{CliCluster, ClusterError, ClusterOps};
use env_tests::config::ProbeConfig;
use env_tests::eventual::{assert_eventually, poll_until, ConsistencyCategory};
use env_tests::fixtures::GreetingClient;
use env_tests::init_tracing;

/// Helper to load probe configuration and the cluster it points at.
fn cluster() -> (ProbeConfig, CliCluster) {
    init_tracing();
    let config = ProbeConfig::from_env().expect("BOOSTER_* environment should be valid");
    let cluster = CliCluster::from_config(&config);
    (config, cluster)
}

/// Wait for the router to admit `route`, then return its host.
async fn admitted_host(cluster: &CliCluster, route: &str) -> String {
    assert_eventually(ConsistencyCategory::RouteAdmission, move || async move {
        cluster.resolve_route_host(route).await.is_ok()
    })
    .await
    .unwrap_or_else(|e| panic!("Route {} should be admitted: {}", route, e));

    cluster
        .resolve_route_host(route)
        .await
        .expect("Admitted route should resolve")
}

#[tokio::test]
async fn test_sso_route_resolves() {
    let (config, cluster) = cluster();

    // Ensure the SSO server is deployed with a secure-sso route
    let host = admitted_host(&cluster, &config.sso_route).await;

    assert!(!host.is_empty());
    assert!(!host.contains("://"), "route host should not carry a scheme");
}

#[tokio::test]
async fn test_application_route_resolves() {
    let (config, cluster) = cluster();

    let host = admitted_host(&cluster, &config.app_route).await;
    assert!(!host.is_empty());
}

#[tokio::test]
async fn test_application_is_live() {
    let (config, cluster) = cluster();

    let host = admitted_host(&cluster, &config.app_route).await;
    let client = GreetingClient::new(config.app_scheme.url_for(&host));

    let policy = ConsistencyCategory::ApplicationLiveness
        .policy()
        .with_timeout(config.liveness_timeout);

    poll_until(policy, || client.check_liveness())
        .await
        .expect("Application root should answer 200 OK");
}

#[tokio::test]
async fn test_unknown_route_is_reported_as_missing() {
    let (_, cluster) = cluster();

    let result = cluster
        .resolve_route_host("env-tests-route-that-does-not-exist")
        .await;

    match result {
        Err(ClusterError::RouteNotFound { name }) => {
            assert_eq!(name, "env-tests-route-that-does-not-exist");
        }
        other => panic!("expected RouteNotFound, got {:?}", other),
    }
}
