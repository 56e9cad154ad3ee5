//! P1 Tests: Secured Greeting
//!
//! Deploys the booster, waits for it to become live, and checks that the
//! greeting endpoint honours the realm's users and roles. All scenarios share
//! one deployment; each obtains its own token.

#![cfg(feature = "flows")]

use anyhow::{bail, ensure, Context};
use common::token_client::TokenError;
use env_tests::cluster::CliCluster;
use env_tests::fixtures::users;
use env_tests::{init_tracing, setup_from_env, TokenGatedProbe};

type Probe = TokenGatedProbe<CliCluster>;

async fn default_user_default_from(probe: &Probe) -> anyhow::Result<()> {
    let token = probe
        .obtain_token(&users::alice())
        .await
        .context("alice should obtain a token")?;
    let greeting = probe
        .fetch_greeting(&token, None)
        .await
        .context("alice should be greeted")?;

    ensure!(
        greeting.content.contains("Hello, World!"),
        "unexpected greeting: {}",
        greeting.content
    );
    Ok(())
}

async fn default_user_custom_from(probe: &Probe) -> anyhow::Result<()> {
    let token = probe
        .obtain_token(&users::alice())
        .await
        .context("alice should obtain a token")?;
    let greeting = probe
        .fetch_greeting(&token, Some("Scott"))
        .await
        .context("alice should be greeted")?;

    ensure!(
        greeting.content.contains("Hello, Scott!"),
        "unexpected greeting: {}",
        greeting.content
    );
    Ok(())
}

async fn admin_user(probe: &Probe) -> anyhow::Result<()> {
    let token = probe
        .obtain_token(&users::admin())
        .await
        .context("admin should obtain a token")?;

    match probe.fetch_greeting(&token, None).await {
        Ok(greeting) => bail!("403 Forbidden expected, got greeting {:?}", greeting),
        Err(e) => ensure!(e.status() == Some(403), "403 Forbidden expected, got {}", e),
    }
    Ok(())
}

async fn bad_password(probe: &Probe) -> anyhow::Result<()> {
    match probe.obtain_token(&users::alice_bad_password()).await {
        Ok(_) => bail!("401 Unauthorized expected, got a token"),
        Err(e @ TokenError::AuthenticationRejected { .. }) => {
            ensure!(e.status() == Some(401), "401 Unauthorized expected, got {}", e);
        }
        Err(e) => bail!("401 Unauthorized expected, got {}", e),
    }
    Ok(())
}

#[tokio::test]
async fn test_secured_greeting_scenarios() {
    init_tracing();

    let probe = setup_from_env()
        .await
        .expect("Setup should deploy the booster and see it live within the timeout");

    let results = vec![
        ("default user, default from", default_user_default_from(&probe).await),
        ("default user, custom from", default_user_custom_from(&probe).await),
        ("admin user", admin_user(&probe).await),
        ("bad password", bad_password(&probe).await),
    ];

    let teardown = probe.teardown().await;

    let failures: Vec<String> = results
        .into_iter()
        .filter_map(|(name, result)| result.err().map(|e| format!("{}: {:#}", name, e)))
        .collect();

    assert!(failures.is_empty(), "Scenarios failed:\n{}", failures.join("\n"));
    teardown.expect("Teardown should delete the booster resources");
}
