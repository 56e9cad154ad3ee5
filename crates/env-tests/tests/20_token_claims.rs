//! P1 Tests: Token Claims
//!
//! Validates tokens issued by the SSO realm against its published JWKS. Only
//! the SSO server is needed; the application is not deployed.

#![cfg(feature = "flows")]

use common::secret::ExposeSecret;
use common::token_client::{TokenClient, TokenClientConfig};
use env_tests::cluster::{CliCluster, ClusterOps};
use env_tests::config::ProbeConfig;
use env_tests::fixtures::users;
use env_tests::init_tracing;
use env_tests::probe::load_sso_config;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Subset of the Keycloak access token claims we check.
#[derive(Debug, Deserialize)]
struct Claims {
    iss: String,
    exp: i64,
    preferred_username: Option<String>,
    azp: Option<String>,
}

/// Helper to build a token client for the realm behind the SSO route.
async fn token_client() -> TokenClient {
    init_tracing();
    let config = ProbeConfig::from_env().expect("BOOSTER_* environment should be valid");
    let cluster = CliCluster::from_config(&config);

    let host = cluster
        .resolve_route_host(&config.sso_route)
        .await
        .expect("SSO route should exist");
    let sso_url = format!("{}/auth", config.sso_scheme.url_for(&host));

    let sso = load_sso_config(&config, &sso_url).expect("SSO client configuration should load");
    TokenClient::new(TokenClientConfig::new(sso, config.trust))
}

#[tokio::test]
async fn test_token_validates_against_jwks() {
    let client = token_client().await;

    let token = client
        .obtain_access_token(&users::alice())
        .await
        .expect("alice should obtain a token");
    let jwt = token.secret().expose_secret();

    let jwks = client.fetch_jwks().await.expect("JWKS fetch should succeed");

    // Decode token header to get kid
    let header = decode_header(jwt).expect("Token header should be decodable");
    assert_eq!(header.alg, Algorithm::RS256);
    let kid = header.kid.expect("Token should have kid in header");

    let jwk = jwks
        .find(&kid)
        .expect("JWKS should contain key with matching kid");
    let n = jwk.n.as_deref().expect("RSA key should have modulus");
    let e = jwk.e.as_deref().expect("RSA key should have exponent");

    let decoding_key =
        DecodingKey::from_rsa_components(n, e).expect("RSA components should be valid base64url");

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.set_issuer(&[client.sso().realm_url()]);

    let token_data = decode::<Claims>(jwt, &decoding_key, &validation)
        .expect("Token should validate against JWKS public key");

    assert_eq!(token_data.claims.iss, client.sso().realm_url());
    assert_eq!(token_data.claims.preferred_username.as_deref(), Some("alice"));
    assert_eq!(token_data.claims.azp.as_deref(), Some(client.sso().client_id()));
    assert!(token_data.claims.exp > 0);
}

#[tokio::test]
async fn test_token_response_is_bearer() {
    let client = token_client().await;

    let token = client
        .obtain_access_token(&users::alice())
        .await
        .expect("alice should obtain a token");

    assert!(token.token_type().eq_ignore_ascii_case("bearer"));
    assert!(token.expires_in() > 0);
    assert!(!token.is_expired_at(chrono::Utc::now()));
}

#[tokio::test]
async fn test_tokens_are_not_reused() {
    let client = token_client().await;

    let first = client
        .obtain_access_token(&users::alice())
        .await
        .expect("first token");
    let second = client
        .obtain_access_token(&users::alice())
        .await
        .expect("second token");

    assert_ne!(
        first.secret().expose_secret(),
        second.secret().expose_secret(),
        "Each request should mint a fresh token"
    );
}
