//! Token acquisition integration tests
//!
//! Runs the JWT-bearer exchange against a local mock token endpoint:
//! - A dead or slow clock probe still yields a token
//! - Cached tokens are reused until they near expiry
//! - Failed exchanges carry the endpoint's error description
//! - Measured clock skew shifts the signed `iat`

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;

use common::{spawn_server, test_account, ManualClock, TEST_PUBLIC_KEY, UNREACHABLE};
use field_health_backend::error::AppError;
use field_health_backend::external::clock::format_http_date;
use field_health_backend::external::token::{AssertionClaims, JWT_BEARER_GRANT};
use field_health_backend::external::{Clock, ClockSkewProbe, SystemClock, TokenAcquirer, TokenAcquirerConfig};

const SCOPE: &str = "https://www.googleapis.com/auth/earthengine";

#[derive(Default)]
struct TokenEndpoint {
    exchanges: AtomicUsize,
    assertions: Mutex<Vec<String>>,
    reject: bool,
}

async fn issue_token(
    State(endpoint): State<Arc<TokenEndpoint>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let n = endpoint.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(assertion) = form.get("assertion") {
        endpoint.assertions.lock().push(assertion.clone());
    }

    if endpoint.reject || form.get("grant_type").map(String::as_str) != Some(JWT_BEARER_GRANT) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid JWT Signature."
            })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("token-{}", n),
            "expires_in": 3600,
            "token_type": "Bearer"
        })),
    )
}

async fn start_token_endpoint(reject: bool) -> (String, Arc<TokenEndpoint>) {
    let endpoint = Arc::new(TokenEndpoint {
        reject,
        ..Default::default()
    });
    let router = Router::new()
        .route("/token", post(issue_token))
        .with_state(endpoint.clone());
    (spawn_server(router).await, endpoint)
}

fn acquirer(base: &str, probe_url: &str, probe_timeout: Duration, clock: Arc<dyn Clock>) -> TokenAcquirer {
    let client = Client::new();
    TokenAcquirer::with_clock(
        client.clone(),
        Some(test_account()),
        TokenAcquirerConfig {
            token_url: format!("{}/token", base),
            scope: SCOPE.to_string(),
        },
        ClockSkewProbe::new(client, probe_url, probe_timeout),
        clock,
    )
}

fn decode_claims(assertion: &str, audience: &str) -> AssertionClaims {
    let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);
    validation.validate_exp = false;
    decode::<AssertionClaims>(assertion, &key, &validation)
        .unwrap()
        .claims
}

// ============================================================================
// Clock Skew Probe Tests
// ============================================================================

#[tokio::test]
async fn test_unreachable_probe_still_yields_token() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let tokens = acquirer(&base, UNREACHABLE, Duration::from_millis(500), Arc::new(SystemClock));

    let token = tokens.access_token().await.unwrap();
    assert_eq!(token, "token-1");
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_probe_times_out_to_zero_skew() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let slow = Router::new().route(
        "/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }),
    );
    let probe_base = spawn_server(slow).await;
    let tokens = acquirer(&base, &probe_base, Duration::from_millis(200), Arc::new(SystemClock));

    let before = Utc::now().timestamp();
    let started = std::time::Instant::now();
    tokens.access_token().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    let assertion = endpoint.assertions.lock()[0].clone();
    let claims = decode_claims(&assertion, &format!("{}/token", base));
    // Zero skew: iat is simply "now"
    assert!((claims.iat - before).abs() <= 2);
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[tokio::test]
async fn test_measured_skew_shifts_issued_at() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let now = Utc::now();
    let clock = Arc::new(ManualClock::new(now));

    // Remote clock two minutes behind the local one
    let remote = format_http_date(now - chrono::Duration::seconds(120));
    let probe = Router::new().route(
        "/",
        get(move || {
            let remote = remote.clone();
            async move { ([(header::DATE, remote)], "ok") }
        }),
    );
    let probe_base = spawn_server(probe).await;
    let tokens = acquirer(&base, &probe_base, Duration::from_secs(2), clock);

    tokens.access_token().await.unwrap();

    let assertion = endpoint.assertions.lock()[0].clone();
    let claims = decode_claims(&assertion, &format!("{}/token", base));
    assert_eq!(claims.iat, now.timestamp() - 120);
    assert_eq!(claims.exp, claims.iat + 3600);
    assert_eq!(claims.iss, test_account().client_email);
    assert_eq!(claims.scope, SCOPE);
}

// ============================================================================
// Credential Cache Tests
// ============================================================================

#[tokio::test]
async fn test_token_reused_within_validity() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let tokens = acquirer(&base, UNREACHABLE, Duration::from_millis(500), Arc::new(SystemClock));

    let first = tokens.access_token().await.unwrap();
    let second = tokens.access_token().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_token_triggers_exactly_one_exchange() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let tokens = acquirer(&base, UNREACHABLE, Duration::from_millis(500), clock.clone());

    assert_eq!(tokens.access_token().await.unwrap(), "token-1");

    clock.advance(chrono::Duration::seconds(3600));
    assert_eq!(tokens.access_token().await.unwrap(), "token-2");
    assert_eq!(tokens.access_token().await.unwrap(), "token-2");

    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_exchange() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let tokens = Arc::new(acquirer(&base, UNREACHABLE, Duration::from_millis(500), Arc::new(SystemClock)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.access_token().await.unwrap() })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "token-1");
    }

    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidate_forces_new_exchange() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let tokens = acquirer(&base, UNREACHABLE, Duration::from_millis(500), Arc::new(SystemClock));

    let first = tokens.access_token().await.unwrap();
    tokens.invalidate(&first).await;
    assert_eq!(tokens.access_token().await.unwrap(), "token-2");
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalidating_a_replaced_token_keeps_the_current_one() {
    let (base, endpoint) = start_token_endpoint(false).await;
    let tokens = acquirer(&base, UNREACHABLE, Duration::from_millis(500), Arc::new(SystemClock));

    let first = tokens.access_token().await.unwrap();
    tokens.invalidate(&first).await;
    let second = tokens.access_token().await.unwrap();

    // A caller still holding the first token reports it rejected
    tokens.invalidate(&first).await;
    assert_eq!(tokens.access_token().await.unwrap(), second);
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_failed_exchange_carries_description() {
    let (base, _endpoint) = start_token_endpoint(true).await;
    let tokens = acquirer(&base, UNREACHABLE, Duration::from_millis(500), Arc::new(SystemClock));

    let err = tokens.access_token().await.unwrap_err();
    match err {
        AppError::TokenExchange(detail) => assert_eq!(detail, "Invalid JWT Signature."),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_token_endpoint_is_upstream_error() {
    let tokens = acquirer(UNREACHABLE, UNREACHABLE, Duration::from_millis(500), Arc::new(SystemClock));
    let err = tokens.access_token().await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
}
