//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex as StdMutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{NaiveDate, TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use tenfold_api::auth::TokenAuthenticator;
use tenfold_api::routes;
use tenfold_api::state::AppState;
use tenfold_api::ws;
use tenfold_core::clock::Clock;
use tenfold_core::player::PlayerId;
use tenfold_core::rng::RandomSource;
use tenfold_engine::{EngineConfig, TurnOrchestrator};
use tenfold_gateway::{CompletionGateway, CompletionProvider, GatewayConfig};
use tenfold_sentinel::NoopAnalyzer;
use tenfold_session::{GameSession, InMemorySessionStore, SessionStore};
use tenfold_test_support::{FixedClock, ScriptedBehavior, ScriptedProvider, SequenceRandom};

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemorySessionStore>,
}

/// Build the full app router with an in-memory store, a scripted
/// provider, and deterministic clock/RNG. Same route structure as
/// `main.rs`.
pub fn build_test_app() -> TestApp {
    build_test_app_with_script(vec![])
}

pub fn build_test_app_with_script(script: Vec<ScriptedBehavior>) -> TestApp {
    let store = Arc::new(InMemorySessionStore::new());
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::default());
    let provider = ScriptedProvider::new("alpha", script);
    let gateway = Arc::new(CompletionGateway::new(
        vec![provider as Arc<dyn CompletionProvider>],
        GatewayConfig::default(),
        Arc::clone(&clock),
    ));
    let rng: Arc<StdMutex<dyn RandomSource>> =
        Arc::new(StdMutex::new(SequenceRandom::new(vec![])));
    let orchestrator = Arc::new(TurnOrchestrator::new(
        store.clone() as Arc<dyn SessionStore>,
        gateway,
        Arc::new(NoopAnalyzer),
        clock,
        rng,
        EngineConfig::default(),
    ));
    let auth = Arc::new(TokenAuthenticator::new("test-secret"));
    let app_state = AppState::new(orchestrator, auth, Some(ADMIN_TOKEN.to_owned()));

    let router = Router::new()
        .merge(routes::health::router())
        .merge(ws::router())
        .nest("/api/v1/admin", routes::admin::router())
        .with_state(app_state);

    TestApp { router, store }
}

/// Seed a default daily session for a player, optionally mutated first.
pub async fn seed_session(
    store: &InMemorySessionStore,
    player: &str,
    mutate: impl FnOnce(&mut GameSession),
) {
    let mut session = GameSession::fresh(
        PlayerId::new(player),
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap(),
        "you are the game master",
        "welcome",
    );
    mutate(&mut session);
    store.save(&mut session).await.unwrap();
}

/// Send a request and return `(status, json_body)`. `admin_token`
/// attaches the admin header when given.
pub async fn request_json(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<&serde_json::Value>,
    admin_token: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = admin_token {
        builder = builder.header("x-admin-token", token);
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    request_json(app, "GET", uri, None, None).await
}

pub async fn admin_get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    request_json(app, "GET", uri, None, Some(ADMIN_TOKEN)).await
}

pub async fn admin_post(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    request_json(app, "POST", uri, Some(body), Some(ADMIN_TOKEN)).await
}
