//! Tenfold game server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tenfold_api::auth::TokenAuthenticator;
use tenfold_api::config::AppConfig;
use tenfold_api::state::AppState;
use tenfold_api::{routes, ws};
use tenfold_core::clock::{Clock, SystemClock};
use tenfold_core::rng::{RandomSource, ThreadRandom};
use tenfold_engine::{EngineConfig, TurnOrchestrator};
use tenfold_gateway::{CompletionGateway, CompletionProvider, GatewayConfig, OpenAiProvider};
use tenfold_sentinel::{AbuseAnalyzer, CompletionAnalyzer};
use tenfold_session::{InMemorySessionStore, SessionStore};
use tenfold_store_pg::PgSessionStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Tenfold game server");

    let config = AppConfig::from_env()?;

    // Session store: PostgreSQL when configured, process memory otherwise.
    let store: Arc<dyn SessionStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PgSessionStore::new(pool);
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; sessions live in process memory only");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut providers: Vec<Arc<dyn CompletionProvider>> = Vec::new();
    for provider_config in config.providers.clone() {
        let name = provider_config.name.clone();
        let provider = OpenAiProvider::new(provider_config)
            .map_err(|e| format!("provider {name}: {e}"))?;
        providers.push(Arc::new(provider));
    }
    tracing::info!(providers = providers.len(), "completion gateway configured");
    let gateway = Arc::new(CompletionGateway::new(
        providers,
        GatewayConfig::default(),
        Arc::clone(&clock),
    ));

    let analyzer: Arc<dyn AbuseAnalyzer> = Arc::new(CompletionAnalyzer::new(
        Arc::clone(&gateway),
        config.review_preference.clone(),
    ));

    let rng: Arc<StdMutex<dyn RandomSource>> = Arc::new(StdMutex::new(ThreadRandom));
    let engine_config = EngineConfig {
        provider_preference: config.provider_preference.clone(),
        ..EngineConfig::default()
    };
    let orchestrator = Arc::new(TurnOrchestrator::new(
        store, gateway, analyzer, clock, rng, engine_config,
    ));

    let auth = Arc::new(TokenAuthenticator::new(&config.secret_key));
    let app_state = AppState::new(orchestrator, auth, config.admin_token.clone());

    // Build router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = Router::new()
        .merge(routes::health::router())
        .merge(ws::router())
        .nest("/api/v1/admin", routes::admin::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
