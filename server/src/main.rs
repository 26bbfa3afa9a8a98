use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use ledger::adapters::PgStore;
use ledger::{Engine, EngineConfig, NewUser, RateTable};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod config;
mod error;
mod routes;

use auth::{hash_password, TokenService};
use config::Config;
use routes::accounts::{account_balance, list_accounts, reconcile};
use routes::auth::{login, me, register};
use routes::transactions::{exchange, list_transactions, transfer};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine<PgStore>>,
    pub tokens: TokenService,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(25)
        .connect(&config.database_url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    let store = PgStore::new(pool);
    store.init_schema().await?;
    tracing::info!("database schema ready");

    let engine = Arc::new(Engine::new(
        Arc::new(store),
        EngineConfig {
            initial_balance_usd_cents: config.initial_balance_usd_cents,
            initial_balance_eur_cents: config.initial_balance_eur_cents,
            min_exchange_amount_cents: config.min_exchange_amount_cents,
        },
        RateTable::default(),
    ));

    engine.bootstrap_fx_accounts().await?;
    seed_users(&engine).await;

    let tokens = TokenService::new(config.token_secret.clone(), config.token_expiry_hours);
    let port = config.port;
    let state = AppState {
        engine,
        tokens,
        config: Arc::new(config),
    };

    let app = router(state.clone()).layer(ServiceBuilder::new().layer(cors_layer(&state.config)));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "server running");
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/accounts", get(list_accounts))
        .route("/api/v1/accounts/reconcile", get(reconcile))
        .route("/api/v1/accounts/{id}/balance", get(account_balance))
        .route("/api/v1/transactions/transfer", post(transfer))
        .route("/api/v1/transactions/exchange", post(exchange))
        .route("/api/v1/transactions", get(list_transactions))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_allow_origin == "*" {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_allow_origin
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Register a few demo users so a fresh database is immediately usable.
/// Re-registration fails with user_exists, which is logged and ignored.
async fn seed_users(engine: &Engine<PgStore>) {
    let demo = [
        ("alice@example.com", "Alice", "Smith"),
        ("bob@example.com", "Bob", "Johnson"),
        ("charlie@example.com", "Charlie", "Brown"),
    ];

    for (email, first_name, last_name) in demo {
        let result = engine
            .register(NewUser {
                email: email.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                password_hash: hash_password("password123"),
            })
            .await;

        match result {
            Ok(user) => tracing::info!(email, user_id = %user.id, "demo user seeded"),
            Err(err) => tracing::debug!(email, reason = %err, "demo user seed skipped"),
        }
    }
}
