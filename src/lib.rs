pub mod auth;
pub mod backoffice;
pub mod config;
pub mod db;
pub mod errors;
pub mod forms;
pub mod models;
pub mod policy;
pub mod redaction;
pub mod session;
pub mod storage;
pub mod util;
pub mod web;

use crate::auth::hash_password;
use crate::backoffice::Backoffice;
use crate::config::Config;
use crate::db::Database;
use crate::errors::AppResult;
use crate::session::SessionManager;
use crate::storage::ObjectStore;
use crate::web::{AppState, SharedState, Templates};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Assembles the shared state around an already opened database and store.
pub fn build_state(config: &Config, db: Arc<Database>, store: Arc<dyn ObjectStore>) -> AppResult<SharedState> {
    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        if db.ensure_bootstrap_admin(username, &hash_password(password))? {
            tracing::info!(username = %username, "bootstrap admin created");
        }
    }
    let office = Backoffice::new(db, store, config.max_upload_bytes, config.page_size);
    Ok(Arc::new(AppState {
        office,
        sessions: SessionManager::new(),
        templates: Templates::load()?,
    }))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config.log_dir).map_err(anyhow::Error::msg)?;

    let db = Database::new(&config.database)
        .with_context(|| format!("failed to open database {}", config.database.display()))?;
    tracing::info!(path = %db.path().display(), "database ready");
    let store = storage::connect(config.s3_settings()).await;
    let state = build_state(&config, Arc::new(db), store)?;

    let app = web::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "sno2 listening");
    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}

fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "sno2.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
