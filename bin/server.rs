// Ledger GL Code System - Web Server
// REST API with Axum over one tenant database

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use ledger_glcode::{
    backend_for, AccountGroupRange, ClassifiedLedger, CodeIssue, GlCodeJob, JobConfig, LedgerStore,
    RunReport, SqliteStore,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    config: Arc<JobConfig>,
    /// Held for the duration of a run; one run per server at a time
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> Response {
    log::error!("{}: {}", context, e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", context, e))
}

/// Classified ledger with every code it was ever issued
#[derive(Serialize)]
struct LedgerCodeResponse {
    current: ClassifiedLedger,
    history: Vec<CodeIssue>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/account-groups - The loaded range table
async fn get_account_groups(State(state): State<AppState>) -> Response {
    let store = match state.store.lock() {
        Ok(store) => store,
        Err(e) => return internal_error("Store unavailable", e),
    };

    match store.load_ranges() {
        Ok(ranges) => ApiResponse::<Vec<AccountGroupRange>>::ok(ranges),
        Err(e) => internal_error("Error loading account groups", e),
    }
}

/// GET /api/gl-codes - Every classified ledger
async fn get_gl_codes(State(state): State<AppState>) -> Response {
    let store = match state.store.lock() {
        Ok(store) => store,
        Err(e) => return internal_error("Store unavailable", e),
    };

    match store.list_classified() {
        Ok(rows) => ApiResponse::<Vec<ClassifiedLedger>>::ok(rows),
        Err(e) => internal_error("Error listing GL codes", e),
    }
}

/// GET /api/gl-codes/:ledger_id - One ledger's row and code history
async fn get_gl_code(State(state): State<AppState>, Path(ledger_id): Path<i64>) -> Response {
    let store = match state.store.lock() {
        Ok(store) => store,
        Err(e) => return internal_error("Store unavailable", e),
    };

    let current = match store.fetch_existing_output(ledger_id) {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("ledger {} has no GL code", ledger_id),
            )
        }
        Err(e) => return internal_error("Error loading GL code", e),
    };

    match store.history_for(ledger_id) {
        Ok(history) => ApiResponse::ok(LedgerCodeResponse { current, history }),
        Err(e) => internal_error("Error loading code history", e),
    }
}

/// POST /api/gl-codes/run - Initial assignment + reconciliation
async fn run_jobs(State(state): State<AppState>) -> Response {
    let _guard = match state.run_lock.clone().try_lock_owned() {
        Ok(guard) => guard,
        Err(_) => {
            return error_response(StatusCode::CONFLICT, "a GL code run is already in progress".to_string())
        }
    };

    let config = state.config.clone();
    let outcome = tokio::task::spawn_blocking(move || -> ledger_glcode::Result<RunReport> {
        // The run gets its own connection; readers keep the shared one
        let store = SqliteStore::open(&config.database_path)?;
        store.setup()?;
        let backend = backend_for(&config)?;
        let mut job = GlCodeJob::start(&store, backend, config.job_options()?)?;
        job.run_all()
    })
    .await;

    match outcome {
        Ok(Ok(report)) => ApiResponse::ok(report),
        Ok(Err(e)) => internal_error("GL code run failed", e),
        Err(e) => internal_error("GL code run panicked", e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌐 Ledger GL Code System - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = JobConfig::from_env(None).context("Failed to load configuration")?;

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    store.setup().context("Failed to set up database")?;
    println!("✓ Database opened: {:?}", config.database_path);

    let addr = config.server_addr.clone();

    // Create shared state
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        config: Arc::new(config),
        run_lock: Arc::new(tokio::sync::Mutex::new(())),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/account-groups", get(get_account_groups))
        .route("/gl-codes", get(get_gl_codes))
        .route("/gl-codes/run", post(run_jobs))
        .route("/gl-codes/:ledger_id", get(get_gl_code))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/gl-codes", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
