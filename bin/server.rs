// Card Vault - Web Server
// REST API with Axum over the same SQLite store the CLI uses

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use card_vault::{
    find_card, get_all_batches, ingest_in_transaction, open_database, register_card, AppConfig,
    CardError, CardHasher, IngestError, SqliteStore, TextEncoding,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    hasher: CardHasher,
    default_encoding: TextEncoding,
}

impl AppState {
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Error body shared by every endpoint
#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    error: String,
    message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        status: status.as_u16(),
        error: status.canonical_reason().unwrap_or("Error").to_string(),
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// Status code plus client-facing message
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.0, self.1)
    }
}

impl From<CardError> for ApiError {
    fn from(err: CardError) -> Self {
        if matches!(err, CardError::InvalidCardNumber) {
            ApiError(StatusCode::BAD_REQUEST, err.to_string())
        } else {
            error!("Card operation failed: {:#}", anyhow::Error::from(err));
            ApiError(StatusCode::INTERNAL_SERVER_ERROR, "Internal error.".to_string())
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        if err.is_malformed_input() {
            ApiError(StatusCode::BAD_REQUEST, err.to_string())
        } else {
            error!("Batch ingestion failed: {:#}", anyhow::Error::from(err));
            ApiError(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process batch.".to_string())
        }
    }
}

#[derive(Deserialize)]
struct CardRequest {
    card_number: String,
}

#[derive(Serialize)]
struct CardIdResponse {
    card_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct UploadParams {
    encoding: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/card - Register a single card
async fn add_card(
    State(state): State<AppState>,
    Json(request): Json<CardRequest>,
) -> Result<Response, ApiError> {
    let conn = state.conn();
    let store = SqliteStore::new(&conn);

    let registration = register_card(&request.card_number, &state.hasher, &store, &store)?;
    let card = registration.card();

    Ok(Json(ApiResponse::ok(CardIdResponse { card_id: card.id })).into_response())
}

/// POST /api/card/lookup - Resolve a card number to its stored id
async fn lookup_card(
    State(state): State<AppState>,
    Json(request): Json<CardRequest>,
) -> Result<Response, ApiError> {
    let conn = state.conn();
    let store = SqliteStore::new(&conn);

    match find_card(&request.card_number, &state.hasher, &store)? {
        Some(card) => Ok(Json(CardIdResponse { card_id: card.id }).into_response()),
        None => Ok(error_response(StatusCode::NOT_FOUND, "Card not found.")),
    }
}

/// POST /api/cards - Upload a fixed-width batch file as the raw body
async fn upload_batch(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "File is empty.".to_string()));
    }

    let encoding = match params.encoding.as_deref() {
        Some(label) => TextEncoding::from_label(label).ok_or_else(|| {
            ApiError(
                StatusCode::BAD_REQUEST,
                format!("Unsupported encoding: {}", label),
            )
        })?,
        None => state.default_encoding,
    };

    let mut conn = state.conn();
    let outcome = ingest_in_transaction(&mut conn, &state.hasher, body.as_ref(), encoding)?;
    info!("{}", outcome.summary());

    Ok(Json(ApiResponse::ok(outcome)).into_response())
}

/// GET /api/batches - All persisted batches
async fn list_batches(State(state): State<AppState>) -> Result<Response, ApiError> {
    let conn = state.conn();

    match get_all_batches(&conn) {
        Ok(batches) => Ok(Json(ApiResponse::ok(batches)).into_response()),
        Err(e) => {
            error!("Error getting batches: {:#}", e);
            Err(ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list batches.".to_string(),
            ))
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🌐 Card Vault - Web Server v{}", card_vault::VERSION);

    let config = AppConfig::from_env()?;
    let conn = open_database(&config.database_path)?;
    info!("✓ Database opened: {}", config.database_path.display());

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        hasher: CardHasher::new(config.hash_salt.clone()),
        default_encoding: config.batch_encoding,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/card", post(add_card))
        .route("/card/lookup", post(lookup_card))
        .route("/cards", post(upload_batch))
        .route("/batches", get(list_batches))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    info!("🚀 Server running on http://{}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
