use axum::{
    routing::{get, post},
    Router,
    Json,
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{CorsLayer, Any};
use validator::Validate;

use crate::database::{Database, LoggedExchange};
use crate::llm::RetrievalQa;

const MAX_CONCURRENT_REQUESTS: usize = 16;
const HISTORY_LIMIT: i64 = 20;

/// `qa` is only a prototype: every request answers on its own session, so
/// no chat history is shared between clients.
#[derive(Clone)]
pub struct AppState {
    qa: Arc<RetrievalQa>,
    db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(qa: RetrievalQa, db: Option<Database>) -> Self {
        Self {
            qa: Arc::new(qa),
            db: db.map(Arc::new),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceDocument>,
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse { status: message.into() })).into_response()
}

/// Routes for the question-answering front end.
pub fn create_api(state: AppState) -> Router {
    create_api_with_limit(state, MAX_CONCURRENT_REQUESTS)
}

/// Same routes, with at most `max_in_flight` requests served at once across all of them.
pub fn create_api_with_limit(state: AppState, max_in_flight: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/query", post(query_handler))
        .route("/api/history", get(history_handler))
        .layer(cors)
        .layer(GlobalConcurrencyLimitLayer::new(max_in_flight.max(1)))
        .with_state(state)
}

async fn health_check() -> Response {
    log::debug!("Health check requested");
    Json(ApiResponse {
        status: "Server is running and healthy".to_string(),
    })
    .into_response()
}

async fn query_handler(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {}", rejection.body_text()));
        }
    };
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e));
    }
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Question must not be blank");
    }

    let mut session = state.qa.new_session();
    let result = session.query(&question).await;

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            log::error!("Query failed: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to answer the question");
        }
    };

    if let Some(db) = &state.db {
        let sources = result
            .source_documents
            .iter()
            .map(|doc| doc.source().to_string())
            .collect();
        if let Err(e) = db.log_exchange(question, result.result.clone(), sources).await {
            log::warn!("Failed to log exchange: {}", e);
        }
    }

    Json(QueryResponse {
        answer: result.result,
        sources: result
            .source_documents
            .into_iter()
            .map(|doc| SourceDocument {
                source: doc.source().to_string(),
                content: doc.page_content,
            })
            .collect(),
    })
    .into_response()
}

async fn history_handler(State(state): State<AppState>) -> Response {
    let db = match &state.db {
        Some(db) => db,
        None => return Json(Vec::<LoggedExchange>::new()).into_response(),
    };
    match db.recent_exchanges(HISTORY_LIMIT).await {
        Ok(exchanges) => Json(exchanges).into_response(),
        Err(e) => {
            log::error!("Database error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}
