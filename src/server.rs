//! Web front end: upload form, report pages and an admin listing.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::ai_service::AIService;
use crate::config::CritiqueConfig;
use crate::store::ReviewStore;
use crate::templates;
use crate::upload::{FormErrors, RawUpload};

const ADMIN_LIST_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("upload too large")]
    PayloadTooLarge,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, title, message) = match &self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "Not found",
                "No such report.".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", msg.clone()),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Upload too large",
                "The uploaded file is larger than this server accepts.".to_string(),
            ),
            AppError::Internal(e) => {
                error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server error",
                    "Something went wrong while handling this request.".to_string(),
                )
            }
        };

        match templates::error_page(title, &message) {
            Ok(page) => (status, Html(page)).into_response(),
            Err(_) => (status, message).into_response(),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        // Body limit hits surface here when no Content-Length was sent.
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::BadRequest(e.body_text())
        }
    }
}

/// Shared state across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: ReviewStore,
    pub reviewer: Arc<AIService>,
}

impl AppState {
    pub fn new(store: ReviewStore, reviewer: AIService) -> Self {
        Self {
            store,
            reviewer: Arc::new(reviewer),
        }
    }
}

/// Run a store call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(anyhow::Error::from)??;
    Ok(result)
}

async fn upload_page() -> Result<Html<String>, AppError> {
    Ok(Html(templates::upload_page(&FormErrors::default(), "")?))
}

async fn collect_upload(mut multipart: Multipart) -> Result<RawUpload, AppError> {
    let mut raw = RawUpload::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                raw.filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                raw.content = Some(bytes.to_vec());
            }
            "language_hint" => {
                let text = field.text().await?;
                raw.language_hint = Some(text);
            }
            _ => {}
        }
    }

    Ok(raw)
}

async fn upload_code(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let raw = collect_upload(multipart).await?;
    let submitted_hint = raw.language_hint.clone().unwrap_or_default();

    let upload = match raw.validate() {
        Ok(upload) => upload,
        Err(errors) => {
            let page = templates::upload_page(&errors, &submitted_hint)?;
            return Ok((StatusCode::BAD_REQUEST, Html(page)).into_response());
        }
    };

    info!(
        "📥 Upload received: {} ({} bytes)",
        upload.filename,
        upload.code_text.len()
    );

    let store = state.store.clone();
    let (filename, code) = (upload.filename.clone(), upload.code_text.clone());
    let report = blocking(move || store.create(&filename, &code)).await?;

    let review_text = state
        .reviewer
        .review_code(&upload.code_text, &upload.language_hint)
        .await;

    let store = state.store.clone();
    let id = report.id;
    blocking(move || store.update_review(id, &review_text)).await?;

    Ok(Redirect::to(&format!("/report/{}", id)).into_response())
}

async fn view_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let store = state.store.clone();
    let report = blocking(move || store.get(id))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Html(templates::report_page(&report)?))
}

async fn admin_reports(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let store = state.store.clone();
    let reports = blocking(move || store.list_recent(ADMIN_LIST_LIMIT)).await?;
    Ok(Html(templates::admin_reports_page(&reports)?))
}

async fn not_found() -> AppError {
    AppError::NotFound
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(upload_page).post(upload_code))
        .route("/report/:id", get(view_report))
        .route("/admin/reports", get(admin_reports))
        .route("/health", get(|| async { "ok" }))
        .fallback(not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store, build the reviewer and serve until the process stops.
pub async fn start_server(config: &CritiqueConfig) -> anyhow::Result<()> {
    let db_path = config.database_path()?;
    let store = ReviewStore::open_at(&db_path)?;
    let reviewer = AIService::new(config.ai_config());

    info!("📄 Report store: {}", db_path.display());
    info!(
        "   Gemini configured: {}",
        if reviewer.is_configured() {
            "✅ YES"
        } else {
            "❌ NO (fallback checklist only)"
        }
    );

    let app = router(AppState::new(store, reviewer), config.max_upload_bytes);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("⚡ critique listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
