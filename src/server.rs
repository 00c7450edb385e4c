//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the render thread
//! runs on a plain `std::thread`. Hardware work goes through the
//! [`RenderHandle`]; image decoding and resizing run on tokio's blocking pool.
//!
//! ## Rust concepts
//! - axum extractors: `State`, `Path`, `Json`, `Bytes`
//! - `Arc` for sharing read-only state across async tasks
//! - `spawn_blocking` for CPU-bound work inside an async handler
//! - `tower-http` middleware for CORS and request tracing

use crate::config::{LightbarConfig, LightbarSettings};
use crate::error::LightbarError;
use crate::lightbar::{DisplaySettings, prepare};
use crate::playback::{DEFAULT_FPS, PlaybackReport, clamp_fps};
use crate::render::{DisplayState, DisplayStatus, RenderCommand, RenderHandle, lock_status};
use crate::sequencer::ResamplingMode;
use crate::store::{ActiveStats, ImageSize, ImageStat, ImageStats, ImageStore};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Most extra passes one display request may ask for.
pub const MAX_REPEAT: usize = 1000;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Everything in here is cheap to clone: axum clones the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Queue to the render thread
    pub render: RenderHandle,
    /// Shared display status (render thread writes, handlers read)
    pub status: Arc<Mutex<DisplayStatus>>,
    pub store: ImageStore,
    /// Settings file as loaded at startup
    pub settings: Arc<LightbarSettings>,
    pub config: Arc<LightbarConfig>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        get_settings,
        get_images,
        post_image,
        get_active,
        post_active,
        post_display,
        post_display_off,
        post_display_stop,
    ),
    components(schemas(
        DisplayStatus,
        DisplayState,
        PlaybackReport,
        LightbarSettings,
        crate::config::DeviceSettings,
        ImageSize,
        ImageStat,
        ImageStats,
        ActiveStats,
        ResamplingMode,
        UploadResponse,
        ActiveRequest,
        DisplayRequest,
    )),
    tags(
        (name = "display", description = "Display control endpoints"),
        (name = "images", description = "Image upload and preparation endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Lightbar API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for painting images with a segmented APA102 lightbar"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    /// Name the image is stored under
    #[schema(example = "sunset")]
    name: String,
    stats: ImageStats,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRequest {
    /// Name of a stored image. Use GET /api/v1/images to list them.
    #[schema(example = "sunset")]
    image_name: String,
    /// NEAREST, BOX, BILINEAR, HAMMING, BICUBIC or LANCZOS (case-insensitive)
    #[serde(default = "default_resampling")]
    #[schema(example = "BICUBIC", default = "BICUBIC")]
    resampling: String,
    /// Global brightness, 0.0 - 1.0
    #[schema(example = 0.5, minimum = 0.0, maximum = 1.0)]
    brightness: f32,
    /// Frames (columns) per second; values outside (0, 30] fall back to 30
    #[serde(default = "default_fps")]
    #[schema(example = 30, default = 30)]
    fps: f64,
}

fn default_resampling() -> String {
    ResamplingMode::default().as_str().to_string()
}

fn default_fps() -> f64 {
    DEFAULT_FPS
}

/// Overrides for one display run. Omitted fields come from the active stats.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct DisplayRequest {
    #[schema(example = 30)]
    fps: Option<f64>,
    #[schema(example = 0.5)]
    brightness: Option<f32>,
    /// Extra passes after the first, at most 1000
    #[serde(default)]
    #[schema(example = 0, default = 0, maximum = 1000)]
    repeat: usize,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
///
/// Stored images and the active artifacts are served under `/data`, which is
/// where the `url` fields in their stats point.
pub fn create_router(state: AppState) -> Router {
    let data_dir = ServeDir::new(state.store.root());
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/images", get(get_images))
        .route(
            "/api/v1/images/{file_name}",
            post(post_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/v1/active", get(get_active).post(post_active))
        .route("/api/v1/display", post(post_display))
        .route("/api/v1/display/off", post(post_display_off))
        .route("/api/v1/display/stop", post(post_display_stop))
        .nest_service("/data", data_dir)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error mapping ────────────────────────────────────────────────────

/// Map a library error onto an HTTP status and message.
fn error_response(err: LightbarError) -> (StatusCode, String) {
    let status = match &err {
        LightbarError::ImageNotFound(_) => StatusCode::NOT_FOUND,
        LightbarError::InvalidResamplingMode(_)
        | LightbarError::FrameSizeMismatch { .. }
        | LightbarError::UnsupportedUpload(_)
        | LightbarError::EmptyImage
        | LightbarError::Image(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("{}", err);
    }
    (status, err.to_string())
}

fn render_gone() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Render thread gone".to_string(),
    )
}

/// Run blocking store/image work off the async runtime.
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(error_response)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status: current display state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current display status", body = DisplayStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    Json(lock_status(&state.status).clone())
}

/// GET /api/v1/settings: the lightbar settings the server was started with
#[utoipa::path(
    get,
    path = "/api/v1/settings",
    tag = "system",
    responses(
        (status = 200, description = "Loaded settings", body = LightbarSettings)
    )
)]
async fn get_settings(State(state): State<AppState>) -> Json<LightbarSettings> {
    Json(state.settings.as_ref().clone())
}

/// GET /api/v1/images: list stored images
#[utoipa::path(
    get,
    path = "/api/v1/images",
    tag = "images",
    responses(
        (status = 200, description = "Stats of every stored image, keyed by name", body = BTreeMap<String, ImageStats>)
    )
)]
async fn get_images(State(state): State<AppState>) -> Json<BTreeMap<String, ImageStats>> {
    Json(state.store.list_images())
}

/// POST /api/v1/images/{file_name}: upload an image as the raw request body
#[utoipa::path(
    post,
    path = "/api/v1/images/{file_name}",
    tag = "images",
    params(("file_name" = String, Path, description = "Original file name, e.g. sunset.png")),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Unsupported file name or undecodable image")
    )
)]
async fn post_image(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<UploadResponse>> {
    let store = state.store.clone();
    let (name, stats) = blocking(move || store.save_upload(&file_name, &body)).await?;
    Ok(Json(UploadResponse { name, stats }))
}

/// GET /api/v1/active: stats of the prepared image, `{}` when there is none
#[utoipa::path(
    get,
    path = "/api/v1/active",
    tag = "images",
    responses(
        (status = 200, description = "Active image stats, or an empty object", body = ActiveStats)
    )
)]
async fn get_active(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.store.active_stats().map_err(error_response)?;
    let body = match stats {
        Some(stats) => serde_json::to_value(stats)
            .map_err(|e| error_response(LightbarError::Json(e)))?,
        None => serde_json::json!({}),
    };
    Ok(Json(body))
}

/// POST /api/v1/active: fit a stored image to the strip and make it active
///
/// No hardware I/O: the resized image and its encoded preview are written
/// to the data directory for a later display.
#[utoipa::path(
    post,
    path = "/api/v1/active",
    tag = "images",
    request_body = ActiveRequest,
    responses(
        (status = 200, description = "Image prepared", body = ActiveStats),
        (status = 400, description = "Unknown resampling mode"),
        (status = 404, description = "Image not found")
    )
)]
async fn post_active(
    State(state): State<AppState>,
    Json(req): Json<ActiveRequest>,
) -> ApiResult<Json<ActiveStats>> {
    let mode: ResamplingMode = req.resampling.parse().map_err(error_response)?;
    let brightness = req.brightness.clamp(0.0, 1.0);
    let fps = clamp_fps(req.fps);

    let store = state.store.clone();
    let config = state.config.clone();
    let stats = blocking(move || {
        let original = store.load_original(&req.image_name)?;
        let prepared = prepare(&original, &config, mode, brightness)?;
        let stats = ActiveStats {
            width: prepared.resized.width(),
            height: prepared.resized.height(),
            fps,
            brightness,
            name: req.image_name,
            resampling: mode,
        };
        store.save_active(&prepared, &stats)?;
        Ok(stats)
    })
    .await?;

    tracing::info!(
        "Prepared {} ({}x{}, {})",
        stats.name,
        stats.width,
        stats.height,
        stats.resampling
    );
    Ok(Json(stats))
}

/// POST /api/v1/display: paint the active image, preempting any playback
#[utoipa::path(
    post,
    path = "/api/v1/display",
    tag = "display",
    request_body = DisplayRequest,
    responses(
        (status = 202, description = "Display queued"),
        (status = 400, description = "Repeat count above the limit"),
        (status = 404, description = "No active image")
    )
)]
async fn post_display(
    State(state): State<AppState>,
    body: Option<Json<DisplayRequest>>,
) -> ApiResult<StatusCode> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    if req.repeat > MAX_REPEAT {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("repeat must be at most {MAX_REPEAT}, got {}", req.repeat),
        ));
    }

    let store = state.store.clone();
    let (image, stats) = blocking(move || store.load_active())
        .await?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "No active image".to_string()))?;

    let settings = DisplaySettings {
        brightness: req.brightness.unwrap_or(stats.brightness).clamp(0.0, 1.0),
        fps: clamp_fps(req.fps.unwrap_or(stats.fps)),
        repeat: req.repeat,
    };

    state
        .render
        .send(RenderCommand::Display {
            name: stats.name,
            image,
            settings,
        })
        .map_err(|_| render_gone())?;

    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/display/off: write one dark frame, preempting any playback
#[utoipa::path(
    post,
    path = "/api/v1/display/off",
    tag = "display",
    responses(
        (status = 202, description = "Turn-off queued"),
    )
)]
async fn post_display_off(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state
        .render
        .send(RenderCommand::TurnOff)
        .map_err(|_| render_gone())?;

    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/display/stop: stop playback, leaving the strip as it is
#[utoipa::path(
    post,
    path = "/api/v1/display/stop",
    tag = "display",
    responses(
        (status = 202, description = "Stop queued"),
    )
)]
async fn post_display_stop(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state
        .render
        .send(RenderCommand::Stop)
        .map_err(|_| render_gone())?;

    Ok(StatusCode::ACCEPTED)
}
