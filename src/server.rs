//! HTTP routes in front of `TrackerCore`.
//!
//! Everything except `/health`, `/login` and `/logout` sits behind
//! `require_identity`.

use crate::config::Settings;
use crate::errors::{AppError, AppResult};
use crate::identity::{Identity, IdentityGate, SessionSealer};
use crate::models::{ActivityEntry, ActivityLogRow, Habit, HabitFilter, LogActivityPayload};
use crate::store::JsonFileStore;
use crate::tracker::TrackerCore;
use axum::{
    async_trait,
    extract::{FromRequest, Query, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const SESSION_COOKIE: &str = "habit_session";

#[derive(Clone)]
pub struct AppState {
    core: Arc<Mutex<TrackerCore>>,
    gate: IdentityGate,
    sessions: SessionSealer,
    identity_header: HeaderName,
}

impl AppState {
    pub fn new(settings: &Settings) -> AppResult<Self> {
        let store = Arc::new(JsonFileStore::new(&settings.data_dir));
        let core = TrackerCore::new(store);
        let gate = IdentityGate::new(settings.allowed_email.as_deref());
        let sessions = SessionSealer::from_config(settings.session_key.as_deref(), settings.session_ttl())?;
        Self::from_parts(core, gate, sessions, &settings.identity_header)
    }

    pub fn from_parts(
        core: TrackerCore,
        gate: IdentityGate,
        sessions: SessionSealer,
        identity_header: &str,
    ) -> AppResult<Self> {
        let identity_header = HeaderName::from_bytes(identity_header.trim().to_ascii_lowercase().as_bytes())
            .map_err(|error| AppError::Config(format!("identity_header: {}", error)))?;
        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            gate,
            sessions,
            identity_header,
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/habits", get(api_habits))
        .route("/api/log", post(api_log_activity))
        .route("/api/activity", get(api_activity))
        .route("/api/recompute", post(api_recompute))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity));

    Router::new()
        .route("/health", get(health))
        .route("/login", get(login))
        .route("/logout", post(logout))
        .merge(protected)
        .with_state(state)
}

/// Admits a live session cookie, or a verified email asserted by the
/// identity proxy; the latter also gets a fresh session cookie.
async fn require_identity(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let now = Utc::now();

    let from_session = session_cookie(request.headers())
        .and_then(|token| state.sessions.open(token, now).ok())
        .and_then(|identity| state.gate.authorize(Some(identity.email.as_str())).ok());
    if let Some(identity) = from_session {
        request.extensions_mut().insert(identity);
        return next.run(request).await;
    }

    let asserted = request
        .headers()
        .get(&state.identity_header)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let identity = match state.gate.authorize(asserted.as_deref()) {
        Ok(identity) => identity,
        Err(error) => return error.into_response(),
    };
    let token = match state.sessions.seal(&identity, now) {
        Ok(token) => token,
        Err(error) => return error.into_response(),
    };
    tracing::info!(email = %identity.email, "session started");

    request.extensions_mut().insert(identity);
    let mut response = next.run(request).await;
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        state.sessions.ttl().num_seconds()
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(error) => tracing::warn!(error = %error, "failed to encode session cookie"),
    }
    response
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

async fn health() -> impl IntoResponse {
    "OK"
}

async fn login(State(state): State<AppState>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Sign in through the identity provider",
            "identity_header": state.identity_header.as_str(),
        })),
    )
        .into_response()
}

async fn logout() -> Response {
    let cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    ([(header::SET_COOKIE, cookie)], StatusCode::NO_CONTENT).into_response()
}

/// GET /api/habits
async fn api_habits(State(state): State<AppState>) -> Result<Json<Vec<Habit>>, AppError> {
    let core = state.core.lock().await;
    Ok(Json(core.habits()?))
}

/// A log submission as JSON or as an urlencoded form. Bodies that fail to
/// parse surface as `AppError::Validation`.
struct LogSubmission(LogActivityPayload);

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for LogSubmission {
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(payload) = Form::<LogActivityPayload>::from_request(request, state)
                .await
                .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
            return Ok(Self(payload));
        }

        let Json(payload) = Json::<LogActivityPayload>::from_request(request, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(payload))
    }
}

/// POST /api/log
async fn api_log_activity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    LogSubmission(payload): LogSubmission,
) -> Result<(StatusCode, Json<ActivityEntry>), AppError> {
    let core = state.core.lock().await;
    let entry = core.log_activity(payload)?;
    tracing::debug!(email = %identity.email, progress_id = entry.progress_id, "log request served");
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    habit: Option<String>,
}

/// GET /api/activity?habit=<name|all>
async fn api_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityLogRow>>, AppError> {
    let filter = HabitFilter::parse(query.habit.as_deref());
    let core = state.core.lock().await;
    Ok(Json(core.activity_log(&filter)?))
}

/// POST /api/recompute
async fn api_recompute(State(state): State<AppState>) -> Result<Json<Vec<Habit>>, AppError> {
    let core = state.core.lock().await;
    Ok(Json(core.recompute_all()?))
}
