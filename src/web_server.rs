use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Json, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::completion::CompletionClient;
use crate::config::SETUP_INSTRUCTIONS;
use crate::constants::{DEFAULT_PORT, SESSION_COOKIE, SESSION_SWEEP_INTERVAL};
use crate::prompt::UserProfile;
use crate::session::{Message, ProfileForm, SessionError, SessionPhase, SessionState};
use crate::session_store::SessionStore;
use crate::zodiac::Constellation;

const PAGE_TITLE: &str = "Joy 心灵疗愈师";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            templates_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
        }
    }
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    sessions: SessionStore,
    client: Arc<dyn CompletionClient>,
}

impl AppState {
    pub fn new(templates_dir: impl Into<PathBuf>, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.into())),
            sessions: SessionStore::new(),
            client,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("failed to render template: {0}")]
    Template(#[from] minijinja::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        error!("{}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Internal Server Error: {}", self)),
        )
            .into_response()
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

fn render<S: Serialize>(state: &AppState, name: &str, ctx: S) -> Result<Html<String>, WebError> {
    let env = state.templates.acquire_env()?;
    let tmpl = env.get_template(name)?;
    Ok(Html(tmpl.render(ctx)?))
}

fn render_setup(state: &AppState) -> Result<Response, WebError> {
    let page = render(
        state,
        "setup.html",
        minijinja::context! {
            title => PAGE_TITLE,
            instructions => SETUP_INSTRUCTIONS,
        },
    )?;
    Ok((StatusCode::SERVICE_UNAVAILABLE, page).into_response())
}

#[derive(Serialize)]
struct PageView<'a> {
    title: &'static str,
    phase: SessionPhase,
    profile: &'a UserProfile,
    element: &'static str,
    show_welcome: bool,
    messages: Vec<&'a Message>,
    constellations: Vec<&'static str>,
    form: &'a ProfileForm,
    validation_error: Option<String>,
}

impl<'a> PageView<'a> {
    fn new(session: &'a SessionState, form: &'a ProfileForm, validation_error: Option<String>) -> Self {
        Self {
            title: PAGE_TITLE,
            phase: session.phase(),
            profile: session.profile(),
            element: session.profile().element().label(),
            show_welcome: session.is_fresh(),
            messages: session.visible_messages().collect(),
            constellations: Constellation::ALL.iter().map(|c| c.label()).collect(),
            form,
            validation_error,
        }
    }
}

/// Session id from the `joy_session` cookie, if present and well formed.
fn session_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

struct SessionHandle {
    id: Uuid,
    state: Arc<Mutex<SessionState>>,
    is_new: bool,
}

impl SessionHandle {
    async fn resolve(state: &AppState, headers: &HeaderMap) -> Self {
        let requested = session_id_from(headers);
        let (id, session) = state.sessions.get_or_create(requested).await;
        Self {
            id,
            state: session,
            is_new: requested != Some(id),
        }
    }

    /// Attaches the session cookie when the client did not already carry it.
    fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.is_new {
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, self.id);
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => error!("Failed to build session cookie: {}", e),
            }
        }
        response
    }
}

async fn index_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    if !state.client.is_configured() {
        return render_setup(&state);
    }
    let handle = SessionHandle::resolve(&state, &headers).await;
    let session = handle.state.lock().await;
    let form = ProfileForm::default();
    let page = render(&state, "index.html", PageView::new(&session, &form, None))?;
    Ok(handle.respond(page))
}

async fn profile_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ProfileForm>,
) -> Result<Response, WebError> {
    if !state.client.is_configured() {
        return render_setup(&state);
    }
    let handle = SessionHandle::resolve(&state, &headers).await;
    let mut session = handle.state.lock().await;

    match session.confirm_profile(form.clone()) {
        Ok(()) => Ok(handle.respond(Redirect::to("/"))),
        Err(SessionError::AlreadyConfirmed) => {
            warn!(session_id = %handle.id, "Profile already confirmed, ignoring resubmission");
            Ok(handle.respond(Redirect::to("/")))
        }
        Err(e) => {
            info!(session_id = %handle.id, "Profile rejected: {}", e);
            let page = render(
                &state,
                "index.html",
                PageView::new(&session, &form, Some(e.to_string())),
            )?;
            Ok(handle.respond((StatusCode::UNPROCESSABLE_ENTITY, page)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub message: String,
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(chat): Form<ChatForm>,
) -> Result<Response, WebError> {
    if !state.client.is_configured() {
        return render_setup(&state);
    }
    let handle = SessionHandle::resolve(&state, &headers).await;
    // Held for the whole turn: one in-flight turn per session.
    let mut session = handle.state.lock().await;

    match session.submit_turn(&chat.message, state.client.as_ref()).await {
        Ok(_) => info!(
            session_id = %handle.id,
            messages = session.transcript().len(),
            "Turn completed"
        ),
        Err(e) => warn!(session_id = %handle.id, "Turn rejected: {}", e),
    }
    Ok(handle.respond(Redirect::to("/")))
}

async fn reset_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    if !state.client.is_configured() {
        return render_setup(&state);
    }
    let handle = SessionHandle::resolve(&state, &headers).await;
    handle.state.lock().await.reset();
    Ok(handle.respond(Redirect::to("/")))
}

#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub configured: bool,
    pub phase: SessionPhase,
    pub profile: UserProfile,
    pub element: &'static str,
    pub has_system_prompt: bool,
    pub transcript: Vec<Message>,
}

impl SessionSnapshot {
    fn new(session_id: Option<Uuid>, configured: bool, session: &SessionState) -> Self {
        Self {
            session_id,
            configured,
            phase: session.phase(),
            profile: session.profile().clone(),
            element: session.profile().element().label(),
            has_system_prompt: session.system_prompt().is_some(),
            transcript: session.transcript().messages().to_vec(),
        }
    }
}

/// Read-only: reports a blank session instead of creating one for unknown callers.
async fn session_api_handler(State(state): State<AppState>, headers: HeaderMap) -> Json<SessionSnapshot> {
    let configured = state.client.is_configured();
    let existing = match session_id_from(&headers) {
        Some(id) => state.sessions.get(&id).await.map(|session| (id, session)),
        None => None,
    };
    match existing {
        Some((id, session)) => {
            let session = session.lock().await;
            Json(SessionSnapshot::new(Some(id), configured, &session))
        }
        None => Json(SessionSnapshot::new(None, configured, &SessionState::new())),
    }
}

pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    // Serve static files from the static directory
    let static_files_service = ServeDir::new(static_dir).not_found_service(tower::service_fn(|_req: axum::extract::Request| async {
        Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
    }));

    Router::new()
        .route("/", get(index_handler))
        .route("/profile", post(profile_handler))
        .route("/chat", post(chat_handler))
        .route("/reset", post(reset_handler))
        .route("/api/session", get(session_api_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(config: WebConfig, client: Arc<dyn CompletionClient>) -> Result<()> {
    if !client.is_configured() {
        warn!("No API key configured; the web UI will only show setup instructions");
    }
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .context(format!("Failed to bind to address {}", config.addr))?;
    info!("Web server listening on http://{}", config.addr);

    let state = AppState::new(config.templates_dir.clone(), client);
    let sweeper = state.sessions.spawn_sweeper(SESSION_SWEEP_INTERVAL);
    let app = build_router(state, &config.static_dir);

    let served = serve(listener, app.into_make_service()).await;
    sweeper.abort();
    served.context("Web server failed")?;

    Ok(())
}
