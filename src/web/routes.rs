//! Request handlers.

use super::render::{self, Tab, DEFAULT_EDIT_INSTRUCTION};
use super::AppState;
use crate::error::StudioError;
use crate::gemini::ModelBackend;
use crate::media::ImageFormat;
use crate::service::{self, Notice, NoticeLevel};
use crate::session::{SessionHandle, SessionId};
use crate::store::{Gallery, GALLERY_LIMIT};
use axum::async_trait;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequestParts, Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "gemini_studio_session";

/// Reply recorded when chat is attempted without a usable key.
const CHAT_KEY_ERROR: &str = "Error: Please provide a valid API key in the sidebar.";

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/chat", get(chat_view).post(chat_submit))
        .route("/generate", get(generate_view).post(generate_submit))
        .route("/edit", get(edit_view).post(edit_submit))
        .route("/settings/api-key", post(set_api_key))
        .route("/settings/clear-chat", post(clear_chat))
        .route("/images/:name", get(image_inline))
        .route("/images/:name/download", get(image_download))
        .route("/health", get(health))
}

/// The caller's session, created on first contact.
pub(super) struct CurrentSession {
    id: SessionId,
    state: SessionHandle,
    is_new: bool,
}

impl CurrentSession {
    /// Finishes a response, attaching the session cookie for new sessions.
    fn respond(&self, body: impl IntoResponse) -> Response {
        let mut response = body.into_response();
        if self.is_new {
            let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!("invalid session cookie: {e}"),
            }
        }
        response
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        app: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let requested = session_from_cookies(&parts.headers);
        let (id, state, is_new) = app.sessions.get_or_create(requested).await;
        if is_new {
            tracing::debug!(session = %id, "started session");
        }
        Ok(Self { id, state, is_new })
    }
}

fn session_from_cookies(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| SessionId::parse(value))
}

fn connect(app: &AppState, api_key: &str) -> Result<Arc<dyn ModelBackend>, StudioError> {
    app.clients.connect(api_key).inspect_err(|e| {
        tracing::warn!("could not create model client: {e}");
    })
}

async fn load_gallery(app: &AppState, notices: &mut Vec<Notice>) -> Gallery {
    let store = app.store.clone();
    let listed = tokio::task::spawn_blocking(move || store.gallery(GALLERY_LIMIT))
        .await
        .map_err(|e| StudioError::Io(std::io::Error::other(e)))
        .and_then(|listed| listed);
    listed.unwrap_or_else(|e| {
        tracing::warn!("could not list images: {e}");
        notices.push(Notice::new(
            NoticeLevel::Error,
            format!("Could not read the image gallery: {e}"),
        ));
        Gallery::default()
    })
}

async fn index() -> Redirect {
    Redirect::to(Tab::Chat.path())
}

async fn chat_view(session: CurrentSession) -> Response {
    let state = session.state.lock().await;
    let page = render::chat_page(&state, &[]);
    session.respond(Html(page))
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    #[serde(default)]
    message: String,
}

async fn chat_submit(
    State(app): State<AppState>,
    session: CurrentSession,
    Form(form): Form<ChatForm>,
) -> Response {
    let message = form.message.trim();
    if !message.is_empty() {
        let mut state = session.state.lock().await;
        let history = state.chat_history.clone();
        state.push_user(message);

        let reply = match connect(&app, &state.api_key) {
            Ok(backend) => match service::chat(&*backend, &history, message).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!("chat failed: {e}");
                    format!("Error: {e}")
                }
            },
            Err(StudioError::Auth(_)) => CHAT_KEY_ERROR.to_string(),
            Err(e) => format!("Error: {e}"),
        };
        state.push_model(reply);
    }
    session.respond(Redirect::to(Tab::Chat.path()))
}

async fn generate_view(State(app): State<AppState>, session: CurrentSession) -> Response {
    let mut notices = Vec::new();
    let gallery = load_gallery(&app, &mut notices).await;
    let state = session.state.lock().await;
    let page = render::generate_page(&state, &notices, &gallery);
    session.respond(Html(page))
}

#[derive(Debug, Deserialize)]
struct GenerateForm {
    #[serde(default)]
    prompt: String,
}

async fn generate_submit(
    State(app): State<AppState>,
    session: CurrentSession,
    Form(form): Form<GenerateForm>,
) -> Response {
    let mut state = session.state.lock().await;
    let mut notices = match connect(&app, &state.api_key) {
        Ok(backend) => {
            let outcome = service::generate_image(&*backend, &app.store, &form.prompt).await;
            if let Some(path) = outcome.image {
                state.last_generated_image = Some(path);
                state.current_prompt = Some(form.prompt.clone());
            }
            outcome.notices
        }
        Err(e) => vec![Notice::new(NoticeLevel::Error, e.to_string())],
    };

    let gallery = load_gallery(&app, &mut notices).await;
    let page = render::generate_page(&state, &notices, &gallery);
    session.respond(Html(page))
}

async fn edit_view(session: CurrentSession) -> Response {
    let state = session.state.lock().await;
    let page = render::edit_page(&state, &[]);
    session.respond(Html(page))
}

#[derive(Debug, Default)]
struct EditForm {
    image: Vec<u8>,
    instruction: Option<String>,
}

async fn read_edit_form(multipart: &mut Multipart) -> Result<EditForm, MultipartError> {
    let mut form = EditForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => form.image = field.bytes().await?.to_vec(),
            Some("instruction") => form.instruction = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(form)
}

async fn edit_submit(
    State(app): State<AppState>,
    session: CurrentSession,
    mut multipart: Multipart,
) -> Response {
    let form = read_edit_form(&mut multipart).await;
    let mut state = session.state.lock().await;

    let notices = match form {
        Err(e) => {
            tracing::warn!("bad edit form: {e}");
            vec![Notice::new(
                NoticeLevel::Error,
                format!("Could not read the upload: {}", e.body_text()),
            )]
        }
        Ok(form) => {
            let instruction = form
                .instruction
                .unwrap_or_else(|| DEFAULT_EDIT_INSTRUCTION.to_string());
            match connect(&app, &state.api_key) {
                Ok(backend) => {
                    let outcome = service::edit_image(
                        &*backend,
                        &app.store,
                        &app.scratch_dir,
                        &form.image,
                        &instruction,
                    )
                    .await;
                    if let Some(path) = outcome.image {
                        state.last_edited_image = Some(path);
                        state.last_edit_prompt = Some(instruction);
                    }
                    outcome.notices
                }
                Err(e) => vec![Notice::new(NoticeLevel::Error, e.to_string())],
            }
        }
    };

    let page = render::edit_page(&state, &notices);
    session.respond(Html(page))
}

#[derive(Debug, Deserialize)]
struct ApiKeyForm {
    #[serde(default)]
    api_key: String,
    return_to: Option<String>,
}

async fn set_api_key(session: CurrentSession, Form(form): Form<ApiKeyForm>) -> Response {
    {
        let mut state = session.state.lock().await;
        state.api_key = form.api_key.trim().to_string();
        tracing::debug!(session = %session.id, has_key = state.has_api_key(), "updated api key");
    }
    let target = form
        .return_to
        .as_deref()
        .and_then(Tab::from_path)
        .unwrap_or(Tab::Chat);
    session.respond(Redirect::to(target.path()))
}

async fn clear_chat(session: CurrentSession) -> Response {
    let mut state = session.state.lock().await;
    state.clear_history();
    let notices = [Notice::new(NoticeLevel::Success, "Chat history cleared!")];
    let page = render::chat_page(&state, &notices);
    session.respond(Html(page))
}

async fn image_inline(State(app): State<AppState>, Path(name): Path<String>) -> Response {
    serve_image(&app, &name, false)
}

async fn image_download(State(app): State<AppState>, Path(name): Path<String>) -> Response {
    serve_image(&app, &name, true)
}

fn serve_image(app: &AppState, name: &str, attachment: bool) -> Response {
    let data = match app.store.read_image(name) {
        Ok(data) => data,
        Err(e) => return error_response(e),
    };

    let mut response = ([(CONTENT_TYPE, ImageFormat::sniff_mime_type(&data))], data).into_response();
    if attachment {
        let disposition = if name.is_ascii() && !name.contains('"') {
            format!("attachment; filename=\"{name}\"")
        } else {
            format!("attachment; filename*=UTF-8''{}", urlencoding::encode(name))
        };
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            response.headers_mut().insert(CONTENT_DISPOSITION, value);
        }
    }
    response
}

fn error_response(err: StudioError) -> Response {
    let status = match &err {
        StudioError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        StudioError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => {
            tracing::warn!("request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string()).into_response()
}

async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": app.sessions.len().await,
    }))
}
