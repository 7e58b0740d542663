//! One formatting path for every handler result.
//!
//! Handlers return a [`Reply`] describing what happened; the caller's
//! negotiated [`Format`] decides whether that becomes a rendered template, a
//! JSON body, a redirect with a flash message, or a plain-text sentinel.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;
use tera::Context;

use crate::errors::{AppError, AppResult};
use crate::models::{ListQuery, Page, Principal};
use crate::session::{FlashKind, FlashMessage};
use crate::web::extract::{Caller, Format};
use crate::web::state::AppState;

/// Plain-text body an upload or association endpoint returns on success.
pub const OK_SENTINEL: &str = "OK";

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

pub fn api_message(message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "message": message.into() });
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub fn plain_text(text: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text.into(),
    )
        .into_response()
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        AppError::Storage(_) => StatusCode::BAD_GATEWAY,
        AppError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub enum Reply {
    /// Data shown as a page (HTML) or returned as-is (JSON).
    View {
        template: &'static str,
        context: Context,
        json: serde_json::Value,
    },
    /// A completed write: `{"message"}` for JSON, flash and redirect for HTML.
    Done { message: String, redirect: String },
    /// Plain text regardless of format.
    Text(String),
}

impl Reply {
    pub fn view<T: Serialize>(template: &'static str, data: &T) -> AppResult<Self> {
        let json = serde_json::to_value(data)?;
        let mut context = Context::new();
        if let serde_json::Value::Object(map) = &json {
            for (key, value) in map {
                context.insert(key.as_str(), value);
            }
        }
        Ok(Self::View {
            template,
            context,
            json,
        })
    }

    /// A list page together with its paging controls.
    pub fn page<T: Serialize>(template: &'static str, page: &Page<T>, query: &ListQuery) -> AppResult<Self> {
        Ok(Self::view(template, page)?
            .with("query", query)
            .with("range", &page.display_x_to_y_of_z())
            .with("hasPrev", &page.has_prev())
            .with("hasNext", &page.has_next()))
    }

    /// Adds a value only the HTML rendering needs.
    pub fn with<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        if let Self::View { context, .. } = &mut self {
            context.insert(key, value);
        }
        self
    }

    pub fn done(message: impl Into<String>, redirect: impl Into<String>) -> Self {
        Self::Done {
            message: message.into(),
            redirect: redirect.into(),
        }
    }

    /// `OK` on success, otherwise the failure message, always as text.
    pub fn sentinel<T>(result: AppResult<T>) -> Self {
        match result {
            Ok(_) => Self::Text(OK_SENTINEL.to_string()),
            Err(err) => Self::Text(err.user_message().to_string()),
        }
    }
}

pub async fn respond(state: &AppState, caller: &Caller, result: AppResult<Reply>, back: &str) -> Response {
    match result {
        Ok(Reply::View {
            template,
            context,
            json,
        }) => match caller.format {
            Format::Json => (StatusCode::OK, axum::Json(json)).into_response(),
            Format::Html => {
                render(
                    state,
                    caller.session_id.as_deref(),
                    Some(&caller.principal),
                    template,
                    context,
                )
                .await
            }
        },
        Ok(Reply::Done { message, redirect }) => match caller.format {
            Format::Json => api_message(message),
            Format::Html => {
                flash(state, caller.session_id.as_deref(), FlashKind::Success, message).await;
                Redirect::to(&redirect).into_response()
            }
        },
        Ok(Reply::Text(text)) => plain_text(text),
        Err(err) => fail(state, caller.format, caller.session_id.as_deref(), err, back).await,
    }
}

/// Error envelope for JSON; flash and redirect back for HTML.
pub async fn fail(
    state: &AppState,
    format: Format,
    session_id: Option<&str>,
    err: AppError,
    back: &str,
) -> Response {
    if err.is_recoverable_input() {
        tracing::debug!(error = %err, "request rejected");
    }
    match (format, session_id) {
        (Format::Html, Some(session_id)) => {
            flash(state, Some(session_id), FlashKind::Error, err.user_message()).await;
            Redirect::to(back).into_response()
        }
        (Format::Html, None) => (status_for(&err), err.user_message().to_string()).into_response(),
        (Format::Json, _) => api_error(status_for(&err), err.user_message()),
    }
}

pub async fn flash(state: &AppState, session_id: Option<&str>, kind: FlashKind, message: impl Into<String>) {
    if let Some(session_id) = session_id {
        state
            .sessions
            .push_flash(session_id, FlashMessage::new(kind, message))
            .await;
    }
}

/// Renders a page with the shared layout values filled in.
pub async fn render(
    state: &AppState,
    session_id: Option<&str>,
    principal: Option<&Principal>,
    template: &str,
    context: Context,
) -> Response {
    render_with_flashes(state, session_id, principal, template, context, Vec::new()).await
}

/// Like [`render`], showing `carried` flashes ahead of the session's own.
pub async fn render_with_flashes(
    state: &AppState,
    session_id: Option<&str>,
    principal: Option<&Principal>,
    template: &str,
    mut context: Context,
    mut carried: Vec<FlashMessage>,
) -> Response {
    if let Some(session_id) = session_id {
        carried.extend(state.sessions.take_flashes(session_id).await);
    }
    context.insert("flashes", &carried);
    context.insert("principal", &principal);
    match state.templates.render(template, &context) {
        Ok(html) => axum::response::Html(html).into_response(),
        Err(err) => {
            tracing::error!(template, error = %err, "template render failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.user_message())
        }
    }
}
