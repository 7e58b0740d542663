//! Request extractors: representation negotiation, the authenticated caller
//! and form-or-JSON submissions.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{Form, FromRequest, FromRequestParts, Request};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use serde::de::DeserializeOwned;

use crate::auth::{PASSWORD_HEADER, USERNAME_HEADER};
use crate::models::Principal;
use crate::session::SESSION_COOKIE;
use crate::web::respond::{api_error, status_for};
use crate::web::state::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Html,
    Json,
}

impl Format {
    /// `None` when the client asks for neither HTML nor JSON.
    pub fn negotiate(headers: &HeaderMap) -> Option<Self> {
        let accept = match headers.get(ACCEPT).and_then(|value| value.to_str().ok()) {
            Some(value) => value.to_ascii_lowercase(),
            None => return Some(Self::Html),
        };
        if accept.trim().is_empty() || accept.contains("text/html") {
            Some(Self::Html)
        } else if accept.contains("application/json") || accept.contains("text/json") {
            Some(Self::Json)
        } else if accept.contains("*/*") {
            Some(Self::Html)
        } else {
            None
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Format {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::negotiate(&parts.headers).ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "Unsupported Accept header. Use text/html or application/json.",
            )
        })
    }
}

pub fn session_id(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// The authenticated principal making the request.
pub struct Caller {
    pub principal: Principal,
    pub format: Format,
    pub session_id: Option<String>,
}

#[async_trait]
impl FromRequestParts<SharedState> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let format = Format::from_request_parts(parts, state).await?;
        let session_id = session_id(&parts.headers);
        let session_username = match session_id.as_deref() {
            Some(id) => state.sessions.username(id).await,
            None => None,
        };
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string)
        };
        let username = header(USERNAME_HEADER);
        let password = header(PASSWORD_HEADER);
        let credentials = match (username.as_deref(), password.as_deref()) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        };

        match state
            .office
            .resolve_principal(session_username.as_deref(), credentials)
        {
            Ok(Some(principal)) => Ok(Self {
                principal,
                format,
                session_id,
            }),
            Ok(None) => Err(match format {
                Format::Html => Redirect::to("/login").into_response(),
                Format::Json => api_error(StatusCode::UNAUTHORIZED, "Authentication required."),
            }),
            Err(err) => {
                tracing::error!(error = %err, "failed to resolve caller");
                Err(api_error(status_for(&err), err.user_message()))
            }
        }
    }
}

/// A submitted body, JSON when the content type says so, otherwise a
/// url-encoded form.
pub struct Submission<T>(pub T);

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            let value = value.to_ascii_lowercase();
            value.starts_with("application/json") || value.starts_with("text/json")
        })
        .unwrap_or(false)
}

#[async_trait]
impl<S, T> FromRequest<S> for Submission<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json_content(req.headers()) {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            let value = serde_json::from_slice(&bytes).map_err(|err| {
                api_error(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", err))
            })?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| api_error(StatusCode::BAD_REQUEST, rejection.body_text()))?;
            Ok(Self(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{is_json_content, session_id, Format};
    use axum::http::header::{ACCEPT, CONTENT_TYPE, COOKIE};
    use axum::http::{HeaderMap, HeaderValue};

    fn headers(name: axum::http::HeaderName, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn negotiates_representation_from_accept() {
        assert_eq!(Format::negotiate(&HeaderMap::new()), Some(Format::Html));
        assert_eq!(
            Format::negotiate(&headers(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")),
            Some(Format::Html)
        );
        assert_eq!(Format::negotiate(&headers(ACCEPT, "application/json")), Some(Format::Json));
        assert_eq!(Format::negotiate(&headers(ACCEPT, "text/json")), Some(Format::Json));
        assert_eq!(Format::negotiate(&headers(ACCEPT, "*/*")), Some(Format::Html));
        assert_eq!(Format::negotiate(&headers(ACCEPT, "image/png")), None);
    }

    #[test]
    fn reads_session_cookie_and_json_content() {
        let cookie = headers(COOKIE, "theme=dark; SNO2_SESSION=abc-123");
        assert_eq!(session_id(&cookie).as_deref(), Some("abc-123"));
        assert!(is_json_content(&headers(CONTENT_TYPE, "application/json; charset=utf-8")));
        assert!(!is_json_content(&headers(CONTENT_TYPE, "application/x-www-form-urlencoded")));
    }
}
