//! Sign-in, sign-out, the home page and the unknown-route fallback.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use tera::Context;

use crate::forms::LoginForm;
use crate::models::ListQuery;
use crate::session::{decode_flashes, encode_flashes, FlashKind, FlashMessage, FLASH_COOKIE, SESSION_COOKIE};
use crate::web::extract::{Caller, Format, Submission};
use crate::web::respond::{api_error, api_message, render_with_flashes, respond, Reply};
use crate::web::state::SharedState;

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Carries a flash to the next page for a caller without a session.
fn flash_cookie(flash: FlashMessage) -> Cookie<'static> {
    Cookie::build((FLASH_COOKIE, encode_flashes(&[flash])))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub async fn home_handler(State(state): State<SharedState>, caller: Caller) -> Response {
    let query = ListQuery::default();
    let result = state
        .office
        .list_analysts(&query)
        .and_then(|page| Reply::page("analysts/list.html", &page, &query));
    respond(&state, &caller, result, "/login").await
}

pub async fn login_page_handler(State(state): State<SharedState>, format: Format, jar: CookieJar) -> Response {
    match format {
        Format::Json => api_message("Send username and password to sign in."),
        Format::Html => {
            let session_id = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string());
            let carried = jar
                .get(FLASH_COOKIE)
                .map(|cookie| decode_flashes(cookie.value()))
                .unwrap_or_default();
            let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
            let page = render_with_flashes(
                &state,
                session_id.as_deref(),
                None,
                "login.html",
                Context::new(),
                carried,
            )
            .await;
            (jar, page).into_response()
        }
    }
}

pub async fn login_handler(
    State(state): State<SharedState>,
    format: Format,
    jar: CookieJar,
    Submission(form): Submission<LoginForm>,
) -> Response {
    match state.office.login(&form.username, &form.password) {
        Ok(principal) => {
            if let Some(cookie) = jar.get(SESSION_COOKIE) {
                state.sessions.close_session(cookie.value()).await;
            }
            let session_id = state.sessions.open_session(&principal.username).await;
            let jar = jar.add(session_cookie(session_id));
            let message = format!("Signed in as {}.", principal.fullname);
            match format {
                Format::Json => (jar, api_message(message)).into_response(),
                Format::Html => (jar, Redirect::to("/")).into_response(),
            }
        }
        Err(err) => match format {
            Format::Json => api_error(StatusCode::UNAUTHORIZED, err.user_message()),
            Format::Html => {
                let jar = jar.add(flash_cookie(FlashMessage::new(FlashKind::Error, err.user_message())));
                (jar, Redirect::to("/login")).into_response()
            }
        },
    }
}

pub async fn logout_handler(State(state): State<SharedState>, format: Format, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.close_session(cookie.value()).await;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    match format {
        Format::Json => (jar, api_message("You have signed out.")).into_response(),
        Format::Html => {
            let jar = jar.add(flash_cookie(FlashMessage::new(FlashKind::Info, "You have signed out.")));
            (jar, Redirect::to("/login")).into_response()
        }
    }
}

pub async fn not_found_handler(headers: HeaderMap, uri: Uri) -> Response {
    let message = format!("URL not found: {}", uri);
    match Format::negotiate(&headers) {
        Some(Format::Html) => (StatusCode::NOT_FOUND, message).into_response(),
        _ => api_error(StatusCode::NOT_FOUND, message),
    }
}
