//! Dropdown data: desks, ranks and statuses.

use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use crate::errors::AppResult;
use crate::forms::DeskForm;
use crate::web::extract::{Caller, Submission};
use crate::web::respond::{respond, Reply};
use crate::web::state::SharedState;

/// JSON callers get the bare list; the page shows it under a heading.
fn lookup_reply<T: Serialize>(kind: &str, items: &[T]) -> AppResult<Reply> {
    Ok(Reply::view("lookups.html", &items)?
        .with("kind", kind)
        .with("items", items))
}

pub async fn desks_handler(State(state): State<SharedState>, caller: Caller) -> Response {
    let result = state
        .office
        .desks()
        .and_then(|desks| lookup_reply("desks", &desks))
        .map(|reply| reply.with("isAdmin", &caller.principal.role.is_admin()));
    respond(&state, &caller, result, "/").await
}

pub async fn create_desk_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Submission(form): Submission<DeskForm>,
) -> Response {
    let result = state
        .office
        .create_desk(&caller.principal, form)
        .map(|saved| Reply::done(saved.message, "/desks"));
    respond(&state, &caller, result, "/desks").await
}

pub async fn ranks_handler(State(state): State<SharedState>, caller: Caller) -> Response {
    let result = state
        .office
        .ranks()
        .and_then(|ranks| lookup_reply("ranks", &ranks));
    respond(&state, &caller, result, "/").await
}

pub async fn statuses_handler(State(state): State<SharedState>, caller: Caller) -> Response {
    let result = state
        .office
        .statuses(&caller.principal)
        .and_then(|statuses| lookup_reply("statuses", &statuses));
    respond(&state, &caller, result, "/").await
}
