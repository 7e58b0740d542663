//! Group list and maintenance.

use axum::extract::{Path, Query, State};
use axum::response::Response;

use crate::forms::GroupForm;
use crate::models::{GroupRecord, ListQuery, NEW_RECORD_ID};
use crate::web::extract::{Caller, Submission};
use crate::web::respond::{respond, Reply};
use crate::web::state::SharedState;

fn group_path(group_id: i64) -> String {
    format!("/groups/{}", group_id)
}

pub async fn list_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Response {
    let result = state
        .office
        .list_groups(&query)
        .and_then(|page| Reply::page("groups/list.html", &page, &query));
    respond(&state, &caller, result, "/").await
}

pub async fn edit_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(group_id): Path<i64>,
) -> Response {
    let group = if group_id == NEW_RECORD_ID {
        Ok(GroupRecord {
            id: NEW_RECORD_ID,
            name: String::new(),
        })
    } else {
        state.office.group(group_id)
    };
    let result = group.and_then(|group| Ok(Reply::view("groups/edit.html", &group)?.with("group", &group)));
    respond(&state, &caller, result, "/groups").await
}

pub async fn save_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(group_id): Path<i64>,
    Submission(form): Submission<GroupForm>,
) -> Response {
    let result = state
        .office
        .save_group(&caller.principal, group_id, form)
        .map(|saved| Reply::done(saved.message, "/groups"));
    respond(&state, &caller, result, &group_path(group_id)).await
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(group_id): Path<i64>,
) -> Response {
    let result = state
        .office
        .delete_group(&caller.principal, group_id)
        .map(|message| Reply::done(message, "/groups"));
    respond(&state, &caller, result, &group_path(group_id)).await
}
