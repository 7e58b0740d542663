//! User administration, self-service profile and password changes.

use axum::extract::{Path, Query, State};
use axum::response::Response;

use crate::errors::AppResult;
use crate::forms::{PasswordForm, UserForm};
use crate::models::{GroupRecord, ListQuery, NEW_RECORD_ID};
use crate::web::extract::{Caller, Submission};
use crate::web::respond::{respond, Reply, OK_SENTINEL};
use crate::web::state::SharedState;

fn user_path(user_id: i64) -> String {
    format!("/users/{}", user_id)
}

/// Group membership changes answer `OK` or `ERROR: <reason>` as plain text.
fn membership_reply(result: AppResult<bool>) -> Reply {
    match result {
        Ok(_) => Reply::Text(OK_SENTINEL.to_string()),
        Err(err) => Reply::Text(format!("ERROR: {}", err.user_message())),
    }
}

pub async fn list_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Response {
    let office = &state.office;
    let result = office.list_users(&caller.principal, &query).and_then(|page| {
        Ok(Reply::page("users/list.html", &page, &query)?.with("groups", &office.all_groups()?))
    });
    respond(&state, &caller, result, "/").await
}

fn edit_reply(user: &serde_json::Value, groups: &[GroupRecord]) -> AppResult<Reply> {
    Ok(Reply::view("users/edit.html", user)?
        .with("user", user)
        .with("allGroups", groups))
}

pub async fn edit_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(user_id): Path<i64>,
) -> Response {
    let office = &state.office;
    let result = if user_id == NEW_RECORD_ID {
        office.policy().require_admin(&caller.principal).and_then(|()| {
            let blank = serde_json::json!({
                "id": NEW_RECORD_ID,
                "username": "",
                "email": "",
                "fullname": "",
                "lastLogin": null,
                "groups": [],
            });
            edit_reply(&blank, &office.all_groups()?)
        })
    } else {
        office
            .user(&caller.principal, user_id)
            .and_then(|user| edit_reply(&serde_json::to_value(&user)?, &office.all_groups()?))
    };
    let result = result.map(|reply| reply.with("isAdmin", &caller.principal.role.is_admin()));
    respond(&state, &caller, result, "/").await
}

pub async fn save_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(user_id): Path<i64>,
    Submission(form): Submission<UserForm>,
) -> Response {
    let result = state.office.save_user(&caller.principal, user_id, form);
    if let (Ok(saved), Some(session_id)) = (&result, caller.session_id.as_deref()) {
        if saved.record.id == caller.principal.user_id {
            state
                .sessions
                .set_username(session_id, &saved.record.username)
                .await;
        }
    }
    let result = result.map(|saved| Reply::done(saved.message, user_path(saved.record.id)));
    respond(&state, &caller, result, &user_path(user_id)).await
}

pub async fn password_page_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(user_id): Path<i64>,
) -> Response {
    let result = state
        .office
        .user(&caller.principal, user_id)
        .and_then(|user| Ok(Reply::view("users/password.html", &user)?.with("user", &user)));
    respond(&state, &caller, result, "/").await
}

pub async fn change_password_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(user_id): Path<i64>,
    Submission(form): Submission<PasswordForm>,
) -> Response {
    let result = state
        .office
        .change_password(&caller.principal, user_id, form)
        .map(|message| Reply::done(message, user_path(user_id)));
    respond(&state, &caller, result, &format!("/users/{}/password", user_id)).await
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(user_id): Path<i64>,
) -> Response {
    let result = state
        .office
        .delete_user(&caller.principal, user_id)
        .map(|message| Reply::done(message, "/users"));
    respond(&state, &caller, result, &user_path(user_id)).await
}

pub async fn add_group_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path((user_id, group_id)): Path<(i64, i64)>,
) -> Response {
    let result = state.office.add_user_group(&caller.principal, user_id, group_id);
    respond(&state, &caller, Ok(membership_reply(result)), &user_path(user_id)).await
}

pub async fn remove_group_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path((user_id, group_id)): Path<(i64, i64)>,
) -> Response {
    let result = state.office.remove_user_group(&caller.principal, user_id, group_id);
    respond(&state, &caller, Ok(membership_reply(result)), &user_path(user_id)).await
}

#[cfg(test)]
mod tests {
    use super::membership_reply;
    use crate::errors::AppError;
    use crate::web::respond::Reply;

    #[test]
    fn membership_errors_are_prefixed() {
        match membership_reply(Err(AppError::NotFound("User not found.".into()))) {
            Reply::Text(text) => assert_eq!(text, "ERROR: User not found."),
            _ => panic!("expected text"),
        }
        match membership_reply(Ok(false)) {
            Reply::Text(text) => assert_eq!(text, "OK"),
            _ => panic!("expected text"),
        }
    }
}
