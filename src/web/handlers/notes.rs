//! Notes attached to an analyst.

use axum::extract::{Path, State};
use axum::response::Response;

use crate::forms::NoteForm;
use crate::web::extract::{Caller, Submission};
use crate::web::respond::{respond, Reply};
use crate::web::state::SharedState;

fn note_path(analyst_id: i64, note_id: i64) -> String {
    format!("/analysts/{}/notes/{}", analyst_id, note_id)
}

pub async fn edit_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path((analyst_id, note_id)): Path<(i64, i64)>,
) -> Response {
    let office = &state.office;
    let result = office.note(analyst_id, note_id).and_then(|note| {
        let analyst = office.analyst_record(analyst_id)?;
        let data = serde_json::json!({
            "analystId": analyst_id,
            "fullName": analyst.full_name(),
            "note": note,
        });
        Reply::view("notes/edit.html", &data)
    });
    respond(&state, &caller, result, &format!("/analysts/{}", analyst_id)).await
}

pub async fn save_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path((analyst_id, note_id)): Path<(i64, i64)>,
    Submission(form): Submission<NoteForm>,
) -> Response {
    let result = state
        .office
        .save_note(&caller.principal, analyst_id, note_id, form)
        .map(|saved| Reply::done(saved.message, format!("/analysts/{}", analyst_id)));
    respond(&state, &caller, result, &note_path(analyst_id, note_id)).await
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path((analyst_id, note_id)): Path<(i64, i64)>,
) -> Response {
    let result = state
        .office
        .delete_note(analyst_id, note_id)
        .map(|message| Reply::done(message, format!("/analysts/{}", analyst_id)));
    respond(&state, &caller, result, &format!("/analysts/{}", analyst_id)).await
}
