//! Analyst list, edit form, save, delete, file uploads and desk assignments.

use axum::extract::{Multipart, Path, Query, State};
use axum::response::Response;

use crate::backoffice::{Backoffice, Upload};
use crate::errors::{AppError, AppResult};
use crate::forms::{AnalystForm, DeskAssignmentForm};
use crate::models::{AnalystFields, FileSlot, ListQuery, Principal, S3FileRecord, NEW_RECORD_ID};
use crate::policy::CheckboxInput;
use crate::util::format_created_timestamp;
use crate::web::extract::{Caller, Submission};
use crate::web::respond::{respond, Reply};
use crate::web::state::SharedState;

fn analyst_path(analyst_id: i64) -> String {
    format!("/analysts/{}", analyst_id)
}

pub async fn list_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Response {
    let result = state
        .office
        .list_analysts(&query)
        .and_then(|page| Reply::page("analysts/list.html", &page, &query));
    respond(&state, &caller, result, "/").await
}

/// Dropdowns and per-field access the edit page needs alongside the record.
fn edit_reply(office: &Backoffice, principal: &Principal, data: &serde_json::Value) -> AppResult<Reply> {
    Ok(Reply::view("analysts/edit.html", data)?
        .with("analyst", data)
        .with("desks", &office.desks()?)
        .with("ranks", &office.ranks()?)
        .with("statuses", &office.statuses(principal)?)
        .with("fieldAccess", &office.policy().field_access(principal.role))
        .with("maxUploadLabel", &office.max_upload_label()))
}

pub async fn edit_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(analyst_id): Path<i64>,
) -> Response {
    let office = &state.office;
    let result = if analyst_id == NEW_RECORD_ID {
        blank_analyst().and_then(|data| edit_reply(office, &caller.principal, &data))
    } else {
        office
            .analyst_detail(&caller.principal, analyst_id)
            .and_then(|detail| {
                let created = format_created_timestamp(&detail.analyst.created_on);
                let data = serde_json::to_value(&detail)?;
                Ok(edit_reply(office, &caller.principal, &data)?
                    .with("createdLabel", &created)
                    .with("profileImageUrl", &detail.profile_image.as_ref().map(S3FileRecord::url))
                    .with("cvDocumentUrl", &detail.cv_document.as_ref().map(S3FileRecord::url)))
            })
    };
    respond(&state, &caller, result, "/analysts").await
}

fn blank_analyst() -> AppResult<serde_json::Value> {
    let mut value = serde_json::to_value(AnalystFields::default())?;
    if let Some(map) = value.as_object_mut() {
        map.insert("analystId".to_string(), NEW_RECORD_ID.into());
    }
    Ok(value)
}

pub async fn save_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(analyst_id): Path<i64>,
    Submission(form): Submission<AnalystForm>,
) -> Response {
    let result = state
        .office
        .save_analyst(&caller.principal, analyst_id, form)
        .map(|saved| Reply::done(saved.message, analyst_path(saved.record.analyst_id)));
    respond(&state, &caller, result, &analyst_path(analyst_id)).await
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(analyst_id): Path<i64>,
) -> Response {
    let result = state
        .office
        .delete_analyst(&caller.principal, analyst_id)
        .await
        .map(|message| Reply::done(message, "/analysts"));
    respond(&state, &caller, result, &analyst_path(analyst_id)).await
}

/// Reads the named file part, stopping once it is past `limit` bytes so an
/// oversized file is still reported by name.
async fn read_upload(multipart: Option<Multipart>, part: &str, limit: u64) -> AppResult<Option<Upload>> {
    let Some(mut multipart) = multipart else {
        return Ok(None);
    };
    let malformed = |err: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("Upload could not be read: {}", err.body_text()))
    };
    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(part) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(ToString::to_string);
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(malformed)? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > limit {
                break;
            }
        }
        return Ok(Some(Upload {
            file_name,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

async fn upload(
    state: &SharedState,
    caller: &Caller,
    analyst_id: i64,
    slot: FileSlot,
    multipart: Option<Multipart>,
) -> Response {
    let office = &state.office;
    let result = match read_upload(multipart, slot.part_name(), office.max_upload_bytes()).await {
        Ok(upload) => office
            .upload_analyst_file(&caller.principal, analyst_id, slot, upload)
            .await,
        Err(err) => Err(err),
    };
    respond(state, caller, Ok(Reply::sentinel(result)), &analyst_path(analyst_id)).await
}

pub async fn upload_profile_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(analyst_id): Path<i64>,
    multipart: Option<Multipart>,
) -> Response {
    upload(&state, &caller, analyst_id, FileSlot::ProfileImage, multipart).await
}

pub async fn upload_document_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(analyst_id): Path<i64>,
    multipart: Option<Multipart>,
) -> Response {
    upload(&state, &caller, analyst_id, FileSlot::CvDocument, multipart).await
}

pub async fn desks_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path(analyst_id): Path<i64>,
) -> Response {
    let office = &state.office;
    let result = office.analyst_detail(&caller.principal, analyst_id).and_then(|detail| {
        let data = serde_json::json!({
            "analystId": analyst_id,
            "fullName": detail.analyst.full_name(),
            "assignments": detail.desks,
        });
        Ok(Reply::view("analysts/desks.html", &data)?.with("desks", &office.desks()?))
    });
    respond(&state, &caller, result, &analyst_path(analyst_id)).await
}

pub async fn add_desk_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path((analyst_id, desk_id)): Path<(i64, i64)>,
    form: Option<Submission<DeskAssignmentForm>>,
) -> Response {
    let coordinator = form
        .map(|Submission(form)| form.coordinator.resolve(CheckboxInput::NotSubmitted))
        .unwrap_or(false);
    let result = state.office.add_analyst_desk(analyst_id, desk_id, coordinator);
    respond(&state, &caller, Ok(Reply::sentinel(result)), &analyst_path(analyst_id)).await
}

pub async fn remove_desk_handler(
    State(state): State<SharedState>,
    caller: Caller,
    Path((analyst_id, desk_id)): Path<(i64, i64)>,
) -> Response {
    let result = state.office.remove_analyst_desk(analyst_id, desk_id);
    respond(&state, &caller, Ok(Reply::sentinel(result)), &analyst_path(analyst_id)).await
}

#[cfg(test)]
mod tests {
    use super::blank_analyst;

    #[test]
    fn blank_analyst_is_the_new_record() {
        let value = blank_analyst().expect("blank");
        assert_eq!(value["analystId"], 0);
        assert_eq!(value["firstname"], "");
        assert_eq!(value["emailVerified"], false);
    }
}
