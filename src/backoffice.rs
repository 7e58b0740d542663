use crate::auth::{hash_password, is_password_hash, resolve_user, verify_credentials};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::forms::{AnalystForm, DeskForm, GroupForm, NoteForm, PasswordForm, UserForm};
use crate::models::{
    AnalystDetail, AnalystFields, AnalystRecord, AnalystSummary, DeskAssignment, DeskRecord, FileSlot,
    GroupRecord, ListQuery, NoteRecord, Page, Principal, RankRecord, S3FileRecord, StatusRecord, UserRecord,
    NEW_RECORD_ID,
};
use crate::policy::{AnalystField, CheckboxInput, FieldPolicy};
use crate::redaction::Redactor;
use crate::storage::ObjectStore;
use crate::util::{base_file_name, looks_like_email, max_size_label};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a write, with the confirmation shown to the caller.
#[derive(Debug, Clone)]
pub struct Saved<T> {
    pub record: T,
    pub message: String,
    pub created: bool,
}

/// A single uploaded file held in memory for the duration of the request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|content_type| content_type.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }
}

/// Owns the persistence, storage and policy handles every request goes through.
pub struct Backoffice {
    db: Arc<Database>,
    store: Arc<dyn ObjectStore>,
    policy: FieldPolicy,
    redactor: Redactor,
    max_upload_bytes: u64,
    page_size: u32,
}

impl Backoffice {
    pub fn new(db: Arc<Database>, store: Arc<dyn ObjectStore>, max_upload_bytes: u64, page_size: u32) -> Self {
        Self {
            db,
            store,
            policy: FieldPolicy::new(),
            redactor: Redactor::new(),
            max_upload_bytes,
            page_size,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    pub fn max_upload_label(&self) -> String {
        max_size_label(self.max_upload_bytes)
    }

    /// Logs a failed operation with its redacted arguments and prefixes system
    /// faults with what was not saved. Caller mistakes pass through untouched.
    fn not_saved<A: Serialize>(&self, operation: &str, args: &A, err: AppError) -> AppError {
        if err.is_recoverable_input() {
            return err;
        }
        tracing::error!(
            operation,
            args = %self.redactor.redact_args(args),
            error = %err,
            "operation failed"
        );
        let message = format!("Changes not saved. {}", err.user_message());
        err.with_message(message)
    }

    // Authentication

    pub fn resolve_principal(
        &self,
        session_username: Option<&str>,
        header_credentials: Option<(&str, &str)>,
    ) -> AppResult<Option<Principal>> {
        let user = resolve_user(&self.db, session_username, header_credentials)?;
        Ok(user.as_ref().map(Principal::from))
    }

    pub fn login(&self, username: &str, password: &str) -> AppResult<Principal> {
        let user = verify_credentials(&self.db, username.trim(), password)?
            .ok_or_else(|| AppError::Validation("Invalid username or password.".to_string()))?;
        self.db.touch_last_login(user.id)?;
        tracing::info!(username = %user.username, role = user.role().as_str(), "user signed in");
        Ok(Principal::from(&user))
    }

    // Lookups

    pub fn desks(&self) -> AppResult<Vec<DeskRecord>> {
        self.db.list_desks()
    }

    pub fn ranks(&self) -> AppResult<Vec<RankRecord>> {
        self.db.list_ranks()
    }

    pub fn statuses(&self, principal: &Principal) -> AppResult<Vec<StatusRecord>> {
        let statuses = self.db.list_statuses()?;
        Ok(self.policy.visible_statuses(principal.role, statuses))
    }

    pub fn create_desk(&self, principal: &Principal, form: DeskForm) -> AppResult<Saved<DeskRecord>> {
        if !principal.role.is_admin() {
            return Err(AppError::Forbidden("Only admin users can create desks.".to_string()));
        }
        let name = form.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Desk name is required.".to_string()));
        }
        if self.db.desk_name_taken(&name)? {
            return Err(AppError::Validation("Desk with same name already exists".to_string()));
        }
        let coordinator = form.coordinator.resolve(CheckboxInput::NotSubmitted);
        let desk = self
            .db
            .insert_desk(&name, coordinator)
            .map_err(|err| self.not_saved("create_desk", &name, err))?;
        Ok(Saved {
            message: format!("Desk: {} created.", desk.name),
            record: desk,
            created: true,
        })
    }

    // Analysts

    pub fn list_analysts(&self, query: &ListQuery) -> AppResult<Page<AnalystSummary>> {
        self.db.page_analysts(query, self.page_size)
    }

    /// Analyst with related rows, masked for the caller's role.
    pub fn analyst_detail(&self, principal: &Principal, analyst_id: i64) -> AppResult<AnalystDetail> {
        let mut detail = self
            .db
            .get_analyst_detail(analyst_id)?
            .ok_or_else(analyst_not_found)?;
        self.policy
            .mask_for_view(principal.role, &mut detail.analyst.fields);
        if !self.policy.can_view(principal.role, AnalystField::Rank) {
            detail.rank = None;
        }
        Ok(detail)
    }

    /// Unmasked stored attributes, for building the edit form.
    pub fn analyst_record(&self, analyst_id: i64) -> AppResult<AnalystRecord> {
        self.db.get_analyst(analyst_id)?.ok_or_else(analyst_not_found)
    }

    /// Creates (`analyst_id == 0`) or updates an analyst.
    pub fn save_analyst(
        &self,
        principal: &Principal,
        analyst_id: i64,
        form: AnalystForm,
    ) -> AppResult<Saved<AnalystRecord>> {
        if let Some(payload_id) = form.analyst_id {
            if payload_id != analyst_id {
                return Err(AppError::Validation(format!(
                    "Analyst id {} in the submitted data does not match analyst {}. Changes not saved.",
                    payload_id, analyst_id
                )));
            }
        }

        let args = form.clone();
        let mut fields = form.into_fields();
        validate_analyst_fields(&fields)?;

        let existing = if analyst_id == NEW_RECORD_ID {
            None
        } else {
            Some(self.db.get_analyst(analyst_id)?.ok_or_else(analyst_not_found)?)
        };
        self.policy
            .reconcile_update(principal.role, &mut fields, existing.as_ref().map(|record| &record.fields));
        self.validate_analyst_references(&fields)?;

        match existing {
            None => {
                let record = self
                    .db
                    .insert_analyst(&fields)
                    .map_err(|err| self.not_saved("create_analyst", &args, err))?;
                tracing::info!(analyst_id = record.analyst_id, user = %principal.username, "analyst created");
                Ok(Saved {
                    message: format!("Analyst: {} has been created.", record.full_name()),
                    record,
                    created: true,
                })
            }
            Some(previous) => {
                if previous.fields.status_id != fields.status_id {
                    tracing::info!(
                        analyst_id,
                        from = ?previous.fields.status_id,
                        to = ?fields.status_id,
                        "analyst status changed"
                    );
                }
                self.db
                    .update_analyst(analyst_id, &fields)
                    .map_err(|err| self.not_saved("update_analyst", &args, err))?;
                let record = AnalystRecord { fields, ..previous };
                Ok(Saved {
                    message: format!("Analyst: {} successfully updated.", record.full_name()),
                    record,
                    created: false,
                })
            }
        }
    }

    fn validate_analyst_references(&self, fields: &AnalystFields) -> AppResult<()> {
        if let Some(status_id) = fields.status_id {
            if self.db.get_status(status_id)?.is_none() {
                return Err(AppError::Validation(format!("Status {} does not exist.", status_id)));
            }
        }
        if let Some(rank_id) = fields.rank_id {
            if self.db.get_rank(rank_id)?.is_none() {
                return Err(AppError::Validation(format!("Rank {} does not exist.", rank_id)));
            }
        }
        if let Some(desk_id) = fields.primary_desk_id {
            if self.db.get_desk(desk_id)?.is_none() {
                return Err(AppError::Validation(format!("Desk {} does not exist.", desk_id)));
            }
        }
        Ok(())
    }

    /// Deletes stored files first, then the analyst with its notes and desk
    /// associations. A storage failure leaves the analyst in place.
    pub async fn delete_analyst(&self, principal: &Principal, analyst_id: i64) -> AppResult<String> {
        let analyst = self.analyst_record(analyst_id)?;
        for slot in [FileSlot::ProfileImage, FileSlot::CvDocument] {
            self.remove_analyst_file(&analyst, slot)
                .await
                .map_err(|err| self.not_saved("delete_analyst", &analyst_id, err))?;
        }
        self.db
            .delete_analyst_rows(analyst_id)
            .map_err(|err| self.not_saved("delete_analyst", &analyst_id, err))?;
        tracing::info!(analyst_id, user = %principal.username, "analyst deleted");
        Ok(format!("Analyst: {} deleted.", analyst.full_name()))
    }

    async fn remove_analyst_file(&self, analyst: &AnalystRecord, slot: FileSlot) -> AppResult<()> {
        let Some(file_id) = analyst.file_id(slot) else {
            return Ok(());
        };
        if let Some(file) = self.db.get_s3file(file_id)? {
            self.store.delete(&file.object_key()).await?;
        }
        self.db.detach_analyst_file(analyst.analyst_id, slot, file_id)
    }

    /// Validates and stores an upload, replacing whatever the slot held.
    pub async fn upload_analyst_file(
        &self,
        principal: &Principal,
        analyst_id: i64,
        slot: FileSlot,
        upload: Option<Upload>,
    ) -> AppResult<S3FileRecord> {
        if analyst_id == NEW_RECORD_ID {
            return Err(AppError::Validation(
                "Analyst must be saved before uploading files.".to_string(),
            ));
        }
        let analyst = self.analyst_record(analyst_id)?;

        let Some(upload) = upload else {
            return Err(AppError::Validation("Please select a file.".to_string()));
        };
        let file_name = base_file_name(&upload.file_name);
        if file_name.is_empty() {
            return Err(AppError::Validation("Please select a file.".to_string()));
        }
        if slot.requires_image() && !upload.is_image() {
            return Err(AppError::Validation(format!(
                "File {} is not an image. File not saved.",
                file_name
            )));
        }
        if upload.bytes.len() as u64 > self.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "File {} exceeds the maximum size allowed of {}.",
                file_name,
                self.max_upload_label()
            )));
        }

        let args = serde_json::json!({
            "analystId": analyst_id,
            "slot": slot,
            "fileName": file_name,
            "size": upload.bytes.len(),
        });
        self.remove_analyst_file(&analyst, slot)
            .await
            .map_err(|err| self.not_saved("upload_analyst_file", &args, err))?;

        let file = S3FileRecord {
            id: Uuid::new_v4().to_string(),
            bucket: self.store.bucket().to_string(),
            name: file_name,
        };
        let key = file.object_key();
        self.store
            .put(&key, upload.bytes, upload.content_type.as_deref())
            .await
            .map_err(|err| self.not_saved("upload_analyst_file", &args, err))?;

        if let Err(err) = self.db.attach_analyst_file(analyst_id, slot, &file) {
            if let Err(cleanup) = self.store.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "could not remove orphaned object");
            }
            return Err(self.not_saved("upload_analyst_file", &args, err));
        }
        tracing::info!(analyst_id, slot = ?slot, key = %key, user = %principal.username, "file uploaded");
        Ok(file)
    }

    // Desk assignments

    pub fn analyst_desks(&self, analyst_id: i64) -> AppResult<Vec<DeskAssignment>> {
        self.analyst_record(analyst_id)?;
        self.db.list_analyst_desks(analyst_id)
    }

    pub fn add_analyst_desk(&self, analyst_id: i64, desk_id: i64, coordinator: bool) -> AppResult<bool> {
        self.analyst_record(analyst_id)?;
        self.db
            .get_desk(desk_id)?
            .ok_or_else(|| AppError::NotFound("Desk not found.".to_string()))?;
        self.db
            .add_analyst_desk(analyst_id, desk_id, coordinator)
            .map_err(|err| self.not_saved("add_analyst_desk", &(analyst_id, desk_id), err))
    }

    /// Removing a desk that is not associated is a no-op.
    pub fn remove_analyst_desk(&self, analyst_id: i64, desk_id: i64) -> AppResult<bool> {
        self.analyst_record(analyst_id)?;
        self.db
            .remove_analyst_desk(analyst_id, desk_id)
            .map_err(|err| self.not_saved("remove_analyst_desk", &(analyst_id, desk_id), err))
    }

    // Notes

    /// Existing note, or a blank one for `note_id == 0`.
    pub fn note(&self, analyst_id: i64, note_id: i64) -> AppResult<Option<NoteRecord>> {
        self.analyst_record(analyst_id)?;
        if note_id == NEW_RECORD_ID {
            return Ok(None);
        }
        let note = self.owned_note(analyst_id, note_id)?;
        Ok(Some(note))
    }

    fn owned_note(&self, analyst_id: i64, note_id: i64) -> AppResult<NoteRecord> {
        match self.db.get_note(note_id)? {
            Some(note) if note.analyst_id == Some(analyst_id) => Ok(note),
            _ => Err(AppError::NotFound("Note not found.".to_string())),
        }
    }

    pub fn save_note(
        &self,
        principal: &Principal,
        analyst_id: i64,
        note_id: i64,
        form: NoteForm,
    ) -> AppResult<Saved<NoteRecord>> {
        if let Some(payload_id) = form.note_id {
            if payload_id != note_id {
                return Err(AppError::Validation(format!(
                    "Note id {} in the submitted data does not match note {}. Changes not saved.",
                    payload_id, note_id
                )));
            }
        }
        if form.title.trim().is_empty() {
            return Err(AppError::Validation("Title is required.".to_string()));
        }
        if form.content.trim().is_empty() {
            return Err(AppError::Validation("Content is required.".to_string()));
        }
        self.analyst_record(analyst_id)?;

        if note_id == NEW_RECORD_ID {
            let note = self
                .db
                .insert_note(analyst_id, &form.title, &form.content, principal.user_id)
                .map_err(|err| self.not_saved("create_note", &form, err))?;
            return Ok(Saved {
                message: format!("Note: {} has been created.", note.title),
                record: note,
                created: true,
            });
        }

        self.owned_note(analyst_id, note_id)?;
        self.db
            .update_note(note_id, &form.title, &form.content, principal.user_id)
            .map_err(|err| self.not_saved("update_note", &form, err))?;
        let note = self.owned_note(analyst_id, note_id)?;
        Ok(Saved {
            message: format!("Note: {} successfully updated.", note.title),
            record: note,
            created: false,
        })
    }

    pub fn delete_note(&self, analyst_id: i64, note_id: i64) -> AppResult<String> {
        let note = self
            .db
            .delete_note(analyst_id, note_id)
            .map_err(|err| self.not_saved("delete_note", &(analyst_id, note_id), err))?;
        Ok(format!("Note: {} deleted.", note.title))
    }

    // Users

    pub fn list_users(&self, principal: &Principal, query: &ListQuery) -> AppResult<Page<UserRecord>> {
        self.policy.require_admin(principal)?;
        self.db.page_users(query, self.page_size)
    }

    pub fn user(&self, principal: &Principal, user_id: i64) -> AppResult<UserRecord> {
        self.policy.require_self_or_admin(principal, user_id)?;
        self.db.get_user(user_id)?.ok_or_else(user_not_found)
    }

    pub fn all_groups(&self) -> AppResult<Vec<GroupRecord>> {
        self.db.list_groups()
    }

    /// Creates (`user_id == 0`, admin only) or updates a user.
    pub fn save_user(&self, principal: &Principal, user_id: i64, form: UserForm) -> AppResult<Saved<UserRecord>> {
        if user_id == NEW_RECORD_ID {
            self.policy.require_admin(principal)?;
        } else {
            self.policy.require_self_or_admin(principal, user_id)?;
        }
        if let Some(payload_id) = form.id {
            if payload_id != user_id {
                return Err(AppError::Validation(format!(
                    "User id {} in the submitted data does not match user {}. Changes not saved.",
                    payload_id, user_id
                )));
            }
        }
        if form.username.is_empty() {
            return Err(AppError::Validation("Username is required.".to_string()));
        }
        if form.fullname.is_empty() {
            return Err(AppError::Validation("Full name is required.".to_string()));
        }
        if form.email.is_empty() || !looks_like_email(&form.email) {
            return Err(AppError::Validation("A valid email address is required.".to_string()));
        }
        if user_id == NEW_RECORD_ID && form.password.is_empty() {
            return Err(AppError::Validation("Password is required.".to_string()));
        }
        let except = (user_id != NEW_RECORD_ID).then_some(user_id);
        if self.db.username_taken(&form.username, except)? {
            return Err(AppError::Validation("Username already exists".to_string()));
        }

        if user_id == NEW_RECORD_ID {
            if form.password != form.confirm_password {
                return Err(AppError::Validation("Passwords do not match.".to_string()));
            }
            let user = self
                .db
                .insert_user(&form.username, &hash_password(&form.password), &form.email, &form.fullname)
                .map_err(|err| self.not_saved("create_user", &form, err))?;
            return Ok(Saved {
                message: format!("User: {} created.", user.fullname),
                record: user,
                created: true,
            });
        }

        let existing = self.db.get_user(user_id)?.ok_or_else(user_not_found)?;
        // A blank password or the stored hash sent back unchanged keeps the current password.
        let sent_back = is_password_hash(&form.password) && form.password == existing.password_hash;
        let password_hash = if form.password.is_empty() || sent_back {
            existing.password_hash.clone()
        } else {
            hash_password(&form.password)
        };
        self.db
            .update_user(user_id, &form.username, &password_hash, &form.email, &form.fullname)
            .map_err(|err| self.not_saved("update_user", &form, err))?;
        let user = self.db.get_user(user_id)?.ok_or_else(user_not_found)?;
        Ok(Saved {
            message: format!("User: {} successfully updated.", user.fullname),
            record: user,
            created: false,
        })
    }

    pub fn change_password(&self, principal: &Principal, user_id: i64, form: PasswordForm) -> AppResult<String> {
        self.policy.require_self_or_admin(principal, user_id)?;
        if form.new_password.is_empty() || form.confirm_password.is_empty() {
            return Err(AppError::Validation(
                "Please enter the new password and confirm it.".to_string(),
            ));
        }
        if form.new_password != form.confirm_password {
            return Err(AppError::Validation("Passwords do not match.".to_string()));
        }
        let user = self.db.get_user(user_id)?.ok_or_else(user_not_found)?;
        self.db
            .update_password(user_id, &hash_password(&form.new_password))
            .map_err(|err| self.not_saved("change_password", &form, err))?;
        tracing::info!(user_id, by = %principal.username, "password changed");
        Ok(format!("Password changed for user: {}.", user.fullname))
    }

    pub fn delete_user(&self, principal: &Principal, user_id: i64) -> AppResult<String> {
        self.policy.require_admin(principal)?;
        let user = self.db.get_user(user_id)?.ok_or_else(user_not_found)?;
        self.db
            .delete_user(user_id)
            .map_err(|err| self.not_saved("delete_user", &user_id, err))?;
        Ok(format!("User: {} deleted.", user.fullname))
    }

    pub fn add_user_group(&self, principal: &Principal, user_id: i64, group_id: i64) -> AppResult<bool> {
        self.policy.require_admin(principal)?;
        self.db.get_user(user_id)?.ok_or_else(user_not_found)?;
        self.db.get_group(group_id)?.ok_or_else(group_not_found)?;
        self.db
            .add_user_group(user_id, group_id)
            .map_err(|err| self.not_saved("add_user_group", &(user_id, group_id), err))
    }

    /// Removing a group the user is not in is a no-op.
    pub fn remove_user_group(&self, principal: &Principal, user_id: i64, group_id: i64) -> AppResult<bool> {
        self.policy.require_admin(principal)?;
        self.db.get_user(user_id)?.ok_or_else(user_not_found)?;
        self.db
            .remove_user_group(user_id, group_id)
            .map_err(|err| self.not_saved("remove_user_group", &(user_id, group_id), err))
    }

    // Groups

    pub fn list_groups(&self, query: &ListQuery) -> AppResult<Page<GroupRecord>> {
        self.db.page_groups(query, self.page_size)
    }

    pub fn group(&self, group_id: i64) -> AppResult<GroupRecord> {
        self.db.get_group(group_id)?.ok_or_else(group_not_found)
    }

    pub fn save_group(&self, principal: &Principal, group_id: i64, form: GroupForm) -> AppResult<Saved<GroupRecord>> {
        self.policy.require_admin(principal)?;
        if let Some(payload_id) = form.id {
            if payload_id != group_id {
                return Err(AppError::Validation(format!(
                    "Group id {} in the submitted data does not match group {}. Changes not saved.",
                    payload_id, group_id
                )));
            }
        }
        if form.name.is_empty() {
            return Err(AppError::Validation("Group name is required.".to_string()));
        }
        if let Some(other) = self.db.find_group_by_name(&form.name)? {
            if other.id != group_id {
                return Err(AppError::Validation("Group with same name already exists".to_string()));
            }
        }

        if group_id == NEW_RECORD_ID {
            let group = self
                .db
                .insert_group(&form.name)
                .map_err(|err| self.not_saved("create_group", &form, err))?;
            return Ok(Saved {
                message: format!("Group: {} created.", group.name),
                record: group,
                created: true,
            });
        }

        self.group(group_id)?;
        self.db
            .update_group(group_id, &form.name)
            .map_err(|err| self.not_saved("update_group", &form, err))?;
        Ok(Saved {
            message: format!("Group: {} successfully updated.", form.name),
            record: GroupRecord {
                id: group_id,
                name: form.name,
            },
            created: false,
        })
    }

    pub fn delete_group(&self, principal: &Principal, group_id: i64) -> AppResult<String> {
        self.policy.require_admin(principal)?;
        let group = self.group(group_id)?;
        self.db
            .delete_group(group_id)
            .map_err(|err| self.not_saved("delete_group", &group_id, err))?;
        Ok(format!("Group: {} deleted.", group.name))
    }
}

fn validate_analyst_fields(fields: &AnalystFields) -> AppResult<()> {
    if fields.firstname.trim().is_empty() {
        return Err(AppError::Validation("First name is required.".to_string()));
    }
    if fields.lastname.trim().is_empty() {
        return Err(AppError::Validation("Last name is required.".to_string()));
    }
    for email in [&fields.email, &fields.email_alternate, &fields.paypal_account_email]
        .into_iter()
        .flatten()
    {
        if !looks_like_email(email) {
            return Err(AppError::Validation(format!("Invalid email address: {}", email)));
        }
    }
    Ok(())
}

fn analyst_not_found() -> AppError {
    AppError::NotFound("Analyst not found.".to_string())
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found.".to_string())
}

fn group_not_found() -> AppError {
    AppError::NotFound("Group not found.".to_string())
}

#[cfg(test)]
mod tests {
    use super::{Backoffice, Upload};
    use crate::auth::hash_password;
    use crate::db::Database;
    use crate::forms::{AnalystForm, NoteForm, UserForm};
    use crate::models::{FileSlot, ListQuery, Principal, Role};
    use crate::storage::{DisabledStore, MemoryStore};
    use std::sync::Arc;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: 1,
            username: "tester".to_string(),
            fullname: "Test User".to_string(),
            role,
        }
    }

    fn setup() -> (tempfile::TempDir, Backoffice, MemoryStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("office.db")).expect("db"));
        db.insert_user("tester", &hash_password("pw"), "t@example.com", "Test User")
            .expect("user");
        let store = MemoryStore::new("test-bucket");
        let office = Backoffice::new(db, Arc::new(store.clone()), 1024, 10);
        (dir, office, store)
    }

    fn analyst_form(firstname: &str, lastname: &str) -> AnalystForm {
        AnalystForm {
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
            ..AnalystForm::default()
        }
    }

    fn image(name: &str, size: usize) -> Option<Upload> {
        Some(Upload {
            file_name: name.to_string(),
            content_type: Some("image/png".to_string()),
            bytes: vec![7; size],
        })
    }

    #[test]
    fn create_confirms_full_name_and_lists_it() {
        let (_dir, office, _store) = setup();
        let saved = office
            .save_analyst(&principal(Role::Staff), 0, analyst_form("Created by Testing", "A New Analyst"))
            .expect("create");
        assert!(saved.created);
        assert_eq!(
            saved.message,
            "Analyst: Created by Testing A New Analyst has been created."
        );
        let page = office.list_analysts(&ListQuery::default()).expect("list");
        assert!(page
            .items
            .iter()
            .any(|item| item.full_name() == "Created by Testing A New Analyst"));
    }

    #[test]
    fn mismatched_payload_id_is_rejected_without_mutation() {
        let (_dir, office, _store) = setup();
        let admin = principal(Role::Admin);
        let created = office.save_analyst(&admin, 0, analyst_form("Ada", "Lovelace")).expect("create");
        let id = created.record.analyst_id;

        let mut form = analyst_form("Changed", "Name");
        form.analyst_id = Some(id + 1);
        let error = office.save_analyst(&admin, id, form).expect_err("mismatch");
        assert!(error.to_string().starts_with("VALIDATION"));
        let stored = office.analyst_record(id).expect("stored");
        assert_eq!(stored.fields.firstname, "Ada");
    }

    #[test]
    fn staff_cannot_change_manager_fields() {
        let (_dir, office, _store) = setup();
        let mut form = analyst_form("Ada", "Lovelace");
        form.phone = Some("555-0100".to_string());
        let id = office
            .save_analyst(&principal(Role::Manager), 0, form)
            .expect("create")
            .record
            .analyst_id;

        let mut form = analyst_form("Ada", "Lovelace");
        form.phone = Some("555-9999".to_string());
        form.city = Some("London".to_string());
        office.save_analyst(&principal(Role::Staff), id, form).expect("update");
        let stored = office.analyst_record(id).expect("stored");
        assert_eq!(stored.fields.phone.as_deref(), Some("555-0100"));
        assert_eq!(stored.fields.city.as_deref(), Some("London"));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let (_dir, office, _store) = setup();
        let mut form = analyst_form("Ada", "Lovelace");
        form.primary_desk_id = Some(404);
        let error = office.save_analyst(&principal(Role::Admin), 0, form).expect_err("bad desk");
        assert_eq!(error.user_message(), "Desk 404 does not exist.");
        let error = office
            .save_analyst(&principal(Role::Admin), 0, analyst_form(" ", "Lovelace"))
            .expect_err("blank name");
        assert_eq!(error.user_message(), "First name is required.");
    }

    #[tokio::test]
    async fn upload_replaces_previous_file() {
        let (_dir, office, store) = setup();
        let user = principal(Role::Staff);
        let id = office.save_analyst(&user, 0, analyst_form("Ada", "Lovelace")).expect("create").record.analyst_id;

        let first = office
            .upload_analyst_file(&user, id, FileSlot::ProfileImage, image("one.png", 10))
            .await
            .expect("first upload");
        let second = office
            .upload_analyst_file(&user, id, FileSlot::ProfileImage, image(r"C:\pics\two.png", 10))
            .await
            .expect("second upload");

        assert_eq!(second.name, "two.png");
        assert_eq!(store.keys().await, vec![second.object_key()]);
        assert!(office.database().get_s3file(&first.id).expect("lookup").is_none());
        let stored = office.analyst_record(id).expect("stored");
        assert_eq!(stored.profile_image_id.as_deref(), Some(second.id.as_str()));
    }

    #[tokio::test]
    async fn rejected_uploads_leave_reference_unchanged() {
        let (_dir, office, store) = setup();
        let user = principal(Role::Staff);
        let id = office.save_analyst(&user, 0, analyst_form("Ada", "Lovelace")).expect("create").record.analyst_id;

        let not_image = Some(Upload {
            file_name: "notes.txt".to_string(),
            content_type: Some("text/plain".to_string()),
            bytes: vec![1, 2, 3],
        });
        let error = office
            .upload_analyst_file(&user, id, FileSlot::ProfileImage, not_image)
            .await
            .expect_err("not an image");
        assert_eq!(error.user_message(), "File notes.txt is not an image. File not saved.");

        let error = office
            .upload_analyst_file(&user, id, FileSlot::CvDocument, image("big.png", 2048))
            .await
            .expect_err("too large");
        assert_eq!(error.user_message(), "File big.png exceeds the maximum size allowed of 0Mb.");

        let error = office
            .upload_analyst_file(&user, id, FileSlot::CvDocument, image("uploads/", 1))
            .await
            .expect_err("directory name");
        assert_eq!(error.user_message(), "Please select a file.");

        let error = office
            .upload_analyst_file(&user, 0, FileSlot::CvDocument, image("cv.png", 1))
            .await
            .expect_err("unsaved analyst");
        assert_eq!(error.user_message(), "Analyst must be saved before uploading files.");

        store.set_fail_puts(true);
        let error = office
            .upload_analyst_file(&user, id, FileSlot::CvDocument, image("cv.png", 1))
            .await
            .expect_err("store down");
        assert!(error.user_message().starts_with("Changes not saved."));

        let stored = office.analyst_record(id).expect("stored");
        assert!(stored.profile_image_id.is_none());
        assert!(stored.cv_document_id.is_none());
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn deleting_analyst_removes_everything_it_owns() {
        let (_dir, office, store) = setup();
        let user = principal(Role::Admin);
        let id = office.save_analyst(&user, 0, analyst_form("Ada", "Lovelace")).expect("create").record.analyst_id;
        let desk = office.database().insert_desk("Energy", false).expect("desk");
        office.add_analyst_desk(id, desk.desk_id, false).expect("desk add");
        for title in ["One", "Two"] {
            let form = NoteForm {
                note_id: None,
                title: title.to_string(),
                content: "Body".to_string(),
            };
            office.save_note(&user, id, 0, form).expect("note");
        }
        office
            .upload_analyst_file(&user, id, FileSlot::ProfileImage, image("me.png", 4))
            .await
            .expect("image");
        office
            .upload_analyst_file(&user, id, FileSlot::CvDocument, image("cv.png", 4))
            .await
            .expect("cv");

        let message = office.delete_analyst(&user, id).await.expect("delete");
        assert_eq!(message, "Analyst: Ada Lovelace deleted.");
        assert!(store.keys().await.is_empty());
        assert!(office.database().list_notes(id).expect("notes").is_empty());
        assert!(office.database().list_analyst_desks(id).expect("desks").is_empty());
        assert!(office.analyst_record(id).is_err());
    }

    #[tokio::test]
    async fn storage_failure_keeps_analyst() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("office.db")).expect("db"));
        let memory = MemoryStore::new("bucket");
        let office = Backoffice::new(db.clone(), Arc::new(memory.clone()), 1024, 10);
        let user = principal(Role::Admin);
        let id = office.save_analyst(&user, 0, analyst_form("Ada", "Lovelace")).expect("create").record.analyst_id;
        office
            .upload_analyst_file(&user, id, FileSlot::ProfileImage, image("me.png", 4))
            .await
            .expect("image");

        let disabled = Backoffice::new(db, Arc::new(DisabledStore::new("AWS_S3_BUCKET not set")), 1024, 10);
        let error = disabled.delete_analyst(&user, id).await.expect_err("storage down");
        assert!(error.to_string().starts_with("STORAGE"));
        assert!(error.user_message().starts_with("Changes not saved."));
        assert!(office.analyst_record(id).expect("still there").profile_image_id.is_some());
    }

    #[test]
    fn user_rules() {
        let (_dir, office, _store) = setup();
        let admin = principal(Role::Admin);
        let form = UserForm {
            id: None,
            username: "newbie".to_string(),
            password: "pw1".to_string(),
            confirm_password: "pw2".to_string(),
            email: "n@example.com".to_string(),
            fullname: "New User".to_string(),
        };
        let error = office.save_user(&admin, 0, form.clone()).expect_err("mismatch");
        assert_eq!(error.user_message(), "Passwords do not match.");

        let form = UserForm {
            confirm_password: "pw1".to_string(),
            ..form
        };
        let saved = office.save_user(&admin, 0, form.clone()).expect("create");
        assert_eq!(saved.message, "User: New User created.");
        assert_eq!(saved.record.password_hash.len(), 64);

        let error = office.save_user(&admin, 0, form).expect_err("duplicate");
        assert_eq!(error.user_message(), "Username already exists");

        let update = UserForm {
            id: Some(saved.record.id),
            username: "newbie".to_string(),
            password: saved.record.password_hash.clone(),
            confirm_password: String::new(),
            email: "n@example.com".to_string(),
            fullname: "Renamed User".to_string(),
        };
        let updated = office.save_user(&admin, saved.record.id, update.clone()).expect("update");
        assert_eq!(updated.record.password_hash, saved.record.password_hash);

        let fresh = UserForm {
            password: "fresh-pw".to_string(),
            ..update
        };
        let updated = office.save_user(&admin, saved.record.id, fresh).expect("new password");
        assert_eq!(updated.record.password_hash, hash_password("fresh-pw"));

        let staff = principal(Role::Staff);
        let error = office.list_users(&staff, &ListQuery::default()).expect_err("forbidden");
        assert_eq!(error.user_message(), "Only admin users can see user data.");
        assert!(office.user(&staff, 1).is_ok());
    }
}
