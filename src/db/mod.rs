use crate::errors::{AppError, AppResult};
use crate::models::{
    AnalystDetail, AnalystFields, AnalystRecord, AnalystSummary, DeskAssignment, DeskRecord, FileSlot,
    GroupRecord, ListQuery, NoteRecord, Page, RankRecord, S3FileRecord, StatusRecord, UserRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub const ADMIN_GROUP: &str = "Admin";
pub const ROLE_GROUPS: [&str; 3] = [ADMIN_GROUP, "Manager", "Staff"];

const DEFAULT_STATUSES: [(&str, i64); 6] = [
    ("Applicant", 10),
    ("Active", 20),
    ("Inactive", 30),
    ("Removed - Requested", 40),
    ("Removed - Performance", 50),
    ("Deleted", 60),
];

const DEFAULT_RANKS: [&str; 4] = ["Junior", "Analyst", "Senior", "Lead"];

const ANALYST_COLUMNS: &str = "analyst_id, salutation, firstname, lastname, status_id, rank_id, email, email_alternate,
    paypal_account_email, mobile, phone, address1, address2, city, state, zip, country, country_of_residence,
    email_verified, phone_verified, wiki_username, highrise_account, contract_signed, position_description,
    biography, academic, notes, skype, expertise, primary_desk_id, profile_image_id, cv_document_id, created_on";

const NOTE_COLUMNS: &str = "note_id, analyst_id, title, content, user_id, created_dt, updated_by, updated_dt";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        db.seed_lookups()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    fn seed_lookups(&self) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for group in ROLE_GROUPS {
            tx.execute("INSERT OR IGNORE INTO app_group (name) VALUES (?1)", [group])?;
        }
        for (name, sort_order) in DEFAULT_STATUSES {
            tx.execute(
                "INSERT OR IGNORE INTO analyst_status (status_name, sort_order) VALUES (?1, ?2)",
                params![name, sort_order],
            )?;
        }
        for rank in DEFAULT_RANKS {
            tx.execute("INSERT OR IGNORE INTO analyst_rank (name) VALUES (?1)", [rank])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Creates the configured administrator once; an existing account with the
    /// same username is left untouched.
    pub fn ensure_bootstrap_admin(&self, username: &str, password_hash: &str) -> AppResult<bool> {
        if self.find_user_by_username(username)?.is_some() {
            return Ok(false);
        }
        let user = self.insert_user(username, password_hash, "", "Administrator")?;
        let group = self
            .find_group_by_name(ADMIN_GROUP)?
            .ok_or_else(|| AppError::Internal("admin group missing".to_string()))?;
        self.add_user_group(user.id, group.id)?;
        Ok(true)
    }

    // Lookups

    pub fn list_desks(&self) -> AppResult<Vec<DeskRecord>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare("SELECT desk_id, name, coordinator FROM desk ORDER BY name ASC")?;
        let rows = statement.query_map([], parse_desk_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_desk(&self, desk_id: i64) -> AppResult<Option<DeskRecord>> {
        let conn = self.lock()?;
        query_desk(&conn, desk_id)
    }

    pub fn insert_desk(&self, name: &str, coordinator: bool) -> AppResult<DeskRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO desk (name, coordinator) VALUES (?1, ?2)",
            params![name, coordinator],
        )?;
        Ok(DeskRecord {
            desk_id: conn.last_insert_rowid(),
            name: name.to_string(),
            coordinator,
        })
    }

    pub fn desk_name_taken(&self, name: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM desk WHERE lower(name) = lower(?1)",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_statuses(&self) -> AppResult<Vec<StatusRecord>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT status_id, parent, sort_order, status_name FROM analyst_status ORDER BY sort_order ASC, status_id ASC",
        )?;
        let rows = statement.query_map([], parse_status_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_status(&self, status_id: i64) -> AppResult<Option<StatusRecord>> {
        let conn = self.lock()?;
        query_status(&conn, status_id)
    }

    pub fn list_ranks(&self) -> AppResult<Vec<RankRecord>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare("SELECT id, name FROM analyst_rank ORDER BY id ASC")?;
        let rows = statement.query_map([], parse_rank_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_rank(&self, rank_id: i64) -> AppResult<Option<RankRecord>> {
        let conn = self.lock()?;
        query_rank(&conn, rank_id)
    }

    // Analysts

    pub fn page_analysts(&self, query: &ListQuery, page_size: u32) -> AppResult<Page<AnalystSummary>> {
        let conn = self.lock()?;
        let from_sql = " FROM analyst a
             LEFT JOIN desk d ON d.desk_id = a.primary_desk_id
             LEFT JOIN analyst_status s ON s.status_id = a.status_id
             WHERE 1 = 1";
        let mut where_sql = String::new();
        let mut params_vec: Vec<String> = Vec::new();

        if !query.search.trim().is_empty() {
            where_sql.push_str(" AND lower(a.lastname) LIKE lower(?)");
            params_vec.push(like_pattern(&query.search));
        } else if !query.filter.trim().is_empty() {
            where_sql.push_str(" AND lower(d.name) LIKE lower(?)");
            params_vec.push(like_pattern(&query.filter));
        }

        let sort_column = match query.sort_by.as_deref() {
            Some("firstname") => "a.firstname",
            Some("email") => "a.email",
            Some("status") => "s.status_name",
            Some("primaryDesk") => "d.name",
            Some("analystId") => "a.analyst_id",
            _ => "a.lastname",
        };

        let count_sql = format!("SELECT COUNT(1){from_sql}{where_sql}");
        let select_sql = format!(
            "SELECT a.analyst_id, a.firstname, a.lastname, a.email, d.name, s.status_name{from_sql}{where_sql}
             ORDER BY {sort_column} {order}, a.analyst_id ASC",
            order = query.order.as_sql()
        );
        fetch_page(&conn, &count_sql, &select_sql, &params_vec, query.page, page_size, |row| {
            Ok(AnalystSummary {
                analyst_id: row.get(0)?,
                firstname: row.get(1)?,
                lastname: row.get(2)?,
                email: row.get(3)?,
                primary_desk: row.get(4)?,
                status: row.get(5)?,
            })
        })
    }

    pub fn get_analyst(&self, analyst_id: i64) -> AppResult<Option<AnalystRecord>> {
        let conn = self.lock()?;
        query_analyst(&conn, analyst_id)
    }

    pub fn get_analyst_detail(&self, analyst_id: i64) -> AppResult<Option<AnalystDetail>> {
        let conn = self.lock()?;
        let analyst = match query_analyst(&conn, analyst_id)? {
            Some(analyst) => analyst,
            None => return Ok(None),
        };

        let status = match analyst.fields.status_id {
            Some(id) => query_status(&conn, id)?,
            None => None,
        };
        let rank = match analyst.fields.rank_id {
            Some(id) => query_rank(&conn, id)?,
            None => None,
        };
        let primary_desk = match analyst.fields.primary_desk_id {
            Some(id) => query_desk(&conn, id)?,
            None => None,
        };
        let profile_image = match analyst.profile_image_id.as_deref() {
            Some(id) => query_s3file(&conn, id)?,
            None => None,
        };
        let cv_document = match analyst.cv_document_id.as_deref() {
            Some(id) => query_s3file(&conn, id)?,
            None => None,
        };
        let desks = query_analyst_desks(&conn, analyst_id)?;
        let note_list = query_notes(&conn, analyst_id)?;

        Ok(Some(AnalystDetail {
            analyst,
            status,
            rank,
            primary_desk,
            desks,
            note_list,
            profile_image,
            cv_document,
        }))
    }

    pub fn insert_analyst(&self, fields: &AnalystFields) -> AppResult<AnalystRecord> {
        let created_on = Utc::now();
        let created_raw = created_on.to_rfc3339();
        let conn = self.lock()?;
        let mut named = analyst_field_params(fields);
        named.push((":created_on", &created_raw));
        conn.execute(
            "INSERT INTO analyst (
               salutation, firstname, lastname, status_id, rank_id, email, email_alternate, paypal_account_email,
               mobile, phone, address1, address2, city, state, zip, country, country_of_residence,
               email_verified, phone_verified, wiki_username, highrise_account, contract_signed,
               position_description, biography, academic, notes, skype, expertise, primary_desk_id, created_on
             ) VALUES (
               :salutation, :firstname, :lastname, :status_id, :rank_id, :email, :email_alternate, :paypal_account_email,
               :mobile, :phone, :address1, :address2, :city, :state, :zip, :country, :country_of_residence,
               :email_verified, :phone_verified, :wiki_username, :highrise_account, :contract_signed,
               :position_description, :biography, :academic, :notes, :skype, :expertise, :primary_desk_id, :created_on
             )",
            named.as_slice(),
        )?;

        Ok(AnalystRecord {
            analyst_id: conn.last_insert_rowid(),
            fields: fields.clone(),
            profile_image_id: None,
            cv_document_id: None,
            created_on,
        })
    }

    pub fn update_analyst(&self, analyst_id: i64, fields: &AnalystFields) -> AppResult<bool> {
        let conn = self.lock()?;
        let mut named = analyst_field_params(fields);
        named.push((":analyst_id", &analyst_id));
        let changed = conn.execute(
            "UPDATE analyst SET
               salutation = :salutation, firstname = :firstname, lastname = :lastname, status_id = :status_id,
               rank_id = :rank_id, email = :email, email_alternate = :email_alternate,
               paypal_account_email = :paypal_account_email, mobile = :mobile, phone = :phone,
               address1 = :address1, address2 = :address2, city = :city, state = :state, zip = :zip,
               country = :country, country_of_residence = :country_of_residence,
               email_verified = :email_verified, phone_verified = :phone_verified,
               wiki_username = :wiki_username, highrise_account = :highrise_account,
               contract_signed = :contract_signed, position_description = :position_description,
               biography = :biography, academic = :academic, notes = :notes, skype = :skype,
               expertise = :expertise, primary_desk_id = :primary_desk_id
             WHERE analyst_id = :analyst_id",
            named.as_slice(),
        )?;
        Ok(changed > 0)
    }

    /// Removes an analyst with its desk joins and notes in one transaction.
    /// Stored files must already have been detached.
    pub fn delete_analyst_rows(&self, analyst_id: i64) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let attached: Option<(Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT profile_image_id, cv_document_id FROM analyst WHERE analyst_id = ?1",
                [analyst_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match attached {
            None => return Ok(false),
            Some((None, None)) => {}
            Some(_) => {
                return Err(AppError::Storage(
                    "analyst still references stored files".to_string(),
                ))
            }
        }
        tx.execute("DELETE FROM desk_analyst WHERE analyst_id = ?1", [analyst_id])?;
        tx.execute("DELETE FROM note WHERE analyst_id = ?1", [analyst_id])?;
        let changed = tx.execute("DELETE FROM analyst WHERE analyst_id = ?1", [analyst_id])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    // Files

    pub fn get_s3file(&self, id: &str) -> AppResult<Option<S3FileRecord>> {
        let conn = self.lock()?;
        query_s3file(&conn, id)
    }

    /// Records a stored object and points the analyst's slot at it.
    pub fn attach_analyst_file(&self, analyst_id: i64, slot: FileSlot, file: &S3FileRecord) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO s3file (id, bucket, name) VALUES (?1, ?2, ?3)",
            params![file.id, file.bucket, file.name],
        )?;
        let changed = tx.execute(
            &format!("UPDATE analyst SET {} = ?1 WHERE analyst_id = ?2", slot.column()),
            params![file.id, analyst_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound("Analyst not found.".to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    /// Clears the analyst's slot and deletes the metadata row it referenced.
    pub fn detach_analyst_file(&self, analyst_id: i64, slot: FileSlot, file_id: &str) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "UPDATE analyst SET {column} = NULL WHERE analyst_id = ?1 AND {column} = ?2",
                column = slot.column()
            ),
            params![analyst_id, file_id],
        )?;
        tx.execute("DELETE FROM s3file WHERE id = ?1", [file_id])?;
        tx.commit()?;
        Ok(())
    }

    // Desk assignments

    pub fn list_analyst_desks(&self, analyst_id: i64) -> AppResult<Vec<DeskAssignment>> {
        let conn = self.lock()?;
        query_analyst_desks(&conn, analyst_id)
    }

    /// Returns false when the pair was already associated.
    pub fn add_analyst_desk(&self, analyst_id: i64, desk_id: i64, coordinator: bool) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO desk_analyst (desk_id, analyst_id, coordinator) VALUES (?1, ?2, ?3)",
            params![desk_id, analyst_id, coordinator],
        )?;
        Ok(changed > 0)
    }

    pub fn remove_analyst_desk(&self, analyst_id: i64, desk_id: i64) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM desk_analyst WHERE desk_id = ?1 AND analyst_id = ?2",
            params![desk_id, analyst_id],
        )?;
        Ok(changed > 0)
    }

    // Notes

    pub fn list_notes(&self, analyst_id: i64) -> AppResult<Vec<NoteRecord>> {
        let conn = self.lock()?;
        query_notes(&conn, analyst_id)
    }

    pub fn get_note(&self, note_id: i64) -> AppResult<Option<NoteRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM note WHERE note_id = ?1"),
            [note_id],
            parse_note_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_note(&self, analyst_id: i64, title: &str, content: &str, user_id: i64) -> AppResult<NoteRecord> {
        let created_dt = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO note (analyst_id, title, content, user_id, created_dt) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![analyst_id, title, content, user_id, created_dt.to_rfc3339()],
        )?;
        Ok(NoteRecord {
            note_id: conn.last_insert_rowid(),
            analyst_id: Some(analyst_id),
            title: title.to_string(),
            content: content.to_string(),
            user_id: Some(user_id),
            created_dt,
            updated_by: None,
            updated_dt: None,
        })
    }

    /// Rewrites title and content; the author and creation time stay as they were.
    pub fn update_note(&self, note_id: i64, title: &str, content: &str, updated_by: i64) -> AppResult<bool> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE note SET title = ?1, content = ?2, updated_by = ?3, updated_dt = ?4 WHERE note_id = ?5",
            params![title, content, updated_by, now, note_id],
        )?;
        Ok(changed > 0)
    }

    /// Detaches the note from its analyst, then deletes it. Both steps share a
    /// transaction and a stale analyst reference aborts the whole operation.
    pub fn delete_note(&self, analyst_id: i64, note_id: i64) -> AppResult<NoteRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let note = tx
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM note WHERE note_id = ?1"),
                [note_id],
                parse_note_row,
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("Note not found.".to_string()))?;

        let analyst_exists: i64 = tx.query_row(
            "SELECT COUNT(1) FROM analyst WHERE analyst_id = ?1",
            [analyst_id],
            |row| row.get(0),
        )?;
        if analyst_exists == 0 {
            return Err(AppError::NotFound("Analyst not found.".to_string()));
        }

        let detached = tx.execute(
            "UPDATE note SET analyst_id = NULL WHERE note_id = ?1 AND analyst_id = ?2",
            params![note_id, analyst_id],
        )?;
        if detached == 0 {
            return Err(AppError::Validation(format!(
                "Note {} does not belong to analyst {}.",
                note_id, analyst_id
            )));
        }
        tx.execute("DELETE FROM note WHERE note_id = ?1", [note_id])?;
        tx.commit()?;
        Ok(note)
    }

    // Users

    pub fn page_users(&self, query: &ListQuery, page_size: u32) -> AppResult<Page<UserRecord>> {
        let conn = self.lock()?;
        let from_sql = " FROM app_user u WHERE 1 = 1";
        let mut where_sql = String::new();
        let mut params_vec: Vec<String> = Vec::new();

        if !query.search.trim().is_empty() {
            where_sql.push_str(" AND lower(u.fullname) LIKE lower(?)");
            params_vec.push(like_pattern(&query.search));
        } else if !query.filter.trim().is_empty() {
            where_sql.push_str(
                " AND EXISTS (
                   SELECT 1 FROM user_group ug JOIN app_group g ON g.id = ug.group_id
                   WHERE ug.user_id = u.id AND lower(g.name) LIKE lower(?)
                 )",
            );
            params_vec.push(like_pattern(&query.filter));
        }

        let sort_column = match query.sort_by.as_deref() {
            Some("username") => "u.username",
            Some("email") => "u.email",
            Some("lastLogin") => "u.last_login",
            Some("id") => "u.id",
            _ => "u.fullname",
        };

        let count_sql = format!("SELECT COUNT(1){from_sql}{where_sql}");
        let select_sql = format!(
            "SELECT u.id, u.username, u.password, u.email, u.fullname, u.last_login{from_sql}{where_sql}
             ORDER BY {sort_column} {order}, u.id ASC",
            order = query.order.as_sql()
        );
        let mut page = fetch_page(
            &conn,
            &count_sql,
            &select_sql,
            &params_vec,
            query.page,
            page_size,
            parse_user_row,
        )?;
        for user in &mut page.items {
            user.groups = query_user_groups(&conn, user.id)?;
        }
        Ok(page)
    }

    pub fn get_user(&self, user_id: i64) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, password, email, fullname, last_login FROM app_user WHERE id = ?1",
                [user_id],
                parse_user_row,
            )
            .optional()?;
        with_groups(&conn, user)
    }

    pub fn find_user_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, password, email, fullname, last_login FROM app_user WHERE username = ?1",
                [username],
                parse_user_row,
            )
            .optional()?;
        with_groups(&conn, user)
    }

    pub fn username_taken(&self, username: &str, except_id: Option<i64>) -> AppResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM app_user WHERE username = ?1 AND id != ?2",
            params![username, except_id.unwrap_or(0)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        email: &str,
        fullname: &str,
    ) -> AppResult<UserRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO app_user (username, password, email, fullname) VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, email, fullname],
        )?;
        Ok(UserRecord {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            email: email.to_string(),
            fullname: fullname.to_string(),
            last_login: None,
            groups: Vec::new(),
        })
    }

    pub fn update_user(
        &self,
        user_id: i64,
        username: &str,
        password_hash: &str,
        email: &str,
        fullname: &str,
    ) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE app_user SET username = ?1, password = ?2, email = ?3, fullname = ?4 WHERE id = ?5",
            params![username, password_hash, email, fullname, user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn update_password(&self, user_id: i64, password_hash: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE app_user SET password = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn touch_last_login(&self, user_id: i64) -> AppResult<DateTime<Utc>> {
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE app_user SET last_login = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), user_id],
        )?;
        Ok(now)
    }

    pub fn delete_user(&self, user_id: i64) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM user_group WHERE user_id = ?1", [user_id])?;
        tx.execute("UPDATE note SET user_id = NULL WHERE user_id = ?1", [user_id])?;
        tx.execute("UPDATE note SET updated_by = NULL WHERE updated_by = ?1", [user_id])?;
        let changed = tx.execute("DELETE FROM app_user WHERE id = ?1", [user_id])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    pub fn add_user_group(&self, user_id: i64, group_id: i64) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO user_group (user_id, group_id) VALUES (?1, ?2)",
            params![user_id, group_id],
        )?;
        Ok(changed > 0)
    }

    pub fn remove_user_group(&self, user_id: i64, group_id: i64) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM user_group WHERE user_id = ?1 AND group_id = ?2",
            params![user_id, group_id],
        )?;
        Ok(changed > 0)
    }

    // Groups

    pub fn page_groups(&self, query: &ListQuery, page_size: u32) -> AppResult<Page<GroupRecord>> {
        let conn = self.lock()?;
        let from_sql = " FROM app_group WHERE 1 = 1";
        let mut where_sql = String::new();
        let mut params_vec: Vec<String> = Vec::new();
        if !query.search.trim().is_empty() {
            where_sql.push_str(" AND lower(name) LIKE lower(?)");
            params_vec.push(like_pattern(&query.search));
        }
        let sort_column = match query.sort_by.as_deref() {
            Some("id") => "id",
            _ => "name",
        };
        let count_sql = format!("SELECT COUNT(1){from_sql}{where_sql}");
        let select_sql = format!(
            "SELECT id, name{from_sql}{where_sql} ORDER BY {sort_column} {order}, id ASC",
            order = query.order.as_sql()
        );
        fetch_page(
            &conn,
            &count_sql,
            &select_sql,
            &params_vec,
            query.page,
            page_size,
            parse_group_row,
        )
    }

    pub fn list_groups(&self) -> AppResult<Vec<GroupRecord>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare("SELECT id, name FROM app_group ORDER BY name ASC")?;
        let rows = statement.query_map([], parse_group_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_group(&self, group_id: i64) -> AppResult<Option<GroupRecord>> {
        let conn = self.lock()?;
        conn.query_row("SELECT id, name FROM app_group WHERE id = ?1", [group_id], parse_group_row)
            .optional()
            .map_err(AppError::from)
    }

    pub fn find_group_by_name(&self, name: &str) -> AppResult<Option<GroupRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name FROM app_group WHERE lower(name) = lower(?1)",
            [name],
            parse_group_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_group(&self, name: &str) -> AppResult<GroupRecord> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO app_group (name) VALUES (?1)", [name])?;
        Ok(GroupRecord {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub fn update_group(&self, group_id: i64, name: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("UPDATE app_group SET name = ?1 WHERE id = ?2", params![name, group_id])?;
        Ok(changed > 0)
    }

    pub fn delete_group(&self, group_id: i64) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM user_group WHERE group_id = ?1", [group_id])?;
        let changed = tx.execute("DELETE FROM app_group WHERE id = ?1", [group_id])?;
        tx.commit()?;
        Ok(changed > 0)
    }
}

fn fetch_page<T, F>(
    conn: &Connection,
    count_sql: &str,
    select_sql: &str,
    params_vec: &[String],
    page_index: u32,
    page_size: u32,
    parse: F,
) -> AppResult<Page<T>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let total: i64 = conn.query_row(count_sql, rusqlite::params_from_iter(params_vec.iter()), |row| {
        row.get(0)
    })?;

    let limit = i64::from(page_size);
    let offset = i64::from(page_index) * limit;
    let query = format!("{select_sql} LIMIT ? OFFSET ?");
    let mut statement = conn.prepare(&query)?;
    let mut dyn_params: Vec<&dyn ToSql> = params_vec.iter().map(|param| param as &dyn ToSql).collect();
    dyn_params.push(&limit);
    dyn_params.push(&offset);

    let rows = statement.query_map(rusqlite::params_from_iter(dyn_params), parse)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(Page::new(items, page_index, page_size, total.max(0) as u64))
}

fn analyst_field_params(fields: &AnalystFields) -> Vec<(&'static str, &dyn ToSql)> {
    vec![
        (":salutation", &fields.salutation),
        (":firstname", &fields.firstname),
        (":lastname", &fields.lastname),
        (":status_id", &fields.status_id),
        (":rank_id", &fields.rank_id),
        (":email", &fields.email),
        (":email_alternate", &fields.email_alternate),
        (":paypal_account_email", &fields.paypal_account_email),
        (":mobile", &fields.mobile),
        (":phone", &fields.phone),
        (":address1", &fields.address1),
        (":address2", &fields.address2),
        (":city", &fields.city),
        (":state", &fields.state),
        (":zip", &fields.zip),
        (":country", &fields.country),
        (":country_of_residence", &fields.country_of_residence),
        (":email_verified", &fields.email_verified),
        (":phone_verified", &fields.phone_verified),
        (":wiki_username", &fields.wiki_username),
        (":highrise_account", &fields.highrise_account),
        (":contract_signed", &fields.contract_signed),
        (":position_description", &fields.position_description),
        (":biography", &fields.biography),
        (":academic", &fields.academic),
        (":notes", &fields.notes),
        (":skype", &fields.skype),
        (":expertise", &fields.expertise),
        (":primary_desk_id", &fields.primary_desk_id),
    ]
}

fn query_analyst(conn: &Connection, analyst_id: i64) -> AppResult<Option<AnalystRecord>> {
    conn.query_row(
        &format!("SELECT {ANALYST_COLUMNS} FROM analyst WHERE analyst_id = ?1"),
        [analyst_id],
        parse_analyst_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn query_desk(conn: &Connection, desk_id: i64) -> AppResult<Option<DeskRecord>> {
    conn.query_row(
        "SELECT desk_id, name, coordinator FROM desk WHERE desk_id = ?1",
        [desk_id],
        parse_desk_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn query_status(conn: &Connection, status_id: i64) -> AppResult<Option<StatusRecord>> {
    conn.query_row(
        "SELECT status_id, parent, sort_order, status_name FROM analyst_status WHERE status_id = ?1",
        [status_id],
        parse_status_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn query_rank(conn: &Connection, rank_id: i64) -> AppResult<Option<RankRecord>> {
    conn.query_row("SELECT id, name FROM analyst_rank WHERE id = ?1", [rank_id], parse_rank_row)
        .optional()
        .map_err(AppError::from)
}

fn query_s3file(conn: &Connection, id: &str) -> AppResult<Option<S3FileRecord>> {
    conn.query_row("SELECT id, bucket, name FROM s3file WHERE id = ?1", [id], |row| {
        Ok(S3FileRecord {
            id: row.get(0)?,
            bucket: row.get(1)?,
            name: row.get(2)?,
        })
    })
    .optional()
    .map_err(AppError::from)
}

fn query_analyst_desks(conn: &Connection, analyst_id: i64) -> AppResult<Vec<DeskAssignment>> {
    let mut statement = conn.prepare(
        "SELECT d.desk_id, d.name, d.coordinator, da.coordinator
         FROM desk_analyst da
         JOIN desk d ON d.desk_id = da.desk_id
         WHERE da.analyst_id = ?1
         ORDER BY d.name ASC",
    )?;
    let rows = statement.query_map([analyst_id], |row| {
        Ok(DeskAssignment {
            desk: parse_desk_row(row)?,
            coordinator: row.get(3)?,
        })
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

fn query_notes(conn: &Connection, analyst_id: i64) -> AppResult<Vec<NoteRecord>> {
    let mut statement = conn.prepare(&format!(
        "SELECT {NOTE_COLUMNS} FROM note WHERE analyst_id = ?1 ORDER BY created_dt DESC, note_id DESC"
    ))?;
    let rows = statement.query_map([analyst_id], parse_note_row)?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

fn query_user_groups(conn: &Connection, user_id: i64) -> AppResult<Vec<GroupRecord>> {
    let mut statement = conn.prepare(
        "SELECT g.id, g.name FROM user_group ug JOIN app_group g ON g.id = ug.group_id
         WHERE ug.user_id = ?1 ORDER BY g.name ASC",
    )?;
    let rows = statement.query_map([user_id], parse_group_row)?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

fn with_groups(conn: &Connection, user: Option<UserRecord>) -> AppResult<Option<UserRecord>> {
    match user {
        Some(mut user) => {
            user.groups = query_user_groups(conn, user.id)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

fn like_pattern(raw: &str) -> String {
    format!("%{}%", raw.trim())
}

fn parse_analyst_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalystRecord> {
    let created_raw: String = row.get(32)?;
    Ok(AnalystRecord {
        analyst_id: row.get(0)?,
        fields: AnalystFields {
            salutation: row.get(1)?,
            firstname: row.get(2)?,
            lastname: row.get(3)?,
            status_id: row.get(4)?,
            rank_id: row.get(5)?,
            email: row.get(6)?,
            email_alternate: row.get(7)?,
            paypal_account_email: row.get(8)?,
            mobile: row.get(9)?,
            phone: row.get(10)?,
            address1: row.get(11)?,
            address2: row.get(12)?,
            city: row.get(13)?,
            state: row.get(14)?,
            zip: row.get(15)?,
            country: row.get(16)?,
            country_of_residence: row.get(17)?,
            email_verified: row.get(18)?,
            phone_verified: row.get(19)?,
            wiki_username: row.get(20)?,
            highrise_account: row.get(21)?,
            contract_signed: row.get(22)?,
            position_description: row.get(23)?,
            biography: row.get(24)?,
            academic: row.get(25)?,
            notes: row.get(26)?,
            skype: row.get(27)?,
            expertise: row.get(28)?,
            primary_desk_id: row.get(29)?,
        },
        profile_image_id: row.get(30)?,
        cv_document_id: row.get(31)?,
        created_on: parse_time(&created_raw)?,
    })
}

fn parse_desk_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeskRecord> {
    Ok(DeskRecord {
        desk_id: row.get(0)?,
        name: row.get(1)?,
        coordinator: row.get(2)?,
    })
}

fn parse_status_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusRecord> {
    Ok(StatusRecord {
        status_id: row.get(0)?,
        parent: row.get(1)?,
        sort_order: row.get(2)?,
        status_name: row.get(3)?,
    })
}

fn parse_rank_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RankRecord> {
    Ok(RankRecord {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn parse_note_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRecord> {
    let created_raw: String = row.get(5)?;
    let updated_raw: Option<String> = row.get(7)?;
    Ok(NoteRecord {
        note_id: row.get(0)?,
        analyst_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        user_id: row.get(4)?,
        created_dt: parse_time(&created_raw)?,
        updated_by: row.get(6)?,
        updated_dt: updated_raw.as_deref().map(parse_time).transpose()?,
    })
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    let last_login_raw: Option<String> = row.get(5)?;
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        email: row.get(3)?,
        fullname: row.get(4)?,
        last_login: last_login_raw.as_deref().map(parse_time).transpose()?,
        groups: Vec::new(),
    })
}

fn parse_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRecord> {
    Ok(GroupRecord {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{AnalystFields, FileSlot, ListQuery, Role, S3FileRecord, SortOrder};

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        (dir, db)
    }

    fn analyst(firstname: &str, lastname: &str) -> AnalystFields {
        AnalystFields {
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
            ..AnalystFields::default()
        }
    }

    #[test]
    fn database_can_insert_and_read_analyst() {
        let (_dir, db) = open();
        let mut fields = analyst("Ada", "Lovelace");
        fields.phone = Some("555-0100".to_string());
        fields.contract_signed = true;
        let created = db.insert_analyst(&fields).expect("insert");

        let loaded = db.get_analyst(created.analyst_id).expect("get").expect("present");
        assert_eq!(loaded.fields, fields);
        assert_eq!(loaded.full_name(), "Ada Lovelace");

        fields.city = Some("London".to_string());
        assert!(db.update_analyst(created.analyst_id, &fields).expect("update"));
        let reloaded = db.get_analyst(created.analyst_id).expect("get").expect("present");
        assert_eq!(reloaded.fields.city.as_deref(), Some("London"));
        assert_eq!(reloaded.created_on, loaded.created_on);
    }

    #[test]
    fn lookups_are_seeded_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seed.db");
        drop(Database::new(&path).expect("first open"));
        let db = Database::new(&path).expect("second open");
        assert_eq!(db.list_groups().expect("groups").len(), 3);
        let statuses = db.list_statuses().expect("statuses");
        assert_eq!(statuses.len(), 6);
        assert_eq!(statuses[0].status_name, "Applicant");
        assert!(!db.list_ranks().expect("ranks").is_empty());
    }

    #[test]
    fn adding_same_desk_twice_keeps_one_row() {
        let (_dir, db) = open();
        let record = db.insert_analyst(&analyst("Grace", "Hopper")).expect("insert");
        let desk = db.insert_desk("Energy", false).expect("desk");

        assert!(db.add_analyst_desk(record.analyst_id, desk.desk_id, true).expect("add"));
        assert!(!db.add_analyst_desk(record.analyst_id, desk.desk_id, false).expect("add again"));
        let desks = db.list_analyst_desks(record.analyst_id).expect("desks");
        assert_eq!(desks.len(), 1);
        assert!(desks[0].coordinator);

        assert!(db.remove_analyst_desk(record.analyst_id, desk.desk_id).expect("remove"));
        assert!(!db.remove_analyst_desk(record.analyst_id, desk.desk_id).expect("remove again"));
    }

    #[test]
    fn note_update_preserves_creation_stamp() {
        let (_dir, db) = open();
        let author = db.insert_user("author", "hash", "a@example.com", "Author").expect("user");
        let editor = db.insert_user("editor", "hash", "e@example.com", "Editor").expect("user");
        let record = db.insert_analyst(&analyst("Alan", "Turing")).expect("insert");
        let note = db
            .insert_note(record.analyst_id, "First call", "Went well", author.id)
            .expect("note");

        assert!(db.update_note(note.note_id, "First call", "Went very well", editor.id).expect("update"));
        let updated = db.get_note(note.note_id).expect("get").expect("present");
        assert_eq!(updated.created_dt, note.created_dt);
        assert_eq!(updated.user_id, Some(author.id));
        assert_eq!(updated.updated_by, Some(editor.id));
        assert!(updated.updated_dt.is_some());
    }

    #[test]
    fn note_delete_rejects_stale_analyst_reference() {
        let (_dir, db) = open();
        let user = db.insert_user("writer", "hash", "w@example.com", "Writer").expect("user");
        let first = db.insert_analyst(&analyst("One", "First")).expect("first");
        let second = db.insert_analyst(&analyst("Two", "Second")).expect("second");
        let note = db.insert_note(first.analyst_id, "Title", "Body", user.id).expect("note");

        let error = db.delete_note(second.analyst_id, note.note_id).expect_err("wrong analyst");
        assert!(error.to_string().starts_with("VALIDATION"));
        assert!(db.get_note(note.note_id).expect("get").is_some());

        let error = db.delete_note(9999, note.note_id).expect_err("missing analyst");
        assert!(error.to_string().starts_with("NOT_FOUND"));

        db.delete_note(first.analyst_id, note.note_id).expect("delete");
        assert!(db.get_note(note.note_id).expect("get").is_none());
    }

    #[test]
    fn analyst_delete_removes_joins_and_notes() {
        let (_dir, db) = open();
        let user = db.insert_user("writer", "hash", "w@example.com", "Writer").expect("user");
        let record = db.insert_analyst(&analyst("Katherine", "Johnson")).expect("insert");
        let desk = db.insert_desk("Space", false).expect("desk");
        db.add_analyst_desk(record.analyst_id, desk.desk_id, false).expect("add");
        db.insert_note(record.analyst_id, "One", "Body", user.id).expect("note");
        db.insert_note(record.analyst_id, "Two", "Body", user.id).expect("note");

        let file = S3FileRecord {
            id: "file-1".to_string(),
            bucket: "bucket".to_string(),
            name: "cv.pdf".to_string(),
        };
        db.attach_analyst_file(record.analyst_id, FileSlot::CvDocument, &file).expect("attach");
        assert!(db.delete_analyst_rows(record.analyst_id).is_err());

        db.detach_analyst_file(record.analyst_id, FileSlot::CvDocument, &file.id).expect("detach");
        assert!(db.get_s3file(&file.id).expect("file").is_none());
        assert!(db.delete_analyst_rows(record.analyst_id).expect("delete"));
        assert!(db.get_analyst(record.analyst_id).expect("get").is_none());
        assert!(db.list_notes(record.analyst_id).expect("notes").is_empty());
        assert!(db.list_analyst_desks(record.analyst_id).expect("desks").is_empty());
    }

    #[test]
    fn analyst_pages_search_and_sort() {
        let (_dir, db) = open();
        let desk = db.insert_desk("Markets", false).expect("desk");
        for (first, last) in [("Bea", "Zimmer"), ("Carl", "Adams"), ("Dora", "Miller")] {
            let mut fields = analyst(first, last);
            if last == "Miller" {
                fields.primary_desk_id = Some(desk.desk_id);
            }
            db.insert_analyst(&fields).expect("insert");
        }

        let page = db.page_analysts(&ListQuery::default(), 2).expect("page");
        assert_eq!(page.total_rows, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items[0].lastname, "Adams");

        let query = ListQuery {
            order: SortOrder::Desc,
            ..ListQuery::default()
        };
        let page = db.page_analysts(&query, 10).expect("page");
        assert_eq!(page.items[0].lastname, "Zimmer");

        let query = ListQuery {
            search: "MILL".to_string(),
            ..ListQuery::default()
        };
        let page = db.page_analysts(&query, 10).expect("page");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].primary_desk.as_deref(), Some("Markets"));

        let query = ListQuery {
            filter: "mark".to_string(),
            ..ListQuery::default()
        };
        assert_eq!(db.page_analysts(&query, 10).expect("page").total_rows, 1);
    }

    #[test]
    fn bootstrap_admin_gets_admin_role() {
        let (_dir, db) = open();
        assert!(db.ensure_bootstrap_admin("root", "hash").expect("bootstrap"));
        assert!(!db.ensure_bootstrap_admin("root", "other").expect("bootstrap again"));
        let user = db.find_user_by_username("root").expect("find").expect("present");
        assert_eq!(user.role(), Role::Admin);
        assert_eq!(user.password_hash, "hash");
    }

    #[test]
    fn deleting_user_drops_memberships() {
        let (_dir, db) = open();
        let user = db.insert_user("temp", "hash", "t@example.com", "Temp").expect("user");
        let staff = db.find_group_by_name("staff").expect("find").expect("present");
        assert!(db.add_user_group(user.id, staff.id).expect("add"));
        assert!(!db.add_user_group(user.id, staff.id).expect("add again"));
        assert!(db.username_taken("temp", None).expect("taken"));
        assert!(!db.username_taken("temp", Some(user.id)).expect("own name"));

        assert!(db.delete_user(user.id).expect("delete"));
        assert!(db.get_user(user.id).expect("get").is_none());
        assert!(db.delete_group(staff.id).expect("delete group"));
    }
}
