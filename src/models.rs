use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RECORDS_PER_PAGE: u32 = 10;
pub const NEW_RECORD_ID: i64 = 0;

/// Authorization tier derived from a user's group memberships.
///
/// Ordered so that a higher tier compares greater than every tier below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Default,
    Staff,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Staff => "staff",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    fn from_group_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "manager" => Self::Manager,
            "staff" => Self::Staff,
            _ => Self::Default,
        }
    }

    pub fn from_group_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names
            .into_iter()
            .map(Self::from_group_name)
            .max()
            .unwrap_or(Self::Default)
    }

    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskRecord {
    pub desk_id: i64,
    pub name: String,
    pub coordinator: bool,
}

/// A desk an analyst is assigned to, with the join row's coordinator flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskAssignment {
    pub desk: DeskRecord,
    pub coordinator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status_id: i64,
    pub parent: Option<i64>,
    pub sort_order: i64,
    pub status_name: String,
}

impl StatusRecord {
    pub fn is_deleted_or_removed(&self) -> bool {
        self.status_name == "Deleted" || self.status_name.starts_with("Removed")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRecord {
    pub id: i64,
    pub name: String,
}

/// Metadata for an object held in the bucket under `<id>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3FileRecord {
    pub id: String,
    pub bucket: String,
    pub name: String,
}

impl S3FileRecord {
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.id, self.name)
    }

    pub fn url(&self) -> String {
        format!("https://s3.amazonaws.com/{}/{}", self.bucket, self.object_key())
    }
}

/// Which analyst column an uploaded file is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileSlot {
    ProfileImage,
    CvDocument,
}

impl FileSlot {
    /// Multipart field name carrying the file for this slot.
    pub fn part_name(self) -> &'static str {
        match self {
            Self::ProfileImage => "profile",
            Self::CvDocument => "document",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::ProfileImage => "profile_image_id",
            Self::CvDocument => "cv_document_id",
        }
    }

    pub fn requires_image(self) -> bool {
        matches!(self, Self::ProfileImage)
    }
}

/// The editable attributes of an analyst.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalystFields {
    pub salutation: Option<String>,
    pub firstname: String,
    pub lastname: String,
    pub status_id: Option<i64>,
    pub rank_id: Option<i64>,
    pub email: Option<String>,
    pub email_alternate: Option<String>,
    pub paypal_account_email: Option<String>,
    pub mobile: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub country_of_residence: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub wiki_username: Option<String>,
    pub highrise_account: Option<String>,
    pub contract_signed: bool,
    pub position_description: Option<String>,
    pub biography: Option<String>,
    pub academic: Option<String>,
    pub notes: Option<String>,
    pub skype: Option<String>,
    pub expertise: Option<String>,
    pub primary_desk_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalystRecord {
    pub analyst_id: i64,
    #[serde(flatten)]
    pub fields: AnalystFields,
    pub profile_image_id: Option<String>,
    pub cv_document_id: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl AnalystRecord {
    pub fn full_name(&self) -> String {
        self.fields.full_name()
    }

    pub fn file_id(&self, slot: FileSlot) -> Option<&str> {
        match slot {
            FileSlot::ProfileImage => self.profile_image_id.as_deref(),
            FileSlot::CvDocument => self.cv_document_id.as_deref(),
        }
    }
}

impl AnalystFields {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}

/// An analyst with every related row resolved, for the edit page and JSON reads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalystDetail {
    #[serde(flatten)]
    pub analyst: AnalystRecord,
    pub status: Option<StatusRecord>,
    pub rank: Option<RankRecord>,
    pub primary_desk: Option<DeskRecord>,
    pub desks: Vec<DeskAssignment>,
    pub note_list: Vec<NoteRecord>,
    pub profile_image: Option<S3FileRecord>,
    pub cv_document: Option<S3FileRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalystSummary {
    pub analyst_id: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: Option<String>,
    pub primary_desk: Option<String>,
    pub status: Option<String>,
}

impl AnalystSummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub note_id: i64,
    pub analyst_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub user_id: Option<i64>,
    pub created_dt: DateTime<Utc>,
    pub updated_by: Option<i64>,
    pub updated_dt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub email: String,
    pub fullname: String,
    pub last_login: Option<DateTime<Utc>>,
    pub groups: Vec<GroupRecord>,
}

impl UserRecord {
    pub fn role(&self) -> Role {
        Role::from_group_names(self.groups.iter().map(|group| group.name.as_str()))
    }
}

/// The authenticated caller for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub fullname: String,
    pub role: Role,
}

impl From<&UserRecord> for Principal {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            role: user.role(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Paging, sorting and filtering parameters shared by every list page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub page: u32,
    pub sort_by: Option<String>,
    pub order: SortOrder,
    pub filter: String,
    pub search: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: u32,
    pub page_size: u32,
    pub total_rows: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page_index: u32, page_size: u32, total_rows: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_rows.div_ceil(u64::from(page_size)) as u32
        };
        Self {
            items,
            page_index,
            page_size,
            total_rows,
            total_pages,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages
    }

    /// "Displaying 11 to 20 of 42", as shown under list tables.
    pub fn display_x_to_y_of_z(&self) -> String {
        if self.items.is_empty() {
            return format!("Displaying 0 of {}", self.total_rows);
        }
        let start = u64::from(self.page_index) * u64::from(self.page_size) + 1;
        let end = start + self.items.len() as u64 - 1;
        format!("Displaying {} to {} of {}", start, end, self.total_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, Role};

    #[test]
    fn highest_group_wins() {
        assert_eq!(Role::from_group_names(["Staff", "Manager"]), Role::Manager);
        assert_eq!(Role::from_group_names(["admin"]), Role::Admin);
        assert_eq!(Role::from_group_names(["Editors"]), Role::Default);
        assert_eq!(Role::from_group_names(Vec::<&str>::new()), Role::Default);
    }

    #[test]
    fn page_reports_bounds() {
        let page = Page::new(vec![1, 2, 3], 1, 10, 13);
        assert_eq!(page.total_pages, 2);
        assert!(page.has_prev());
        assert!(!page.has_next());
        assert_eq!(page.display_x_to_y_of_z(), "Displaying 11 to 13 of 13");
    }

    #[test]
    fn last_page_index_has_no_next_page() {
        let page: Page<i32> = Page::new(Vec::new(), u32::MAX, 10, 13);
        assert!(page.has_prev());
        assert!(!page.has_next());
        assert_eq!(page.display_x_to_y_of_z(), "Displaying 0 of 13");
    }
}
