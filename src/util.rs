use chrono::{DateTime, Utc};

const BYTES_PER_MB: u64 = 1_048_576;

/// "Created on Monday 05-Jan-2026 at 14:03"
pub fn format_created_timestamp(created: &DateTime<Utc>) -> String {
    format!("Created on {}", created.format("%A %d-%b-%Y at %H:%M"))
}

/// Upload limit as shown to people, e.g. `10Mb`.
pub fn max_size_label(bytes: u64) -> String {
    format!("{}Mb", bytes / BYTES_PER_MB)
}

/// Final path component of an uploaded file name; browsers may send a full
/// client-side path.
pub fn base_file_name(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim().to_string()
}

pub fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::{base_file_name, format_created_timestamp, looks_like_email, max_size_label};
    use chrono::{TimeZone, Utc};

    #[test]
    fn created_timestamp_names_weekday_and_month() {
        let created = Utc.with_ymd_and_hms(2013, 10, 18, 14, 32, 0).single().expect("valid date");
        assert_eq!(format_created_timestamp(&created), "Created on Friday 18-Oct-2013 at 14:32");
    }

    #[test]
    fn upload_limit_label_uses_megabytes() {
        assert_eq!(max_size_label(10_485_760), "10Mb");
        assert_eq!(max_size_label(2 * 1_048_576 + 5), "2Mb");
    }

    #[test]
    fn strips_client_side_directories() {
        assert_eq!(base_file_name(r"C:\Users\sav\photo.png"), "photo.png");
        assert_eq!(base_file_name("docs/cv.pdf"), "cv.pdf");
        assert_eq!(base_file_name("cv.pdf"), "cv.pdf");
        assert_eq!(base_file_name("uploads/"), "");
    }

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("sav@example.com"));
        assert!(!looks_like_email("sav@example"));
        assert!(!looks_like_email("sav example.com"));
        assert!(!looks_like_email("@example.com"));
    }
}
