use crate::db::Database;
use crate::errors::AppResult;
use crate::models::UserRecord;
use sha2::{Digest, Sha256};

pub const USERNAME_HEADER: &str = "username";
pub const PASSWORD_HEADER: &str = "password";

/// Lowercase hex SHA-256 of the password, 64 characters long.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn is_password_hash(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Looks the user up and compares the stored hash against the hash of `password`.
pub fn verify_credentials(db: &Database, username: &str, password: &str) -> AppResult<Option<UserRecord>> {
    if username.is_empty() || password.is_empty() {
        return Ok(None);
    }
    let Some(user) = db.find_user_by_username(username)? else {
        return Ok(None);
    };
    if user.password_hash == hash_password(password) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Resolves the caller for one request.
///
/// A username carried by the session is trusted as-is. Without one, the
/// `username`/`password` header pair is checked against the stored hash.
pub fn resolve_user(
    db: &Database,
    session_username: Option<&str>,
    header_credentials: Option<(&str, &str)>,
) -> AppResult<Option<UserRecord>> {
    if let Some(username) = session_username {
        return db.find_user_by_username(username);
    }
    match header_credentials {
        Some((username, password)) => verify_credentials(db, username, password),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::{hash_password, is_password_hash, resolve_user, verify_credentials};
    use crate::db::Database;

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let hash = hash_password("password");
        assert_eq!(hash, "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8");
        assert!(is_password_hash(&hash));
        assert!(!is_password_hash("password"));
    }

    #[test]
    fn header_credentials_require_matching_hash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("auth.db")).expect("db");
        db.insert_user("savbalac", &hash_password("s3cret"), "sav@example.com", "Sav Balac")
            .expect("user");

        let user = resolve_user(&db, None, Some(("savbalac", "s3cret")))
            .expect("resolve")
            .expect("authenticated");
        assert_eq!(user.username, "savbalac");

        assert!(resolve_user(&db, None, Some(("savbalac", "wrong"))).expect("resolve").is_none());
        assert!(resolve_user(&db, None, None).expect("resolve").is_none());
        assert!(verify_credentials(&db, "nobody", "s3cret").expect("verify").is_none());
    }

    #[test]
    fn session_username_skips_password_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("auth.db")).expect("db");
        db.insert_user("savbalac", &hash_password("s3cret"), "sav@example.com", "Sav Balac")
            .expect("user");

        let user = resolve_user(&db, Some("savbalac"), Some(("savbalac", "wrong")))
            .expect("resolve")
            .expect("session user");
        assert_eq!(user.fullname, "Sav Balac");
    }
}
