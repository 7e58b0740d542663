//! Submitted payloads shared by the JSON and form-encoded transports.
//!
//! Form posts deliver every value as a string and JSON clients may send ids
//! either as numbers or strings, so the field deserializers accept both.

use crate::models::AnalystFields;
use crate::policy::CheckboxInput;
use serde::{Deserialize, Serialize};

pub(crate) mod lenient {
    use crate::policy::CheckboxInput;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<Scalar>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Scalar::Int(value)) => Ok(Some(value)),
            Some(Scalar::Text(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                trimmed
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| D::Error::custom(format!("invalid id '{}'", trimmed)))
            }
            Some(_) => Err(D::Error::custom("expected a numeric id")),
        }
    }

    pub fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            None => None,
            Some(Scalar::Text(raw)) => {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Some(Scalar::Int(value)) => Some(value.to_string()),
            Some(Scalar::Float(value)) => Some(value.to_string()),
            Some(Scalar::Bool(value)) => Some(value.to_string()),
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        optional_text(deserializer).map(Option::unwrap_or_default)
    }

    /// Passwords keep surrounding whitespace.
    pub fn raw_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            Some(Scalar::Text(raw)) => raw,
            Some(Scalar::Int(value)) => value.to_string(),
            _ => String::new(),
        })
    }

    pub fn checkbox<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CheckboxInput, D::Error> {
        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            None => CheckboxInput::NotSubmitted,
            Some(Scalar::Bool(value)) => CheckboxInput::from_bool(value),
            Some(Scalar::Int(value)) => CheckboxInput::from_bool(value != 0),
            Some(Scalar::Float(value)) => CheckboxInput::from_bool(value != 0.0),
            Some(Scalar::Text(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => CheckboxInput::Checked,
                "false" | "off" | "0" | "no" | "" => CheckboxInput::Unchecked,
                other => return Err(D::Error::custom(format!("invalid checkbox value '{}'", other))),
            },
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalystForm {
    #[serde(deserialize_with = "lenient::optional_id")]
    pub analyst_id: Option<i64>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub salutation: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub firstname: String,
    #[serde(deserialize_with = "lenient::text")]
    pub lastname: String,
    #[serde(deserialize_with = "lenient::optional_id")]
    pub status_id: Option<i64>,
    #[serde(deserialize_with = "lenient::optional_id")]
    pub rank_id: Option<i64>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub email_alternate: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub paypal_account_email: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub mobile: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub address1: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub address2: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub city: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub state: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub zip: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub country: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub country_of_residence: Option<String>,
    #[serde(deserialize_with = "lenient::checkbox")]
    pub email_verified: CheckboxInput,
    #[serde(deserialize_with = "lenient::checkbox")]
    pub email_verified_disabled: CheckboxInput,
    #[serde(deserialize_with = "lenient::checkbox")]
    pub phone_verified: CheckboxInput,
    #[serde(deserialize_with = "lenient::checkbox")]
    pub phone_verified_disabled: CheckboxInput,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub wiki_username: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub highrise_account: Option<String>,
    #[serde(deserialize_with = "lenient::checkbox")]
    pub contract_signed: CheckboxInput,
    #[serde(deserialize_with = "lenient::checkbox")]
    pub contract_signed_disabled: CheckboxInput,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub position_description: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub biography: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub academic: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub notes: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub skype: Option<String>,
    #[serde(deserialize_with = "lenient::optional_text")]
    pub expertise: Option<String>,
    #[serde(deserialize_with = "lenient::optional_id")]
    pub primary_desk_id: Option<i64>,
}

impl AnalystForm {
    /// Resolves the checkbox inputs and yields the attributes to persist.
    pub fn into_fields(self) -> AnalystFields {
        AnalystFields {
            salutation: self.salutation,
            firstname: self.firstname,
            lastname: self.lastname,
            status_id: self.status_id,
            rank_id: self.rank_id,
            email: self.email,
            email_alternate: self.email_alternate,
            paypal_account_email: self.paypal_account_email,
            mobile: self.mobile,
            phone: self.phone,
            address1: self.address1,
            address2: self.address2,
            city: self.city,
            state: self.state,
            zip: self.zip,
            country: self.country,
            country_of_residence: self.country_of_residence,
            email_verified: self.email_verified.resolve(self.email_verified_disabled),
            phone_verified: self.phone_verified.resolve(self.phone_verified_disabled),
            wiki_username: self.wiki_username,
            highrise_account: self.highrise_account,
            contract_signed: self.contract_signed.resolve(self.contract_signed_disabled),
            position_description: self.position_description,
            biography: self.biography,
            academic: self.academic,
            notes: self.notes,
            skype: self.skype,
            expertise: self.expertise,
            primary_desk_id: self.primary_desk_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteForm {
    #[serde(deserialize_with = "lenient::optional_id")]
    pub note_id: Option<i64>,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserForm {
    #[serde(deserialize_with = "lenient::optional_id")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient::text")]
    pub username: String,
    #[serde(deserialize_with = "lenient::raw_text")]
    pub password: String,
    #[serde(deserialize_with = "lenient::raw_text")]
    pub confirm_password: String,
    #[serde(deserialize_with = "lenient::text")]
    pub email: String,
    #[serde(deserialize_with = "lenient::text")]
    pub fullname: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordForm {
    #[serde(deserialize_with = "lenient::raw_text")]
    pub new_password: String,
    #[serde(deserialize_with = "lenient::raw_text")]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupForm {
    #[serde(deserialize_with = "lenient::optional_id")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeskForm {
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(deserialize_with = "lenient::checkbox")]
    pub coordinator: CheckboxInput,
}

/// Body of an analyst/desk association request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeskAssignmentForm {
    #[serde(deserialize_with = "lenient::checkbox")]
    pub coordinator: CheckboxInput,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginForm {
    #[serde(deserialize_with = "lenient::text")]
    pub username: String,
    #[serde(deserialize_with = "lenient::raw_text")]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::{AnalystForm, LoginForm};
    use crate::policy::CheckboxInput;

    #[test]
    fn json_accepts_string_and_numeric_ids() {
        let form: AnalystForm =
            serde_json::from_str(r#"{"analystId":"12","firstname":" Ada ","lastname":"Lovelace","rankId":3}"#)
                .expect("json");
        assert_eq!(form.analyst_id, Some(12));
        assert_eq!(form.rank_id, Some(3));
        assert_eq!(form.firstname, "Ada");
        assert_eq!(form.email_verified, CheckboxInput::NotSubmitted);
    }

    #[test]
    fn json_booleans_become_explicit_checkboxes() {
        let form: AnalystForm =
            serde_json::from_str(r#"{"firstname":"A","lastname":"B","emailVerified":true,"phoneVerified":false}"#)
                .expect("json");
        let fields = form.into_fields();
        assert!(fields.email_verified);
        assert!(!fields.phone_verified);
        assert!(!fields.contract_signed);
    }

    #[test]
    fn shadow_field_wins_over_missing_checkbox() {
        let form: AnalystForm = serde_json::from_value(serde_json::json!({
            "firstname": "A",
            "lastname": "B",
            "contractSigned": "on",
            "contractSignedDisabled": "false",
            "emailVerifiedDisabled": "true",
            "statusId": "",
        }))
        .expect("form");
        assert_eq!(form.status_id, None);
        let fields = form.into_fields();
        assert!(!fields.contract_signed);
        assert!(fields.email_verified);
    }

    #[test]
    fn passwords_keep_whitespace() {
        let form: LoginForm = serde_json::from_str(r#"{"username":" sav ","password":" pw "}"#).expect("json");
        assert_eq!(form.username, "sav");
        assert_eq!(form.password, " pw ");
    }
}
