use crate::errors::{AppError, AppResult};
use crate::models::{AnalystFields, Principal, Role, StatusRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// A checkbox as it arrived in a submission.
///
/// Browsers omit unchecked and disabled controls, so "absent" is a distinct
/// state from "explicitly false".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckboxInput {
    Checked,
    Unchecked,
    #[default]
    NotSubmitted,
}

impl CheckboxInput {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }

    /// A submitted shadow value wins; otherwise an absent box reads as false.
    pub fn resolve(self, shadow: CheckboxInput) -> bool {
        match shadow {
            Self::Checked => true,
            Self::Unchecked => false,
            Self::NotSubmitted => matches!(self, Self::Checked),
        }
    }
}

/// Analyst attributes whose visibility or editability depends on role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalystField {
    Phone,
    EmailAlternate,
    PaypalAccountEmail,
    Address1,
    Address2,
    City,
    State,
    Zip,
    Country,
    CountryOfResidence,
    Rank,
    EmailVerified,
    PhoneVerified,
    ContractSigned,
    WikiUsername,
}

impl AnalystField {
    pub const ALL: [AnalystField; 15] = [
        Self::Phone,
        Self::EmailAlternate,
        Self::PaypalAccountEmail,
        Self::Address1,
        Self::Address2,
        Self::City,
        Self::State,
        Self::Zip,
        Self::Country,
        Self::CountryOfResidence,
        Self::Rank,
        Self::EmailVerified,
        Self::PhoneVerified,
        Self::ContractSigned,
        Self::WikiUsername,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::EmailAlternate => "emailAlternate",
            Self::PaypalAccountEmail => "paypalAccountEmail",
            Self::Address1 => "address1",
            Self::Address2 => "address2",
            Self::City => "city",
            Self::State => "state",
            Self::Zip => "zip",
            Self::Country => "country",
            Self::CountryOfResidence => "countryOfResidence",
            Self::Rank => "rank",
            Self::EmailVerified => "emailVerified",
            Self::PhoneVerified => "phoneVerified",
            Self::ContractSigned => "contractSigned",
            Self::WikiUsername => "wikiUsername",
        }
    }

    /// Lowest role allowed to change the field.
    pub fn edit_role(self) -> Role {
        match self {
            Self::Phone | Self::EmailAlternate => Role::Manager,
            _ => Role::Staff,
        }
    }

    /// Lowest role allowed to read the field. Rank, the verification flags and
    /// the wiki name are shown to everyone but only editable from staff up.
    pub fn view_role(self) -> Role {
        match self {
            Self::Phone | Self::EmailAlternate => Role::Manager,
            Self::Rank | Self::EmailVerified | Self::PhoneVerified | Self::ContractSigned | Self::WikiUsername => {
                Role::Default
            }
            _ => Role::Staff,
        }
    }

    fn copy(self, target: &mut AnalystFields, source: &AnalystFields) {
        match self {
            Self::Phone => target.phone = source.phone.clone(),
            Self::EmailAlternate => target.email_alternate = source.email_alternate.clone(),
            Self::PaypalAccountEmail => target.paypal_account_email = source.paypal_account_email.clone(),
            Self::Address1 => target.address1 = source.address1.clone(),
            Self::Address2 => target.address2 = source.address2.clone(),
            Self::City => target.city = source.city.clone(),
            Self::State => target.state = source.state.clone(),
            Self::Zip => target.zip = source.zip.clone(),
            Self::Country => target.country = source.country.clone(),
            Self::CountryOfResidence => target.country_of_residence = source.country_of_residence.clone(),
            Self::Rank => target.rank_id = source.rank_id,
            Self::EmailVerified => target.email_verified = source.email_verified,
            Self::PhoneVerified => target.phone_verified = source.phone_verified,
            Self::ContractSigned => target.contract_signed = source.contract_signed,
            Self::WikiUsername => target.wiki_username = source.wiki_username.clone(),
        }
    }
}

/// How a restricted field is rendered for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAccess {
    pub visible: bool,
    pub editable: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldPolicy;

impl FieldPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn can_edit(&self, role: Role, field: AnalystField) -> bool {
        role >= field.edit_role()
    }

    pub fn can_view(&self, role: Role, field: AnalystField) -> bool {
        role >= field.view_role()
    }

    /// Resets every field the role may not change to its stored value, or to
    /// the empty default when there is no stored row yet.
    pub fn reconcile_update(&self, role: Role, submitted: &mut AnalystFields, existing: Option<&AnalystFields>) {
        let blank = AnalystFields::default();
        let source = existing.unwrap_or(&blank);
        for field in AnalystField::ALL {
            if !self.can_edit(role, field) {
                field.copy(submitted, source);
            }
        }
    }

    /// Blanks every field the role may not read.
    pub fn mask_for_view(&self, role: Role, fields: &mut AnalystFields) {
        let blank = AnalystFields::default();
        for field in AnalystField::ALL {
            if !self.can_view(role, field) {
                field.copy(fields, &blank);
            }
        }
    }

    pub fn field_access(&self, role: Role) -> BTreeMap<&'static str, FieldAccess> {
        AnalystField::ALL
            .into_iter()
            .map(|field| {
                (
                    field.key(),
                    FieldAccess {
                        visible: self.can_view(role, field),
                        editable: self.can_edit(role, field),
                    },
                )
            })
            .collect()
    }

    /// Status choices for a dropdown; `Deleted` and `Removed...` are staff-only.
    pub fn visible_statuses(&self, role: Role, statuses: Vec<StatusRecord>) -> Vec<StatusRecord> {
        if role >= Role::Staff {
            return statuses;
        }
        statuses
            .into_iter()
            .filter(|status| !status.is_deleted_or_removed())
            .collect()
    }

    pub fn require_admin(&self, principal: &Principal) -> AppResult<()> {
        if principal.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Only admin users can see user data.".to_string()))
        }
    }

    /// Admins reach every user record; anyone else only their own.
    pub fn require_self_or_admin(&self, principal: &Principal, user_id: i64) -> AppResult<()> {
        if principal.user_id == user_id {
            return Ok(());
        }
        self.require_admin(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalystField, CheckboxInput, FieldPolicy};
    use crate::models::{AnalystFields, Principal, Role, StatusRecord};

    const ROLES: [Role; 4] = [Role::Default, Role::Staff, Role::Manager, Role::Admin];

    fn populated(marker: &str, flag: bool) -> AnalystFields {
        let text = |name: &str| Some(format!("{marker}-{name}"));
        AnalystFields {
            salutation: text("salutation"),
            firstname: format!("{marker}-first"),
            lastname: format!("{marker}-last"),
            status_id: Some(1),
            rank_id: Some(if flag { 2 } else { 3 }),
            email: text("email"),
            email_alternate: text("alt"),
            paypal_account_email: text("paypal"),
            mobile: text("mobile"),
            phone: text("phone"),
            address1: text("a1"),
            address2: text("a2"),
            city: text("city"),
            state: text("state"),
            zip: text("zip"),
            country: text("country"),
            country_of_residence: text("residence"),
            email_verified: flag,
            phone_verified: flag,
            wiki_username: text("wiki"),
            highrise_account: text("highrise"),
            contract_signed: flag,
            position_description: text("position"),
            biography: text("bio"),
            academic: text("academic"),
            notes: text("notes"),
            skype: text("skype"),
            expertise: text("expertise"),
            primary_desk_id: None,
        }
    }

    fn field_value(fields: &AnalystFields, field: AnalystField) -> String {
        match field {
            AnalystField::Phone => format!("{:?}", fields.phone),
            AnalystField::EmailAlternate => format!("{:?}", fields.email_alternate),
            AnalystField::PaypalAccountEmail => format!("{:?}", fields.paypal_account_email),
            AnalystField::Address1 => format!("{:?}", fields.address1),
            AnalystField::Address2 => format!("{:?}", fields.address2),
            AnalystField::City => format!("{:?}", fields.city),
            AnalystField::State => format!("{:?}", fields.state),
            AnalystField::Zip => format!("{:?}", fields.zip),
            AnalystField::Country => format!("{:?}", fields.country),
            AnalystField::CountryOfResidence => format!("{:?}", fields.country_of_residence),
            AnalystField::Rank => format!("{:?}", fields.rank_id),
            AnalystField::EmailVerified => fields.email_verified.to_string(),
            AnalystField::PhoneVerified => fields.phone_verified.to_string(),
            AnalystField::ContractSigned => fields.contract_signed.to_string(),
            AnalystField::WikiUsername => format!("{:?}", fields.wiki_username),
        }
    }

    #[test]
    fn higher_roles_edit_a_superset_of_fields() {
        let policy = FieldPolicy::new();
        for pair in ROLES.windows(2) {
            for field in AnalystField::ALL {
                if policy.can_edit(pair[0], field) {
                    assert!(policy.can_edit(pair[1], field), "{:?} {:?}", pair[1], field);
                }
                if policy.can_view(pair[0], field) {
                    assert!(policy.can_view(pair[1], field), "{:?} {:?}", pair[1], field);
                }
            }
        }
        assert!(!policy.can_edit(Role::Staff, AnalystField::Phone));
        assert!(policy.can_edit(Role::Manager, AnalystField::Phone));
        assert!(policy.can_edit(Role::Staff, AnalystField::Zip));
        assert!(!policy.can_edit(Role::Default, AnalystField::Rank));
        assert!(policy.can_view(Role::Default, AnalystField::Rank));
    }

    #[test]
    fn restricted_payload_values_are_ignored_per_role() {
        let policy = FieldPolicy::new();
        let existing = populated("old", false);
        for role in ROLES {
            let mut submitted = populated("new", true);
            policy.reconcile_update(role, &mut submitted, Some(&existing));
            for field in AnalystField::ALL {
                let expected = if policy.can_edit(role, field) {
                    field_value(&populated("new", true), field)
                } else {
                    field_value(&existing, field)
                };
                assert_eq!(field_value(&submitted, field), expected, "{:?} {:?}", role, field);
            }
            assert_eq!(submitted.biography.as_deref(), Some("new-bio"));
        }
    }

    #[test]
    fn create_by_default_role_drops_restricted_values() {
        let policy = FieldPolicy::new();
        let mut submitted = populated("new", true);
        policy.reconcile_update(Role::Default, &mut submitted, None);
        assert!(submitted.phone.is_none());
        assert!(submitted.rank_id.is_none());
        assert!(!submitted.contract_signed);
        assert_eq!(submitted.firstname, "new-first");
    }

    #[test]
    fn masking_hides_contact_details_below_manager() {
        let policy = FieldPolicy::new();
        let mut staff_view = populated("x", true);
        policy.mask_for_view(Role::Staff, &mut staff_view);
        assert!(staff_view.phone.is_none());
        assert!(staff_view.email_alternate.is_none());
        assert!(staff_view.paypal_account_email.is_some());

        let mut default_view = populated("x", true);
        policy.mask_for_view(Role::Default, &mut default_view);
        assert!(default_view.city.is_none());
        assert!(default_view.wiki_username.is_some());
        assert!(default_view.email_verified);
    }

    #[test]
    fn shadow_checkbox_value_is_authoritative() {
        assert!(CheckboxInput::NotSubmitted.resolve(CheckboxInput::Checked));
        assert!(!CheckboxInput::Checked.resolve(CheckboxInput::Unchecked));
        assert!(CheckboxInput::Checked.resolve(CheckboxInput::NotSubmitted));
        assert!(!CheckboxInput::Unchecked.resolve(CheckboxInput::NotSubmitted));
        assert!(!CheckboxInput::NotSubmitted.resolve(CheckboxInput::NotSubmitted));
    }

    #[test]
    fn removed_statuses_hidden_below_staff() {
        let policy = FieldPolicy::new();
        let statuses = ["Active", "Removed - Requested", "Deleted"]
            .into_iter()
            .enumerate()
            .map(|(index, name)| StatusRecord {
                status_id: index as i64 + 1,
                parent: None,
                sort_order: index as i64,
                status_name: name.to_string(),
            })
            .collect::<Vec<_>>();
        assert_eq!(policy.visible_statuses(Role::Staff, statuses.clone()).len(), 3);
        let visible = policy.visible_statuses(Role::Default, statuses);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].status_name, "Active");
    }

    #[test]
    fn user_data_is_admin_or_self() {
        let policy = FieldPolicy::new();
        let staff = Principal {
            user_id: 7,
            username: "staff".to_string(),
            fullname: "Staff Member".to_string(),
            role: Role::Staff,
        };
        assert!(policy.require_self_or_admin(&staff, 7).is_ok());
        let error = policy.require_self_or_admin(&staff, 8).expect_err("forbidden");
        assert_eq!(error.user_message(), "Only admin users can see user data.");
        assert!(policy.require_admin(&staff).is_err());
    }
}
