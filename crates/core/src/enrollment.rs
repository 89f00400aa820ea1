//! Enrollment request model, normalization, and validation rules.
//!
//! The request arrives from the signup form as camelCase JSON. Handlers
//! call [`EnrollmentRequest::normalize`] then
//! [`EnrollmentRequest::validate_at`] before any write happens.

use base64::Engine;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::TenantId;

/// Club codes are always exactly this many characters, zero-padded.
pub const CLUB_CODE_LEN: usize = 3;

/// Date formats accepted from the signup form.
const REQUEST_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Billing category of the membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipCategory {
    Individual,
    Dual,
    Family,
}

impl MembershipCategory {
    /// Derive the category from the family roster.
    ///
    /// Standard tenants count heads (primary included): one is
    /// Individual, two is Dual, three or more is Family. New Mexico
    /// clubs bill any membership carrying a dependent as Family, and a
    /// single additional adult as Dual.
    pub fn derive(tenant: &TenantId, family: &[FamilyMember]) -> Self {
        if family.is_empty() {
            return Self::Individual;
        }

        let adults = family
            .iter()
            .filter(|m| m.role() == MemberRole::Secondary)
            .count();
        let dependents = family.len() - adults;

        if tenant.is_new_mexico() {
            if dependents > 0 {
                return Self::Family;
            }
            if adults == 1 {
                return Self::Dual;
            }
        }

        match family.len() + 1 {
            1 => Self::Individual,
            2 => Self::Dual,
            _ => Self::Family,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "Individual",
            Self::Dual => "Dual",
            Self::Family => "Family",
        }
    }
}

/// Specialty pricing program the applicant qualifies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialtyCode {
    Junior,
    Senior,
    #[default]
    Standard,
    YoungProfessional,
}

impl SpecialtyCode {
    /// Code stored on the membership record. Standard memberships store
    /// an empty code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Junior => "JR",
            Self::Senior => "SR",
            Self::Standard => "",
            Self::YoungProfessional => "YP",
        }
    }
}

/// Age bracket of a family member as captured by the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Adult,
    Child,
    Youth,
}

impl MemberType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adult => "adult",
            Self::Child => "child",
            Self::Youth => "youth",
        }
    }
}

/// Role of a person on the membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberRole {
    Primary,
    Secondary,
    Dependent,
    Guardian,
}

impl MemberRole {
    pub fn code(self) -> &'static str {
        match self {
            Self::Primary => "P",
            Self::Secondary => "S",
            Self::Dependent => "D",
            Self::Guardian => "G",
        }
    }
}

// ---------------------------------------------------------------------------
// Request parts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub cell_phone: Option<String>,
    #[serde(default)]
    pub home_phone: Option<String>,
    #[serde(default)]
    pub work_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1))]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 2, max = 2))]
    pub state: String,
    #[validate(length(min = 5, max = 10))]
    pub zip: String,
}

/// The primary applicant.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[serde(default)]
    pub middle_initial: Option<String>,
    #[validate(length(min = 1))]
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    #[validate(length(min = 1, max = 1))]
    pub gender: String,
    #[validate(nested)]
    pub contact: ContactInfo,
    #[validate(nested)]
    pub address: Address,
}

/// An additional person on the membership.
///
/// The role is not accepted from the client; it is always derived from
/// [`MemberType`] through [`FamilyMember::role`].
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[serde(default)]
    pub middle_initial: Option<String>,
    #[validate(length(min = 1))]
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    #[validate(length(min = 1, max = 1))]
    pub gender: String,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    pub cell_phone: Option<String>,
    pub member_type: MemberType,
}

impl FamilyMember {
    pub fn role(&self) -> MemberRole {
        match self.member_type {
            MemberType::Adult => MemberRole::Secondary,
            MemberType::Child | MemberType::Youth => MemberRole::Dependent,
        }
    }
}

/// Responsible adult for a junior membership.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Guardian {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
}

/// Masked card metadata captured after the gateway authorized the card.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    #[validate(length(min = 1))]
    pub card_type: String,
    #[validate(length(min = 4, max = 4))]
    pub last_four: String,
    #[validate(range(min = 1, max = 12))]
    pub exp_month: u32,
    #[validate(range(min = 2000, max = 2099))]
    pub exp_year: i32,
    #[validate(length(min = 1))]
    pub name_on_card: String,
    #[serde(default)]
    pub authorization_code: Option<String>,
}

impl PaymentSummary {
    /// Expiry rendered as `MM/YY`.
    pub fn expiry(&self) -> String {
        format!("{:02}/{:02}", self.exp_month, self.exp_year.rem_euclid(100))
    }
}

/// A recurring add-on service. Catalog data; immutable once fetched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAddon {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub monthly_price: Decimal,
    pub upc: String,
    #[serde(default)]
    pub tax_code: Option<String>,
}

/// Personal-training package chosen on the form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtSelection {
    pub package_id: String,
}

// ---------------------------------------------------------------------------
// EnrollmentRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
    #[validate(nested)]
    pub primary: Applicant,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub requested_start_date: Option<NaiveDate>,
    #[validate(length(min = 1))]
    pub club: String,
    /// Category computed by the form, if any. Derived when absent.
    #[serde(default)]
    pub membership_category: Option<MembershipCategory>,
    #[serde(default)]
    pub specialty: SpecialtyCode,
    #[serde(default)]
    #[validate(nested)]
    pub family_members: Vec<FamilyMember>,
    #[serde(default)]
    #[validate(nested)]
    pub guardian: Option<Guardian>,
    #[validate(nested)]
    pub payment: PaymentSummary,
    #[serde(default)]
    pub service_addons: Vec<ServiceAddon>,
    #[serde(default)]
    pub child_addons: Vec<ServiceAddon>,
    #[serde(default)]
    pub personal_training: Option<PtSelection>,
    /// Signed contract PDF, base64 in transit.
    #[serde(default, deserialize_with = "deserialize_base64")]
    pub contract_document: Option<Vec<u8>>,
}

impl EnrollmentRequest {
    /// Canonicalize free-form fields in place.
    pub fn normalize(&mut self) -> Result<(), CoreError> {
        self.club = normalize_club(&self.club)?;
        self.primary.first_name = self.primary.first_name.trim().to_string();
        self.primary.last_name = self.primary.last_name.trim().to_string();
        self.primary.address.state = self.primary.address.state.trim().to_ascii_uppercase();
        for member in &mut self.family_members {
            member.first_name = member.first_name.trim().to_string();
            member.last_name = member.last_name.trim().to_string();
        }
        Ok(())
    }

    /// Run field validation plus the cross-field rules.
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), CoreError> {
        self.validate()?;

        if let Some(start) = self.requested_start_date {
            if start < today {
                return Err(CoreError::Validation(format!(
                    "Requested start date {start} is in the past"
                )));
            }
        }

        // Guardian and secondary adults would both take member code 1.
        if self.guardian.is_some() && self.adults().next().is_some() {
            return Err(CoreError::Validation(
                "A guardian cannot be combined with additional adult family members".to_string(),
            ));
        }

        Ok(())
    }

    /// Category supplied by the form, or derived from the roster.
    pub fn category_for(&self, tenant: &TenantId) -> MembershipCategory {
        self.membership_category
            .unwrap_or_else(|| MembershipCategory::derive(tenant, &self.family_members))
    }

    /// Secondary adults in input order.
    pub fn adults(&self) -> impl Iterator<Item = &FamilyMember> {
        self.family_members
            .iter()
            .filter(|m| m.role() == MemberRole::Secondary)
    }

    /// Dependents in input order.
    pub fn dependents(&self) -> impl Iterator<Item = &FamilyMember> {
        self.family_members
            .iter()
            .filter(|m| m.role() == MemberRole::Dependent)
    }
}

/// Normalize a club identifier to a 3-character zero-padded code.
pub fn normalize_club(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > CLUB_CODE_LEN {
        return Err(CoreError::Validation(format!(
            "Club '{raw}' must be 1 to {CLUB_CODE_LEN} characters"
        )));
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Validation(format!(
            "Club '{raw}' must be alphanumeric"
        )));
    }
    Ok(format!("{trimmed:0>width$}", width = CLUB_CODE_LEN))
}

/// Parse a date in any of the accepted request formats.
pub fn parse_request_date(raw: &str) -> Result<NaiveDate, CoreError> {
    REQUEST_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| CoreError::Validation(format!("Invalid date '{raw}'")))
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_request_date(s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_base64<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => {
            // Browsers send data URLs; strip the prefix if present.
            let payload = s.split_once(";base64,").map_or(s, |(_, data)| data);
            base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
