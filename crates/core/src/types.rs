//! Shared identifier and money types.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Tenant used when a request does not name one.
pub const DEFAULT_TENANT: &str = "default";

/// Tenant identifier for New Mexico clubs, which classify family
/// memberships differently.
pub const NEW_MEXICO_TENANT: &str = "nm";

/// Money values are rounded to this many places after every step.
pub const MONEY_DECIMAL_PLACES: u32 = 2;

// ---------------------------------------------------------------------------
// TenantId
// ---------------------------------------------------------------------------

/// Identifies the legacy store a request is written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Build a tenant id, lowercasing and trimming the raw value.
    ///
    /// Blank input resolves to [`DEFAULT_TENANT`].
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self(DEFAULT_TENANT.to_string())
        } else {
            Self(trimmed.to_ascii_lowercase())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_new_mexico(&self) -> bool {
        self.0 == NEW_MEXICO_TENANT
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self(DEFAULT_TENANT.to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// CustomerCode
// ---------------------------------------------------------------------------

/// Opaque member identifier issued by the legacy store.
///
/// Created once per enrollment and used as the foreign key for every
/// subsequent write. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CustomerCode(String);

impl CustomerCode {
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation(
                "Customer code must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Round half away from zero to two places.
///
/// Applied to every intermediate amount so stored figures match the
/// legacy records to the penny.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Render an amount with exactly two decimals, e.g. `"49.00"`.
pub fn format_money(value: Decimal) -> String {
    format!("{:.2}", round2(value))
}
