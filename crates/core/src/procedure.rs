//! Stored-procedure invocation contract.
//!
//! The legacy store exposes every write as a named procedure taking
//! positional arguments. [`ProcedureInvoker`] is the seam between the
//! enrollment pipeline and the database driver:
//!
//! - [`Procedure`] is the closed set of procedures the pipeline may call.
//!   Real names are resolved once at startup by
//!   [`ProcedureCatalog`](crate::catalog::ProcedureCatalog).
//! - [`ProcParam`] carries a typed argument that the driver binds
//!   positionally. Argument values never become part of the call text.
//! - [`ProcRow`] is a decoded result row whose columns may be named or
//!   positionally numbered depending on the driver.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::TenantId;

// ---------------------------------------------------------------------------
// Procedure
// ---------------------------------------------------------------------------

/// Logical procedures used by the enrollment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    NextMembershipId,
    InsertMembership,
    InsertMember,
    InsertMessage,
    InsertContract,
    InsertReceipt,
    FinalizeProduction,
    InsertUpcItem,
    PurgeStagedEnrollment,
}

impl Procedure {
    pub const ALL: [Procedure; 9] = [
        Procedure::NextMembershipId,
        Procedure::InsertMembership,
        Procedure::InsertMember,
        Procedure::InsertMessage,
        Procedure::InsertContract,
        Procedure::InsertReceipt,
        Procedure::FinalizeProduction,
        Procedure::InsertUpcItem,
        Procedure::PurgeStagedEnrollment,
    ];

    /// Name used when the definitions artifact does not declare one.
    pub fn default_name(self) -> &'static str {
        match self {
            Self::NextMembershipId => "sp_next_membership_id",
            Self::InsertMembership => "sp_ins_membership",
            Self::InsertMember => "sp_ins_member",
            Self::InsertMessage => "sp_ins_message",
            Self::InsertContract => "sp_ins_contract",
            Self::InsertReceipt => "sp_ins_receipt",
            Self::FinalizeProduction => "sp_finalize_online_join",
            Self::InsertUpcItem => "sp_ins_upc_item",
            Self::PurgeStagedEnrollment => "sp_purge_online_join",
        }
    }

    /// Case-insensitive pattern a declared procedure name must match to be
    /// bound to this logical procedure.
    pub fn name_pattern(self) -> &'static str {
        match self {
            Self::NextMembershipId => r"(?i)next_?(membership|memb|cust(omer)?)_?(id|code|num)",
            Self::InsertMembership => r"(?i)ins(ert)?_?(online_?)?membership$",
            Self::InsertMember => r"(?i)ins(ert)?_?(online_?)?member$",
            Self::InsertMessage => r"(?i)ins(ert)?_?(online_?)?(join_?)?message$",
            Self::InsertContract => r"(?i)ins(ert)?_?(online_?)?(contract|agreement)$",
            Self::InsertReceipt => r"(?i)ins(ert)?_?(online_?)?(receipt|document)$",
            Self::FinalizeProduction => r"(?i)(finali[sz]e|migrate)_?(online_?)?(join|prod|enroll)",
            Self::InsertUpcItem => r"(?i)ins(ert)?_?(online_?)?upc_?item$",
            Self::PurgeStagedEnrollment => r"(?i)(purge|del(ete)?)_?(online_?)?(join|enroll)",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Fixed, non-procedure statements the pipeline may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    /// Recover the code generated for a row inserted with a blank code.
    /// Parameters: business name, email.
    MaxCustomerCode,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxCustomerCode => f.write_str("max_customer_code"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// A typed positional argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcParam {
    Text(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl ProcParam {
    /// Money travels as a two-decimal string, e.g. `"12.50"`.
    pub fn money(value: Decimal) -> Self {
        Self::Text(crate::types::format_money(value))
    }

    /// `"Y"` or `"N"`.
    pub fn flag(value: bool) -> Self {
        Self::Text(if value { "Y" } else { "N" }.to_string())
    }
}

impl From<&str> for ProcParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ProcParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for ProcParam {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl<T: Into<ProcParam>> From<Option<T>> for ProcParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<i64> for ProcParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ProcParam {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ProcParam {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<Decimal> for ProcParam {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for ProcParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for ProcParam {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

// ---------------------------------------------------------------------------
// Result rows
// ---------------------------------------------------------------------------

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcValue {
    Null,
    Text(String),
    Int(i64),
    Decimal(Decimal),
    Float(f64),
    Bool(bool),
}

impl ProcValue {
    /// Text rendering of a scalar; `None` for null or blank text.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            Self::Null => return None,
            Self::Text(s) => s.trim().to_string(),
            Self::Int(i) => i.to_string(),
            Self::Decimal(d) => d.normalize().to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Decimal(d) => d.to_i64(),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
}

/// Errors decoding a result row. Decoding fails closed: a missing field is
/// an error, never a silent default.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{0} returned no rows")]
    NoRows(String),

    #[error("missing field `{name}` (position {position})")]
    MissingField { name: &'static str, position: usize },

    #[error("field `{name}` has unexpected value {value:?}")]
    UnexpectedValue { name: &'static str, value: ProcValue },
}

/// An ordered set of `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcRow {
    columns: Vec<(String, ProcValue)>,
}

impl ProcRow {
    pub fn new(columns: Vec<(String, ProcValue)>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ProcValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Lookup by column name, ignoring case.
    pub fn named(&self, name: &str) -> Option<&ProcValue> {
        self.columns
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Lookup by zero-based column index.
    pub fn at(&self, index: usize) -> Option<&ProcValue> {
        self.columns.get(index).map(|(_, v)| v)
    }

    /// Resolve a field that may be named `name`, numbered `"<position>"`,
    /// or only reachable by its 1-based `position`.
    pub fn field(&self, name: &'static str, position: usize) -> Result<&ProcValue, DecodeError> {
        self.named(name)
            .or_else(|| self.named(&position.to_string()))
            .or_else(|| position.checked_sub(1).and_then(|i| self.at(i)))
            .ok_or(DecodeError::MissingField { name, position })
    }

    /// First column rendered as text.
    pub fn first_text(&self) -> Option<String> {
        self.at(0).and_then(ProcValue::as_text)
    }
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// A failed remote call.
#[derive(Debug, thiserror::Error)]
#[error("procedure {procedure} failed for tenant {tenant}: {cause}")]
pub struct ProcedureError {
    pub procedure: String,
    pub tenant: TenantId,
    #[source]
    pub cause: Box<dyn std::error::Error + Send + Sync>,
}

impl ProcedureError {
    pub fn new(
        procedure: impl fmt::Display,
        tenant: &TenantId,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            procedure: procedure.to_string(),
            tenant: tenant.clone(),
            cause: cause.into(),
        }
    }
}

/// Executes procedures against a tenant-scoped store.
///
/// Each call acquires its own connection and releases it on return; no
/// connection is held across calls.
#[async_trait]
pub trait ProcedureInvoker: Send + Sync {
    /// Call `procedure` with positional `params` and return every row.
    async fn invoke(
        &self,
        tenant: &TenantId,
        procedure: Procedure,
        params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError>;

    /// Run a fixed [`Statement`] with positional `params`.
    async fn query(
        &self,
        tenant: &TenantId,
        statement: Statement,
        params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError>;

    /// Verify the tenant store is reachable.
    async fn health_check(&self, tenant: &TenantId) -> Result<(), ProcedureError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
