//! Shared fixtures for workflow tests: a scripted in-memory invoker, an
//! in-memory contract store, and a priced enrollment builder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use clubjoin_core::enrollment::{EnrollmentRequest, MembershipCategory};
use clubjoin_core::pricing::PtPackage;
use clubjoin_core::procedure::{
    ProcParam, ProcRow, ProcValue, Procedure, ProcedureError, ProcedureInvoker, Statement,
};
use clubjoin_core::types::TenantId;
use clubjoin_pipeline::archive::ContractStore;
use clubjoin_pipeline::{EnrollmentConfig, EnrollmentWorkflow, PricedEnrollment};

pub const ALLOCATED_CODE: &str = "100482";
pub const FALLBACK_CODE: &str = "100777";

// ---------------------------------------------------------------------------
// RecordingInvoker
// ---------------------------------------------------------------------------

/// One recorded remote call.
#[derive(Debug, Clone)]
pub enum Call {
    Procedure(Procedure, Vec<ProcParam>),
    Statement(Statement, Vec<ProcParam>),
}

impl Call {
    pub fn procedure(&self) -> Option<Procedure> {
        match self {
            Self::Procedure(p, _) => Some(*p),
            Self::Statement(..) => None,
        }
    }

    pub fn params(&self) -> &[ProcParam] {
        match self {
            Self::Procedure(_, params) | Self::Statement(_, params) => params,
        }
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        match self.params().get(index) {
            Some(ProcParam::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, index: usize) -> Option<i64> {
        match self.params().get(index) {
            Some(ProcParam::Int(i)) => Some(*i),
            _ => None,
        }
    }
}

/// Which calls to a procedure should fail.
#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    /// Zero-based index among calls to the procedure.
    Nth(usize),
}

/// Records every call and answers from a script.
///
/// Unscripted procedures succeed with no rows, except the allocation
/// procedure (returns [`ALLOCATED_CODE`]) and finalize (returns a
/// successful numbered row).
#[derive(Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Procedure, Failure>>,
    responses: Mutex<HashMap<Procedure, Vec<ProcRow>>>,
    statement_rows: Mutex<Vec<ProcRow>>,
}

impl RecordingInvoker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, procedure: Procedure) {
        self.failures.lock().unwrap().insert(procedure, Failure::Always);
    }

    pub fn fail_nth(&self, procedure: Procedure, n: usize) {
        self.failures.lock().unwrap().insert(procedure, Failure::Nth(n));
    }

    pub fn respond(&self, procedure: Procedure, rows: Vec<ProcRow>) {
        self.responses.lock().unwrap().insert(procedure, rows);
    }

    pub fn respond_to_lookup(&self, rows: Vec<ProcRow>) {
        *self.statement_rows.lock().unwrap() = rows;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, procedure: Procedure) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.procedure() == Some(procedure))
            .collect()
    }

    pub fn procedures(&self) -> Vec<Procedure> {
        self.calls().iter().filter_map(Call::procedure).collect()
    }

    fn default_rows(procedure: Procedure) -> Vec<ProcRow> {
        match procedure {
            Procedure::NextMembershipId => vec![text_row("next_id", ALLOCATED_CODE)],
            Procedure::FinalizeProduction => vec![finalize_row(0, "", "TX-1001")],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl ProcedureInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        tenant: &TenantId,
        procedure: Procedure,
        params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let index = calls
                .iter()
                .filter(|c| c.procedure() == Some(procedure))
                .count();
            calls.push(Call::Procedure(procedure, params.to_vec()));
            index
        };

        let failing = match self.failures.lock().unwrap().get(&procedure) {
            Some(Failure::Always) => true,
            Some(Failure::Nth(n)) => *n == index,
            None => false,
        };
        if failing {
            return Err(ProcedureError::new(procedure, tenant, "scripted failure"));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&procedure)
            .cloned()
            .unwrap_or_else(|| Self::default_rows(procedure)))
    }

    async fn query(
        &self,
        _tenant: &TenantId,
        statement: Statement,
        params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Statement(statement, params.to_vec()));
        Ok(self.statement_rows.lock().unwrap().clone())
    }

    async fn health_check(&self, _tenant: &TenantId) -> Result<(), ProcedureError> {
        Ok(())
    }
}

pub fn text_row(column: &str, value: &str) -> ProcRow {
    ProcRow::new(vec![(column.to_string(), ProcValue::Text(value.to_string()))])
}

/// Numbered-key finalize row.
pub fn finalize_row(result_code: i64, customer_code: &str, transaction_id: &str) -> ProcRow {
    ProcRow::new(vec![
        ("1".into(), ProcValue::Int(result_code)),
        ("2".into(), ProcValue::Int(0)),
        ("3".into(), ProcValue::Int(0)),
        ("4".into(), ProcValue::Null),
        ("5".into(), ProcValue::Text(customer_code.into())),
        ("6".into(), ProcValue::Text(transaction_id.into())),
    ])
}

// ---------------------------------------------------------------------------
// MemoryContractStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryContractStore {
    pub saved: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl ContractStore for MemoryContractStore {
    async fn save(&self, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        self.saved
            .lock()
            .unwrap()
            .push((filename.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(filename))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, 16).unwrap()
}

pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_776_340_800_000).unwrap()
}

/// Request JSON as the signup form sends it.
pub fn request_json() -> serde_json::Value {
    json!({
        "primary": {
            "firstName": "Ana",
            "middleInitial": "m",
            "lastName": "Ortiz",
            "dateOfBirth": "1988-02-11",
            "gender": "F",
            "contact": {
                "email": "ana@example.com",
                "cellPhone": "",
                "homePhone": "5055550101"
            },
            "address": {
                "line1": "12 Mesa Rd",
                "city": "Santa Fe",
                "state": "nm",
                "zip": "87501"
            }
        },
        "requestedStartDate": "2026-04-16",
        "club": "7",
        "payment": {
            "cardType": "VISA",
            "lastFour": "4242",
            "expMonth": 9,
            "expYear": 2028,
            "nameOnCard": "ANA ORTIZ"
        }
    })
}

pub fn request_from(value: serde_json::Value) -> EnrollmentRequest {
    let mut request: EnrollmentRequest = serde_json::from_value(value).expect("valid request");
    request.normalize().expect("normalizes");
    request
}

pub fn priced(request: EnrollmentRequest) -> PricedEnrollment {
    let tenant = TenantId::new("nm");
    PricedEnrollment {
        category: request.category_for(&tenant),
        tenant,
        request,
        monthly_dues: d("60.00"),
        tax_rate: d("0.07875"),
        pt_package: None,
    }
}

pub fn pt_package() -> PtPackage {
    PtPackage {
        package_id: "PT4".into(),
        upc: "PT-004".into(),
        description: "Four sessions".into(),
        price: d("199.00"),
        sessions: 4,
    }
}

pub fn workflow(
    invoker: Arc<RecordingInvoker>,
    store: Arc<MemoryContractStore>,
) -> EnrollmentWorkflow {
    EnrollmentWorkflow::new(invoker, store, EnrollmentConfig::default())
}

/// `MembershipCategory` derived for a request on `tenant`.
pub fn category(value: serde_json::Value, tenant: &str) -> MembershipCategory {
    request_from(value).category_for(&TenantId::new(tenant))
}
