#![allow(dead_code)]

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::json;
use tower::ServiceExt;

use clubjoin_api::config::ServerConfig;
use clubjoin_api::router::build_app_router;
use clubjoin_api::state::AppState;
use clubjoin_core::enrollment::{MembershipCategory, ServiceAddon, SpecialtyCode};
use clubjoin_core::error::CoreError;
use clubjoin_core::pricing::{PricingCatalog, PtPackage};
use clubjoin_core::procedure::{
    ProcParam, ProcRow, ProcValue, Procedure, ProcedureError, ProcedureInvoker, Statement,
};
use clubjoin_core::types::TenantId;
use clubjoin_pipeline::archive::FsContractStore;
use clubjoin_pipeline::{EnrollmentConfig, EnrollmentWorkflow};

pub const ALLOCATED_CODE: &str = "100482";
pub const FALLBACK_CODE: &str = "100777";
pub const NON_TAXED_TENANT: &str = "tx";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        alert_email: None,
    }
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ---------------------------------------------------------------------------
// StaticPricing
// ---------------------------------------------------------------------------

/// Fixed catalog: 7.875% tax, $60.00 dues, one tanning add-on, one PT
/// package. [`NON_TAXED_TENANT`] has no tax rows.
pub struct StaticPricing;

#[async_trait]
impl PricingCatalog for StaticPricing {
    /// The non-taxed tenant has no tax rows at all.
    async fn tax_rate(&self, tenant: &TenantId, club: &str) -> Result<Decimal, CoreError> {
        if tenant.as_str() == NON_TAXED_TENANT {
            return Err(CoreError::NotFound {
                entity: "Club tax rate",
                key: club.to_string(),
            });
        }
        Ok(d("0.07875"))
    }

    async fn membership_price(
        &self,
        _tenant: &TenantId,
        club: &str,
        _category: MembershipCategory,
        _specialty: SpecialtyCode,
    ) -> Result<Decimal, CoreError> {
        if club == "999" {
            return Err(CoreError::NotFound {
                entity: "Membership price",
                key: club.to_string(),
            });
        }
        Ok(d("60.00"))
    }

    async fn service_addons(
        &self,
        _tenant: &TenantId,
        _club: &str,
    ) -> Result<Vec<ServiceAddon>, CoreError> {
        Ok(vec![ServiceAddon {
            description: "Tanning".into(),
            monthly_price: d("15.00"),
            upc: "TAN-01".into(),
            tax_code: Some("T".into()),
        }])
    }

    async fn pt_package(
        &self,
        _tenant: &TenantId,
        _club: &str,
        package_id: &str,
    ) -> Result<Option<PtPackage>, CoreError> {
        Ok((package_id == "PT4").then(|| PtPackage {
            package_id: "PT4".into(),
            upc: "PT-004".into(),
            description: "Four sessions".into(),
            price: d("199.00"),
            sessions: 4,
        }))
    }
}

// ---------------------------------------------------------------------------
// ScriptedInvoker
// ---------------------------------------------------------------------------

/// Records procedure calls and fails the ones it is told to.
#[derive(Default)]
pub struct ScriptedInvoker {
    calls: Mutex<Vec<Procedure>>,
    failing: Mutex<HashSet<Procedure>>,
    slow: Mutex<Option<(Procedure, Duration)>>,
    unhealthy: Mutex<bool>,
}

impl ScriptedInvoker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, procedure: Procedure) {
        self.failing.lock().unwrap().insert(procedure);
    }

    /// Sleep for `delay` before answering calls to `procedure`.
    pub fn slow_down(&self, procedure: Procedure, delay: Duration) {
        *self.slow.lock().unwrap() = Some((procedure, delay));
    }

    pub fn set_unhealthy(&self) {
        *self.unhealthy.lock().unwrap() = true;
    }

    pub fn procedures(&self) -> Vec<Procedure> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcedureInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        tenant: &TenantId,
        procedure: Procedure,
        _params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError> {
        self.calls.lock().unwrap().push(procedure);
        let slow = *self.slow.lock().unwrap();
        let delay = slow
            .filter(|(slow, _)| *slow == procedure)
            .map(|(_, delay)| delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&procedure) {
            return Err(ProcedureError::new(
                procedure,
                tenant,
                "connection reset by peer at 10.0.0.5",
            ));
        }

        Ok(match procedure {
            Procedure::NextMembershipId => vec![ProcRow::new(vec![(
                "next_id".into(),
                ProcValue::Text(ALLOCATED_CODE.into()),
            )])],
            Procedure::FinalizeProduction => vec![ProcRow::new(vec![
                ("1".into(), ProcValue::Int(0)),
                ("2".into(), ProcValue::Int(0)),
                ("3".into(), ProcValue::Int(0)),
                ("4".into(), ProcValue::Null),
                ("5".into(), ProcValue::Text(String::new())),
                ("6".into(), ProcValue::Text("TX-1001".into())),
            ])],
            _ => Vec::new(),
        })
    }

    async fn query(
        &self,
        _tenant: &TenantId,
        _statement: Statement,
        _params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError> {
        Ok(vec![ProcRow::new(vec![(
            "cust_code".into(),
            ProcValue::Text(FALLBACK_CODE.into()),
        )])])
    }

    async fn health_check(&self, tenant: &TenantId) -> Result<(), ProcedureError> {
        if *self.unhealthy.lock().unwrap() {
            return Err(ProcedureError::new("health_check", tenant, "pool timed out"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App builder
// ---------------------------------------------------------------------------

/// A router wired to in-memory collaborators. Contracts land in `contract_dir`.
pub fn build_test_app(invoker: Arc<ScriptedInvoker>, contract_dir: &std::path::Path) -> Router {
    build_test_app_with_config(invoker, contract_dir, test_config())
}

pub fn build_test_app_with_config(
    invoker: Arc<ScriptedInvoker>,
    contract_dir: &std::path::Path,
    config: ServerConfig,
) -> Router {
    let enrollment_config = EnrollmentConfig {
        contract_dir: contract_dir.to_path_buf(),
        non_taxed_tenants: vec![TenantId::new(NON_TAXED_TENANT)],
        ..EnrollmentConfig::default()
    };
    let contracts = Arc::new(FsContractStore::new(contract_dir));
    let workflow = EnrollmentWorkflow::new(invoker.clone(), contracts, enrollment_config);

    let state = AppState {
        config: Arc::new(config.clone()),
        workflow: Arc::new(workflow),
        pricing: Arc::new(StaticPricing),
        invoker,
    };

    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A valid single-adult request with no start date.
pub fn request_json() -> serde_json::Value {
    json!({
        "primary": {
            "firstName": "Ana",
            "lastName": "Ortiz",
            "dateOfBirth": "1988-02-11",
            "gender": "F",
            "contact": {
                "email": "ana@example.com",
                "homePhone": "5055550101"
            },
            "address": {
                "line1": "12 Mesa Rd",
                "city": "Santa Fe",
                "state": "nm",
                "zip": "87501"
            }
        },
        "club": "7",
        "payment": {
            "cardType": "VISA",
            "lastFour": "4242",
            "expMonth": 9,
            "expYear": 2099,
            "nameOnCard": "ANA ORTIZ"
        }
    })
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(
    app: Router,
    uri: &str,
    tenant: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
