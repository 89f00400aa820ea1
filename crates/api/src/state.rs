use std::sync::Arc;

use clubjoin_core::pricing::PricingCatalog;
use clubjoin_core::procedure::ProcedureInvoker;
use clubjoin_pipeline::EnrollmentWorkflow;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Runs enrollments and quotes.
    pub workflow: Arc<EnrollmentWorkflow>,
    /// Tax, dues, add-on and PT package lookups.
    pub pricing: Arc<dyn PricingCatalog>,
    /// Used by the health check.
    pub invoker: Arc<dyn ProcedureInvoker>,
}
