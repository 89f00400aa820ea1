//! Handlers for the `/enrollments` resource.
//!
//! Both endpoints normalize and validate the request, then resolve every
//! price from the catalog. Client-submitted prices are never used.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;

use clubjoin_core::enrollment::EnrollmentRequest;
use clubjoin_core::error::CoreError;
use clubjoin_core::pricing::resolve_addons;
use clubjoin_core::proration::ProrationResult;
use clubjoin_core::types::TenantId;
use clubjoin_pipeline::PricedEnrollment;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, SubmitResponse};
use crate::state::AppState;

/// Header selecting the tenant store.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant named by [`TENANT_HEADER`], or the default tenant.
pub fn tenant_from_headers(headers: &HeaderMap) -> TenantId {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TenantId::new)
        .unwrap_or_default()
}

/// Normalize, validate and price a raw request.
pub async fn prepare(
    state: &AppState,
    tenant: TenantId,
    mut request: EnrollmentRequest,
    today: NaiveDate,
) -> AppResult<PricedEnrollment> {
    request.normalize()?;
    request.validate_at(today)?;

    let club = request.club.clone();
    let category = request.category_for(&tenant);
    let pricing = state.pricing.as_ref();

    // Non-taxed tenants keep no tax rows.
    let tax_rate = if state.workflow.config().is_taxed(&tenant) {
        let catalog_rate = pricing.tax_rate(&tenant, &club).await?;
        state.workflow.effective_tax_rate(&tenant, catalog_rate)
    } else {
        Decimal::ZERO
    };
    let monthly_dues = pricing
        .membership_price(&tenant, &club, category, request.specialty)
        .await?;

    if !request.service_addons.is_empty() || !request.child_addons.is_empty() {
        let catalog = pricing.service_addons(&tenant, &club).await?;
        request.service_addons = resolve_addons(&request.service_addons, &catalog)?;
        request.child_addons = resolve_addons(&request.child_addons, &catalog)?;
    }

    let pt_package = match &request.personal_training {
        Some(selection) => Some(
            pricing
                .pt_package(&tenant, &club, &selection.package_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Unknown personal training package '{}'",
                        selection.package_id
                    ))
                })?,
        ),
        None => None,
    };

    Ok(PricedEnrollment {
        tenant,
        request,
        category,
        monthly_dues,
        tax_rate,
        pt_package,
    })
}

/// POST /api/v1/enrollments
///
/// Run the enrollment workflow on its own task. Returns the completed or
/// fallback body; aborts map to 500 through [`AppError`].
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EnrollmentRequest>,
) -> AppResult<Json<SubmitResponse>> {
    let tenant = tenant_from_headers(&headers);
    let today = Local::now().date_naive();
    let enrollment = prepare(&state, tenant, request, today).await?;

    tracing::info!(
        tenant = %enrollment.tenant,
        club = %enrollment.request.club,
        category = enrollment.category.as_str(),
        family = enrollment.request.family_members.len(),
        "Enrollment submitted"
    );

    // Once started, the saga runs to completion even if the client goes away
    // or the request times out.
    let workflow = Arc::clone(&state.workflow);
    let outcome = tokio::spawn(async move { workflow.run(&enrollment).await })
        .await
        .map_err(|e| AppError::InternalError(format!("Enrollment task failed: {e}")))??;
    Ok(Json(SubmitResponse::from(outcome)))
}

/// POST /api/v1/enrollments/quote
///
/// Amounts due for a request without writing anything.
pub async fn quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EnrollmentRequest>,
) -> AppResult<Json<DataResponse<ProrationResult>>> {
    let tenant = tenant_from_headers(&headers);
    let today = Local::now().date_naive();
    let enrollment = prepare(&state, tenant, request, today).await?;

    Ok(Json(DataResponse {
        data: state.workflow.quote(&enrollment, today),
    }))
}
