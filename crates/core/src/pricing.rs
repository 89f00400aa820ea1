//! Read-only pricing collaborators consulted before the workflow starts.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::enrollment::{MembershipCategory, ServiceAddon, SpecialtyCode};
use crate::error::CoreError;
use crate::types::TenantId;

/// A personal-training package from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PtPackage {
    pub package_id: String,
    pub upc: String,
    pub description: String,
    pub price: Decimal,
    pub sessions: i32,
}

/// Lookups for tax, dues, add-ons, and PT packages.
#[async_trait]
pub trait PricingCatalog: Send + Sync {
    /// Sales tax rate for the club as a fraction (e.g. `0.07875`).
    async fn tax_rate(&self, tenant: &TenantId, club: &str) -> Result<Decimal, CoreError>;

    /// Full monthly dues for the membership.
    async fn membership_price(
        &self,
        tenant: &TenantId,
        club: &str,
        category: MembershipCategory,
        specialty: SpecialtyCode,
    ) -> Result<Decimal, CoreError>;

    /// Every add-on the club sells.
    async fn service_addons(
        &self,
        tenant: &TenantId,
        club: &str,
    ) -> Result<Vec<ServiceAddon>, CoreError>;

    async fn pt_package(
        &self,
        tenant: &TenantId,
        club: &str,
        package_id: &str,
    ) -> Result<Option<PtPackage>, CoreError>;
}

/// Replace requested add-ons with their catalog entries, matched by UPC.
///
/// Prices and descriptions submitted by the client are never trusted.
pub fn resolve_addons(
    requested: &[ServiceAddon],
    catalog: &[ServiceAddon],
) -> Result<Vec<ServiceAddon>, CoreError> {
    requested
        .iter()
        .map(|wanted| {
            catalog
                .iter()
                .find(|entry| entry.upc.eq_ignore_ascii_case(wanted.upc.trim()))
                .cloned()
                .ok_or_else(|| {
                    CoreError::Validation(format!("Unknown add-on UPC '{}'", wanted.upc))
                })
        })
        .collect()
}
