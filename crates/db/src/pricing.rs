//! [`PricingCatalog`] backed by the tenant pricing tables.

use async_trait::async_trait;
use rust_decimal::Decimal;

use clubjoin_core::enrollment::{MembershipCategory, ServiceAddon, SpecialtyCode};
use clubjoin_core::error::CoreError;
use clubjoin_core::pricing::{PricingCatalog, PtPackage};
use clubjoin_core::types::TenantId;

use crate::repositories::PricingRepo;
use crate::TenantPools;

pub struct PgPricingCatalog {
    pools: TenantPools,
}

impl PgPricingCatalog {
    pub fn new(pools: TenantPools) -> Self {
        Self { pools }
    }
}

fn internal(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Pricing lookup failed");
    CoreError::Internal(format!("Pricing lookup failed: {err}"))
}

#[async_trait]
impl PricingCatalog for PgPricingCatalog {
    async fn tax_rate(&self, tenant: &TenantId, club: &str) -> Result<Decimal, CoreError> {
        PricingRepo::find_tax_rate(self.pools.pool(tenant), club)
            .await
            .map_err(internal)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "ClubTaxRate",
                key: club.to_string(),
            })
    }

    async fn membership_price(
        &self,
        tenant: &TenantId,
        club: &str,
        category: MembershipCategory,
        specialty: SpecialtyCode,
    ) -> Result<Decimal, CoreError> {
        PricingRepo::find_membership_price(
            self.pools.pool(tenant),
            club,
            category.as_str(),
            specialty.code(),
        )
        .await
        .map_err(internal)?
        .ok_or_else(|| CoreError::NotFound {
            entity: "MembershipPrice",
            key: format!("{club}/{}/{}", category.as_str(), specialty.code()),
        })
    }

    async fn service_addons(
        &self,
        tenant: &TenantId,
        club: &str,
    ) -> Result<Vec<ServiceAddon>, CoreError> {
        let rows = PricingRepo::list_addons(self.pools.pool(tenant), club)
            .await
            .map_err(internal)?;
        Ok(rows.into_iter().map(ServiceAddon::from).collect())
    }

    async fn pt_package(
        &self,
        tenant: &TenantId,
        club: &str,
        package_id: &str,
    ) -> Result<Option<PtPackage>, CoreError> {
        let row = PricingRepo::find_pt_package(self.pools.pool(tenant), club, package_id)
            .await
            .map_err(internal)?;
        Ok(row.map(PtPackage::from))
    }
}
