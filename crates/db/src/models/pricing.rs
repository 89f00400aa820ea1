//! Pricing catalog rows.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use clubjoin_core::enrollment::ServiceAddon;
use clubjoin_core::pricing::PtPackage;

/// A row from the `service_addons` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ServiceAddonRow {
    pub upc: String,
    pub description: String,
    pub monthly_price: Decimal,
    pub tax_code: Option<String>,
}

impl From<ServiceAddonRow> for ServiceAddon {
    fn from(row: ServiceAddonRow) -> Self {
        Self {
            description: row.description.trim().to_string(),
            monthly_price: row.monthly_price,
            upc: row.upc.trim().to_string(),
            tax_code: row.tax_code.map(|c| c.trim().to_string()),
        }
    }
}

/// A row from the `pt_packages` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PtPackageRow {
    pub package_id: String,
    pub upc: String,
    pub description: String,
    pub price: Decimal,
    pub sessions: i32,
}

impl From<PtPackageRow> for PtPackage {
    fn from(row: PtPackageRow) -> Self {
        Self {
            package_id: row.package_id.trim().to_string(),
            upc: row.upc.trim().to_string(),
            description: row.description.trim().to_string(),
            price: row.price,
            sessions: row.sessions,
        }
    }
}
