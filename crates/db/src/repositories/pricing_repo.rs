//! Repository for the club pricing tables: `club_tax_rates`,
//! `membership_prices`, `service_addons`, and `pt_packages`.

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::pricing::{PtPackageRow, ServiceAddonRow};

/// Read-only queries over the pricing tables.
pub struct PricingRepo;

impl PricingRepo {
    /// Sales tax rate for a club, if configured.
    pub async fn find_tax_rate(pool: &PgPool, club: &str) -> Result<Option<Decimal>, sqlx::Error> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT tax_rate FROM club_tax_rates WHERE club = $1")
                .bind(club)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Monthly dues for a club, category, and specialty program.
    pub async fn find_membership_price(
        pool: &PgPool,
        club: &str,
        category: &str,
        specialty_code: &str,
    ) -> Result<Option<Decimal>, sqlx::Error> {
        let row: Option<(Decimal,)> = sqlx::query_as(
            "SELECT monthly_dues FROM membership_prices
             WHERE club = $1 AND category = $2 AND specialty_code = $3",
        )
        .bind(club)
        .bind(category)
        .bind(specialty_code)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Active add-ons sold at a club.
    pub async fn list_addons(pool: &PgPool, club: &str) -> Result<Vec<ServiceAddonRow>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAddonRow>(
            "SELECT upc, description, monthly_price, tax_code
             FROM service_addons
             WHERE club = $1 AND active
             ORDER BY description",
        )
        .bind(club)
        .fetch_all(pool)
        .await
    }

    /// A personal-training package by id.
    pub async fn find_pt_package(
        pool: &PgPool,
        club: &str,
        package_id: &str,
    ) -> Result<Option<PtPackageRow>, sqlx::Error> {
        sqlx::query_as::<_, PtPackageRow>(
            "SELECT package_id, upc, description, price, sessions
             FROM pt_packages
             WHERE club = $1 AND package_id = $2",
        )
        .bind(club)
        .bind(package_id)
        .fetch_optional(pool)
        .await
    }
}
