//! PostgreSQL access for the legacy membership store.
//!
//! - [`TenantPools`]: one connection pool per tenant store.
//! - [`invoker::PgProcedureInvoker`]: the sqlx implementation of
//!   [`ProcedureInvoker`](clubjoin_core::procedure::ProcedureInvoker).
//! - [`pricing::PgPricingCatalog`]: pricing lookups over [`repositories`].

pub mod invoker;
pub mod models;
pub mod pricing;
pub mod repositories;

use std::collections::HashMap;
use std::sync::Arc;

use clubjoin_core::types::TenantId;
use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// Default per-tenant pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// TenantPools
// ---------------------------------------------------------------------------

/// Connection pools keyed by tenant.
///
/// Tenants without a dedicated URL share the default pool.
#[derive(Clone)]
pub struct TenantPools {
    default: DbPool,
    tenants: Arc<HashMap<TenantId, DbPool>>,
}

impl TenantPools {
    /// Build pools for the default store and every tenant override.
    ///
    /// Tenant pools connect lazily on first use so one unreachable tenant
    /// does not prevent startup.
    pub fn new(
        default: DbPool,
        tenant_urls: &[(TenantId, String)],
        max_connections: u32,
    ) -> Result<Self, sqlx::Error> {
        let mut tenants = HashMap::with_capacity(tenant_urls.len());
        for (tenant, url) in tenant_urls {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect_lazy(url)?;
            tenants.insert(tenant.clone(), pool);
        }
        Ok(Self {
            default,
            tenants: Arc::new(tenants),
        })
    }

    /// Pool serving `tenant`.
    pub fn pool(&self, tenant: &TenantId) -> &DbPool {
        self.tenants.get(tenant).unwrap_or(&self.default)
    }
}

/// Parse `TENANT_DATABASE_URLS`: comma-separated `tenant=url` pairs.
pub fn parse_tenant_urls(raw: &str) -> Result<Vec<(TenantId, String)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (tenant, url) = entry
                .split_once('=')
                .ok_or_else(|| format!("Expected tenant=url, got '{entry}'"))?;
            let url = url.trim();
            if tenant.trim().is_empty() || url.is_empty() {
                return Err(format!("Expected tenant=url, got '{entry}'"));
            }
            Ok((TenantId::new(tenant), url.to_string()))
        })
        .collect()
}
