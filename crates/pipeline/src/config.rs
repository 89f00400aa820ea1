use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use clubjoin_core::types::TenantId;

const DEFAULT_INITIATION_FEE: &str = "49.00";
const DEFAULT_PRORATED_DUES_UPC: &str = "PRORATED-DUES";
const DEFAULT_CONTRACT_DIR: &str = "./contracts";

/// Business constants and switches for the enrollment saga.
#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    /// One-time fee charged with every enrollment, folded into the dues tax base.
    pub initiation_fee: Decimal,
    /// UPC recorded on the prorated dues item after production finalize.
    pub prorated_dues_upc: String,
    /// Directory receiving archived contract documents.
    pub contract_dir: PathBuf,
    /// Purge staged rows when the saga aborts after the membership insert.
    pub compensate_on_abort: bool,
    /// Tenants whose clubs never charge sales tax.
    pub non_taxed_tenants: Vec<TenantId>,
}

impl EnrollmentConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default          |
    /// |-----------------------|------------------|
    /// | `INITIATION_FEE`      | `49.00`          |
    /// | `PRORATED_DUES_UPC`   | `PRORATED-DUES`  |
    /// | `CONTRACT_DIR`        | `./contracts`    |
    /// | `COMPENSATE_ON_ABORT` | `true`           |
    /// | `NON_TAXED_TENANTS`   | (empty)          |
    pub fn from_env() -> Self {
        let initiation_fee = Decimal::from_str(
            &std::env::var("INITIATION_FEE").unwrap_or_else(|_| DEFAULT_INITIATION_FEE.into()),
        )
        .expect("INITIATION_FEE must be a decimal amount");

        let prorated_dues_upc = std::env::var("PRORATED_DUES_UPC")
            .unwrap_or_else(|_| DEFAULT_PRORATED_DUES_UPC.into());

        let contract_dir = std::env::var("CONTRACT_DIR")
            .unwrap_or_else(|_| DEFAULT_CONTRACT_DIR.into())
            .into();

        let compensate_on_abort: bool = std::env::var("COMPENSATE_ON_ABORT")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("COMPENSATE_ON_ABORT must be true or false");

        let non_taxed_tenants =
            parse_tenant_list(&std::env::var("NON_TAXED_TENANTS").unwrap_or_default());

        Self {
            initiation_fee,
            prorated_dues_upc,
            contract_dir,
            compensate_on_abort,
            non_taxed_tenants,
        }
    }

    pub fn is_taxed(&self, tenant: &TenantId) -> bool {
        !self.non_taxed_tenants.contains(tenant)
    }
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            initiation_fee: Decimal::new(4900, 2),
            prorated_dues_upc: DEFAULT_PRORATED_DUES_UPC.to_string(),
            contract_dir: PathBuf::from(DEFAULT_CONTRACT_DIR),
            compensate_on_abort: true,
            non_taxed_tenants: Vec::new(),
        }
    }
}

fn parse_tenant_list(raw: &str) -> Vec<TenantId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TenantId::new)
        .collect()
}
