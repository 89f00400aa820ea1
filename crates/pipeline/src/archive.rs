//! Contract document archive.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use clubjoin_core::naming::contract_filename;
use clubjoin_core::types::CustomerCode;

/// Durable storage for signed contract documents.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Persist `bytes` under `filename` and return where it landed.
    async fn save(&self, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf>;
}

/// Stores contracts as files in a single directory.
pub struct FsContractStore {
    dir: PathBuf,
}

impl FsContractStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ContractStore for FsContractStore {
    async fn save(&self, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Archive a contract. Failures are logged and reported as `None`.
pub async fn archive_contract(
    store: &dyn ContractStore,
    document: &[u8],
    date: NaiveDate,
    customer_code: &CustomerCode,
    first_name: &str,
    last_name: &str,
) -> Option<PathBuf> {
    let filename = contract_filename(date, customer_code, first_name, last_name);
    match store.save(&filename, document).await {
        Ok(path) => {
            tracing::info!(
                customer_code = %customer_code,
                path = %path.display(),
                bytes = document.len(),
                "Contract archived"
            );
            Some(path)
        }
        Err(e) => {
            tracing::warn!(
                customer_code = %customer_code,
                filename = %filename,
                error = %e,
                "Contract archive failed"
            );
            None
        }
    }
}
