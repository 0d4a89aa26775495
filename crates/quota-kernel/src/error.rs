use std::path::PathBuf;

use thiserror::Error;

use crate::transfer::TransferError;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("store error: {0}")]
    Store(#[from] quota_store::StoreError),
    #[error("failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("ownership transfer aborted: {0}")]
    Transfer(#[from] TransferError),
}
