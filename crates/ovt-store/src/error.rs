use ovt_models::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Rejected config: {0}")]
    Config(#[from] ConfigError),

    #[error("Store not available: {0}")]
    Unavailable(String),
}
