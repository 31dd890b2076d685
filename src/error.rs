use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache manager has no event handler registered")]
    NotInitialized,

    #[error("Cache manager is already initialized")]
    AlreadyInitialized,

    #[error("No free connection flag slots ({needed} needed, {available} available)")]
    FlagSlotsExhausted { needed: u8, available: u8 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
