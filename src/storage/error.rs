use thiserror::Error;

use crate::domain::ProductId;

/// Failures reported by a store across the trait boundary.
///
/// Backends work in `anyhow::Result` internally and only the cases the
/// orchestrator must tell apart get their own variant.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("Invalid record: {0}")]
    Validation(String),

    #[error("Transaction {0} is linked to a business event and cannot be removed directly")]
    Linked(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
