use thiserror::Error;

use crate::domain::{Cents, ProductId};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient funds in account {account_name}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_name: String,
        balance: Cents,
        required: Cents,
    },

    /// The charge would push a card past its limit. Retry with the
    /// override flag once the caller has acknowledged it.
    #[error("Credit limit exceeded on {account_name}: available {available}, required {required} (override required)")]
    CreditLimitExceeded {
        account_name: String,
        available: Cents,
        required: Cents,
    },

    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("Transaction {id} cannot be changed this way: {reason}")]
    NotEditable { id: String, reason: String },

    /// A step failed after earlier steps had been applied; every applied
    /// step was reversed.
    #[error("{operation} failed at step '{step}' and was rolled back: {cause}")]
    PartialFailure {
        operation: &'static str,
        step: &'static str,
        cause: Box<AppError>,
    },

    /// Rolling back failed too. The listed steps need manual reconciliation.
    #[error("{operation} failed at step '{step}' ({cause}) and could not be fully rolled back: {}", .failures.join("; "))]
    CompensationFailed {
        operation: &'static str,
        step: &'static str,
        cause: Box<AppError>,
        failures: Vec<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// True only for the credit-limit warning a caller may override.
    pub fn requires_override(&self) -> bool {
        matches!(self, AppError::CreditLimitExceeded { .. })
    }

    /// Compensation failures need a human; nothing else is off limits.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::CompensationFailed { .. })
    }

    /// The error that started a rollback, or `self` when there was none.
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::PartialFailure { cause, .. } | AppError::CompensationFailed { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => AppError::NotFound { entity, id },
            StoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => AppError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StoreError::Validation(message) => AppError::Validation(message),
            StoreError::Linked(id) => AppError::NotEditable {
                id,
                reason: "linked to a business event; use its reverse path".into(),
            },
            StoreError::Backend(err) => AppError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_typed_failures() {
        let err: AppError = StoreError::not_found("Account", "abc").into();
        assert!(matches!(err, AppError::NotFound { entity: "Account", .. }));

        let err: AppError = StoreError::Validation("description is required".into()).into();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_only_credit_limit_requires_override() {
        let limit = AppError::CreditLimitExceeded {
            account_name: "Visa".into(),
            available: 100,
            required: 500,
        };
        assert!(limit.requires_override());
        assert!(!AppError::validation("x").requires_override());
    }

    #[test]
    fn test_compensation_failure_is_not_retryable() {
        let err = AppError::CompensationFailed {
            operation: "settle_sale",
            step: "append sale payment",
            cause: Box::new(AppError::validation("boom")),
            failures: vec!["restore stock: disk full".into()],
        };
        assert!(!err.is_retryable());
        assert!(matches!(err.root_cause(), AppError::Validation(_)));
        assert!(err.to_string().contains("restore stock"));
    }
}
