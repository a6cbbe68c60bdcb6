//! Step-by-step execution with compensation.
//!
//! The stores only offer single-row atomic writes, so every multi-step
//! operation runs as a saga: forward steps are awaited one at a time and each
//! successful step records how to undo itself. The first failure unwinds the
//! recorded compensations in reverse order. Callers only ever observe a
//! committed saga, a cleanly rolled back one (`PartialFailure`), or a rollback
//! that itself failed (`CompensationFailed`).

use std::future::Future;

use tracing::{debug, error, info, warn};

use crate::domain::{
    AccountId, Cents, CounterpartyId, CounterpartyTransaction, CounterpartyTxId,
    LedgerTransaction, ProductId, SaleId, TransactionId,
};
use crate::storage::{StoreResult, Stores};

use super::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Validating,
    Applying { step: usize },
    Compensating { step: usize },
    Committed,
    Failed,
}

/// The inverse of one applied forward step.
#[derive(Debug, Clone)]
pub enum Compensation {
    AccountIncrement {
        account_id: AccountId,
        delta: Cents,
    },
    RemoveTransaction(TransactionId),
    RestoreTransaction(Box<LedgerTransaction>),
    CounterpartyIncrement {
        counterparty_id: CounterpartyId,
        delta: Cents,
        secondary_delta: Cents,
    },
    RemoveCounterpartyTransaction(CounterpartyTxId),
    RestoreCounterpartyTransaction(Box<CounterpartyTransaction>),
    RestoreStock {
        product_id: ProductId,
        quantity: i64,
    },
    TakeStock {
        product_id: ProductId,
        quantity: i64,
    },
    DeleteSale(SaleId),
}

impl Compensation {
    pub fn describe(&self) -> String {
        match self {
            Compensation::AccountIncrement { account_id, delta } => {
                format!("increment account {} by {}", account_id, delta)
            }
            Compensation::RemoveTransaction(id) => format!("remove transaction {}", id),
            Compensation::RestoreTransaction(tx) => format!("restore transaction {}", tx.id),
            Compensation::CounterpartyIncrement {
                counterparty_id,
                delta,
                ..
            } => format!("increment counter-party {} by {}", counterparty_id, delta),
            Compensation::RemoveCounterpartyTransaction(id) => {
                format!("remove counter-party transaction {}", id)
            }
            Compensation::RestoreCounterpartyTransaction(tx) => {
                format!("restore counter-party transaction {}", tx.id)
            }
            Compensation::RestoreStock {
                product_id,
                quantity,
            } => format!("return {} of product {} to stock", quantity, product_id),
            Compensation::TakeStock {
                product_id,
                quantity,
            } => format!("take {} of product {} from stock", quantity, product_id),
            Compensation::DeleteSale(id) => format!("delete sale {}", id),
        }
    }

    async fn apply(&self, stores: &Stores) -> StoreResult<()> {
        match self {
            Compensation::AccountIncrement { account_id, delta } => {
                stores.accounts.increment(*account_id, *delta).await?;
            }
            Compensation::RemoveTransaction(id) => stores.ledger.remove_linked(*id).await?,
            Compensation::RestoreTransaction(tx) => {
                stores.ledger.append(tx).await?;
            }
            Compensation::CounterpartyIncrement {
                counterparty_id,
                delta,
                secondary_delta,
            } => {
                stores
                    .counterparties
                    .increment(*counterparty_id, *delta, *secondary_delta)
                    .await?;
            }
            Compensation::RemoveCounterpartyTransaction(id) => {
                stores.counterparties.remove(*id).await?
            }
            Compensation::RestoreCounterpartyTransaction(tx) => {
                stores.counterparties.append(tx).await?;
            }
            Compensation::RestoreStock {
                product_id,
                quantity,
            } => {
                stores.stock.increment(*product_id, *quantity).await?;
            }
            Compensation::TakeStock {
                product_id,
                quantity,
            } => {
                stores.stock.decrement(*product_id, *quantity).await?;
            }
            Compensation::DeleteSale(id) => stores.sales.delete_sale(*id).await?,
        }
        Ok(())
    }
}

struct AppliedStep {
    name: &'static str,
    undo: Compensation,
}

pub struct Saga<'a> {
    operation: &'static str,
    stores: &'a Stores,
    state: SagaState,
    applied: Vec<AppliedStep>,
}

impl<'a> Saga<'a> {
    pub fn new(operation: &'static str, stores: &'a Stores) -> Self {
        debug!(operation, "validating");
        Self {
            operation,
            stores,
            state: SagaState::Validating,
            applied: Vec::new(),
        }
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Number of forward steps applied and not yet compensated.
    pub fn applied_steps(&self) -> usize {
        self.applied.len()
    }

    /// Run one forward step. On success the compensation built by `undo`
    /// is recorded; on failure every recorded step is unwound.
    pub async fn step<T, F>(
        &mut self,
        name: &'static str,
        forward: F,
        undo: impl FnOnce(&T) -> Compensation,
    ) -> Result<T, AppError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let value = self.run(name, forward).await?;
        self.applied.push(AppliedStep {
            name,
            undo: undo(&value),
        });
        Ok(value)
    }

    /// Run the last forward step; nothing after it can fail, so it needs no
    /// compensation.
    pub async fn final_step<T, F>(&mut self, name: &'static str, forward: F) -> Result<T, AppError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.run(name, forward).await
    }

    async fn run<T, F>(&mut self, name: &'static str, forward: F) -> Result<T, AppError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let index = self.applied.len() + 1;
        self.state = SagaState::Applying { step: index };
        debug!(operation = self.operation, step = name, index, "applying");

        match forward.await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.abort(name, err.into()).await),
        }
    }

    /// Stop the saga at `step` because of `cause` and unwind what was applied.
    pub async fn abort(&mut self, step: &'static str, cause: AppError) -> AppError {
        if self.applied.is_empty() {
            self.state = SagaState::Failed;
            debug!(operation = self.operation, step, error = %cause, "failed before any mutation");
            return cause;
        }

        warn!(
            operation = self.operation,
            step,
            error = %cause,
            applied = self.applied.len(),
            "step failed, compensating"
        );

        let mut failures = Vec::new();
        while let Some(applied) = self.applied.pop() {
            self.state = SagaState::Compensating {
                step: self.applied.len() + 1,
            };
            match applied.undo.apply(self.stores).await {
                Ok(()) => debug!(
                    operation = self.operation,
                    step = applied.name,
                    compensation = %applied.undo.describe(),
                    "compensated"
                ),
                Err(err) => {
                    error!(
                        operation = self.operation,
                        step = applied.name,
                        compensation = %applied.undo.describe(),
                        error = %err,
                        "compensation failed; manual reconciliation required"
                    );
                    failures.push(format!(
                        "{} [{}]: {}",
                        applied.name,
                        applied.undo.describe(),
                        err
                    ));
                }
            }
        }
        self.state = SagaState::Failed;

        if failures.is_empty() {
            AppError::PartialFailure {
                operation: self.operation,
                step,
                cause: Box::new(cause),
            }
        } else {
            AppError::CompensationFailed {
                operation: self.operation,
                step,
                cause: Box::new(cause),
                failures,
            }
        }
    }

    pub fn commit(mut self) {
        self.state = SagaState::Committed;
        info!(
            operation = self.operation,
            steps = self.applied.len(),
            "committed"
        );
        self.applied.clear();
    }
}

impl Drop for Saga<'_> {
    fn drop(&mut self) {
        if self.state != SagaState::Committed && !self.applied.is_empty() {
            let outstanding: Vec<&str> = self.applied.iter().map(|s| s.name).collect();
            error!(
                operation = self.operation,
                ?outstanding,
                "saga abandoned with applied steps; manual reconciliation required"
            );
        }
    }
}
