//! Store boundaries the settlement engine drives.
//!
//! Each trait is one external system as far as the orchestrator is
//! concerned: it only ever sees single-row atomic writes and plain reads.
//! `Repository` implements all of them over SQLite; tests wrap it to
//! inject failures.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{StoreResult, TransactionFilter};
use crate::domain::{
    Account, AccountId, AccountType, CategoryId, Cents, Counterparty, CounterpartyId,
    CounterpartySums, CounterpartyTransaction, CounterpartyTxId, ExpenseCategory,
    LedgerTransaction, NewSale, Product, ProductId, SaleId, SaleRecord, ServiceId,
    TransactionId,
};

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Atomically add `delta` to the stored balance and return the result.
    async fn increment(&self, id: AccountId, delta: Cents) -> StoreResult<Cents>;

    async fn read(&self, id: AccountId) -> StoreResult<Account>;

    async fn list(&self) -> StoreResult<Vec<Account>>;

    /// The account flagged as default for a type, if any.
    async fn default_for(&self, account_type: AccountType) -> StoreResult<Option<Account>>;
}

#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Validate and insert; returns the id of the stored record.
    async fn append(&self, tx: &LedgerTransaction) -> StoreResult<TransactionId>;

    async fn get(&self, id: TransactionId) -> StoreResult<Option<LedgerTransaction>>;

    /// One page of `filter` matches with `sequence > after`, ordered by sequence.
    async fn query_page(
        &self,
        filter: &TransactionFilter,
        after: i64,
        limit: u32,
    ) -> StoreResult<Vec<LedgerTransaction>>;

    async fn find_by_sale(&self, sale_id: SaleId) -> StoreResult<Vec<LedgerTransaction>>;

    /// Rewrite amount, account, description and snapshot of an existing record.
    async fn update(&self, tx: &LedgerTransaction) -> StoreResult<()>;

    /// Remove a manual entry. Linked records are refused.
    async fn remove(&self, id: TransactionId) -> StoreResult<()>;

    /// Remove any record; only the owning settlement's reverse path uses this.
    async fn remove_linked(&self, id: TransactionId) -> StoreResult<()>;

    async fn sums_by_account(&self) -> StoreResult<HashMap<AccountId, Cents>>;

    async fn count(&self) -> StoreResult<usize>;
}

#[async_trait]
pub trait CounterpartyLedger: Send + Sync {
    async fn read(&self, id: CounterpartyId) -> StoreResult<Counterparty>;

    async fn list(&self) -> StoreResult<Vec<Counterparty>>;

    /// Atomically move both balances; returns the new primary balance.
    async fn increment(
        &self,
        id: CounterpartyId,
        delta: Cents,
        secondary_delta: Cents,
    ) -> StoreResult<Cents>;

    async fn append(&self, tx: &CounterpartyTransaction) -> StoreResult<CounterpartyTxId>;

    /// Stamp the balance an entry left behind once the increment has run.
    async fn set_balance_after(&self, id: CounterpartyTxId, balance: Cents) -> StoreResult<()>;

    async fn get(&self, id: CounterpartyTxId) -> StoreResult<Option<CounterpartyTransaction>>;

    async fn remove(&self, id: CounterpartyTxId) -> StoreResult<()>;

    async fn list_transactions(
        &self,
        id: CounterpartyId,
    ) -> StoreResult<Vec<CounterpartyTransaction>>;

    /// Total already paid against a service ticket, as a positive amount.
    async fn paid_for_service(&self, service_id: ServiceId) -> StoreResult<Cents>;

    async fn sums_by_counterparty(&self) -> StoreResult<HashMap<CounterpartyId, CounterpartySums>>;
}

#[async_trait]
pub trait StockCatalog: Send + Sync {
    /// `None` for products that do not track stock.
    async fn available(&self, product_id: ProductId) -> StoreResult<Option<i64>>;

    /// Take stock if enough is on hand; returns the remaining quantity.
    async fn decrement(&self, product_id: ProductId, quantity: i64) -> StoreResult<i64>;

    async fn increment(&self, product_id: ProductId, quantity: i64) -> StoreResult<i64>;
}

#[async_trait]
pub trait SaleRecords: Send + Sync {
    async fn create_sale(&self, sale: &NewSale) -> StoreResult<SaleId>;

    async fn get_sale(&self, id: SaleId) -> StoreResult<Option<SaleRecord>>;

    async fn delete_sale(&self, id: SaleId) -> StoreResult<()>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn expense_category(&self, id: CategoryId) -> StoreResult<Option<ExpenseCategory>>;

    async fn expense_category_by_name(&self, name: &str) -> StoreResult<Option<ExpenseCategory>>;
}

/// Setup writes for the records settlements refer to.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn create_account(&self, account: &Account) -> StoreResult<()>;

    async fn create_counterparty(&self, party: &Counterparty) -> StoreResult<()>;

    async fn create_product(&self, product: &Product) -> StoreResult<()>;

    async fn create_category(&self, category: &ExpenseCategory) -> StoreResult<()>;

    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>>;
}
