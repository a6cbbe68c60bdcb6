use std::sync::Arc;

use super::{
    AccountStore, Catalog, CounterpartyLedger, Directory, Repository, SaleRecords, StockCatalog,
    TransactionLedger,
};

/// Every store the settlement engine writes to, each behind its own seam.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub ledger: Arc<dyn TransactionLedger>,
    pub counterparties: Arc<dyn CounterpartyLedger>,
    pub stock: Arc<dyn StockCatalog>,
    pub sales: Arc<dyn SaleRecords>,
    pub directory: Arc<dyn Directory>,
    pub catalog: Arc<dyn Catalog>,
}

impl Stores {
    /// Route every seam to the same SQLite repository.
    pub fn from_repository(repo: Arc<Repository>) -> Self {
        Self {
            accounts: repo.clone(),
            ledger: repo.clone(),
            counterparties: repo.clone(),
            stock: repo.clone(),
            sales: repo.clone(),
            directory: repo.clone(),
            catalog: repo,
        }
    }
}
