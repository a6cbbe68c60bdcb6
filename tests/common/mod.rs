// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shopledger::application::SettlementService;
use shopledger::domain::{
    Account, AccountId, AccountType, CategoryId, Cents, Counterparty, CounterpartyId,
    CounterpartyKind, CounterpartySums, CounterpartyTransaction, CounterpartyTxId, ExpenseCategory,
    LedgerTransaction, NewSale, Product, ProductId, SaleId, SaleRecord, ServiceId, TransactionId,
};
use shopledger::storage::{
    AccountStore, Catalog, CounterpartyLedger, Directory, Repository, SaleRecords, StockCatalog,
    StoreError, StoreResult, Stores, TransactionFilter, TransactionLedger,
};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(SettlementService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = SettlementService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to create a service whose stores fail on demand
pub async fn faulty_service() -> Result<(SettlementService, Faults, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let repo = Repository::init(&format!("sqlite:{}?mode=rwc", db_path.display())).await?;

    let faults = Faults::default();
    let store = Arc::new(FaultyStore {
        inner: Arc::new(repo),
        faults: faults.clone(),
    });
    let stores = Stores {
        accounts: store.clone(),
        ledger: store.clone(),
        counterparties: store.clone(),
        stock: store.clone(),
        sales: store.clone(),
        directory: store.clone(),
        catalog: store,
    };
    Ok((SettlementService::new(stores), faults, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Every ledger transaction, in recording order
pub async fn all_transactions(service: &SettlementService) -> Result<Vec<LedgerTransaction>> {
    Ok(service
        .query_transactions(TransactionFilter::default())
        .collect_all()
        .await?)
}

/// Test fixture: the accounts of a small shop
pub struct ShopAccounts {
    pub cash: Account,
    pub bank: Account,
    pub pos: Account,
    pub card: Account,
}

impl ShopAccounts {
    /// Cash 100.00 (default), bank 20.00, POS 0.00 (default), card with
    /// 200.00 debt and a 500.00 limit.
    pub async fn create(service: &SettlementService) -> Result<Self> {
        let cash = service
            .create_account(
                Account::new("Cash".into(), AccountType::Cash, "EUR".into())
                    .with_initial_balance(10000)
                    .as_default(),
            )
            .await?;
        let bank = service
            .create_account(
                Account::new("Bank".into(), AccountType::Bank, "EUR".into())
                    .with_initial_balance(2000),
            )
            .await?;
        let pos = service
            .create_account(
                Account::new("Terminal".into(), AccountType::Pos, "EUR".into()).as_default(),
            )
            .await?;
        let card = service
            .create_account(
                Account::new("Visa".into(), AccountType::CreditCard, "EUR".into())
                    .with_initial_balance(20000)
                    .with_credit_limit(50000),
            )
            .await?;
        Ok(Self {
            cash,
            bank,
            pos,
            card,
        })
    }
}

pub async fn create_customer(service: &SettlementService, name: &str) -> Result<Counterparty> {
    Ok(service
        .create_counterparty(Counterparty::new(name.into(), CounterpartyKind::Customer))
        .await?)
}

pub async fn create_supplier(service: &SettlementService, name: &str) -> Result<Counterparty> {
    Ok(service
        .create_counterparty(Counterparty::new(name.into(), CounterpartyKind::Supplier))
        .await?)
}

pub async fn create_product(
    service: &SettlementService,
    name: &str,
    quantity: i64,
) -> Result<Product> {
    Ok(service
        .create_product(Product::new(name.into(), quantity))
        .await?)
}

pub async fn balance(service: &SettlementService, id: AccountId) -> Result<Cents> {
    Ok(service.get_account(id).await?.current_balance)
}

pub async fn stock(service: &SettlementService, id: ProductId) -> Result<i64> {
    Ok(service.get_product(id).await?.quantity)
}

// ========================
// Fault injection
// ========================

#[derive(Default)]
struct FaultState {
    calls: HashMap<&'static str, usize>,
    /// (operation, first failing call, fail every later call too)
    rules: Vec<(&'static str, usize, bool)>,
    created_sales: Vec<SaleId>,
    /// Balance moves slipped in ahead of the next counter-party append
    party_moves: Vec<(CounterpartyId, Cents)>,
}

/// Shared switchboard deciding which store calls fail.
#[derive(Clone, Default)]
pub struct Faults {
    state: Arc<Mutex<FaultState>>,
}

impl Faults {
    /// Fail only the `call`-th invocation (1-based) of `op`.
    pub fn fail_on(&self, op: &'static str, call: usize) {
        self.state.lock().unwrap().rules.push((op, call, false));
    }

    /// Fail the `call`-th invocation of `op` and every one after it.
    pub fn fail_from(&self, op: &'static str, call: usize) {
        self.state.lock().unwrap().rules.push((op, call, true));
    }

    /// Forget all rules and counters.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.clear();
        state.rules.clear();
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    /// Move a counter-party balance behind the service's back right before
    /// its next entry is appended, as a concurrent settlement would.
    pub fn move_party_on_append(&self, id: CounterpartyId, delta: Cents) {
        self.state.lock().unwrap().party_moves.push((id, delta));
    }

    fn take_party_moves(&self) -> Vec<(CounterpartyId, Cents)> {
        std::mem::take(&mut self.state.lock().unwrap().party_moves)
    }

    /// Sales created through the wrapper, including rolled back ones.
    pub fn created_sales(&self) -> Vec<SaleId> {
        self.state.lock().unwrap().created_sales.clone()
    }

    fn check(&self, op: &'static str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let count = state.calls.entry(op).or_insert(0);
        *count += 1;
        let call = *count;

        let fails = state.rules.iter().any(|(rule_op, first, persistent)| {
            *rule_op == op && (call == *first || (*persistent && call > *first))
        });
        if fails {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected failure in {} (call {})",
                op,
                call
            )));
        }
        Ok(())
    }
}

/// Wraps the SQLite repository and fails write calls according to `Faults`.
pub struct FaultyStore {
    inner: Arc<Repository>,
    faults: Faults,
}

#[async_trait]
impl AccountStore for FaultyStore {
    async fn increment(&self, id: AccountId, delta: Cents) -> StoreResult<Cents> {
        self.faults.check("accounts.increment")?;
        AccountStore::increment(&*self.inner, id, delta).await
    }

    async fn read(&self, id: AccountId) -> StoreResult<Account> {
        AccountStore::read(&*self.inner, id).await
    }

    async fn list(&self) -> StoreResult<Vec<Account>> {
        AccountStore::list(&*self.inner).await
    }

    async fn default_for(&self, account_type: AccountType) -> StoreResult<Option<Account>> {
        self.inner.default_for(account_type).await
    }
}

#[async_trait]
impl TransactionLedger for FaultyStore {
    async fn append(&self, tx: &LedgerTransaction) -> StoreResult<TransactionId> {
        self.faults.check("ledger.append")?;
        TransactionLedger::append(&*self.inner, tx).await
    }

    async fn get(&self, id: TransactionId) -> StoreResult<Option<LedgerTransaction>> {
        TransactionLedger::get(&*self.inner, id).await
    }

    async fn query_page(
        &self,
        filter: &TransactionFilter,
        after: i64,
        limit: u32,
    ) -> StoreResult<Vec<LedgerTransaction>> {
        self.inner.query_page(filter, after, limit).await
    }

    async fn find_by_sale(&self, sale_id: SaleId) -> StoreResult<Vec<LedgerTransaction>> {
        self.inner.find_by_sale(sale_id).await
    }

    async fn update(&self, tx: &LedgerTransaction) -> StoreResult<()> {
        self.faults.check("ledger.update")?;
        self.inner.update(tx).await
    }

    async fn remove(&self, id: TransactionId) -> StoreResult<()> {
        self.faults.check("ledger.remove")?;
        TransactionLedger::remove(&*self.inner, id).await
    }

    async fn remove_linked(&self, id: TransactionId) -> StoreResult<()> {
        self.faults.check("ledger.remove_linked")?;
        self.inner.remove_linked(id).await
    }

    async fn sums_by_account(&self) -> StoreResult<HashMap<AccountId, Cents>> {
        self.inner.sums_by_account().await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}

#[async_trait]
impl CounterpartyLedger for FaultyStore {
    async fn read(&self, id: CounterpartyId) -> StoreResult<Counterparty> {
        CounterpartyLedger::read(&*self.inner, id).await
    }

    async fn list(&self) -> StoreResult<Vec<Counterparty>> {
        CounterpartyLedger::list(&*self.inner).await
    }

    async fn increment(
        &self,
        id: CounterpartyId,
        delta: Cents,
        secondary_delta: Cents,
    ) -> StoreResult<Cents> {
        self.faults.check("counterparties.increment")?;
        CounterpartyLedger::increment(&*self.inner, id, delta, secondary_delta).await
    }

    async fn append(&self, tx: &CounterpartyTransaction) -> StoreResult<CounterpartyTxId> {
        self.faults.check("counterparties.append")?;
        for (id, delta) in self.faults.take_party_moves() {
            CounterpartyLedger::increment(&*self.inner, id, delta, 0).await?;
        }
        CounterpartyLedger::append(&*self.inner, tx).await
    }

    async fn set_balance_after(&self, id: CounterpartyTxId, balance: Cents) -> StoreResult<()> {
        self.faults.check("counterparties.set_balance_after")?;
        self.inner.set_balance_after(id, balance).await
    }

    async fn get(&self, id: CounterpartyTxId) -> StoreResult<Option<CounterpartyTransaction>> {
        CounterpartyLedger::get(&*self.inner, id).await
    }

    async fn remove(&self, id: CounterpartyTxId) -> StoreResult<()> {
        self.faults.check("counterparties.remove")?;
        CounterpartyLedger::remove(&*self.inner, id).await
    }

    async fn list_transactions(
        &self,
        id: CounterpartyId,
    ) -> StoreResult<Vec<CounterpartyTransaction>> {
        self.inner.list_transactions(id).await
    }

    async fn paid_for_service(&self, service_id: ServiceId) -> StoreResult<Cents> {
        self.inner.paid_for_service(service_id).await
    }

    async fn sums_by_counterparty(&self) -> StoreResult<HashMap<CounterpartyId, CounterpartySums>> {
        self.inner.sums_by_counterparty().await
    }
}

#[async_trait]
impl StockCatalog for FaultyStore {
    async fn available(&self, product_id: ProductId) -> StoreResult<Option<i64>> {
        self.inner.available(product_id).await
    }

    async fn decrement(&self, product_id: ProductId, quantity: i64) -> StoreResult<i64> {
        self.faults.check("stock.decrement")?;
        self.inner.decrement(product_id, quantity).await
    }

    async fn increment(&self, product_id: ProductId, quantity: i64) -> StoreResult<i64> {
        self.faults.check("stock.increment")?;
        StockCatalog::increment(&*self.inner, product_id, quantity).await
    }
}

#[async_trait]
impl SaleRecords for FaultyStore {
    async fn create_sale(&self, sale: &NewSale) -> StoreResult<SaleId> {
        self.faults.check("sales.create_sale")?;
        let id = self.inner.create_sale(sale).await?;
        self.faults.state.lock().unwrap().created_sales.push(id);
        Ok(id)
    }

    async fn get_sale(&self, id: SaleId) -> StoreResult<Option<SaleRecord>> {
        self.inner.get_sale(id).await
    }

    async fn delete_sale(&self, id: SaleId) -> StoreResult<()> {
        self.faults.check("sales.delete_sale")?;
        self.inner.delete_sale(id).await
    }
}

#[async_trait]
impl Directory for FaultyStore {
    async fn expense_category(&self, id: CategoryId) -> StoreResult<Option<ExpenseCategory>> {
        self.inner.expense_category(id).await
    }

    async fn expense_category_by_name(&self, name: &str) -> StoreResult<Option<ExpenseCategory>> {
        self.inner.expense_category_by_name(name).await
    }
}

#[async_trait]
impl Catalog for FaultyStore {
    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        self.inner.create_account(account).await
    }

    async fn create_counterparty(&self, party: &Counterparty) -> StoreResult<()> {
        self.inner.create_counterparty(party).await
    }

    async fn create_product(&self, product: &Product) -> StoreResult<()> {
        self.inner.create_product(product).await
    }

    async fn create_category(&self, category: &ExpenseCategory) -> StoreResult<()> {
        self.inner.create_category(category).await
    }

    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        self.inner.product(id).await
    }
}
