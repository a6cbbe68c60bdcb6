use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountType, CategoryId, Cents, Counterparty, CounterpartyId,
    CounterpartyKind, CounterpartyTransaction, Direction, ExpenseCategory, IntegrityInputs,
    IntegrityReport, LedgerTransaction, Product, ProductId, SaleId, SaleLine, SaleRecord,
    TransactionId, TxKind, TxLink, build_integrity_report,
};
use crate::storage::{Repository, Stores, TransactionCursor, TransactionFilter};

use super::saga::{Compensation, Saga};
use super::{
    AppError, DeleteResult, EditResult, EntryRequest, EntryResult, TransactionEdit,
    TransferRequest, TransferResult, VoidTransferResult,
};

/// Application service settling every money movement of the shop.
/// This is the primary interface for any client (CLI, tests, a future API).
///
/// Each write is a saga over independent stores; see [`Saga`].
pub struct SettlementService {
    pub(super) stores: Stores,
}

impl SettlementService {
    /// Create a service over an explicit set of stores.
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Create a service with every store backed by one repository.
    pub fn from_repository(repo: Repository) -> Self {
        Self::new(Stores::from_repository(Arc::new(repo)))
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::from_repository(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::from_repository(repo))
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    // ========================
    // Catalog setup
    // ========================

    /// Create a new account. A default account replaces the previous default
    /// of its type.
    pub async fn create_account(&self, account: Account) -> Result<Account, AppError> {
        if account.name.trim().is_empty() {
            return Err(AppError::validation("Account name is required"));
        }
        if account.credit_limit.is_some() && !account.is_credit_card() {
            return Err(AppError::validation(
                "Only credit card accounts carry a credit limit",
            ));
        }
        if account.credit_limit.is_some_and(|limit| limit < 0) {
            return Err(AppError::validation("Credit limit cannot be negative"));
        }

        self.stores.catalog.create_account(&account).await?;
        info!(account = %account.name, account_type = %account.account_type, "account created");
        Ok(account)
    }

    pub async fn create_counterparty(&self, party: Counterparty) -> Result<Counterparty, AppError> {
        if party.name.trim().is_empty() {
            return Err(AppError::validation("Counter-party name is required"));
        }
        self.stores.catalog.create_counterparty(&party).await?;
        info!(counterparty = %party.name, kind = %party.kind, "counter-party created");
        Ok(party)
    }

    pub async fn create_product(&self, product: Product) -> Result<Product, AppError> {
        if product.name.trim().is_empty() {
            return Err(AppError::validation("Product name is required"));
        }
        if product.quantity < 0 {
            return Err(AppError::validation("Stock quantity cannot be negative"));
        }
        self.stores.catalog.create_product(&product).await?;
        Ok(product)
    }

    pub async fn create_category(&self, name: String) -> Result<ExpenseCategory, AppError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Category name is required"));
        }
        let category = ExpenseCategory::new(name);
        self.stores.catalog.create_category(&category).await?;
        Ok(category)
    }

    // ========================
    // Reads
    // ========================

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        Ok(self.stores.accounts.read(id).await?)
    }

    /// Look an account up by its unique name.
    pub async fn find_account(&self, name: &str) -> Result<Account, AppError> {
        self.stores
            .accounts
            .list()
            .await?
            .into_iter()
            .find(|account| account.name == name)
            .ok_or_else(|| AppError::NotFound {
                entity: "Account",
                id: name.to_string(),
            })
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.stores.accounts.list().await?)
    }

    pub async fn default_account(&self, account_type: AccountType) -> Result<Account, AppError> {
        self.stores
            .accounts
            .default_for(account_type)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Default account",
                id: account_type.to_string(),
            })
    }

    pub async fn get_counterparty(&self, id: CounterpartyId) -> Result<Counterparty, AppError> {
        Ok(self.stores.counterparties.read(id).await?)
    }

    /// Look a counter-party up by name. Names are not unique; the first
    /// match in listing order wins.
    pub async fn find_counterparty(&self, name: &str) -> Result<Counterparty, AppError> {
        self.stores
            .counterparties
            .list()
            .await?
            .into_iter()
            .find(|party| party.name == name)
            .ok_or_else(|| AppError::NotFound {
                entity: "Counter-party",
                id: name.to_string(),
            })
    }

    pub async fn list_counterparties(&self) -> Result<Vec<Counterparty>, AppError> {
        Ok(self.stores.counterparties.list().await?)
    }

    pub async fn counterparty_transactions(
        &self,
        id: CounterpartyId,
    ) -> Result<Vec<CounterpartyTransaction>, AppError> {
        // Surface NotFound for unknown ids instead of an empty list.
        self.stores.counterparties.read(id).await?;
        Ok(self.stores.counterparties.list_transactions(id).await?)
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<LedgerTransaction, AppError> {
        self.stores
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Transaction",
                id: id.to_string(),
            })
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, AppError> {
        self.stores
            .catalog
            .product(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Product",
                id: id.to_string(),
            })
    }

    pub async fn get_sale(&self, id: SaleId) -> Result<SaleRecord, AppError> {
        self.stores
            .sales
            .get_sale(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Sale",
                id: id.to_string(),
            })
    }

    pub async fn expense_category_by_name(&self, name: &str) -> Result<ExpenseCategory, AppError> {
        self.stores
            .directory
            .expense_category_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound {
                entity: "Expense category",
                id: name.to_string(),
            })
    }

    /// A lazy, restartable cursor over the ledger. Nothing is read until the
    /// first page is requested.
    pub fn query_transactions(&self, filter: TransactionFilter) -> TransactionCursor {
        TransactionCursor::new(self.stores.ledger.clone(), filter)
    }

    /// Re-read an account after a commit. The write already happened, so a
    /// failed read degrades to the snapshot rather than an error.
    pub(super) async fn fresh_account(&self, mut snapshot: Account, balance: Cents) -> Account {
        match self.stores.accounts.read(snapshot.id).await {
            Ok(account) => account,
            Err(err) => {
                warn!(account = %snapshot.id, error = %err, "could not re-read account after commit");
                snapshot.current_balance = balance;
                snapshot
            }
        }
    }

    pub(super) async fn fresh_counterparty(
        &self,
        mut snapshot: Counterparty,
        balance: Cents,
    ) -> Counterparty {
        match self.stores.counterparties.read(snapshot.id).await {
            Ok(party) => party,
            Err(err) => {
                warn!(counterparty = %snapshot.id, error = %err, "could not re-read counter-party after commit");
                snapshot.balance = balance;
                snapshot
            }
        }
    }

    // ========================
    // Manual entries
    // ========================

    /// Record money coming into an account outside any sale or payment.
    #[instrument(skip(self, request), fields(account = %request.account_id, amount = request.amount))]
    pub async fn record_income(&self, request: EntryRequest) -> Result<EntryResult, AppError> {
        self.record_manual_entry("record_income", TxKind::Income, request)
            .await
    }

    /// Record money leaving an account, optionally under an expense category.
    #[instrument(skip(self, request), fields(account = %request.account_id, amount = request.amount))]
    pub async fn record_expense(&self, request: EntryRequest) -> Result<EntryResult, AppError> {
        self.record_manual_entry("record_expense", TxKind::Expense, request)
            .await
    }

    async fn record_manual_entry(
        &self,
        operation: &'static str,
        kind: TxKind,
        request: EntryRequest,
    ) -> Result<EntryResult, AppError> {
        let mut saga = Saga::new(operation, &self.stores);

        require_positive(request.amount)?;
        let account = self.stores.accounts.read(request.account_id).await?;
        let category = self.resolve_category(request.category_id).await?;
        let description = description_or(request.description, || match &category {
            Some(category) => category.name.clone(),
            None => kind.label().to_string(),
        });

        let delta = account.signed_amount(kind.direction(), request.amount);
        ensure_can_apply(&account, delta, request.override_limit)?;

        let balance_after = saga
            .step(
                "increment account",
                self.stores.accounts.increment(account.id, delta),
                |_| Compensation::AccountIncrement {
                    account_id: account.id,
                    delta: -delta,
                },
            )
            .await?;

        let transaction = LedgerTransaction::new(
            account.id,
            kind,
            delta,
            request.date,
            TxLink::ManualEntry {
                category_id: category.map(|c| c.id),
            },
        )
        .with_description(description)
        .with_balance_after(balance_after);

        saga.final_step(
            "append transaction",
            self.stores.ledger.append(&transaction),
        )
        .await?;
        saga.commit();

        let transaction = self.stored_or(transaction).await;
        let account = self.fresh_account(account, balance_after).await;
        Ok(EntryResult {
            transaction,
            account,
        })
    }

    async fn resolve_category(
        &self,
        id: Option<CategoryId>,
    ) -> Result<Option<ExpenseCategory>, AppError> {
        match id {
            None => Ok(None),
            Some(id) => self
                .stores
                .directory
                .expense_category(id)
                .await?
                .map(Some)
                .ok_or_else(|| AppError::NotFound {
                    entity: "Expense category",
                    id: id.to_string(),
                }),
        }
    }

    /// The stored copy carries the sequence number; fall back to what was
    /// written if the read fails.
    pub(super) async fn stored_or(&self, written: LedgerTransaction) -> LedgerTransaction {
        match self.stores.ledger.get(written.id).await {
            Ok(Some(stored)) => stored,
            _ => written,
        }
    }

    // ========================
    // Transfers
    // ========================

    /// Move money between two of the shop's own accounts.
    #[instrument(skip(self, request), fields(from = %request.from_account, to = %request.to_account, amount = request.amount))]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferResult, AppError> {
        self.move_between_accounts("transfer", request, false).await
    }

    /// Pay down a credit card from a cash, bank or other account.
    #[instrument(skip(self, request), fields(from = %request.from_account, card = %request.to_account, amount = request.amount))]
    pub async fn pay_credit_card(
        &self,
        request: TransferRequest,
    ) -> Result<TransferResult, AppError> {
        self.move_between_accounts("pay_credit_card", request, true)
            .await
    }

    async fn move_between_accounts(
        &self,
        operation: &'static str,
        request: TransferRequest,
        card_payment: bool,
    ) -> Result<TransferResult, AppError> {
        let mut saga = Saga::new(operation, &self.stores);

        require_positive(request.amount)?;
        if request.from_account == request.to_account {
            return Err(AppError::validation(
                "Source and target accounts must be different",
            ));
        }

        let from = self.stores.accounts.read(request.from_account).await?;
        let to = self.stores.accounts.read(request.to_account).await?;

        if from.currency != to.currency {
            return Err(AppError::validation(format!(
                "Currency mismatch: {} is {}, {} is {}",
                from.name, from.currency, to.name, to.currency
            )));
        }
        if from.is_credit_card() && to.is_credit_card() {
            return Err(AppError::validation(
                "Transfers between two credit cards are not supported",
            ));
        }
        if card_payment {
            if !to.is_credit_card() {
                return Err(AppError::validation(format!(
                    "{} is not a credit card",
                    to.name
                )));
            }
            if from.is_credit_card() {
                return Err(AppError::validation(
                    "A credit card cannot be paid from another credit card",
                ));
            }
        }

        let out_delta = from.signed_amount(Direction::Outflow, request.amount);
        let in_delta = to.signed_amount(Direction::Inflow, request.amount);
        ensure_can_apply(&from, out_delta, request.override_limit)?;

        let description = description_or(request.description, || {
            if card_payment {
                format!("Payment of {} from {}", to.name, from.name)
            } else {
                format!("Transfer {} -> {}", from.name, to.name)
            }
        });

        // Both ids up front so each leg is written already paired.
        let out_id = Uuid::new_v4();
        let in_id = Uuid::new_v4();

        let from_balance = saga
            .step(
                "debit source account",
                self.stores.accounts.increment(from.id, out_delta),
                |_| Compensation::AccountIncrement {
                    account_id: from.id,
                    delta: -out_delta,
                },
            )
            .await?;

        let out_leg = LedgerTransaction::new(
            from.id,
            TxKind::TransferOut,
            out_delta,
            request.date,
            TxLink::TransferLeg { pair_id: in_id },
        )
        .with_id(out_id)
        .with_description(description.clone())
        .with_balance_after(from_balance);

        saga.step(
            "append source leg",
            self.stores.ledger.append(&out_leg),
            |id| Compensation::RemoveTransaction(*id),
        )
        .await?;

        let to_balance = saga
            .step(
                "credit target account",
                self.stores.accounts.increment(to.id, in_delta),
                |_| Compensation::AccountIncrement {
                    account_id: to.id,
                    delta: -in_delta,
                },
            )
            .await?;

        let in_leg = LedgerTransaction::new(
            to.id,
            TxKind::TransferIn,
            in_delta,
            request.date,
            TxLink::TransferLeg { pair_id: out_id },
        )
        .with_id(in_id)
        .with_description(description)
        .with_balance_after(to_balance);

        saga.final_step("append target leg", self.stores.ledger.append(&in_leg))
            .await?;
        saga.commit();

        Ok(TransferResult {
            out_leg: self.stored_or(out_leg).await,
            in_leg: self.stored_or(in_leg).await,
            from_account: self.fresh_account(from, from_balance).await,
            to_account: self.fresh_account(to, to_balance).await,
        })
    }

    /// Undo a transfer: reverse both balance movements and remove both legs.
    /// Either leg's id identifies the pair.
    #[instrument(skip(self))]
    pub async fn void_transfer(&self, id: TransactionId) -> Result<VoidTransferResult, AppError> {
        let mut saga = Saga::new("void_transfer", &self.stores);

        let leg = self.get_transaction(id).await?;
        let pair_id = leg.transfer_pair().ok_or_else(|| AppError::NotEditable {
            id: id.to_string(),
            reason: "not a transfer leg".into(),
        })?;

        let mut legs = vec![leg];
        match self.stores.ledger.get(pair_id).await? {
            Some(mate) => legs.push(mate),
            None => warn!(leg = %id, mate = %pair_id, "transfer mate missing; voiding the single leg"),
        }
        // Reverse in recording order: source first.
        legs.sort_by_key(|leg| leg.sequence);

        let mut balances = Vec::with_capacity(legs.len());
        for (index, leg) in legs.iter().enumerate() {
            let balance = saga
                .step(
                    "reverse leg balance",
                    self.stores.accounts.increment(leg.account_id, -leg.amount),
                    |_| Compensation::AccountIncrement {
                        account_id: leg.account_id,
                        delta: leg.amount,
                    },
                )
                .await?;
            balances.push((leg.account_id, balance));

            let remove = self.stores.ledger.remove_linked(leg.id);
            if index + 1 == legs.len() {
                saga.final_step("remove leg", remove).await?;
            } else {
                saga.step("remove leg", remove, |_| {
                    Compensation::RestoreTransaction(Box::new(leg.clone()))
                })
                .await?;
            }
        }
        saga.commit();

        let mut accounts = Vec::with_capacity(balances.len());
        for (account_id, balance) in balances {
            match self.stores.accounts.read(account_id).await {
                Ok(account) => accounts.push(account),
                Err(err) => {
                    warn!(account = %account_id, balance, error = %err, "could not re-read account after commit")
                }
            }
        }

        Ok(VoidTransferResult {
            removed: legs,
            accounts,
        })
    }

    // ========================
    // Edit / delete
    // ========================

    /// Change the amount, account or description of a stored transaction,
    /// moving balances to match.
    ///
    /// Amount and account changes are limited to manual entries and sale
    /// payments; every other record accepts a new description only. The
    /// direction of the movement never changes.
    #[instrument(skip(self, edit))]
    pub async fn edit_transaction(
        &self,
        id: TransactionId,
        edit: TransactionEdit,
    ) -> Result<EditResult, AppError> {
        let mut saga = Saga::new("edit_transaction", &self.stores);

        if edit.is_empty() {
            return Err(AppError::validation("Nothing to change"));
        }
        let old = self.get_transaction(id).await?;

        let target_account = edit.account_id.unwrap_or(old.account_id);
        let moves_money = edit.amount.is_some_and(|amount| amount != old.magnitude())
            || target_account != old.account_id;
        if moves_money && !matches!(old.link, TxLink::ManualEntry { .. } | TxLink::SalePayment { .. })
        {
            return Err(AppError::NotEditable {
                id: id.to_string(),
                reason: format!(
                    "{} records only accept description changes",
                    old.link.as_str()
                ),
            });
        }
        if let Some(amount) = edit.amount {
            require_positive(amount)?;
        }

        let mut updated = old.clone();
        if let Some(description) = edit.description {
            if description.trim().is_empty() {
                return Err(AppError::validation("Description cannot be blank"));
            }
            updated.description = description;
        }

        let magnitude = edit.amount.unwrap_or(old.magnitude());
        let direction = old.kind.direction();
        let mut touched = Vec::new();

        if target_account == old.account_id {
            let account = self.stores.accounts.read(old.account_id).await?;
            let new_amount = account.signed_amount(direction, magnitude);
            let delta = new_amount - old.amount;

            if delta != 0 {
                ensure_can_apply(&account, delta, edit.override_limit)?;
                let balance = saga
                    .step(
                        "adjust account",
                        self.stores.accounts.increment(account.id, delta),
                        |_| Compensation::AccountIncrement {
                            account_id: account.id,
                            delta: -delta,
                        },
                    )
                    .await?;
                updated.amount = new_amount;
                updated.balance_after = balance;
                touched.push((account, balance));
            }
        } else {
            let old_account = self.stores.accounts.read(old.account_id).await?;
            let new_account = self.stores.accounts.read(target_account).await?;
            if old_account.currency != new_account.currency {
                return Err(AppError::validation(format!(
                    "Currency mismatch: {} is {}, {} is {}",
                    old_account.name, old_account.currency, new_account.name, new_account.currency
                )));
            }

            if new_account.is_credit_card() && matches!(old.link, TxLink::SalePayment { .. }) {
                return Err(AppError::validation(format!(
                    "{} is a credit card; sales settle into cash, bank or POS accounts",
                    new_account.name
                )));
            }

            let new_amount = new_account.signed_amount(direction, magnitude);
            ensure_can_apply(&old_account, -old.amount, edit.override_limit)?;
            ensure_can_apply(&new_account, new_amount, edit.override_limit)?;

            let old_balance = saga
                .step(
                    "reverse old account",
                    self.stores.accounts.increment(old_account.id, -old.amount),
                    |_| Compensation::AccountIncrement {
                        account_id: old_account.id,
                        delta: old.amount,
                    },
                )
                .await?;
            let new_balance = saga
                .step(
                    "apply new account",
                    self.stores.accounts.increment(new_account.id, new_amount),
                    |_| Compensation::AccountIncrement {
                        account_id: new_account.id,
                        delta: -new_amount,
                    },
                )
                .await?;

            updated.account_id = new_account.id;
            updated.amount = new_amount;
            updated.balance_after = new_balance;
            touched.push((old_account, old_balance));
            touched.push((new_account, new_balance));
        }

        saga.final_step("update transaction", self.stores.ledger.update(&updated))
            .await?;
        saga.commit();

        let mut accounts = Vec::with_capacity(touched.len());
        for (account, balance) in touched {
            accounts.push(self.fresh_account(account, balance).await);
        }

        Ok(EditResult {
            transaction: self.stored_or(updated).await,
            accounts,
        })
    }

    /// Delete a manual entry and reverse its effect on the balance. Records
    /// created by a transfer, sale or payment are removed through their own
    /// void operation instead.
    #[instrument(skip(self))]
    pub async fn delete_transaction(&self, id: TransactionId) -> Result<DeleteResult, AppError> {
        let mut saga = Saga::new("delete_transaction", &self.stores);

        let transaction = self.get_transaction(id).await?;
        if !transaction.is_manual() {
            return Err(AppError::NotEditable {
                id: id.to_string(),
                reason: format!(
                    "{} records are removed by voiding what created them",
                    transaction.link.as_str()
                ),
            });
        }
        let account = self.stores.accounts.read(transaction.account_id).await?;

        let balance = saga
            .step(
                "reverse balance",
                self.stores
                    .accounts
                    .increment(account.id, -transaction.amount),
                |_| Compensation::AccountIncrement {
                    account_id: account.id,
                    delta: transaction.amount,
                },
            )
            .await?;
        saga.final_step("remove transaction", self.stores.ledger.remove(id))
            .await?;
        saga.commit();

        Ok(DeleteResult {
            removed: transaction,
            account: self.fresh_account(account, balance).await,
        })
    }

    // ========================
    // Reconciliation
    // ========================

    /// Recompute every balance from the ledgers and report anything that
    /// does not add up.
    #[instrument(skip(self))]
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let accounts = self.stores.accounts.list().await?;
        let account_sums = self.stores.ledger.sums_by_account().await?;
        let counterparties = self.stores.counterparties.list().await?;
        let counterparty_sums = self.stores.counterparties.sums_by_counterparty().await?;

        let transfer_legs = self
            .query_transactions(
                TransactionFilter::default().with_kinds(vec![TxKind::TransferOut, TxKind::TransferIn]),
            )
            .collect_all()
            .await?;

        let sale_payments = self
            .query_transactions(TransactionFilter::default().with_kinds(vec![TxKind::SalePayment]))
            .collect_all()
            .await?;
        let mut known_sales: HashMap<SaleId, bool> = HashMap::new();
        let mut orphan_sale_payments = Vec::new();
        for payment in &sale_payments {
            let TxLink::SalePayment { sale_id } = payment.link else {
                continue;
            };
            let exists = match known_sales.get(&sale_id) {
                Some(exists) => *exists,
                None => {
                    let exists = self.stores.sales.get_sale(sale_id).await?.is_some();
                    known_sales.insert(sale_id, exists);
                    exists
                }
            };
            if !exists {
                orphan_sale_payments.push((payment.id, sale_id));
            }
        }

        let transaction_count = self.stores.ledger.count().await?;

        let report = build_integrity_report(IntegrityInputs {
            accounts: &accounts,
            account_sums: &account_sums,
            counterparties: &counterparties,
            counterparty_sums: &counterparty_sums,
            transfer_legs: &transfer_legs,
            orphan_sale_payments: &orphan_sale_payments,
            transaction_count,
        });

        if report.is_healthy() {
            info!(transactions = transaction_count, "integrity check passed");
        } else {
            warn!(issues = report.issues.len(), "integrity check found issues");
        }
        Ok(report)
    }
}

// ========================
// Validation helpers
// ========================

pub(super) fn require_positive(amount: Cents) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::validation("Amount must be positive"));
    }
    Ok(())
}

/// Check that adding `delta` to `account` is allowed.
///
/// Ordinary accounts cannot go below zero. Credit cards cannot grow their
/// debt past the limit unless `override_limit` is set.
pub(super) fn ensure_can_apply(
    account: &Account,
    delta: Cents,
    override_limit: bool,
) -> Result<(), AppError> {
    if account.is_credit_card() {
        if delta <= 0 || override_limit {
            return Ok(());
        }
        let available = account.available_credit().unwrap_or(0).max(0);
        if delta > available {
            return Err(AppError::CreditLimitExceeded {
                account_name: account.name.clone(),
                available,
                required: delta,
            });
        }
        return Ok(());
    }

    if delta < 0 && account.current_balance + delta < 0 {
        return Err(AppError::InsufficientFunds {
            account_name: account.name.clone(),
            balance: account.current_balance,
            required: -delta,
        });
    }
    Ok(())
}

/// Use the caller's description unless it is missing or blank.
pub(super) fn description_or(
    description: Option<String>,
    fallback: impl FnOnce() -> String,
) -> String {
    match description {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => fallback(),
    }
}

/// Total quantity per stocked product across sale lines.
pub(super) fn quantities_by_product(lines: &[SaleLine]) -> Vec<(ProductId, i64)> {
    let mut order = Vec::new();
    let mut totals: HashMap<ProductId, i64> = HashMap::new();
    for line in lines {
        if let Some(product_id) = line.product_id {
            if !totals.contains_key(&product_id) {
                order.push(product_id);
            }
            let total = totals.entry(product_id).or_insert(0);
            *total = total.saturating_add(line.quantity);
        }
    }
    order
        .into_iter()
        .map(|id| (id, totals.get(&id).copied().unwrap_or(0)))
        .collect()
}

pub(super) fn customer_only(party: &Counterparty) -> Result<(), AppError> {
    if party.kind != CounterpartyKind::Customer {
        return Err(AppError::validation(format!(
            "{} is a {}, not a customer",
            party.name, party.kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinary_account_cannot_go_negative() {
        let cash = Account::new("Cash".into(), AccountType::Cash, "EUR".into())
            .with_initial_balance(10000);
        assert!(ensure_can_apply(&cash, -10000, false).is_ok());
        let err = ensure_can_apply(&cash, -10001, false).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { required: 10001, .. }));
        // Override only applies to credit limits.
        assert!(ensure_can_apply(&cash, -10001, true).is_err());
    }

    #[test]
    fn test_card_limit_needs_override() {
        let card = Account::new("Visa".into(), AccountType::CreditCard, "EUR".into())
            .with_initial_balance(20000)
            .with_credit_limit(50000);
        assert!(ensure_can_apply(&card, 30000, false).is_ok());

        let err = ensure_can_apply(&card, 30001, false).unwrap_err();
        assert!(err.requires_override());
        assert!(ensure_can_apply(&card, 30001, true).is_ok());

        // Paying a card down is always allowed.
        assert!(ensure_can_apply(&card, -90000, false).is_ok());
    }

    #[test]
    fn test_blank_description_falls_back() {
        assert_eq!(description_or(Some("  ".into()), || "Expense".into()), "Expense");
        assert_eq!(description_or(Some(" Rent ".into()), || "Expense".into()), "Rent");
        assert_eq!(description_or(None, || "Income".into()), "Income");
    }

    #[test]
    fn test_quantities_are_summed_per_product() {
        let screen = Uuid::new_v4();
        let cable = Uuid::new_v4();
        let lines = vec![
            SaleLine::product(screen, "Screen", 1, 5000),
            SaleLine::free("Labor", 1, 2000),
            SaleLine::product(cable, "Cable", 2, 300),
            SaleLine::product(screen, "Screen", 2, 5000),
        ];
        assert_eq!(quantities_by_product(&lines), vec![(screen, 3), (cable, 2)]);
    }
}
