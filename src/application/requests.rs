use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    Account, AccountId, AccountType, CategoryId, Cents, Counterparty, CounterpartyId,
    CounterpartyTransaction, LedgerTransaction, SaleId, SaleLine, SaleRecord, ServiceId,
};

// ========================
// Requests
// ========================

/// A manual income or expense. `amount` is the unsigned size of the movement.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub account_id: AccountId,
    pub amount: Cents,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub override_limit: bool,
}

impl EntryRequest {
    pub fn new(account_id: AccountId, amount: Cents, date: DateTime<Utc>) -> Self {
        Self {
            account_id,
            amount,
            date,
            description: None,
            category_id: None,
            override_limit: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn override_limit(mut self) -> Self {
        self.override_limit = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: Cents,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub override_limit: bool,
}

impl TransferRequest {
    pub fn new(
        from_account: AccountId,
        to_account: AccountId,
        amount: Cents,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            from_account,
            to_account,
            amount,
            date,
            description: None,
            override_limit: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Where the money for a sale goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleTender {
    Account(AccountId),
    /// The account flagged as default for this type.
    DefaultOf(AccountType),
    /// Charged to a customer's running balance.
    OnCredit(CounterpartyId),
}

#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub date: DateTime<Utc>,
    pub lines: Vec<SaleLine>,
    pub discount: Cents,
    pub tender: SaleTender,
    pub description: Option<String>,
    /// Rate for the customer's secondary currency; on-credit sales only.
    pub exchange_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub service_id: ServiceId,
    pub customer_id: CounterpartyId,
    pub parts: Vec<SaleLine>,
    pub labor: Cents,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub exchange_rate: Option<f64>,
}

/// Money received from a customer or paid to a supplier.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub counterparty_id: CounterpartyId,
    pub account_id: AccountId,
    pub amount: Cents,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    /// Ties a customer payment to a service ticket.
    pub service_id: Option<ServiceId>,
    pub exchange_rate: Option<f64>,
    pub override_limit: bool,
}

impl PaymentRequest {
    pub fn new(
        counterparty_id: CounterpartyId,
        account_id: AccountId,
        amount: Cents,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            counterparty_id,
            account_id,
            amount,
            date,
            description: None,
            service_id: None,
            exchange_rate: None,
            override_limit: false,
        }
    }

    pub fn for_service(mut self, service_id: ServiceId) -> Self {
        self.service_id = Some(service_id);
        self
    }
}

/// A debt booked against a counter-party with no money moving yet.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub counterparty_id: CounterpartyId,
    pub amount: Cents,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub exchange_rate: Option<f64>,
}

/// Fields to change on a stored transaction; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TransactionEdit {
    pub amount: Option<Cents>,
    pub account_id: Option<AccountId>,
    pub description: Option<String>,
    pub override_limit: bool,
}

impl TransactionEdit {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.account_id.is_none() && self.description.is_none()
    }
}

// ========================
// Results
// ========================

#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    pub transaction: LedgerTransaction,
    pub account: Account,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub out_leg: LedgerTransaction,
    pub in_leg: LedgerTransaction,
    pub from_account: Account,
    pub to_account: Account,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleResult {
    pub sale_id: SaleId,
    pub net_total: Cents,
    pub transaction: Option<LedgerTransaction>,
    pub account: Option<Account>,
    pub charge: Option<CounterpartyTransaction>,
    pub customer: Option<Counterparty>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceResult {
    pub sale_id: SaleId,
    pub total_cost: Cents,
    pub paid_before: Cents,
    pub remaining_due: Cents,
    pub charge: CounterpartyTransaction,
    pub customer: Counterparty,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    pub counterparty_tx: CounterpartyTransaction,
    pub counterparty: Counterparty,
    pub transaction: LedgerTransaction,
    pub account: Account,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChargeResult {
    pub counterparty_tx: CounterpartyTransaction,
    pub counterparty: Counterparty,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditResult {
    pub transaction: LedgerTransaction,
    /// Every account whose balance the edit touched.
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub removed: LedgerTransaction,
    pub account: Account,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoidTransferResult {
    pub removed: Vec<LedgerTransaction>,
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoidSaleResult {
    pub sale: SaleRecord,
    pub removed_transactions: Vec<LedgerTransaction>,
    pub removed_charges: Vec<CounterpartyTransaction>,
    pub accounts: Vec<Account>,
    pub customer: Option<Counterparty>,
}
