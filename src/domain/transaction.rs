use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, CounterpartyTxId, SaleId, ServiceId};

pub type TransactionId = Uuid;
pub type CategoryId = Uuid;

/// Which way money moves relative to the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inflow,
    Outflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Income,
    Expense,
    TransferIn,
    TransferOut,
    SalePayment,
    ServiceIncome,
    CustomerPayment,
    SupplierPayment,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Income => "income",
            TxKind::Expense => "expense",
            TxKind::TransferIn => "transfer_in",
            TxKind::TransferOut => "transfer_out",
            TxKind::SalePayment => "sale_payment",
            TxKind::ServiceIncome => "service_income",
            TxKind::CustomerPayment => "customer_payment",
            TxKind::SupplierPayment => "supplier_payment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "income" => Some(TxKind::Income),
            "expense" => Some(TxKind::Expense),
            "transfer_in" => Some(TxKind::TransferIn),
            "transfer_out" => Some(TxKind::TransferOut),
            "sale_payment" => Some(TxKind::SalePayment),
            "service_income" => Some(TxKind::ServiceIncome),
            "customer_payment" => Some(TxKind::CustomerPayment),
            "supplier_payment" => Some(TxKind::SupplierPayment),
            _ => None,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            TxKind::Income
            | TxKind::TransferIn
            | TxKind::SalePayment
            | TxKind::ServiceIncome
            | TxKind::CustomerPayment => Direction::Inflow,
            TxKind::Expense | TxKind::TransferOut | TxKind::SupplierPayment => Direction::Outflow,
        }
    }

    /// Human-readable name, used as the description of last resort.
    pub fn label(&self) -> &'static str {
        match self {
            TxKind::Income => "Income",
            TxKind::Expense => "Expense",
            TxKind::TransferIn => "Transfer in",
            TxKind::TransferOut => "Transfer out",
            TxKind::SalePayment => "Sale",
            TxKind::ServiceIncome => "Service payment",
            TxKind::CustomerPayment => "Customer payment",
            TxKind::SupplierPayment => "Supplier payment",
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The business event a ledger transaction belongs to. Each variant carries
/// exactly the references that event needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxLink {
    ManualEntry {
        category_id: Option<CategoryId>,
    },
    TransferLeg {
        pair_id: TransactionId,
    },
    SalePayment {
        sale_id: SaleId,
    },
    ServicePayment {
        service_id: ServiceId,
        counterparty_tx_id: CounterpartyTxId,
    },
    CustomerPayment {
        counterparty_tx_id: CounterpartyTxId,
    },
    SupplierPayment {
        counterparty_tx_id: CounterpartyTxId,
    },
}

impl TxLink {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxLink::ManualEntry { .. } => "manual_entry",
            TxLink::TransferLeg { .. } => "transfer_leg",
            TxLink::SalePayment { .. } => "sale_payment",
            TxLink::ServicePayment { .. } => "service_payment",
            TxLink::CustomerPayment { .. } => "customer_payment",
            TxLink::SupplierPayment { .. } => "supplier_payment",
        }
    }

    /// Manual entries are the only records owned by nothing else.
    pub fn is_manual(&self) -> bool {
        matches!(self, TxLink::ManualEntry { .. })
    }

    pub fn accepts(&self, kind: TxKind) -> bool {
        match self {
            TxLink::ManualEntry { .. } => matches!(kind, TxKind::Income | TxKind::Expense),
            TxLink::TransferLeg { .. } => {
                matches!(kind, TxKind::TransferIn | TxKind::TransferOut)
            }
            TxLink::SalePayment { .. } => kind == TxKind::SalePayment,
            TxLink::ServicePayment { .. } => kind == TxKind::ServiceIncome,
            TxLink::CustomerPayment { .. } => kind == TxKind::CustomerPayment,
            TxLink::SupplierPayment { .. } => kind == TxKind::SupplierPayment,
        }
    }

    pub fn counterparty_tx_id(&self) -> Option<CounterpartyTxId> {
        match self {
            TxLink::ServicePayment {
                counterparty_tx_id, ..
            }
            | TxLink::CustomerPayment { counterparty_tx_id }
            | TxLink::SupplierPayment { counterparty_tx_id } => Some(*counterparty_tx_id),
            _ => None,
        }
    }
}

/// A signed balance change on one account.
///
/// `amount` is exactly the delta applied to the account's `current_balance`,
/// so for a credit card a charge is positive and a payment negative.
/// Records are immutable apart from the explicit edit path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    /// Assigned by the ledger on append
    pub sequence: i64,
    pub date: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub account_id: AccountId,
    pub kind: TxKind,
    pub amount: Cents,
    /// Account balance right after this record was applied
    pub balance_after: Cents,
    pub description: String,
    pub link: TxLink,
}

impl LedgerTransaction {
    pub fn new(
        account_id: AccountId,
        kind: TxKind,
        amount: Cents,
        date: DateTime<Utc>,
        link: TxLink,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            date,
            recorded_at: Utc::now(),
            account_id,
            kind,
            amount,
            balance_after: 0,
            description: String::new(),
            link,
        }
    }

    pub fn with_id(mut self, id: TransactionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_balance_after(mut self, balance_after: Cents) -> Self {
        self.balance_after = balance_after;
        self
    }

    /// Unsigned size of the movement.
    pub fn magnitude(&self) -> Cents {
        self.amount.abs()
    }

    pub fn is_manual(&self) -> bool {
        self.link.is_manual()
    }

    pub fn transfer_pair(&self) -> Option<TransactionId> {
        match self.link {
            TxLink::TransferLeg { pair_id } => Some(pair_id),
            _ => None,
        }
    }

    /// Checks the fields every appended record must carry.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description is required".into());
        }
        if self.amount == 0 {
            return Err("amount must be non-zero".into());
        }
        if !self.link.accepts(self.kind) {
            return Err(format!(
                "transaction kind '{}' cannot carry a '{}' link",
                self.kind,
                self.link.as_str()
            ));
        }
        if let TxLink::TransferLeg { pair_id } = self.link {
            if pair_id == self.id {
                return Err("a transfer leg cannot pair with itself".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(kind: TxKind, amount: Cents) -> LedgerTransaction {
        LedgerTransaction::new(
            Uuid::new_v4(),
            kind,
            amount,
            Utc::now(),
            TxLink::ManualEntry { category_id: None },
        )
        .with_description("Rent")
    }

    #[test]
    fn test_kind_roundtrip_and_direction() {
        for kind in [
            TxKind::Income,
            TxKind::Expense,
            TxKind::TransferIn,
            TxKind::TransferOut,
            TxKind::SalePayment,
            TxKind::ServiceIncome,
            TxKind::CustomerPayment,
            TxKind::SupplierPayment,
        ] {
            assert_eq!(TxKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TxKind::Expense.direction(), Direction::Outflow);
        assert_eq!(TxKind::SalePayment.direction(), Direction::Inflow);
    }

    #[test]
    fn test_validate_accepts_manual_expense() {
        assert!(manual(TxKind::Expense, -3000).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let blank = manual(TxKind::Expense, -3000).with_description("  ");
        assert!(blank.validate().is_err());

        let zero = manual(TxKind::Income, 0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_kind_link_mismatch() {
        let tx = manual(TxKind::SalePayment, 1000);
        let err = tx.validate().unwrap_err();
        assert!(err.contains("manual_entry"));
    }

    #[test]
    fn test_link_serializes_tagged() {
        let link = TxLink::SalePayment {
            sale_id: Uuid::nil(),
        };
        let json = serde_json::to_value(link).unwrap();
        assert_eq!(json["type"], "sale_payment");
        assert!(json.get("sale_id").is_some());
    }

    #[test]
    fn test_only_manual_entries_are_manual() {
        assert!(manual(TxKind::Income, 100).is_manual());
        let leg = LedgerTransaction::new(
            Uuid::new_v4(),
            TxKind::TransferOut,
            -100,
            Utc::now(),
            TxLink::TransferLeg {
                pair_id: Uuid::new_v4(),
            },
        );
        assert!(!leg.is_manual());
        assert!(leg.transfer_pair().is_some());
    }
}
