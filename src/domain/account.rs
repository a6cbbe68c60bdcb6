use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, Direction};

pub type AccountId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Till drawer and petty cash
    Cash,
    Bank,
    /// Card terminal settlement account
    Pos,
    /// Balance is outstanding debt, bounded by a credit limit
    CreditCard,
    Other,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Cash,
        AccountType::Bank,
        AccountType::Pos,
        AccountType::CreditCard,
        AccountType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Cash => "cash",
            AccountType::Bank => "bank",
            AccountType::Pos => "pos",
            AccountType::CreditCard => "credit_card",
            AccountType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cash" => Some(AccountType::Cash),
            "bank" => Some(AccountType::Bank),
            "pos" => Some(AccountType::Pos),
            "credit_card" | "card" => Some(AccountType::CreditCard),
            "other" => Some(AccountType::Other),
            _ => None,
        }
    }

    pub fn is_credit_card(&self) -> bool {
        matches!(self, AccountType::CreditCard)
    }

    /// Signed delta applied to `current_balance` when `magnitude` moves in
    /// `direction`. Credit-card balances are debt, so the sign is inverted:
    /// a charge (outflow) grows the debt and a payment (inflow) shrinks it.
    pub fn signed_amount(&self, direction: Direction, magnitude: Cents) -> Cents {
        let asset_sign = match direction {
            Direction::Inflow => magnitude,
            Direction::Outflow => -magnitude,
        };
        if self.is_credit_card() {
            -asset_sign
        } else {
            asset_sign
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub initial_balance: Cents,
    pub current_balance: Cents,
    /// Only meaningful for credit cards
    pub credit_limit: Option<Cents>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: String, account_type: AccountType, currency: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            account_type,
            currency,
            initial_balance: 0,
            current_balance: 0,
            credit_limit: None,
            is_default: false,
            created_at: Utc::now(),
        }
    }

    /// Opening balance; for a credit card this is the debt carried in.
    pub fn with_initial_balance(mut self, initial: Cents) -> Self {
        self.initial_balance = initial;
        self.current_balance = initial;
        self
    }

    pub fn with_credit_limit(mut self, limit: Cents) -> Self {
        self.credit_limit = Some(limit);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn is_credit_card(&self) -> bool {
        self.account_type.is_credit_card()
    }

    /// `credit_limit - current_balance` for credit cards, `None` otherwise.
    pub fn available_credit(&self) -> Option<Cents> {
        if !self.is_credit_card() {
            return None;
        }
        Some(self.credit_limit.unwrap_or(0) - self.current_balance)
    }

    /// Signed delta this account would receive for a movement.
    pub fn signed_amount(&self, direction: Direction, magnitude: Cents) -> Cents {
        self.account_type.signed_amount(direction, magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_roundtrip() {
        for at in AccountType::ALL {
            assert_eq!(AccountType::from_str(at.as_str()), Some(at));
        }
        assert_eq!(AccountType::from_str("credit-card"), Some(AccountType::CreditCard));
        assert_eq!(AccountType::from_str("wallet"), None);
    }

    #[test]
    fn test_asset_accounts_sign_like_money() {
        for at in [AccountType::Cash, AccountType::Bank, AccountType::Pos, AccountType::Other] {
            assert_eq!(at.signed_amount(Direction::Inflow, 500), 500);
            assert_eq!(at.signed_amount(Direction::Outflow, 500), -500);
        }
    }

    #[test]
    fn test_credit_card_sign_is_inverted() {
        let card = AccountType::CreditCard;
        assert_eq!(card.signed_amount(Direction::Outflow, 500), 500);
        assert_eq!(card.signed_amount(Direction::Inflow, 500), -500);
    }

    #[test]
    fn test_available_credit() {
        let card = Account::new("Visa".into(), AccountType::CreditCard, "EUR".into())
            .with_credit_limit(50000)
            .with_initial_balance(20000);
        assert_eq!(card.available_credit(), Some(30000));

        let cash = Account::new("Till".into(), AccountType::Cash, "EUR".into());
        assert_eq!(cash.available_credit(), None);
    }
}
