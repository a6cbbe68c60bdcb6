use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, SaleId, ServiceId, convert_at_rate};

pub type CounterpartyId = Uuid;
pub type CounterpartyTxId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyKind {
    Customer,
    Supplier,
    Wholesaler,
}

impl CounterpartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "customer",
            CounterpartyKind::Supplier => "supplier",
            CounterpartyKind::Wholesaler => "wholesaler",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(CounterpartyKind::Customer),
            "supplier" => Some(CounterpartyKind::Supplier),
            "wholesaler" => Some(CounterpartyKind::Wholesaler),
            _ => None,
        }
    }

    /// Customers owe the shop; the shop owes suppliers and wholesalers.
    pub fn owes_shop(&self) -> bool {
        matches!(self, CounterpartyKind::Customer)
    }
}

impl std::fmt::Display for CounterpartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An external party's running obligation.
///
/// For a customer `balance` is what they owe the shop; for a supplier or
/// wholesaler it is what the shop owes them. Either way a charge raises it
/// and a payment lowers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: CounterpartyId,
    pub name: String,
    pub kind: CounterpartyKind,
    pub balance: Cents,
    pub secondary_currency: Option<String>,
    pub secondary_balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Counterparty {
    pub fn new(name: String, kind: CounterpartyKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            balance: 0,
            secondary_currency: None,
            secondary_balance: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_secondary_currency(mut self, currency: impl Into<String>) -> Self {
        self.secondary_currency = Some(currency.into());
        self
    }

    pub fn tracks_secondary(&self) -> bool {
        self.secondary_currency.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyTxKind {
    Charge,
    Payment,
}

impl CounterpartyTxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartyTxKind::Charge => "charge",
            CounterpartyTxKind::Payment => "payment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "charge" => Some(CounterpartyTxKind::Charge),
            "payment" => Some(CounterpartyTxKind::Payment),
            _ => None,
        }
    }

    /// Charges grow the debt, payments shrink it.
    pub fn signed(&self, magnitude: Cents) -> Cents {
        match self {
            CounterpartyTxKind::Charge => magnitude,
            CounterpartyTxKind::Payment => -magnitude,
        }
    }
}

impl std::fmt::Display for CounterpartyTxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartyTransaction {
    pub id: CounterpartyTxId,
    pub sequence: i64,
    pub counterparty_id: CounterpartyId,
    pub kind: CounterpartyTxKind,
    /// Signed: charge positive, payment negative
    pub amount: Cents,
    pub secondary_amount: Option<Cents>,
    /// Rate in effect when the record was written
    pub exchange_rate: Option<f64>,
    pub balance_after: Cents,
    pub date: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub description: String,
    pub related_sale_id: Option<SaleId>,
    pub related_service_id: Option<ServiceId>,
}

impl CounterpartyTransaction {
    pub fn new(
        counterparty_id: CounterpartyId,
        kind: CounterpartyTxKind,
        magnitude: Cents,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            counterparty_id,
            kind,
            amount: kind.signed(magnitude),
            secondary_amount: None,
            exchange_rate: None,
            balance_after: 0,
            date,
            recorded_at: Utc::now(),
            description: String::new(),
            related_sale_id: None,
            related_service_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_sale(mut self, sale_id: SaleId) -> Self {
        self.related_sale_id = Some(sale_id);
        self
    }

    pub fn with_service(mut self, service_id: ServiceId) -> Self {
        self.related_service_id = Some(service_id);
        self
    }

    /// Captures the secondary-currency amount at `rate`.
    pub fn with_exchange_rate(mut self, rate: f64) -> Self {
        self.exchange_rate = Some(rate);
        self.secondary_amount = Some(convert_at_rate(self.amount, rate));
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description is required".into());
        }
        if self.amount == 0 {
            return Err("amount must be non-zero".into());
        }
        if self.kind.signed(self.amount.abs()) != self.amount {
            return Err(format!("{} amount has the wrong sign", self.kind));
        }
        if let Some(rate) = self.exchange_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err("exchange rate must be positive".into());
            }
        }
        Ok(())
    }
}
