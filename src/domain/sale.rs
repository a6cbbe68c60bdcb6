use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CategoryId, Cents, CounterpartyId};

pub type ProductId = Uuid;
pub type SaleId = Uuid;
/// Service tickets live outside the ledger; only their id is carried here.
pub type ServiceId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub quantity: i64,
    /// Labour and other non-physical items carry no stock
    pub tracks_stock: bool,
}

impl Product {
    pub fn new(name: String, quantity: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            quantity,
            tracks_stock: true,
        }
    }

    pub fn untracked(name: String) -> Self {
        Self {
            tracks_stock: false,
            ..Self::new(name, 0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Cents,
}

impl SaleLine {
    pub fn product(product_id: ProductId, description: impl Into<String>, quantity: i64, unit_price: Cents) -> Self {
        Self {
            product_id: Some(product_id),
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// A line with no catalog product behind it (labour, ad-hoc fees).
    pub fn free(description: impl Into<String>, quantity: i64, unit_price: Cents) -> Self {
        Self {
            product_id: None,
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// `None` when quantity times price does not fit in the amount type.
    pub fn total(&self) -> Option<Cents> {
        self.quantity.checked_mul(self.unit_price)
    }
}

pub fn lines_total(lines: &[SaleLine]) -> Result<Cents, String> {
    lines.iter().enumerate().try_fold(0, |sum: Cents, (i, line)| {
        line.total()
            .and_then(|total| sum.checked_add(total))
            .ok_or_else(|| format!("line {}: amount is too large", i + 1))
    })
}

/// Checks line shape; stock availability is the catalog's concern.
pub fn validate_lines(lines: &[SaleLine]) -> Result<(), String> {
    for (i, line) in lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(format!("line {}: quantity must be positive", i + 1));
        }
        if line.unit_price < 0 {
            return Err(format!("line {}: unit price cannot be negative", i + 1));
        }
        if line.product_id.is_none() && line.description.trim().is_empty() {
            return Err(format!("line {}: description is required", i + 1));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSale {
    pub date: DateTime<Utc>,
    pub lines: Vec<SaleLine>,
    pub discount: Cents,
    pub net_total: Cents,
    pub customer_id: Option<CounterpartyId>,
    pub service_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: SaleId,
    pub date: DateTime<Utc>,
    pub lines: Vec<SaleLine>,
    pub discount: Cents,
    pub net_total: Cents,
    pub customer_id: Option<CounterpartyId>,
    pub service_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub id: CategoryId,
    pub name: String,
}

impl ExpenseCategory {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
        }
    }
}
