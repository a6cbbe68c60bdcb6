use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;

use crate::domain::{AccountId, Cents, LedgerTransaction, SaleId, TransactionId, TxKind, TxLink};

use super::repository::{parse_id, parse_optional_id, parse_timestamp};
use super::{Repository, StoreError, StoreResult, TransactionFilter, TransactionLedger};

const LEDGER_COLUMNS: &str = "id, sequence, date, recorded_at, account_id, kind, amount, balance_after, description, link_type, category_id, pair_id, sale_id, service_id, counterparty_tx_id";

/// Flattened link columns: (link_type, category, pair, sale, service, counterparty tx).
type LinkColumns = (
    &'static str,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn link_columns(link: &TxLink) -> LinkColumns {
    let id = |u: &uuid::Uuid| Some(u.to_string());
    match link {
        TxLink::ManualEntry { category_id } => (
            link.as_str(),
            category_id.as_ref().and_then(id),
            None,
            None,
            None,
            None,
        ),
        TxLink::TransferLeg { pair_id } => (link.as_str(), None, id(pair_id), None, None, None),
        TxLink::SalePayment { sale_id } => (link.as_str(), None, None, id(sale_id), None, None),
        TxLink::ServicePayment {
            service_id,
            counterparty_tx_id,
        } => (
            link.as_str(),
            None,
            None,
            None,
            id(service_id),
            id(counterparty_tx_id),
        ),
        TxLink::CustomerPayment { counterparty_tx_id }
        | TxLink::SupplierPayment { counterparty_tx_id } => (
            link.as_str(),
            None,
            None,
            None,
            None,
            id(counterparty_tx_id),
        ),
    }
}

fn required(value: Option<uuid::Uuid>, column: &str, link_type: &str) -> Result<uuid::Uuid> {
    value.ok_or_else(|| anyhow::anyhow!("{} link is missing {}", link_type, column))
}

fn row_to_link(row: &sqlx::sqlite::SqliteRow) -> Result<TxLink> {
    let link_type: String = row.get("link_type");
    let category_id = parse_optional_id(row.get("category_id"), "category ID")?;
    let pair_id = parse_optional_id(row.get("pair_id"), "pair ID")?;
    let sale_id = parse_optional_id(row.get("sale_id"), "sale ID")?;
    let service_id = parse_optional_id(row.get("service_id"), "service ID")?;
    let counterparty_tx_id =
        parse_optional_id(row.get("counterparty_tx_id"), "counter-party transaction ID")?;

    let link = match link_type.as_str() {
        "manual_entry" => TxLink::ManualEntry { category_id },
        "transfer_leg" => TxLink::TransferLeg {
            pair_id: required(pair_id, "pair_id", &link_type)?,
        },
        "sale_payment" => TxLink::SalePayment {
            sale_id: required(sale_id, "sale_id", &link_type)?,
        },
        "service_payment" => TxLink::ServicePayment {
            service_id: required(service_id, "service_id", &link_type)?,
            counterparty_tx_id: required(counterparty_tx_id, "counterparty_tx_id", &link_type)?,
        },
        "customer_payment" => TxLink::CustomerPayment {
            counterparty_tx_id: required(counterparty_tx_id, "counterparty_tx_id", &link_type)?,
        },
        "supplier_payment" => TxLink::SupplierPayment {
            counterparty_tx_id: required(counterparty_tx_id, "counterparty_tx_id", &link_type)?,
        },
        other => anyhow::bail!("Invalid link type: {}", other),
    };
    Ok(link)
}

impl Repository {
    /// Get the next ledger sequence number and increment the counter.
    async fn next_ledger_sequence(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'ledger_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerTransaction> {
        let kind_str: String = row.get("kind");

        Ok(LedgerTransaction {
            id: parse_id(row.get("id"), "transaction ID")?,
            sequence: row.get("sequence"),
            date: parse_timestamp(row.get("date"), "date")?,
            recorded_at: parse_timestamp(row.get("recorded_at"), "recorded_at")?,
            account_id: parse_id(row.get("account_id"), "account ID")?,
            kind: TxKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            amount: row.get("amount"),
            balance_after: row.get("balance_after"),
            description: row.get("description"),
            link: row_to_link(row)?,
        })
    }

    async fn delete_transaction_row(&self, id: TransactionId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM ledger_transactions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to remove transaction")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Transaction", id));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionLedger for Repository {
    async fn append(&self, tx: &LedgerTransaction) -> StoreResult<TransactionId> {
        tx.validate().map_err(StoreError::Validation)?;

        let sequence = self.next_ledger_sequence().await?;
        let (link_type, category_id, pair_id, sale_id, service_id, counterparty_tx_id) =
            link_columns(&tx.link);

        sqlx::query(
            r#"
            INSERT INTO ledger_transactions (id, sequence, date, recorded_at, account_id, kind, amount, balance_after, description, link_type, category_id, pair_id, sale_id, service_id, counterparty_tx_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(sequence)
        .bind(tx.date.to_rfc3339())
        .bind(tx.recorded_at.to_rfc3339())
        .bind(tx.account_id.to_string())
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(tx.balance_after)
        .bind(&tx.description)
        .bind(link_type)
        .bind(category_id)
        .bind(pair_id)
        .bind(sale_id)
        .bind(service_id)
        .bind(counterparty_tx_id)
        .execute(&self.pool)
        .await
        .context("Failed to append transaction")?;

        Ok(tx.id)
    }

    async fn get(&self, id: TransactionId) -> StoreResult<Option<LedgerTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ledger_transactions WHERE id = ?",
            LEDGER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        Ok(row.as_ref().map(Self::row_to_transaction).transpose()?)
    }

    async fn query_page(
        &self,
        filter: &TransactionFilter,
        after: i64,
        limit: u32,
    ) -> StoreResult<Vec<LedgerTransaction>> {
        let mut query = format!(
            "SELECT {} FROM ledger_transactions WHERE sequence > ?",
            LEDGER_COLUMNS
        );

        // Collect all string bindings first so they live long enough
        let account_str = filter.account_id.map(|id| id.to_string());
        let from_str = filter.from_date.map(|dt| dt.to_rfc3339());
        let to_str = filter.to_date.map(|dt| dt.to_rfc3339());

        if account_str.is_some() {
            query.push_str(" AND account_id = ?");
        }
        if from_str.is_some() {
            query.push_str(" AND date >= ?");
        }
        if to_str.is_some() {
            query.push_str(" AND date <= ?");
        }
        if !filter.kinds.is_empty() {
            let placeholders = vec!["?"; filter.kinds.len()].join(", ");
            query.push_str(&format!(" AND kind IN ({})", placeholders));
        }
        query.push_str(" ORDER BY sequence LIMIT ?");

        let mut sql_query = sqlx::query(&query).bind(after);
        if let Some(ref account) = account_str {
            sql_query = sql_query.bind(account);
        }
        if let Some(ref from) = from_str {
            sql_query = sql_query.bind(from);
        }
        if let Some(ref to) = to_str {
            sql_query = sql_query.bind(to);
        }
        for kind in &filter.kinds {
            sql_query = sql_query.bind(kind.as_str());
        }
        sql_query = sql_query.bind(limit as i64);

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to query transactions")?;

        Ok(rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn find_by_sale(&self, sale_id: SaleId) -> StoreResult<Vec<LedgerTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_transactions WHERE sale_id = ? ORDER BY sequence",
            LEDGER_COLUMNS
        ))
        .bind(sale_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to find transactions for sale")?;

        Ok(rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn update(&self, tx: &LedgerTransaction) -> StoreResult<()> {
        tx.validate().map_err(StoreError::Validation)?;

        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET account_id = ?, amount = ?, balance_after = ?, description = ?
            WHERE id = ?
            "#,
        )
        .bind(tx.account_id.to_string())
        .bind(tx.amount)
        .bind(tx.balance_after)
        .bind(&tx.description)
        .bind(tx.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update transaction")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Transaction", tx.id));
        }
        Ok(())
    }

    async fn remove(&self, id: TransactionId) -> StoreResult<()> {
        let tx = TransactionLedger::get(self, id)
            .await?
            .ok_or_else(|| StoreError::not_found("Transaction", id))?;
        if !tx.is_manual() {
            return Err(StoreError::Linked(id.to_string()));
        }
        self.delete_transaction_row(id).await
    }

    async fn remove_linked(&self, id: TransactionId) -> StoreResult<()> {
        self.delete_transaction_row(id).await
    }

    async fn sums_by_account(&self) -> StoreResult<HashMap<AccountId, Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, SUM(amount) as total
            FROM ledger_transactions
            GROUP BY account_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to sum transactions by account")?;

        let mut sums = HashMap::new();
        for row in rows {
            let id = parse_id(row.get("account_id"), "account ID")?;
            sums.insert(id, row.get::<i64, _>("total"));
        }
        Ok(sums)
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM ledger_transactions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?
            .get("count");
        Ok(count as usize)
    }
}
