use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;

use crate::domain::{
    Cents, Counterparty, CounterpartyId, CounterpartyKind, CounterpartySums,
    CounterpartyTransaction, CounterpartyTxId, CounterpartyTxKind, ServiceId,
};

use super::repository::{parse_id, parse_optional_id, parse_timestamp};
use super::{CounterpartyLedger, Repository, StoreError, StoreResult};

const PARTY_COLUMNS: &str =
    "id, name, kind, balance, secondary_currency, secondary_balance, created_at";

const PARTY_TX_COLUMNS: &str = "id, sequence, counterparty_id, kind, amount, secondary_amount, exchange_rate, balance_after, date, recorded_at, description, related_sale_id, related_service_id";

impl Repository {
    /// Save a new counter-party (customer, supplier or wholesaler).
    pub async fn save_counterparty(&self, party: &Counterparty) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO counterparties (id, name, kind, balance, secondary_currency, secondary_balance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(party.id.to_string())
        .bind(&party.name)
        .bind(party.kind.as_str())
        .bind(party.balance)
        .bind(&party.secondary_currency)
        .bind(party.secondary_balance)
        .bind(party.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save counter-party")?;
        Ok(())
    }

    async fn next_counterparty_sequence(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'counterparty_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get next counter-party sequence number")?;

        Ok(row.get("value"))
    }

    fn row_to_counterparty(row: &sqlx::sqlite::SqliteRow) -> Result<Counterparty> {
        let kind_str: String = row.get("kind");

        Ok(Counterparty {
            id: parse_id(row.get("id"), "counter-party ID")?,
            name: row.get("name"),
            kind: CounterpartyKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid counter-party kind: {}", kind_str))?,
            balance: row.get("balance"),
            secondary_currency: row.get("secondary_currency"),
            secondary_balance: row.get("secondary_balance"),
            created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        })
    }

    fn row_to_counterparty_tx(row: &sqlx::sqlite::SqliteRow) -> Result<CounterpartyTransaction> {
        let kind_str: String = row.get("kind");

        Ok(CounterpartyTransaction {
            id: parse_id(row.get("id"), "counter-party transaction ID")?,
            sequence: row.get("sequence"),
            counterparty_id: parse_id(row.get("counterparty_id"), "counter-party ID")?,
            kind: CounterpartyTxKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid counter-party entry kind: {}", kind_str))?,
            amount: row.get("amount"),
            secondary_amount: row.get("secondary_amount"),
            exchange_rate: row.get("exchange_rate"),
            balance_after: row.get("balance_after"),
            date: parse_timestamp(row.get("date"), "date")?,
            recorded_at: parse_timestamp(row.get("recorded_at"), "recorded_at")?,
            description: row.get("description"),
            related_sale_id: parse_optional_id(row.get("related_sale_id"), "sale ID")?,
            related_service_id: parse_optional_id(row.get("related_service_id"), "service ID")?,
        })
    }
}

#[async_trait]
impl CounterpartyLedger for Repository {
    async fn read(&self, id: CounterpartyId) -> StoreResult<Counterparty> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM counterparties WHERE id = ?",
            PARTY_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch counter-party")?;

        match row {
            Some(row) => Ok(Self::row_to_counterparty(&row)?),
            None => Err(StoreError::not_found("Counter-party", id)),
        }
    }

    async fn list(&self) -> StoreResult<Vec<Counterparty>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM counterparties ORDER BY kind, name",
            PARTY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list counter-parties")?;

        Ok(rows
            .iter()
            .map(Self::row_to_counterparty)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn increment(
        &self,
        id: CounterpartyId,
        delta: Cents,
        secondary_delta: Cents,
    ) -> StoreResult<Cents> {
        let row = sqlx::query(
            r#"
            UPDATE counterparties
            SET balance = balance + ?, secondary_balance = secondary_balance + ?
            WHERE id = ?
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(secondary_delta)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to increment counter-party balance")?;

        match row {
            Some(row) => Ok(row.get("balance")),
            None => Err(StoreError::not_found("Counter-party", id)),
        }
    }

    async fn append(&self, tx: &CounterpartyTransaction) -> StoreResult<CounterpartyTxId> {
        tx.validate().map_err(StoreError::Validation)?;

        let sequence = self.next_counterparty_sequence().await?;

        sqlx::query(
            r#"
            INSERT INTO counterparty_transactions (id, sequence, counterparty_id, kind, amount, secondary_amount, exchange_rate, balance_after, date, recorded_at, description, related_sale_id, related_service_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(sequence)
        .bind(tx.counterparty_id.to_string())
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(tx.secondary_amount)
        .bind(tx.exchange_rate)
        .bind(tx.balance_after)
        .bind(tx.date.to_rfc3339())
        .bind(tx.recorded_at.to_rfc3339())
        .bind(&tx.description)
        .bind(tx.related_sale_id.map(|id| id.to_string()))
        .bind(tx.related_service_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await
        .context("Failed to append counter-party transaction")?;

        Ok(tx.id)
    }

    async fn set_balance_after(&self, id: CounterpartyTxId, balance: Cents) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE counterparty_transactions SET balance_after = ? WHERE id = ?")
                .bind(balance)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .context("Failed to stamp counter-party balance")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Counter-party transaction", id));
        }
        Ok(())
    }

    async fn get(&self, id: CounterpartyTxId) -> StoreResult<Option<CounterpartyTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM counterparty_transactions WHERE id = ?",
            PARTY_TX_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch counter-party transaction")?;

        Ok(row.as_ref().map(Self::row_to_counterparty_tx).transpose()?)
    }

    async fn remove(&self, id: CounterpartyTxId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM counterparty_transactions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to remove counter-party transaction")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Counter-party transaction", id));
        }
        Ok(())
    }

    async fn list_transactions(
        &self,
        id: CounterpartyId,
    ) -> StoreResult<Vec<CounterpartyTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM counterparty_transactions WHERE counterparty_id = ? ORDER BY sequence",
            PARTY_TX_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list counter-party transactions")?;

        Ok(rows
            .iter()
            .map(Self::row_to_counterparty_tx)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn paid_for_service(&self, service_id: ServiceId) -> StoreResult<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(-amount), 0) as paid
            FROM counterparty_transactions
            WHERE related_service_id = ? AND kind = 'payment'
            "#,
        )
        .bind(service_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum service payments")?;

        Ok(row.get("paid"))
    }

    async fn sums_by_counterparty(&self) -> StoreResult<HashMap<CounterpartyId, CounterpartySums>> {
        let rows = sqlx::query(
            r#"
            SELECT counterparty_id, SUM(amount) as total, COALESCE(SUM(secondary_amount), 0) as secondary_total
            FROM counterparty_transactions
            GROUP BY counterparty_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to sum counter-party transactions")?;

        let mut sums = HashMap::new();
        for row in rows {
            let id = parse_id(row.get("counterparty_id"), "counter-party ID")?;
            sums.insert(
                id,
                CounterpartySums {
                    amount: row.get("total"),
                    secondary: row.get("secondary_total"),
                },
            );
        }
        Ok(sums)
    }
}
