use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Account, AccountId, AccountType, Cents};

use super::{AccountStore, MIGRATION_001_INITIAL, StoreError, StoreResult};

const ACCOUNT_COLUMNS: &str = "id, name, account_type, currency, initial_balance, current_balance, credit_limit, is_default, created_at";

/// SQLite-backed implementation of every store the engine talks to.
///
/// Balance changes are issued as single `UPDATE ... RETURNING` statements so
/// concurrent settlements racing on one row never lose an update.
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        debug!("schema migrated");
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Account catalog
    // ========================

    /// Insert a new account. A default account replaces the previous
    /// default of the same type; a duplicate name is refused by the schema.
    pub async fn save_account(&self, account: &Account) -> StoreResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (id, name, account_type, currency, initial_balance, current_balance, credit_limit, is_default, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(&account.currency)
        .bind(account.initial_balance)
        .bind(account.current_balance)
        .bind(account.credit_limit)
        .bind(account.is_default)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;
        if matches!(&inserted, Err(err) if is_unique_violation(err)) {
            return Err(StoreError::Validation(format!(
                "account '{}' already exists",
                account.name
            )));
        }
        inserted.context("Failed to save account")?;

        // The new row is in place before older defaults are cleared; if the
        // clear fails, `default_for` still prefers the newest default.
        if account.is_default {
            sqlx::query("UPDATE accounts SET is_default = 0 WHERE account_type = ? AND id != ?")
                .bind(account.account_type.as_str())
                .bind(account.id.to_string())
                .execute(&self.pool)
                .await
                .context("Failed to clear previous default account")?;
        }
        Ok(())
    }

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
        let type_str: String = row.get("account_type");

        Ok(Account {
            id: parse_id(row.get("id"), "account ID")?,
            name: row.get("name"),
            account_type: AccountType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account type: {}", type_str))?,
            currency: row.get("currency"),
            initial_balance: row.get("initial_balance"),
            current_balance: row.get("current_balance"),
            credit_limit: row.get("credit_limit"),
            is_default: row.get::<i64, _>("is_default") != 0,
            created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        })
    }
}

#[async_trait]
impl AccountStore for Repository {
    async fn increment(&self, id: AccountId, delta: Cents) -> StoreResult<Cents> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET current_balance = current_balance + ?
            WHERE id = ?
            RETURNING current_balance
            "#,
        )
        .bind(delta)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to increment account balance")?;

        match row {
            Some(row) => Ok(row.get("current_balance")),
            None => Err(StoreError::not_found("Account", id)),
        }
    }

    async fn read(&self, id: AccountId) -> StoreResult<Account> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        match row {
            Some(row) => Ok(Self::row_to_account(&row)?),
            None => Err(StoreError::not_found("Account", id)),
        }
    }

    async fn list(&self) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY account_type, name",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        Ok(rows
            .iter()
            .map(Self::row_to_account)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn default_for(&self, account_type: AccountType) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_type = ? AND is_default = 1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch default account")?;

        Ok(row.as_ref().map(Self::row_to_account).transpose()?)
    }
}

/// SQLite refused a duplicate in a UNIQUE column.
pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

pub(super) fn parse_id(value: String, what: &str) -> Result<Uuid> {
    Uuid::parse_str(&value).with_context(|| format!("Invalid {}", what))
}

pub(super) fn parse_optional_id(value: Option<String>, what: &str) -> Result<Option<Uuid>> {
    value.map(|v| parse_id(v, what)).transpose()
}

pub(super) fn parse_timestamp(value: String, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&value)
        .with_context(|| format!("Invalid {} timestamp", what))?
        .with_timezone(&Utc))
}
