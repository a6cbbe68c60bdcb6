use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{
    Account, CategoryId, Counterparty, ExpenseCategory, NewSale, Product, ProductId, SaleId,
    SaleLine, SaleRecord,
};

use super::repository::{is_unique_violation, parse_id, parse_optional_id, parse_timestamp};
use super::{Catalog, Directory, Repository, SaleRecords, StockCatalog, StoreError, StoreResult};

impl Repository {
    // ========================
    // Products
    // ========================

    pub async fn save_product(&self, product: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, name, quantity, tracks_stock) VALUES (?, ?, ?, ?)")
            .bind(product.id.to_string())
            .bind(&product.name)
            .bind(product.quantity)
            .bind(product.tracks_stock)
            .execute(&self.pool)
            .await
            .context("Failed to save product")?;
        Ok(())
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, quantity, tracks_stock FROM products WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch product")?;

        row.map(|row| -> Result<Product> {
            Ok(Product {
                id: parse_id(row.get("id"), "product ID")?,
                name: row.get("name"),
                quantity: row.get("quantity"),
                tracks_stock: row.get::<i64, _>("tracks_stock") != 0,
            })
        })
        .transpose()
    }

    // ========================
    // Expense categories
    // ========================

    pub async fn save_category(&self, category: &ExpenseCategory) -> StoreResult<()> {
        let inserted = sqlx::query("INSERT INTO expense_categories (id, name) VALUES (?, ?)")
            .bind(category.id.to_string())
            .bind(&category.name)
            .execute(&self.pool)
            .await;
        if matches!(&inserted, Err(err) if is_unique_violation(err)) {
            return Err(StoreError::Validation(format!(
                "expense category '{}' already exists",
                category.name
            )));
        }
        inserted.context("Failed to save expense category")?;
        Ok(())
    }

    fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Result<ExpenseCategory> {
        Ok(ExpenseCategory {
            id: parse_id(row.get("id"), "category ID")?,
            name: row.get("name"),
        })
    }

    fn row_to_sale(row: &sqlx::sqlite::SqliteRow) -> Result<SaleRecord> {
        let lines_json: String = row.get("lines");
        let lines: Vec<SaleLine> =
            serde_json::from_str(&lines_json).context("Invalid sale lines")?;

        Ok(SaleRecord {
            id: parse_id(row.get("id"), "sale ID")?,
            date: parse_timestamp(row.get("date"), "date")?,
            lines,
            discount: row.get("discount"),
            net_total: row.get("net_total"),
            customer_id: parse_optional_id(row.get("customer_id"), "customer ID")?,
            service_id: parse_optional_id(row.get("service_id"), "service ID")?,
            created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        })
    }
}

#[async_trait]
impl StockCatalog for Repository {
    async fn available(&self, product_id: ProductId) -> StoreResult<Option<i64>> {
        let product = self
            .get_product(product_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;
        Ok(product.tracks_stock.then_some(product.quantity))
    }

    async fn decrement(&self, product_id: ProductId, quantity: i64) -> StoreResult<i64> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity - ?
            WHERE id = ? AND tracks_stock = 1 AND quantity >= ?
            RETURNING quantity
            "#,
        )
        .bind(quantity)
        .bind(product_id.to_string())
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to decrement stock")?;

        if let Some(row) = row {
            return Ok(row.get("quantity"));
        }

        // Nothing updated: tell missing, untracked and short apart.
        let product = self
            .get_product(product_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;
        if !product.tracks_stock {
            return Ok(product.quantity);
        }
        Err(StoreError::InsufficientStock {
            product_id,
            available: product.quantity,
            requested: quantity,
        })
    }

    async fn increment(&self, product_id: ProductId, quantity: i64) -> StoreResult<i64> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity + ?
            WHERE id = ? AND tracks_stock = 1
            RETURNING quantity
            "#,
        )
        .bind(quantity)
        .bind(product_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to increment stock")?;

        match row {
            Some(row) => Ok(row.get("quantity")),
            None => {
                let product = self
                    .get_product(product_id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("Product", product_id))?;
                Ok(product.quantity)
            }
        }
    }
}

#[async_trait]
impl SaleRecords for Repository {
    async fn create_sale(&self, sale: &NewSale) -> StoreResult<SaleId> {
        let id = Uuid::new_v4();
        let lines_json = serde_json::to_string(&sale.lines).context("Failed to encode sale lines")?;

        sqlx::query(
            r#"
            INSERT INTO sales (id, date, lines, discount, net_total, customer_id, service_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(sale.date.to_rfc3339())
        .bind(&lines_json)
        .bind(sale.discount)
        .bind(sale.net_total)
        .bind(sale.customer_id.map(|id| id.to_string()))
        .bind(sale.service_id.map(|id| id.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to create sale")?;

        Ok(id)
    }

    async fn get_sale(&self, id: SaleId) -> StoreResult<Option<SaleRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, date, lines, discount, net_total, customer_id, service_id, created_at
            FROM sales
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch sale")?;

        Ok(row.as_ref().map(Self::row_to_sale).transpose()?)
    }

    async fn delete_sale(&self, id: SaleId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete sale")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Sale", id));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for Repository {
    async fn expense_category(&self, id: CategoryId) -> StoreResult<Option<ExpenseCategory>> {
        let row = sqlx::query("SELECT id, name FROM expense_categories WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch expense category")?;

        Ok(row.as_ref().map(Self::row_to_category).transpose()?)
    }

    async fn expense_category_by_name(&self, name: &str) -> StoreResult<Option<ExpenseCategory>> {
        let row = sqlx::query("SELECT id, name FROM expense_categories WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch expense category by name")?;

        Ok(row.as_ref().map(Self::row_to_category).transpose()?)
    }
}

#[async_trait]
impl Catalog for Repository {
    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        self.save_account(account).await
    }

    async fn create_counterparty(&self, party: &Counterparty) -> StoreResult<()> {
        Ok(self.save_counterparty(party).await?)
    }

    async fn create_product(&self, product: &Product) -> StoreResult<()> {
        Ok(self.save_product(product).await?)
    }

    async fn create_category(&self, category: &ExpenseCategory) -> StoreResult<()> {
        self.save_category(category).await
    }

    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.get_product(id).await?)
    }
}
