/// Inventory supplies
///
/// Stock items a tenant consumes (detergents, mop heads, gloves). Each has a
/// quantity on hand, a reorder level at or below which it counts as low
/// stock, and the quantity to reorder.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE supplies (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     sku VARCHAR(100) NOT NULL,
///     category VARCHAR(100),
///     unit VARCHAR(50) NOT NULL DEFAULT 'unit',
///     quantity INTEGER NOT NULL DEFAULT 0,
///     reorder_level INTEGER NOT NULL DEFAULT 0,
///     reorder_quantity INTEGER NOT NULL DEFAULT 1,
///     unit_cost_cents BIGINT,
///     supplier VARCHAR(255),
///     image_url VARCHAR(512),
///     ...
///     CONSTRAINT supplies_tenant_sku_key UNIQUE (tenant_id, sku),
///     CONSTRAINT supplies_quantity_check CHECK (quantity >= 0)
/// );
/// ```
///
/// The quantity check constraint backs up the application-level guard, so
/// stock can never be driven negative even by concurrent adjustments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::Pagination;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Supply {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub sku: String,
    pub category: Option<String>,
    pub unit: String,
    pub quantity: i32,
    pub reorder_level: i32,
    pub reorder_quantity: i32,
    pub unit_cost_cents: Option<i64>,
    pub supplier: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Supply {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

#[derive(Debug, Clone)]
pub struct CreateSupply {
    pub name: String,
    pub sku: String,
    pub category: Option<String>,
    pub unit: String,
    pub quantity: i32,
    pub reorder_level: i32,
    pub reorder_quantity: i32,
    pub unit_cost_cents: Option<i64>,
    pub supplier: Option<String>,
}

/// Stock is changed only through adjustments and receipts, not updates
#[derive(Debug, Clone, Default)]
pub struct UpdateSupply {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub category: Option<Option<String>>,
    pub unit: Option<String>,
    pub reorder_level: Option<i32>,
    pub reorder_quantity: Option<i32>,
    pub unit_cost_cents: Option<Option<i64>>,
    pub supplier: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplyFilter {
    pub category: Option<String>,

    /// Case-insensitive match on name or SKU
    pub search: Option<String>,
}

/// Outcome of a stock adjustment
#[derive(Debug, Clone)]
pub enum StockAdjustment {
    Applied(Supply),

    /// The delta would take stock below zero; nothing changed
    Insufficient { available: i32 },

    NotFound,
}

const COLUMNS: &str = "id, tenant_id, name, sku, category, unit, quantity, reorder_level, \
                       reorder_quantity, unit_cost_cents, supplier, image_url, created_at, updated_at";

impl Supply {
    /// # Errors
    ///
    /// Fails with a unique violation on `supplies_tenant_sku_key` for a
    /// duplicate SKU within the tenant.
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        data: CreateSupply,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Supply>(&format!(
            "INSERT INTO supplies
                (tenant_id, name, sku, category, unit, quantity, reorder_level,
                 reorder_quantity, unit_cost_cents, supplier)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(data.name.trim())
        .bind(data.sku.trim())
        .bind(data.category)
        .bind(data.unit)
        .bind(data.quantity)
        .bind(data.reorder_level)
        .bind(data.reorder_quantity)
        .bind(data.unit_cost_cents)
        .bind(data.supplier)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Supply>(&format!(
            "SELECT {COLUMNS} FROM supplies WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Alphabetical by name
    pub async fn list(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        filter: &SupplyFilter,
        page: Pagination,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")));

        sqlx::query_as::<_, Supply>(&format!(
            "SELECT {COLUMNS} FROM supplies
             WHERE tenant_id = $1
               AND ($2::TEXT IS NULL OR category = $2)
               AND ($3::TEXT IS NULL OR name ILIKE $3 OR sku ILIKE $3)
             ORDER BY name ASC
             LIMIT $4 OFFSET $5"
        ))
        .bind(tenant_id)
        .bind(filter.category.as_deref())
        .bind(search)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }

    /// Supplies at or below their reorder level, most depleted first
    pub async fn list_low_stock(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Supply>(&format!(
            "SELECT {COLUMNS} FROM supplies
             WHERE tenant_id = $1 AND quantity <= reorder_level
             ORDER BY (quantity - reorder_level) ASC, name ASC"
        ))
        .bind(tenant_id)
        .fetch_all(db)
        .await
    }

    pub async fn update(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateSupply,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE supplies SET updated_at = NOW()");
        let mut bind_count = 2;

        for (column, present) in [
            ("name", data.name.is_some()),
            ("sku", data.sku.is_some()),
            ("category", data.category.is_some()),
            ("unit", data.unit.is_some()),
            ("reorder_level", data.reorder_level.is_some()),
            ("reorder_quantity", data.reorder_quantity.is_some()),
            ("unit_cost_cents", data.unit_cost_cents.is_some()),
            ("supplier", data.supplier.is_some()),
        ] {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {} = ${}", column, bind_count));
            }
        }

        query.push_str(&format!(" WHERE tenant_id = $1 AND id = $2 RETURNING {COLUMNS}"));

        let mut q = sqlx::query_as::<_, Supply>(&query).bind(tenant_id).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(sku) = data.sku {
            q = q.bind(sku);
        }
        if let Some(category) = data.category {
            q = q.bind(category);
        }
        if let Some(unit) = data.unit {
            q = q.bind(unit);
        }
        if let Some(reorder_level) = data.reorder_level {
            q = q.bind(reorder_level);
        }
        if let Some(reorder_quantity) = data.reorder_quantity {
            q = q.bind(reorder_quantity);
        }
        if let Some(unit_cost_cents) = data.unit_cost_cents {
            q = q.bind(unit_cost_cents);
        }
        if let Some(supplier) = data.supplier {
            q = q.bind(supplier);
        }

        q.fetch_optional(db).await
    }

    pub async fn delete(db: impl PgExecutor<'_>, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM supplies WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Applies a signed delta to the stock unless it would go negative
    ///
    /// Runs as a single conditional UPDATE, so concurrent adjustments cannot
    /// jointly overdraw the stock.
    pub async fn adjust_stock(
        db: impl PgExecutor<'_> + Copy,
        tenant_id: Uuid,
        id: Uuid,
        delta: i32,
    ) -> Result<StockAdjustment, sqlx::Error> {
        let updated = sqlx::query_as::<_, Supply>(&format!(
            "UPDATE supplies SET quantity = quantity + $3, updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2 AND quantity + $3 >= 0
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .bind(delta)
        .fetch_optional(db)
        .await?;

        if let Some(supply) = updated {
            return Ok(StockAdjustment::Applied(supply));
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT quantity FROM supplies WHERE tenant_id = $1 AND id = $2")
                .bind(tenant_id)
                .bind(id)
                .fetch_optional(db)
                .await?;

        Ok(match available {
            Some(available) => StockAdjustment::Insufficient { available },
            None => StockAdjustment::NotFound,
        })
    }

    /// Adds received units to stock
    pub async fn add_stock(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
        quantity: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Supply>(&format!(
            "UPDATE supplies SET quantity = quantity + $3, updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .bind(quantity)
        .fetch_optional(db)
        .await
    }

    pub async fn set_image_url(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
        image_url: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Supply>(&format!(
            "UPDATE supplies SET image_url = $3, updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .bind(image_url)
        .fetch_optional(db)
        .await
    }
}
