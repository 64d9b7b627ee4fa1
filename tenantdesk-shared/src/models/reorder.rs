/// Reorder requests and the restocking workflow
///
/// # Workflow
///
/// ```text
///            ┌──────────────▶ canceled ◀─────────────┐
///            │                   ▲                   │
/// pending ──approve──▶ approved ─┴─order──▶ ordered ─┴─receive─┬─▶ received
///                                               ▲              │
///                                               └── partial ◀──┘ (receive more)
/// ```
///
/// - `pending → approved | canceled`
/// - `approved → ordered | canceled`
/// - `ordered → canceled`, or `partial`/`received` through a receipt
/// - `partial → canceled`, or `partial`/`received` through a further receipt
/// - `received` and `canceled` are terminal
///
/// A receipt adds the delivered units to both `quantity_received` and the
/// supply's stock in the same transaction. When the running total ends up
/// different from what was requested, the caller must say why
/// (`discrepancy_reason`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::supply::Supply;
use super::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reorder_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReorderStatus {
    Pending,
    Approved,
    Ordered,
    Partial,
    Received,
    Canceled,
}

impl ReorderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReorderStatus::Pending => "pending",
            ReorderStatus::Approved => "approved",
            ReorderStatus::Ordered => "ordered",
            ReorderStatus::Partial => "partial",
            ReorderStatus::Received => "received",
            ReorderStatus::Canceled => "canceled",
        }
    }

    /// Whether a manual status change from `self` to `next` is allowed
    ///
    /// `partial` and `received` are reached only through receipts.
    pub fn can_transition_to(&self, next: ReorderStatus) -> bool {
        use ReorderStatus::*;

        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Canceled)
                | (Approved, Ordered)
                | (Approved, Canceled)
                | (Ordered, Canceled)
                | (Partial, Canceled)
        )
    }

    pub fn accepts_receipt(&self) -> bool {
        matches!(self, ReorderStatus::Ordered | ReorderStatus::Partial)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReorderStatus::Received | ReorderStatus::Canceled)
    }

    pub fn is_deletable(&self) -> bool {
        matches!(self, ReorderStatus::Pending | ReorderStatus::Canceled)
    }
}

impl std::fmt::Display for ReorderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReorderError {
    #[error("Reorder request not found")]
    NotFound,

    #[error("Cannot change reorder request status from {from} to {to}")]
    InvalidTransition {
        from: ReorderStatus,
        to: ReorderStatus,
    },

    #[error("Only ordered or partially received requests can be received (status is {0})")]
    NotReceivable(ReorderStatus),

    #[error("Only pending or canceled requests can be deleted (status is {0})")]
    NotDeletable(ReorderStatus),

    #[error(
        "A discrepancy reason is required: received {received} of {requested} requested"
    )]
    DiscrepancyReasonRequired { requested: i32, received: i32 },

    #[error("Received quantity must be positive")]
    InvalidQuantity,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReorderRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub supply_id: Uuid,
    pub quantity_requested: i32,
    pub quantity_received: i32,
    pub status: ReorderStatus,
    pub requested_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub discrepancy_reason: Option<String>,
    pub notes: Option<String>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReorderFilter {
    pub status: Option<ReorderStatus>,
    pub supply_id: Option<Uuid>,
}

/// A recorded delivery against a request
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub request: ReorderRequest,

    /// Supply with its stock after the delivery
    pub supply: Supply,
}

/// Status a request lands in after a receipt, and whether a reason is needed
///
/// ```
/// use tenantdesk_shared::models::reorder::{plan_receipt, ReorderStatus};
///
/// assert_eq!(plan_receipt(10, 4), (ReorderStatus::Partial, true));
/// assert_eq!(plan_receipt(10, 10), (ReorderStatus::Received, false));
/// assert_eq!(plan_receipt(10, 12), (ReorderStatus::Received, true));
/// ```
pub fn plan_receipt(requested: i32, received_total: i32) -> (ReorderStatus, bool) {
    let status = if received_total < requested {
        ReorderStatus::Partial
    } else {
        ReorderStatus::Received
    };

    (status, received_total != requested)
}

const COLUMNS: &str = "id, tenant_id, supply_id, quantity_requested, quantity_received, status, \
                       requested_by, approved_by, discrepancy_reason, notes, ordered_at, \
                       received_at, created_at, updated_at";

impl ReorderRequest {
    /// Creates a pending request
    ///
    /// The supply must exist in the tenant; a foreign key violation surfaces
    /// otherwise.
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        supply_id: Uuid,
        quantity: i32,
        requested_by: Uuid,
        notes: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ReorderRequest>(&format!(
            "INSERT INTO reorder_requests (tenant_id, supply_id, quantity_requested, requested_by, notes)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(supply_id)
        .bind(quantity)
        .bind(requested_by)
        .bind(notes)
        .fetch_one(db)
        .await
    }

    /// Opens a pending request for every low-stock supply that has none open
    ///
    /// Must run inside a transaction. A per-tenant advisory lock keeps two
    /// concurrent runs from both creating requests for the same supply.
    pub async fn create_for_low_stock(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        requested_by: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::TEXT))")
            .bind(format!("reorder-auto:{}", tenant_id))
            .execute(&mut *conn)
            .await?;

        sqlx::query_as::<_, ReorderRequest>(&format!(
            "INSERT INTO reorder_requests (tenant_id, supply_id, quantity_requested, requested_by, notes)
             SELECT s.tenant_id, s.id, s.reorder_quantity, $2, 'Automatic low-stock reorder'
             FROM supplies s
             WHERE s.tenant_id = $1
               AND s.quantity <= s.reorder_level
               AND NOT EXISTS (
                   SELECT 1 FROM reorder_requests r
                   WHERE r.supply_id = s.id
                     AND r.status IN ('pending', 'approved', 'ordered', 'partial')
               )
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(requested_by)
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ReorderRequest>(&format!(
            "SELECT {COLUMNS} FROM reorder_requests WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Newest first
    pub async fn list(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        filter: ReorderFilter,
        page: Pagination,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ReorderRequest>(&format!(
            "SELECT {COLUMNS} FROM reorder_requests
             WHERE tenant_id = $1
               AND ($2::reorder_status IS NULL OR status = $2)
               AND ($3::UUID IS NULL OR supply_id = $3)
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(tenant_id)
        .bind(filter.status)
        .bind(filter.supply_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }

    async fn lock(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Self, ReorderError> {
        sqlx::query_as::<_, ReorderRequest>(&format!(
            "SELECT {COLUMNS} FROM reorder_requests
             WHERE tenant_id = $1 AND id = $2
             FOR UPDATE"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ReorderError::NotFound)
    }

    /// Applies a manual status change (approve, order, cancel)
    ///
    /// Must run inside a transaction.
    pub async fn transition(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
        next: ReorderStatus,
        actor_id: Uuid,
    ) -> Result<Self, ReorderError> {
        let current = Self::lock(conn, tenant_id, id).await?;

        if !current.status.can_transition_to(next) {
            return Err(ReorderError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let updated = sqlx::query_as::<_, ReorderRequest>(&format!(
            "UPDATE reorder_requests SET
                status = $3,
                approved_by = CASE WHEN $3 = 'approved'::reorder_status THEN $4 ELSE approved_by END,
                ordered_at = CASE WHEN $3 = 'ordered'::reorder_status THEN NOW() ELSE ordered_at END,
                updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .bind(next)
        .bind(actor_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }

    /// Records a delivery of `quantity` units
    ///
    /// Must run inside a transaction. The request row is locked first, so
    /// concurrent receipts against the same request are applied in turn and
    /// each sees the other's running total.
    pub async fn receive(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
        quantity: i32,
        discrepancy_reason: Option<&str>,
    ) -> Result<Receipt, ReorderError> {
        if quantity <= 0 {
            return Err(ReorderError::InvalidQuantity);
        }

        let current = Self::lock(conn, tenant_id, id).await?;

        if !current.status.accepts_receipt() {
            return Err(ReorderError::NotReceivable(current.status));
        }

        let total = current.quantity_received.saturating_add(quantity);
        let (status, needs_reason) = plan_receipt(current.quantity_requested, total);

        let reason = discrepancy_reason.map(str::trim).filter(|r| !r.is_empty());
        if needs_reason && reason.is_none() {
            return Err(ReorderError::DiscrepancyReasonRequired {
                requested: current.quantity_requested,
                received: total,
            });
        }

        let request = sqlx::query_as::<_, ReorderRequest>(&format!(
            "UPDATE reorder_requests SET
                quantity_received = $3,
                status = $4,
                discrepancy_reason = COALESCE($5, discrepancy_reason),
                received_at = NOW(),
                updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .bind(total)
        .bind(status)
        .bind(reason)
        .fetch_one(&mut *conn)
        .await?;

        let supply = Supply::add_stock(&mut *conn, tenant_id, request.supply_id, quantity)
            .await?
            .ok_or(ReorderError::NotFound)?;

        Ok(Receipt { request, supply })
    }

    /// Deletes a pending or canceled request
    ///
    /// Must run inside a transaction.
    pub async fn delete(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<(), ReorderError> {
        let current = Self::lock(conn, tenant_id, id).await?;

        if !current.status.is_deletable() {
            return Err(ReorderError::NotDeletable(current.status));
        }

        sqlx::query("DELETE FROM reorder_requests WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
