use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CustomerId, EventId, HistoryId, LineId, Money, NewOrder, OrderAggregate, OrderId, OrderLine,
    OrderStatus, PageRequest, ProductId, Result, StoreError,
    history::{HistoryAction, HistoryRecord, HistoryStore, NewHistoryRecord},
    store::OrderStore,
};

const HEADER_COLUMNS: &str =
    "id, customer_id, order_date, status, total_amount_cents, created_at, updated_at";
const LINE_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price_cents, created_at";
const HISTORY_COLUMNS: &str = "id, event_id, order_id, action, changes, performed_by, created_at";

/// PostgreSQL-backed order store and history log.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Maps a header row; lines are attached by the caller.
    fn row_to_header(row: &PgRow) -> Result<OrderAggregate> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(OrderAggregate {
            id: OrderId::new(row.try_get("id")?),
            customer_id: CustomerId::new(row.try_get("customer_id")?),
            order_date: row.try_get("order_date")?,
            status,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            lines: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::Corrupt(format!("negative line quantity {quantity}")))?;

        Ok(OrderLine {
            id: LineId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_history(row: &PgRow) -> Result<HistoryRecord> {
        let action: String = row.try_get("action")?;

        Ok(HistoryRecord {
            id: HistoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            action: action.parse::<HistoryAction>()?,
            changes: row.try_get("changes")?,
            performed_by: CustomerId::new(row.try_get("performed_by")?),
            created_at: row.try_get("created_at")?,
        })
    }

    async fn load_lines(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = $1 ORDER BY id ASC"
        ))
        .bind(order_id.as_i64())
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(Self::row_to_line).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<OrderAggregate> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_headers (customer_id, order_date, status, total_amount_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING {HEADER_COLUMNS}
            "#
        ))
        .bind(order.customer_id.as_i64())
        .bind(order.order_date)
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .fetch_one(&mut *tx)
        .await?;

        let mut aggregate = Self::row_to_header(&row)?;

        for line in &order.lines {
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| StoreError::Corrupt(format!("quantity {} out of range", line.quantity)))?;

            let row = sqlx::query(&format!(
                r#"
                INSERT INTO order_lines (order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                RETURNING {LINE_COLUMNS}
                "#
            ))
            .bind(aggregate.id.as_i64())
            .bind(line.product_id.as_i64())
            .bind(quantity)
            .bind(line.unit_price.cents())
            .fetch_one(&mut *tx)
            .await?;

            aggregate.lines.push(Self::row_to_line(&row)?);
        }

        // Dropping the transaction on any error above rolls back header and lines together.
        tx.commit().await?;

        tracing::debug!(order_id = %aggregate.id, lines = aggregate.lines.len(), "order inserted");
        Ok(aggregate)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderAggregate>> {
        // One snapshot for header and lines.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM order_headers WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let mut aggregate = Self::row_to_header(&row)?;
        aggregate.lines = Self::load_lines(&mut tx, id).await?;
        tx.commit().await?;

        Ok(Some(aggregate))
    }

    async fn update_order<F>(&self, id: OrderId, mutator: F) -> Result<OrderAggregate>
    where
        F: FnOnce(&mut OrderAggregate) + Send + 'static,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {HEADER_COLUMNS} FROM order_headers WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::OrderNotFound(id))?;

        let stored_lines = Self::load_lines(&mut tx, id).await?;
        let mut aggregate = Self::row_to_header(&row)?;
        aggregate.lines = stored_lines.clone();

        mutator(&mut aggregate);

        // Lines are written once at creation; the header carries every mutable field.
        let updated_at = sqlx::query_scalar(
            r#"
            UPDATE order_headers
            SET status = $2,
                order_date = $3,
                total_amount_cents = $4,
                updated_at = GREATEST(now(), updated_at + interval '1 microsecond')
            WHERE id = $1
            RETURNING updated_at
            "#,
        )
        .bind(id.as_i64())
        .bind(aggregate.status.as_str())
        .bind(aggregate.order_date)
        .bind(aggregate.total_amount.cents())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let committed = Self::row_to_header(&row)?;
        aggregate.id = committed.id;
        aggregate.customer_id = committed.customer_id;
        aggregate.created_at = committed.created_at;
        aggregate.lines = stored_lines;
        aggregate.updated_at = updated_at;

        Ok(aggregate)
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM order_headers WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }

        Ok(())
    }

    async fn list_orders(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<(Vec<OrderAggregate>, u64)> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_headers WHERE customer_id = $1")
                .bind(customer_id.as_i64())
                .fetch_one(&mut *tx)
                .await?;

        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {HEADER_COLUMNS} FROM order_headers
            WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(customer_id.as_i64())
        .bind(i64::from(page.size()))
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        let mut orders = rows
            .iter()
            .map(Self::row_to_header)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let line_rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ANY($1) ORDER BY id ASC"
        ))
        .bind(&ids[..])
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut lines_by_order: HashMap<i64, Vec<OrderLine>> = HashMap::new();
        for row in &line_rows {
            let order_id: i64 = row.try_get("order_id")?;
            lines_by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_line(row)?);
        }
        for order in &mut orders {
            order.lines = lines_by_order
                .remove(&order.id.as_i64())
                .unwrap_or_default();
        }

        Ok((orders, u64::try_from(total).unwrap_or(0)))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PostgresOrderStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<HistoryRecord> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO order_history (id, event_id, order_id, action, changes, performed_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING {HISTORY_COLUMNS}
            "#
        ))
        .bind(HistoryId::new().as_uuid())
        .bind(record.event_id.as_uuid())
        .bind(record.order_id.as_i64())
        .bind(record.action.as_str())
        .bind(&record.changes)
        .bind(record.performed_by.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => {
                tracing::debug!(event_id = %record.event_id, "history record already present");
                sqlx::query(&format!(
                    "SELECT {HISTORY_COLUMNS} FROM order_history WHERE event_id = $1"
                ))
                .bind(record.event_id.as_uuid())
                .fetch_one(&self.pool)
                .await?
            }
        };

        Self::row_to_history(&row)
    }

    async fn history_for(&self, order_id: OrderId) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM order_history WHERE order_id = $1 ORDER BY seq ASC"
        ))
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_history).collect()
    }
}
