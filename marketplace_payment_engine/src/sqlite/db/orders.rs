use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        LineItem,
        MarketId,
        MissingItem,
        NewOrder,
        Order,
        OrderId,
        OrderStatus,
        PaymentMethod,
        StatusFields,
    },
    traits::StorageError,
};

use mpe_common::Money;

/// The raw row shape. Line items and missing items live in JSON columns; everything else maps directly.
#[derive(FromRow)]
struct OrderRow {
    id: i64,
    order_id: OrderId,
    market_id: MarketId,
    customer_id: String,
    status: OrderStatus,
    payment_method: PaymentMethod,
    paid_in_app: bool,
    payment_id: Option<String>,
    payment_description: Option<String>,
    card_token: Option<String>,
    pix_code: Option<String>,
    pix_expires_at: Option<DateTime<Utc>>,
    total: Money,
    market_amount: Money,
    delivery_fee: Money,
    customer_debit: Option<Money>,
    credit_used: Option<Money>,
    debit_market_id: Option<MarketId>,
    debit_amount: Option<Money>,
    items: Json<Vec<LineItem>>,
    missing_items: Option<Json<Vec<MissingItem>>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            order_id: row.order_id,
            market_id: row.market_id,
            customer_id: row.customer_id,
            status: row.status,
            payment_method: row.payment_method,
            paid_in_app: row.paid_in_app,
            payment_id: row.payment_id,
            payment_description: row.payment_description,
            card_token: row.card_token,
            pix_code: row.pix_code,
            pix_expires_at: row.pix_expires_at,
            total: row.total,
            market_amount: row.market_amount,
            delivery_fee: row.delivery_fee,
            customer_debit: row.customer_debit,
            credit_used: row.credit_used,
            debit_market_id: row.debit_market_id,
            debit_amount: row.debit_amount,
            items: row.items.0,
            missing_items: row.missing_items.map(|m| m.0),
            finished_at: row.finished_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Inserts the order, returning `false` in the second element if an order with the same id already exists.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), StorageError> {
    let inserted = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("🗃️ Order [{}] inserted with id {}", order.order_id, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StorageError> {
    let row: OrderRow = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                market_id,
                customer_id,
                status,
                payment_method,
                paid_in_app,
                card_token,
                total,
                market_amount,
                delivery_fee,
                credit_used,
                items,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.market_id)
    .bind(order.customer_id)
    .bind(order.status)
    .bind(order.payment_method)
    .bind(order.paid_in_app)
    .bind(order.card_token)
    .bind(order.total)
    .bind(order.market_amount)
    .bind(order.delivery_fee)
    .bind(order.credit_used)
    .bind(Json(order.items))
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(row.into())
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorageError> {
    let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Order::from))
}

pub async fn fetch_order_for_customer(
    customer_id: &str,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorageError> {
    let row: Option<OrderRow> =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1 AND customer_id = $2")
            .bind(order_id.as_str())
            .bind(customer_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(Order::from))
}

/// Persists the status plus every `Some` field of `fields` in one atomic statement. `COALESCE` keeps the stored
/// value for every `None` field.
pub async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatus,
    fields: &StatusFields,
    conn: &mut SqliteConnection,
) -> Result<Order, StorageError> {
    let row: Option<OrderRow> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                payment_id = COALESCE($2, payment_id),
                payment_method = COALESCE($3, payment_method),
                card_token = COALESCE($4, card_token),
                payment_description = COALESCE($5, payment_description),
                pix_code = COALESCE($6, pix_code),
                pix_expires_at = COALESCE($7, pix_expires_at),
                finished_at = COALESCE($8, finished_at),
                customer_debit = COALESCE($9, customer_debit),
                debit_market_id = COALESCE($10, debit_market_id),
                debit_amount = COALESCE($11, debit_amount),
                missing_items = COALESCE($12, missing_items),
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $13
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(fields.payment_id.as_deref())
    .bind(fields.payment_method)
    .bind(fields.card_token.as_deref())
    .bind(fields.payment_description.as_deref())
    .bind(fields.pix_code.as_deref())
    .bind(fields.pix_expires_at)
    .bind(fields.finished_at)
    .bind(fields.customer_debit)
    .bind(fields.debit_market_id.as_ref())
    .bind(fields.debit_amount)
    .bind(fields.missing_items.as_ref().map(Json))
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(Order::from).ok_or_else(|| StorageError::OrderNotFound(order_id.clone()))
}

/// All orders in one of the given statuses, oldest first.
pub async fn fetch_orders_in_status(
    statuses: &[OrderStatus],
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, StorageError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE status IN (");
    let status_clause =
        statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
    builder.push(status_clause);
    builder.push(") ORDER BY created_at ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows: Vec<OrderRow> = builder.build_query_as().fetch_all(conn).await?;
    Ok(rows.into_iter().map(Order::from).collect())
}

/// The customer's full order history in creation order.
pub async fn fetch_customer_orders(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, StorageError> {
    let rows: Vec<OrderRow> =
        sqlx::query_as("SELECT * FROM orders WHERE customer_id = $1 ORDER BY id ASC")
            .bind(customer_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(Order::from).collect())
}
