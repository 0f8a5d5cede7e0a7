use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Order, OrderNumber, OrderStatusType},
    lifecycle,
    traits::DispatchError,
};
use dsp_common::Kobo;

/// Inserts a new order row. Not atomic on its own; checkout embeds this in the same transaction that creates the
/// shopping list, passing `&mut *tx` as the connection argument.
pub async fn insert_order(
    order_number: &OrderNumber,
    customer_id: i64,
    shopping_list_id: i64,
    total: Kobo,
    conn: &mut SqliteConnection,
) -> Result<Order, DispatchError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (order_number, customer_id, shopping_list_id, total)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_number)
    .bind(customer_id)
    .bind(shopping_list_id)
    .bind(total)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order {order_number} inserted");
    Ok(order)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_number = $1").bind(number).fetch_optional(conn).await?;
    Ok(order)
}

/// Writes the new status and stamps the matching transition timestamp. The COALESCE keeps timestamps write-once:
/// re-entering a status never overwrites the time it was first reached.
pub(crate) async fn update_status(
    id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, DispatchError> {
    let sql = match lifecycle::timestamp_column(status) {
        Some(col) => format!(
            "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP, {col} = COALESCE({col}, \
             CURRENT_TIMESTAMP) WHERE id = $2 RETURNING *"
        ),
        None => "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *".to_string(),
    };
    let result: Option<Order> = sqlx::query_as(&sql).bind(status).bind(id).fetch_optional(conn).await?;
    result.ok_or(DispatchError::OrderNotFound(id))
}

/// Attaches the agent and moves the order to `Accepted` in one statement.
pub(crate) async fn set_agent(id: i64, agent_id: i64, conn: &mut SqliteConnection) -> Result<Order, DispatchError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET agent_id = $1, status = 'Accepted', accepted_at = COALESCE(accepted_at, \
         CURRENT_TIMESTAMP), updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(agent_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(DispatchError::OrderNotFound(id))
}

/// Detaches the agent and returns the order to the assignment queue.
pub(crate) async fn clear_agent(id: i64, conn: &mut SqliteConnection) -> Result<Order, DispatchError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET agent_id = NULL, status = 'Pending', updated_at = CURRENT_TIMESTAMP WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(DispatchError::OrderNotFound(id))
}

pub(crate) async fn mark_payment_completed(
    id: i64,
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, DispatchError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET payment_status = 'Completed', payment_id = $1, payment_processed_at = \
         COALESCE(payment_processed_at, CURRENT_TIMESTAMP), updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(payment_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(DispatchError::OrderNotFound(id))
}

/// Paid orders that still have no agent, oldest first. The background sweep feeds these back into assignment.
pub async fn pending_assignment(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE status = 'Pending' AND payment_status = 'Completed' AND agent_id IS NULL ORDER \
         BY created_at ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// The agent's active (`Accepted`/`InProgress`) order count, split into the target market and everywhere else.
pub(crate) async fn active_counts(
    agent_id: i64,
    market_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(i64, i64), sqlx::Error> {
    let (in_market, elsewhere): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN sl.market_id = $2 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN sl.market_id <> $2 THEN 1 ELSE 0 END), 0)
        FROM orders o JOIN shopping_lists sl ON o.shopping_list_id = sl.id
        WHERE o.agent_id = $1 AND o.status IN ('Accepted', 'InProgress')
        "#,
    )
    .bind(agent_id)
    .bind(market_id)
    .fetch_one(conn)
    .await?;
    trace!("📝️ Agent {agent_id} workload: {in_market} in market {market_id}, {elsewhere} elsewhere");
    Ok((in_market, elsewhere))
}

//--------------------------------------    rejections     -----------------------------------------------------------

pub async fn rejections_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<crate::db_types::RejectedAgent>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM order_rejections WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn rejected_agent_ids(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT agent_id FROM order_rejections WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Appends a rejection row and returns the new rejection count for the order. The UNIQUE (order_id, agent_id)
/// constraint turns a repeat rejection into a database error, which the caller maps to `DuplicateRejection`.
pub(crate) async fn insert_rejection(
    order_id: i64,
    agent_id: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query("INSERT INTO order_rejections (order_id, agent_id, reason) VALUES ($1, $2, $3)")
        .bind(order_id)
        .bind(agent_id)
        .bind(reason)
        .execute(&mut *conn)
        .await?;
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_rejections WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
