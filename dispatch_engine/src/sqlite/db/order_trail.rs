use sqlx::SqliteConnection;

use crate::db_types::{Actor, OrderStatusType, OrderTrailEntry, TrailEvent};

/// Appends one audit row. The trail is append-only; there are deliberately no update or delete functions in this
/// module.
pub(crate) async fn append(
    order_id: i64,
    event: TrailEvent,
    previous_status: Option<OrderStatusType>,
    new_status: Option<OrderStatusType>,
    actor: &Actor,
    note: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO order_trail (order_id, event, previous_status, new_status, actor, note) VALUES ($1, $2, $3, \
         $4, $5, $6)",
    )
    .bind(order_id)
    .bind(event)
    .bind(previous_status)
    .bind(new_status)
    .bind(actor.to_string())
    .bind(note)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderTrailEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM order_trail WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
