use sqlx::SqliteConnection;

use crate::{
    db_types::{ShoppingList, ShoppingListStatusType},
    traits::DispatchError,
};
use dsp_common::Kobo;

pub async fn insert_list(
    customer_id: i64,
    market_id: i64,
    total: Kobo,
    conn: &mut SqliteConnection,
) -> Result<ShoppingList, DispatchError> {
    let list = sqlx::query_as(
        "INSERT INTO shopping_lists (customer_id, market_id, total) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(customer_id)
    .bind(market_id)
    .bind(total)
    .fetch_one(conn)
    .await?;
    Ok(list)
}

pub async fn fetch_list(id: i64, conn: &mut SqliteConnection) -> Result<Option<ShoppingList>, sqlx::Error> {
    let list = sqlx::query_as("SELECT * FROM shopping_lists WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(list)
}

pub(crate) async fn update_status(
    id: i64,
    status: ShoppingListStatusType,
    conn: &mut SqliteConnection,
) -> Result<ShoppingList, DispatchError> {
    let result: Option<ShoppingList> = sqlx::query_as(
        "UPDATE shopping_lists SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(DispatchError::ShoppingListNotFound(id))
}

/// Mirrors the order's `agent_id` onto the shopping list. `None` clears it during reassignment.
pub(crate) async fn set_agent(
    id: i64,
    agent_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<ShoppingList, DispatchError> {
    let result: Option<ShoppingList> = sqlx::query_as(
        "UPDATE shopping_lists SET agent_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(agent_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(DispatchError::ShoppingListNotFound(id))
}
