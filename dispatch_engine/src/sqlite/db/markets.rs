use sqlx::SqliteConnection;

use crate::db_types::Market;

pub async fn fetch_market(id: i64, conn: &mut SqliteConnection) -> Result<Option<Market>, sqlx::Error> {
    let market = sqlx::query_as("SELECT id, name, latitude, longitude FROM markets WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(market)
}

pub async fn insert_market(
    name: &str,
    latitude: f64,
    longitude: f64,
    conn: &mut SqliteConnection,
) -> Result<Market, sqlx::Error> {
    let market = sqlx::query_as(
        "INSERT INTO markets (name, latitude, longitude) VALUES ($1, $2, $3) RETURNING id, name, latitude, longitude",
    )
    .bind(name)
    .bind(latitude)
    .bind(longitude)
    .fetch_one(conn)
    .await?;
    Ok(market)
}
