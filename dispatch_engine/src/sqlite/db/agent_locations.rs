use dsp_common::geo::Coordinate;
use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::AgentLocation, traits::DispatchError};

pub async fn active_for_agent(
    agent_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<AgentLocation>, sqlx::Error> {
    let locations = sqlx::query_as("SELECT * FROM agent_locations WHERE agent_id = $1 AND is_active = 1")
        .bind(agent_id)
        .fetch_all(conn)
        .await?;
    Ok(locations)
}

/// Overwrites the agent's live GPS position. The row is updated in place; a first-ever update inserts it. GPS
/// history is not kept.
pub async fn upsert_current_location(
    agent_id: i64,
    position: Coordinate,
    conn: &mut SqliteConnection,
) -> Result<AgentLocation, DispatchError> {
    let updated: Option<AgentLocation> = sqlx::query_as(
        "UPDATE agent_locations SET latitude = $1, longitude = $2, is_active = 1, updated_at = CURRENT_TIMESTAMP \
         WHERE agent_id = $3 AND location_type = 'CurrentLocation' RETURNING *",
    )
    .bind(position.latitude)
    .bind(position.longitude)
    .bind(agent_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(location) = updated {
        trace!("🧭️ Agent {agent_id} current location moved to ({}, {})", position.latitude, position.longitude);
        return Ok(location);
    }
    let inserted = sqlx::query_as(
        "INSERT INTO agent_locations (agent_id, location_type, latitude, longitude) VALUES ($1, 'CurrentLocation', \
         $2, $3) RETURNING *",
    )
    .bind(agent_id)
    .bind(position.latitude)
    .bind(position.longitude)
    .fetch_one(conn)
    .await?;
    Ok(inserted)
}

pub async fn insert_service_area(
    agent_id: i64,
    center: Coordinate,
    radius_km: f64,
    conn: &mut SqliteConnection,
) -> Result<AgentLocation, DispatchError> {
    let location = sqlx::query_as(
        "INSERT INTO agent_locations (agent_id, location_type, latitude, longitude, radius_km) VALUES ($1, \
         'ServiceArea', $2, $3, $4) RETURNING *",
    )
    .bind(agent_id)
    .bind(center.latitude)
    .bind(center.longitude)
    .bind(radius_km)
    .fetch_one(conn)
    .await?;
    Ok(location)
}
