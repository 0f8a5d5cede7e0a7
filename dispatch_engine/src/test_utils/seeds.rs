//! Data seeding for integration tests. Markets and agent accounts are created upstream of the engine in production,
//! so these helpers write them directly.

use dsp_common::{geo::Coordinate, Kobo};

use crate::{
    db_types::{Actor, AgentProfile, AgentStatus, Market, NewOrder, Order},
    traits::{DispatchDatabase, PaymentConfirmOutcome},
    SqliteDatabase,
};

/// Lagos Island test market.
pub const MARKET_POSITION: Coordinate = Coordinate { latitude: 6.5, longitude: 3.3 };

pub async fn seed_market(db: &SqliteDatabase, name: &str, position: Coordinate) -> Market {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    crate::sqlite::db::markets::insert_market(name, position.latitude, position.longitude, &mut conn)
        .await
        .expect("Error seeding market")
}

/// A KYC-verified agent that is online and accepting orders, with the account backdated `age_days`.
pub async fn seed_agent(db: &SqliteDatabase, age_days: i64) -> AgentProfile {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO agents (created_at, is_kyc_verified, kyc_complete, current_status, is_accepting_orders) VALUES \
         (datetime('now', $1), 1, 1, 'Available', 1) RETURNING id",
    )
    .bind(format!("-{age_days} days"))
    .fetch_one(db.pool())
    .await
    .expect("Error seeding agent");
    db.fetch_agent(id).await.expect("Error fetching seeded agent").expect("Seeded agent missing")
}

/// An agent that fails the eligibility filters (unverified, offline).
pub async fn seed_ineligible_agent(db: &SqliteDatabase) -> AgentProfile {
    let (id,): (i64,) = sqlx::query_as("INSERT INTO agents (is_kyc_verified) VALUES (0) RETURNING id")
        .fetch_one(db.pool())
        .await
        .expect("Error seeding agent");
    db.fetch_agent(id).await.expect("Error fetching seeded agent").expect("Seeded agent missing")
}

pub async fn seed_service_area(db: &SqliteDatabase, agent_id: i64, center: Coordinate, radius_km: f64) {
    db.add_service_area(agent_id, center, radius_km).await.expect("Error seeding service area");
}

pub async fn seed_current_location(db: &SqliteDatabase, agent_id: i64, position: Coordinate) {
    db.record_current_location(agent_id, position).await.expect("Error seeding current location");
}

/// A paid order with no agent, ready for assignment.
pub async fn seed_paid_order(db: &SqliteDatabase, customer_id: i64, market_id: i64, total: Kobo) -> Order {
    let order = db.create_order(NewOrder::new(customer_id, market_id, total)).await.expect("Error creating order");
    let outcome = db
        .mark_payment_completed(order.id, &format!("seed-tx-{}", order.id), &Actor::System)
        .await
        .expect("Error paying order");
    match outcome {
        PaymentConfirmOutcome::Confirmed(order) => order,
        PaymentConfirmOutcome::AlreadyCompleted(order) => order,
    }
}

/// Gives the agent one active order in the market, then puts them back on the market floor as Available.
pub async fn seed_active_order_for_agent(
    db: &SqliteDatabase,
    agent_id: i64,
    customer_id: i64,
    market_id: i64,
) -> Order {
    let order = seed_paid_order(db, customer_id, market_id, Kobo::from_naira(5_000)).await;
    let order = db.assign_agent(order.id, agent_id).await.expect("Error assigning seeded order");
    // assign_agent flips the agent to Busy; reset so the agent stays a candidate for the next order.
    db.update_agent_presence(agent_id, AgentStatus::Available, true).await.expect("Error resetting presence");
    order
}
