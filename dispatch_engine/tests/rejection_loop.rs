//! The bounded rejection/reassignment loop against a real sqlite database.

use dsp_common::{geo::Coordinate, Kobo};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use dispatch_engine::{
    db_types::{Actor, AgentStatus, OrderStatusType, ShoppingListStatusType, TrailEvent},
    events::EventProducers,
    test_utils::{
        doubles::{NullChat, OfflineMaps},
        prepare_env::{prepare_test_env, random_db_path},
        seeds::{seed_agent, seed_current_location, seed_market, seed_paid_order, MARKET_POSITION},
    },
    traits::{RejectionOutcome, MAX_REJECTIONS},
    DispatchApi,
    DispatchDatabase,
    DispatchError,
    SqliteDatabase,
};

type TestApi = DispatchApi<SqliteDatabase, OfflineMaps, NullChat>;

async fn setup() -> (TestApi, SqliteDatabase) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let api = DispatchApi::new(db.clone(), OfflineMaps, NullChat, EventProducers::default());
    (api, db)
}

async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

fn near_market(km: f64) -> Coordinate {
    Coordinate::new(MARKET_POSITION.latitude + km / 111.19, MARKET_POSITION.longitude)
}

#[tokio::test]
async fn rejection_returns_the_order_to_the_queue_and_releases_the_agent() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Oyingbo", MARKET_POSITION).await;
    let agent = seed_agent(&db, 40).await;
    seed_current_location(&db, agent.id, near_market(1.0)).await;
    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    api.assign_agent_to_order(order.id).await.unwrap();

    let resolution = api.handle_agent_rejection(order.id, agent.id, "vehicle breakdown").await.unwrap();
    // The only candidate just rejected it, so reassignment finds nobody.
    assert!(matches!(resolution.outcome, RejectionOutcome::AwaitingReassignment { .. }));
    assert_eq!(resolution.new_agent_id(), None);

    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.agent_id, None);
    let list = db.fetch_shopping_list(order.shopping_list_id).await.unwrap().unwrap();
    assert_eq!(list.status, ShoppingListStatusType::Accepted);
    assert_eq!(list.agent_id, None);
    let agent = db.fetch_agent(agent.id).await.unwrap().unwrap();
    assert_eq!(agent.metadata.current_status, AgentStatus::Available);
    assert!(agent.metadata.is_accepting_orders);
    tear_down(db).await;
}

#[tokio::test]
async fn rejecting_agent_is_excluded_from_reassignment() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Oyingbo", MARKET_POSITION).await;
    // The rejecting agent is much closer; exclusion must trump score.
    let near = seed_agent(&db, 40).await;
    seed_current_location(&db, near.id, near_market(0.5)).await;
    let far = seed_agent(&db, 40).await;
    seed_current_location(&db, far.id, near_market(15.0)).await;

    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    let outcome = api.assign_agent_to_order(order.id).await.unwrap();
    assert_eq!(outcome.assigned_agent_id(), Some(near.id));

    let resolution = api.handle_agent_rejection(order.id, near.id, "too many bags").await.unwrap();
    assert_eq!(resolution.new_agent_id(), Some(far.id));
    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.agent_id, Some(far.id));
    assert_eq!(order.status, OrderStatusType::Accepted);
    tear_down(db).await;
}

#[tokio::test]
async fn duplicate_rejection_is_rejected() {
    let (_api, db) = setup().await;
    let market = seed_market(&db, "Oyingbo", MARKET_POSITION).await;
    let agent = seed_agent(&db, 40).await;
    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    db.assign_agent(order.id, agent.id).await.unwrap();
    db.record_rejection(order.id, agent.id, "first time").await.unwrap();

    // Force the same agent back onto the order; their second rejection must fail.
    db.update_agent_presence(agent.id, AgentStatus::Available, true).await.unwrap();
    db.assign_agent(order.id, agent.id).await.unwrap();
    let err = db.record_rejection(order.id, agent.id, "second time").await.unwrap_err();
    assert!(matches!(err, DispatchError::DuplicateRejection { .. }));
    tear_down(db).await;
}

#[tokio::test]
async fn rejection_is_only_allowed_before_the_job_starts() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Oyingbo", MARKET_POSITION).await;
    let agent = seed_agent(&db, 40).await;
    let bystander = seed_agent(&db, 40).await;
    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    db.assign_agent(order.id, agent.id).await.unwrap();

    // Someone else cannot reject on the assignee's behalf.
    let err = db.record_rejection(order.id, bystander.id, "not mine").await.unwrap_err();
    assert!(matches!(err, DispatchError::Forbidden(_)));

    api.update_order_status(order.id, OrderStatusType::InProgress, &Actor::Agent(agent.id)).await.unwrap();
    let err = db.record_rejection(order.id, agent.id, "changed my mind").await.unwrap_err();
    assert!(matches!(err, DispatchError::RejectionNotAllowed { .. }));
    tear_down(db).await;
}

#[tokio::test]
async fn order_is_cancelled_after_the_rejection_limit() {
    let (_api, db) = setup().await;
    let market = seed_market(&db, "Oyingbo", MARKET_POSITION).await;
    let mut agents = Vec::new();
    for _ in 0..MAX_REJECTIONS {
        agents.push(seed_agent(&db, 40).await);
    }
    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;

    for (n, agent) in agents.iter().enumerate() {
        db.assign_agent(order.id, agent.id).await.unwrap();
        let outcome = db.record_rejection(order.id, agent.id, "no thanks").await.unwrap();
        let is_last = n as i64 + 1 == MAX_REJECTIONS;
        match outcome {
            RejectionOutcome::AwaitingReassignment { excluded, .. } => {
                assert!(!is_last, "rejection {} should have cancelled the order", n + 1);
                assert_eq!(excluded.len(), n + 1);
            },
            RejectionOutcome::Cancelled(order) => {
                assert!(is_last);
                assert_eq!(order.status, OrderStatusType::Cancelled);
            },
        }
    }

    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(order.agent_id, None);
    assert!(order.cancelled_at.is_some());
    let list = db.fetch_shopping_list(order.shopping_list_id).await.unwrap().unwrap();
    assert_eq!(list.status, ShoppingListStatusType::Cancelled);
    let rejections = db.rejections_for_order(order.id).await.unwrap();
    assert_eq!(rejections.len(), MAX_REJECTIONS as usize);
    let trail = db.order_trail(order.id).await.unwrap();
    assert_eq!(trail.iter().filter(|t| t.event == TrailEvent::AgentRejected).count(), MAX_REJECTIONS as usize);
    assert_eq!(trail.iter().filter(|t| t.event == TrailEvent::OrderCancelled).count(), 1);
    tear_down(db).await;
}
