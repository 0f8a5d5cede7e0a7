//! End-to-end dispatch flows against a real sqlite database: checkout, idempotent payment confirmation, scoring and
//! assignment, the full lifecycle walk, and the reconciliation sweep.

use dsp_common::{geo::Coordinate, Kobo};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use dispatch_engine::{
    db_types::{
        Actor,
        AgentStatus,
        ConfirmationSource,
        NewOrder,
        NewPaymentRecord,
        OrderStatusType,
        PaymentStatusType,
        ShoppingListStatusType,
        TrailEvent,
    },
    events::EventProducers,
    sweep::{ReconciliationSweep, SweepConfig},
    test_utils::{
        doubles::{NullChat, OfflineMaps, RecordingChat, TestProvider},
        prepare_env::{prepare_test_env, random_db_path},
        seeds::{
            seed_active_order_for_agent,
            seed_agent,
            seed_current_location,
            seed_ineligible_agent,
            seed_market,
            seed_paid_order,
            seed_service_area,
            MARKET_POSITION,
        },
    },
    traits::{AssignmentOutcome, PaymentProvider, ProviderTransaction},
    DispatchApi,
    DispatchDatabase,
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

/// Roughly `km` kilometres north of the market.
fn north_of_market(km: f64) -> Coordinate {
    Coordinate::new(MARKET_POSITION.latitude + km / 111.19, MARKET_POSITION.longitude)
}

#[tokio::test]
async fn payment_confirmation_is_idempotent() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let order = api.create_order(NewOrder::new(101, market.id, Kobo::from_naira(12_500)))
        .await
        .expect("Error creating order");
    assert_eq!(order.status, OrderStatusType::Pending);
    assert!(!order.is_paid());
    let by_number = db.fetch_order_by_number(&order.order_number).await.unwrap().unwrap();
    assert_eq!(by_number.id, order.id);
    let list = db.fetch_shopping_list(order.shopping_list_id).await.unwrap().unwrap();
    assert_eq!(list.status, ShoppingListStatusType::Draft);

    let first = api
        .confirm_payment(order.id, "tx-777", ConfirmationSource::Webhook, &Actor::System)
        .await
        .expect("Error confirming payment");
    assert!(first.success);
    assert!(!first.already_completed);
    // Nobody to assign; the payment still stands.
    assert_eq!(first.assigned_agent_id, None);
    assert_eq!(first.order.payment_id.as_deref(), Some("tx-777"));
    let stamped = first.order.payment_processed_at.expect("payment_processed_at not set");

    let second = api
        .confirm_payment(order.id, "tx-777-replay", ConfirmationSource::Webhook, &Actor::System)
        .await
        .expect("Error on replay");
    assert!(second.already_completed);
    // The replay changed nothing: same payment id, same processing time.
    assert_eq!(second.order.payment_id.as_deref(), Some("tx-777"));
    assert_eq!(second.order.payment_processed_at, Some(stamped));

    let list = db.fetch_shopping_list(order.shopping_list_id).await.unwrap().unwrap();
    assert_eq!(list.status, ShoppingListStatusType::Accepted);
    let trail = db.order_trail(order.id).await.unwrap();
    let confirmations = trail.iter().filter(|t| t.event == TrailEvent::PaymentCompleted).count();
    assert_eq!(confirmations, 1);
    // One note per confirmation, carrying the transaction id, source, and amount. The replay adds none.
    let notes = trail
        .iter()
        .filter(|t| t.event == TrailEvent::Note && t.note.as_deref().map_or(false, |n| n.contains("tx-777")))
        .collect::<Vec<_>>();
    assert_eq!(notes.len(), 1);
    let note = notes[0].note.as_deref().unwrap();
    assert!(note.contains("webhook"));
    assert!(note.contains(&order.total.to_string()));
    assert!(note.contains("No agent assigned yet"));
    tear_down(db).await;
}

#[tokio::test]
async fn confirmed_payment_activates_chat_even_without_an_agent() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let chat = RecordingChat::default();
    let api = DispatchApi::new(db.clone(), OfflineMaps, chat.clone(), EventProducers::default());
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let order = api.create_order(NewOrder::new(101, market.id, Kobo::from_naira(8_000))).await.unwrap();

    api.confirm_payment(order.id, "tx-42", ConfirmationSource::Webhook, &Actor::System).await.unwrap();
    // Nobody on the floor, yet the customer's channel opens.
    assert_eq!(chat.activations(), vec![(order.id, format!("customer:{}", order.customer_id))]);
    // The replay does not re-activate.
    api.confirm_payment(order.id, "tx-42", ConfirmationSource::Webhook, &Actor::System).await.unwrap();
    assert_eq!(chat.activations().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn invalid_amounts_are_rejected_at_checkout() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let err = api
        .create_order(NewOrder::new(101, market.id, Kobo::from_naira(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, dispatch_engine::DispatchError::InvalidAmount(0)));
    tear_down(db).await;
}

#[tokio::test]
async fn busy_nearby_agent_beats_idle_distant_agent() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    // A1: 40 days old, live GPS 1.5km from the market, one active order in this market.
    let a1 = seed_agent(&db, 40).await;
    seed_current_location(&db, a1.id, north_of_market(1.5)).await;
    seed_active_order_for_agent(&db, a1.id, 555, market.id).await;
    // A2: same age, idle, 50km away.
    let a2 = seed_agent(&db, 40).await;
    seed_current_location(&db, a2.id, north_of_market(50.0)).await;
    // Ineligible agents never appear.
    seed_ineligible_agent(&db).await;

    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    let ranked = api.available_agents_for_order(order.id).await.expect("Error ranking agents");
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].agent_id, a1.id);
    assert!(ranked[0].score > ranked[1].score);

    let nearest = api.find_nearest_agent(order.id).await.unwrap().unwrap();
    assert_eq!(nearest.agent_id, a1.id);

    let outcome = api.assign_agent_to_order(order.id).await.expect("Error assigning");
    assert_eq!(outcome.assigned_agent_id(), Some(a1.id));
    let assigned = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(assigned.status, OrderStatusType::Accepted);
    assert_eq!(assigned.agent_id, Some(a1.id));
    assert!(assigned.accepted_at.is_some());
    // Assignment takes the winner off the floor.
    let a1 = db.fetch_agent(a1.id).await.unwrap().unwrap();
    assert_eq!(a1.metadata.current_status, AgentStatus::Busy);
    assert!(!a1.metadata.is_accepting_orders);
    tear_down(db).await;
}

#[tokio::test]
async fn at_capacity_agent_is_excluded() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    // Maxed out right next to the market.
    let maxed = seed_agent(&db, 40).await;
    seed_current_location(&db, maxed.id, north_of_market(0.5)).await;
    for customer in 0..3 {
        seed_active_order_for_agent(&db, maxed.id, 600 + customer, market.id).await;
    }
    // Far away but idle.
    let idle = seed_agent(&db, 40).await;
    seed_service_area(&db, idle.id, north_of_market(30.0), 5.0).await;

    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    let ranked = api.available_agents_for_order(order.id).await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].agent_id, idle.id);
    tear_down(db).await;
}

#[tokio::test]
async fn covering_service_area_wins_a_tie() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    // Both 4km out and otherwise identical; only one declared a radius that covers the market.
    let covering = seed_agent(&db, 40).await;
    seed_service_area(&db, covering.id, north_of_market(4.0), 10.0).await;
    let not_covering = seed_agent(&db, 40).await;
    seed_service_area(&db, not_covering.id, north_of_market(4.0), 1.0).await;

    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    let ranked = api.available_agents_for_order(order.id).await.unwrap();
    assert_eq!(ranked[0].agent_id, covering.id);
    assert_eq!(ranked[0].score - ranked[1].score, dispatch_engine::scoring::SERVICE_AREA_COVERAGE_BONUS);
    tear_down(db).await;
}

#[tokio::test]
async fn full_lifecycle_walk_stamps_timestamps_and_releases_the_agent() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let agent = seed_agent(&db, 40).await;
    seed_current_location(&db, agent.id, north_of_market(1.0)).await;
    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    api.assign_agent_to_order(order.id).await.unwrap();

    let by_agent = Actor::Agent(agent.id);
    let order = api.update_order_status(order.id, OrderStatusType::InProgress, &by_agent).await.unwrap();
    let order = api.update_order_status(order.id, OrderStatusType::Shopping, &by_agent).await.unwrap();
    assert!(order.shopping_started_at.is_some());
    let list = db.fetch_shopping_list(order.shopping_list_id).await.unwrap().unwrap();
    assert_eq!(list.status, ShoppingListStatusType::Processing);
    let order = api.update_order_status(order.id, OrderStatusType::ShoppingCompleted, &by_agent).await.unwrap();
    assert!(order.shopping_completed_at.is_some());
    let order = api.update_order_status(order.id, OrderStatusType::Delivery, &by_agent).await.unwrap();
    assert!(order.delivery_started_at.is_some());
    let order = api.update_order_status(order.id, OrderStatusType::Completed, &by_agent).await.unwrap();
    assert!(order.completed_at.is_some());
    let list = db.fetch_shopping_list(order.shopping_list_id).await.unwrap().unwrap();
    assert_eq!(list.status, ShoppingListStatusType::Completed);
    // Completion puts the agent back on the floor.
    let agent = db.fetch_agent(agent.id).await.unwrap().unwrap();
    assert_eq!(agent.metadata.current_status, AgentStatus::Available);
    assert!(agent.metadata.is_accepting_orders);

    let report = api.validate_status_consistency(order.id).await.unwrap();
    assert!(report.consistent);
    tear_down(db).await;
}

#[tokio::test]
async fn transitions_are_gated_by_table_and_actor() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let agent = seed_agent(&db, 40).await;
    seed_current_location(&db, agent.id, north_of_market(1.0)).await;
    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    api.assign_agent_to_order(order.id).await.unwrap();

    // Skipping a state is rejected.
    let err = api.update_order_status(order.id, OrderStatusType::Shopping, &Actor::System).await.unwrap_err();
    assert!(matches!(err, dispatch_engine::DispatchError::InvalidTransition { .. }));
    // A different agent cannot drive this order.
    let other = seed_agent(&db, 40).await;
    let err = api.update_order_status(order.id, OrderStatusType::InProgress, &Actor::Agent(other.id)).await.unwrap_err();
    assert!(matches!(err, dispatch_engine::DispatchError::Forbidden(_)));
    // The customer can cancel mid-flight, and the agent is released.
    let order = api.update_order_status(order.id, OrderStatusType::Cancelled, &Actor::Customer(101)).await.unwrap();
    assert!(order.cancelled_at.is_some());
    let agent = db.fetch_agent(agent.id).await.unwrap().unwrap();
    assert_eq!(agent.metadata.current_status, AgentStatus::Available);
    tear_down(db).await;
}

#[tokio::test]
async fn sweep_assigns_stranded_orders() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let order = seed_paid_order(&db, 101, market.id, Kobo::from_naira(8_000)).await;
    // Paid while nobody was on the floor.
    assert!(matches!(api.assign_agent_to_order(order.id).await.unwrap(), AssignmentOutcome::NoCandidates));

    let agent = seed_agent(&db, 40).await;
    seed_current_location(&db, agent.id, north_of_market(1.0)).await;
    let api = DispatchApi::new(db.clone(), OfflineMaps, NullChat, EventProducers::default());
    let sweep = ReconciliationSweep::new(api, TestProvider::new(), SweepConfig::default());
    let report = sweep.run_once().await;
    assert_eq!(report.orders_considered, 1);
    assert_eq!(report.assigned, 1);
    assert_eq!(report.errors, 0);
    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.agent_id, Some(agent.id));
    tear_down(db).await;
}

#[tokio::test]
async fn sweep_resolves_stale_payments_from_the_provider() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let provider = TestProvider::new();

    // Order 1: the provider says the money arrived, but the webhook never did.
    let (paid_order, account) =
        api.checkout(NewOrder::new(101, market.id, Kobo::from_naira(8_000)), "testpay", &provider)
            .await
            .expect("Error during checkout");
    provider.set_transaction(ProviderTransaction {
        provider_tx_id: account.reference.clone(),
        status: PaymentStatusType::Completed,
        amount: paid_order.total,
        raw: serde_json::json!({"status": "successful"}),
    });
    // Order 2: the provider has never heard of the transaction.
    let (ghost_order, _) =
        api.checkout(NewOrder::new(102, market.id, Kobo::from_naira(3_000)), "testpay", &provider)
            .await
            .expect("Error during checkout");
    // Backdate both records past the expiry window.
    sqlx::query("UPDATE payment_records SET updated_at = datetime('now', '-2 days')")
        .execute(db.pool())
        .await
        .unwrap();

    let api = DispatchApi::new(db.clone(), OfflineMaps, NullChat, EventProducers::default());
    let sweep = ReconciliationSweep::new(api, provider, SweepConfig::default());
    let report = sweep.run_once().await;
    assert_eq!(report.payments_confirmed, 1);
    assert_eq!(report.payments_expired, 1);

    let order = db.fetch_order(paid_order.id).await.unwrap().unwrap();
    assert!(order.is_paid());
    let order = db.fetch_order(ghost_order.id).await.unwrap().unwrap();
    assert!(!order.is_paid());
    tear_down(db).await;
}

#[tokio::test]
async fn checkout_registers_a_pending_payment_once() {
    let (api, db) = setup().await;
    let market = seed_market(&db, "Balogun", MARKET_POSITION).await;
    let provider = TestProvider::new();
    let (order, account) = api
        .checkout(NewOrder::new(101, market.id, Kobo::from_naira(8_000)), "testpay", &provider)
        .await
        .unwrap();
    assert_eq!(account.reference, format!("VA-{}", order.id));
    // A retried registration for the same (order, provider) pair is a no-op.
    let replay = provider.generate_virtual_account(order.id, order.total).await.unwrap();
    let record = db
        .upsert_pending_payment(NewPaymentRecord::new(
            order.id,
            "testpay",
            replay.reference,
            order.total,
        ))
        .await
        .unwrap();
    assert_eq!(record.provider_tx_id, account.reference);
    tear_down(db).await;
}

#[tokio::test]
async fn presence_updates_require_kyc() {
    let (_api, db) = setup().await;
    let unverified = seed_ineligible_agent(&db).await;
    let err = db.update_agent_presence(unverified.id, AgentStatus::Available, true).await.unwrap_err();
    assert!(matches!(err, dispatch_engine::DispatchError::KycNotVerified(_)));
    // Going Away is fine without KYC.
    let agent = db.update_agent_presence(unverified.id, AgentStatus::Away, false).await.unwrap();
    assert_eq!(agent.metadata.current_status, AgentStatus::Away);
    tear_down(db).await;
}
