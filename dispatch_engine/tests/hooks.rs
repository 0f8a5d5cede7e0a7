//! Event hook wiring: subscribers see dispatch events after the underlying transactions commit.

use std::{
    future::Future,
    pin::Pin,
    sync::{atomic::AtomicI32, Arc},
};

use dsp_common::Kobo;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use dispatch_engine::{
    db_types::{Actor, ConfirmationSource, NewOrder},
    events::{EventHandlers, EventHooks},
    test_utils::{
        doubles::{NullChat, OfflineMaps},
        prepare_env::{prepare_test_env, random_db_path},
        seeds::{seed_agent, seed_current_location, seed_market, MARKET_POSITION},
    },
    DispatchApi,
    DispatchDatabase,
    SqliteDatabase,
};

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    fn called(&self) {
        let _ = self.called.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn count(&self) -> i32 {
        self.called.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[tokio::test]
async fn payment_and_assignment_hooks_fire() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");

    let paid = HookCalled::default();
    let assigned = HookCalled::default();
    let mut hooks = EventHooks::default();
    let paid_copy = paid.clone();
    hooks.on_payment_confirmed(move |ev| {
        info!("🪝️ payment confirmed for {}", ev.order.order_number);
        paid_copy.called();
        Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let assigned_copy = assigned.clone();
    hooks.on_order_assigned(move |ev| {
        info!("🪝️ order {} assigned to agent {}", ev.order.order_number, ev.agent_id);
        assigned_copy.called();
        Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let market = seed_market(&db, "Mile 12", MARKET_POSITION).await;
    let agent = seed_agent(&db, 40).await;
    seed_current_location(&db, agent.id, MARKET_POSITION).await;

    let api = DispatchApi::new(db.clone(), OfflineMaps, NullChat, producers);
    let order = api.create_order(NewOrder::new(101, market.id, Kobo::from_naira(8_000))).await.unwrap();
    let confirmation =
        api.confirm_payment(order.id, "tx-1", ConfirmationSource::Webhook, &Actor::System).await.unwrap();
    assert_eq!(confirmation.assigned_agent_id, Some(agent.id));
    // The replay must not fire the hook again.
    api.confirm_payment(order.id, "tx-1", ConfirmationSource::Webhook, &Actor::System).await.unwrap();

    // Hand the runtime to the handler tasks.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    assert_eq!(paid.count(), 1);
    assert_eq!(assigned.count(), 1);

    let mut db = db;
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}
