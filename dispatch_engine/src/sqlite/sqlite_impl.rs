use chrono::Duration;
use dsp_common::geo::Coordinate;
use log::{debug, info};
use sqlx::SqlitePool;

use crate::{
    db_types::{
        Actor,
        AgentLocation,
        AgentProfile,
        AgentStatus,
        Market,
        NewOrder,
        NewPaymentRecord,
        Order,
        OrderNumber,
        OrderStatusType,
        OrderTrailEntry,
        PaymentRecord,
        PaymentStatusType,
        RejectedAgent,
        ShoppingList,
        TrailEvent,
    },
    helpers::new_order_number,
    lifecycle,
    sqlite::db,
    traits::{
        AgentCandidate,
        DispatchDatabase,
        DispatchError,
        PaymentConfirmOutcome,
        RejectionOutcome,
        StatusConsistencyReport,
        MAX_REJECTIONS,
    },
};

/// The SQLite implementation of [`DispatchDatabase`]. Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the DISPATCH_DATABASE_URL environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, DispatchError> {
        let url = db::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, DispatchError> {
        let pool = db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl DispatchDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, DispatchError> {
        if !order.total.is_positive() {
            return Err(DispatchError::InvalidAmount(order.total.value()));
        }
        let mut tx = self.pool.begin().await?;
        // SQLite does not always enforce FKs, so check the market explicitly.
        let _market = db::markets::fetch_market(order.market_id, &mut tx)
            .await?
            .ok_or(DispatchError::MarketNotFound(order.market_id))?;
        let list = db::shopping_lists::insert_list(order.customer_id, order.market_id, order.total, &mut tx).await?;
        let number = new_order_number();
        let order = db::orders::insert_order(&number, order.customer_id, list.id, order.total, &mut tx).await?;
        db::order_trail::append(
            order.id,
            TrailEvent::Note,
            None,
            Some(OrderStatusType::Pending),
            &Actor::Customer(order.customer_id),
            Some("order created at checkout"),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("📝️ Order {} created for customer {} ({})", order.order_number, order.customer_id, order.total);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let order = db::orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let order = db::orders::fetch_order_by_number(number, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_shopping_list(&self, list_id: i64) -> Result<Option<ShoppingList>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let list = db::shopping_lists::fetch_list(list_id, &mut conn).await?;
        Ok(list)
    }

    async fn fetch_market(&self, market_id: i64) -> Result<Option<Market>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let market = db::markets::fetch_market(market_id, &mut conn).await?;
        Ok(market)
    }

    async fn fetch_agent(&self, agent_id: i64) -> Result<Option<AgentProfile>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let agent = db::agents::fetch_agent(agent_id, &mut conn).await?;
        Ok(agent)
    }

    async fn eligible_agents(&self, market_id: i64, exclude: &[i64]) -> Result<Vec<AgentCandidate>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let profiles = db::agents::eligible_agents(exclude, &mut conn).await?;
        let mut candidates = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let locations = db::agent_locations::active_for_agent(profile.id, &mut conn).await?;
            let (active_in_market, active_elsewhere) =
                db::orders::active_counts(profile.id, market_id, &mut conn).await?;
            candidates.push(AgentCandidate { profile, locations, active_in_market, active_elsewhere });
        }
        debug!("🧭️ {} eligible agents for market {market_id} ({} excluded)", candidates.len(), exclude.len());
        Ok(candidates)
    }

    async fn rejected_agent_ids(&self, order_id: i64) -> Result<Vec<i64>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let ids = db::orders::rejected_agent_ids(order_id, &mut conn).await?;
        Ok(ids)
    }

    async fn rejections_for_order(&self, order_id: i64) -> Result<Vec<RejectedAgent>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let rejections = db::orders::rejections_for_order(order_id, &mut conn).await?;
        Ok(rejections)
    }

    async fn mark_payment_completed(
        &self,
        order_id: i64,
        provider_tx_id: &str,
        performed_by: &Actor,
    ) -> Result<PaymentConfirmOutcome, DispatchError> {
        let mut tx = self.pool.begin().await?;
        let order =
            db::orders::fetch_order(order_id, &mut tx).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        if order.is_paid() {
            debug!(
                "💳️ Order {} is already paid (payment id {:?}). Confirmation for {provider_tx_id} is a no-op.",
                order.order_number, order.payment_id
            );
            return Ok(PaymentConfirmOutcome::AlreadyCompleted(order));
        }
        let order = db::orders::mark_payment_completed(order_id, provider_tx_id, &mut tx).await?;
        let list_status = lifecycle::shopping_list_status_for(order.status, order.payment_status);
        db::shopping_lists::update_status(order.shopping_list_id, list_status, &mut tx).await?;
        db::payments::complete_matching_pending(order_id, provider_tx_id, &mut tx).await?;
        db::order_trail::append(
            order_id,
            TrailEvent::PaymentCompleted,
            None,
            None,
            performed_by,
            Some(&format!("payment confirmed (provider tx {provider_tx_id})")),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("💳️ Payment for order {} confirmed by {performed_by} (provider tx {provider_tx_id})", order.order_number);
        Ok(PaymentConfirmOutcome::Confirmed(order))
    }

    async fn assign_agent(&self, order_id: i64, agent_id: i64) -> Result<Order, DispatchError> {
        let mut tx = self.pool.begin().await?;
        let order =
            db::orders::fetch_order(order_id, &mut tx).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        if !matches!(order.status, OrderStatusType::Pending | OrderStatusType::Accepted) {
            return Err(DispatchError::InvalidTransition { from: order.status, to: OrderStatusType::Accepted });
        }
        let agent =
            db::agents::fetch_agent(agent_id, &mut tx).await?.ok_or(DispatchError::AgentNotFound(agent_id))?;
        // Re-check inside the transaction. An agent that went Busy or stopped accepting since the candidate query
        // loses the race.
        if agent.is_deactivated ||
            agent.metadata.current_status != AgentStatus::Available ||
            !agent.metadata.is_accepting_orders
        {
            return Err(DispatchError::AgentUnavailable(agent_id));
        }
        let previous = order.status;
        let order = db::orders::set_agent(order_id, agent_id, &mut tx).await?;
        db::shopping_lists::set_agent(order.shopping_list_id, Some(agent_id), &mut tx).await?;
        db::agents::set_availability(agent_id, AgentStatus::Busy, false, &mut tx).await?;
        db::order_trail::append(
            order_id,
            TrailEvent::AgentAssigned,
            Some(previous),
            Some(OrderStatusType::Accepted),
            &Actor::System,
            Some(&format!("agent {agent_id} assigned")),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("📝️ Order {} assigned to agent {agent_id}", order.order_number);
        Ok(order)
    }

    async fn record_rejection(
        &self,
        order_id: i64,
        agent_id: i64,
        reason: &str,
    ) -> Result<RejectionOutcome, DispatchError> {
        let mut tx = self.pool.begin().await?;
        let order =
            db::orders::fetch_order(order_id, &mut tx).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        if order.agent_id != Some(agent_id) {
            return Err(DispatchError::Forbidden(format!(
                "agent:{agent_id} is not the assigned agent for order {order_id}"
            )));
        }
        if order.status != OrderStatusType::Accepted {
            return Err(DispatchError::RejectionNotAllowed {
                order_id,
                reason: format!("the job has already started ({})", order.status),
            });
        }
        let mut excluded = db::orders::rejected_agent_ids(order_id, &mut tx).await?;
        if excluded.contains(&agent_id) {
            return Err(DispatchError::DuplicateRejection { order_id, agent_id });
        }
        let count = db::orders::insert_rejection(order_id, agent_id, reason, &mut tx).await?;
        excluded.push(agent_id);
        db::agents::set_availability(agent_id, AgentStatus::Available, true, &mut tx).await?;
        db::order_trail::append(
            order_id,
            TrailEvent::AgentRejected,
            Some(OrderStatusType::Accepted),
            None,
            &Actor::Agent(agent_id),
            Some(reason),
            &mut tx,
        )
        .await?;
        let outcome = if count >= MAX_REJECTIONS {
            db::orders::clear_agent(order_id, &mut tx).await?;
            let order = db::orders::update_status(order_id, OrderStatusType::Cancelled, &mut tx).await?;
            db::shopping_lists::set_agent(order.shopping_list_id, None, &mut tx).await?;
            db::shopping_lists::update_status(
                order.shopping_list_id,
                lifecycle::shopping_list_status_for(order.status, order.payment_status),
                &mut tx,
            )
            .await?;
            db::order_trail::append(
                order_id,
                TrailEvent::OrderCancelled,
                Some(OrderStatusType::Accepted),
                Some(OrderStatusType::Cancelled),
                &Actor::System,
                Some(&format!("cancelled after {count} rejections")),
                &mut tx,
            )
            .await?;
            info!("📝️ Order {} cancelled after {count} rejections", order.order_number);
            RejectionOutcome::Cancelled(order)
        } else {
            let order = db::orders::clear_agent(order_id, &mut tx).await?;
            db::shopping_lists::set_agent(order.shopping_list_id, None, &mut tx).await?;
            db::shopping_lists::update_status(
                order.shopping_list_id,
                lifecycle::shopping_list_status_for(order.status, order.payment_status),
                &mut tx,
            )
            .await?;
            info!(
                "📝️ Agent {agent_id} rejected order {} ({count}/{MAX_REJECTIONS}). Awaiting reassignment.",
                order.order_number
            );
            RejectionOutcome::AwaitingReassignment { order, excluded }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        new_status: OrderStatusType,
        actor: &Actor,
    ) -> Result<Order, DispatchError> {
        let mut tx = self.pool.begin().await?;
        let order =
            db::orders::fetch_order(order_id, &mut tx).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        lifecycle::check_actor_permission(actor, &order, new_status)?;
        if !lifecycle::is_valid_transition(order.status, new_status) {
            return Err(DispatchError::InvalidTransition { from: order.status, to: new_status });
        }
        let previous = order.status;
        let updated = db::orders::update_status(order_id, new_status, &mut tx).await?;
        let list_status = lifecycle::shopping_list_status_for(new_status, updated.payment_status);
        db::shopping_lists::update_status(updated.shopping_list_id, list_status, &mut tx).await?;
        if new_status.is_terminal() {
            if let Some(agent_id) = updated.agent_id {
                db::agents::set_availability(agent_id, AgentStatus::Available, true, &mut tx).await?;
            }
        }
        db::order_trail::append(order_id, TrailEvent::StatusChanged, Some(previous), Some(new_status), actor, None, &mut tx)
            .await?;
        tx.commit().await?;
        info!("📝️ Order {} moved {previous} → {new_status} by {actor}", updated.order_number);
        Ok(updated)
    }

    async fn pending_agent_assignment_orders(&self, limit: i64) -> Result<Vec<Order>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let orders = db::orders::pending_assignment(limit, &mut conn).await?;
        Ok(orders)
    }

    async fn update_agent_presence(
        &self,
        agent_id: i64,
        status: AgentStatus,
        is_accepting_orders: bool,
    ) -> Result<AgentProfile, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let agent = db::agents::update_presence(agent_id, status, is_accepting_orders, &mut conn).await?;
        Ok(agent)
    }

    async fn record_current_location(
        &self,
        agent_id: i64,
        position: Coordinate,
    ) -> Result<AgentLocation, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let location = db::agent_locations::upsert_current_location(agent_id, position, &mut conn).await?;
        Ok(location)
    }

    async fn add_service_area(
        &self,
        agent_id: i64,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<AgentLocation, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let location = db::agent_locations::insert_service_area(agent_id, center, radius_km, &mut conn).await?;
        Ok(location)
    }

    async fn upsert_pending_payment(&self, record: NewPaymentRecord) -> Result<PaymentRecord, DispatchError> {
        if !record.amount.is_positive() {
            return Err(DispatchError::InvalidAmount(record.amount.value()));
        }
        let mut conn = self.pool.acquire().await?;
        let record = db::payments::idempotent_insert(record, &mut conn).await?;
        Ok(record)
    }

    async fn stale_pending_payments(&self, older_than: Duration) -> Result<Vec<PaymentRecord>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let records = db::payments::stale_pending(older_than, &mut conn).await?;
        Ok(records)
    }

    async fn mark_payment_record(
        &self,
        record_id: i64,
        status: PaymentStatusType,
        raw_response: Option<&serde_json::Value>,
    ) -> Result<(), DispatchError> {
        let mut conn = self.pool.acquire().await?;
        db::payments::update_record_status(record_id, status, raw_response, &mut conn).await?;
        Ok(())
    }

    async fn append_trail_note(&self, order_id: i64, actor: &Actor, note: &str) -> Result<(), DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let order =
            db::orders::fetch_order(order_id, &mut conn).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        db::order_trail::append(order.id, TrailEvent::Note, None, None, actor, Some(note), &mut conn).await?;
        Ok(())
    }

    async fn order_trail(&self, order_id: i64) -> Result<Vec<OrderTrailEntry>, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let entries = db::order_trail::for_order(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn status_consistency(&self, order_id: i64) -> Result<StatusConsistencyReport, DispatchError> {
        let mut conn = self.pool.acquire().await?;
        let order =
            db::orders::fetch_order(order_id, &mut conn).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        let list = db::shopping_lists::fetch_list(order.shopping_list_id, &mut conn)
            .await?
            .ok_or(DispatchError::ShoppingListNotFound(order.shopping_list_id))?;
        let expected = lifecycle::shopping_list_status_for(order.status, order.payment_status);
        Ok(StatusConsistencyReport {
            order_id,
            order_status: order.status,
            payment_status: order.payment_status,
            expected_list_status: expected,
            actual_list_status: list.status,
            consistent: expected == list.status,
        })
    }

    async fn close(&mut self) -> Result<(), DispatchError> {
        self.pool.close().await;
        Ok(())
    }
}
