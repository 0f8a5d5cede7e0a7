use std::fmt::Debug;

use chrono::Utc;
use dsp_common::geo::{haversine_distance, Coordinate};
use log::*;

use crate::{
    db_types::{Actor, ConfirmationSource, NewOrder, NewPaymentRecord, Order, OrderStatusType},
    dispatch_api::dispatch_objects::{PaymentConfirmation, RejectionResolution},
    events::{AgentRejectedEvent, EventProducers, OrderAssignedEvent, OrderCancelledEvent, PaymentConfirmedEvent},
    scoring::{self, LocationDistance, ScoredCandidate},
    traits::{
        AssignmentOutcome,
        ChatService,
        DispatchDatabase,
        DispatchError,
        DistanceService,
        PaymentConfirmOutcome,
        PaymentProvider,
        RejectionOutcome,
        StatusConsistencyReport,
        VirtualAccount,
    },
};

/// `DispatchApi` is the primary API for the order fulfillment dispatch engine. It orchestrates checkout, payment
/// confirmation, agent scoring and assignment, the rejection/reassignment loop, and lifecycle transitions over any
/// [`DispatchDatabase`] backend.
///
/// The database owns atomicity; this layer owns sequencing and the side effects that must never roll back a
/// committed write (auto-assignment after payment, chat activation, event hooks).
pub struct DispatchApi<B, D, C> {
    db: B,
    distance: D,
    chat: C,
    producers: EventProducers,
}

impl<B, D, C> Debug for DispatchApi<B, D, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchApi")
    }
}

impl<B, D, C> DispatchApi<B, D, C> {
    pub fn new(db: B, distance: D, chat: C, producers: EventProducers) -> Self {
        Self { db, distance, chat, producers }
    }
}

impl<B, D, C> DispatchApi<B, D, C>
where
    B: DispatchDatabase,
    D: DistanceService,
    C: ChatService,
{
    pub fn db(&self) -> &B {
        &self.db
    }

    /// Converts a priced shopping list into a `Pending` order.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, DispatchError> {
        let order = self.db.create_order(order).await?;
        debug!("🔄️📦️ Order {} created. Awaiting payment.", order.order_number);
        Ok(order)
    }

    /// Full checkout: creates the order, asks the provider for a dedicated virtual account, and registers the
    /// pending payment so that the expiry sweep can track it.
    pub async fn checkout<P: PaymentProvider>(
        &self,
        order: NewOrder,
        provider_name: &str,
        provider: &P,
    ) -> Result<(Order, VirtualAccount), DispatchError> {
        let order = self.db.create_order(order).await?;
        let account = provider
            .generate_virtual_account(order.id, order.total)
            .await
            .map_err(|e| DispatchError::PaymentProviderFailure(e.to_string()))?;
        let record = NewPaymentRecord::new(order.id, provider_name, account.reference.clone(), order.total)
            .with_idempotency_key(format!("checkout-{}", order.order_number));
        self.db.upsert_pending_payment(record).await?;
        info!("🔄️📦️ Checkout complete for order {}. Virtual account {} issued.", order.order_number, account.account_number);
        Ok((order, account))
    }

    /// Confirms a payment and then tries to place the order with an agent.
    ///
    /// The payment write commits first and is idempotent: replayed webhooks and webhook/poll races resolve to
    /// `already_completed` with no further side effects. Everything after the commit is strictly best-effort and
    /// never rolls the payment back: auto-assignment (a failure is logged and the order stays `Pending` for the
    /// sweep), the customer's chat channel activation, and a trail note recording the transaction id, confirmation
    /// source, amount, and the assigned agent if one was found.
    pub async fn confirm_payment(
        &self,
        order_id: i64,
        provider_tx_id: &str,
        source: ConfirmationSource,
        performed_by: &Actor,
    ) -> Result<PaymentConfirmation, DispatchError> {
        trace!("🔄️💳️ Payment for order {order_id} is being confirmed via {source} (provider tx {provider_tx_id})");
        let outcome = self.db.mark_payment_completed(order_id, provider_tx_id, performed_by).await?;
        let (order, already_completed) = match outcome {
            PaymentConfirmOutcome::Confirmed(order) => {
                self.call_payment_confirmed_hook(&order).await;
                (order, false)
            },
            PaymentConfirmOutcome::AlreadyCompleted(order) => {
                debug!("🔄️💳️ Payment for order {} was already confirmed. No side effects.", order.order_number);
                return Ok(PaymentConfirmation {
                    success: true,
                    assigned_agent_id: order.agent_id,
                    order,
                    already_completed: true,
                });
            },
        };
        let assigned_agent_id = if order.agent_id.is_none() {
            match self.assign_agent_to_order(order.id).await {
                Ok(outcome) => outcome.assigned_agent_id(),
                Err(e) => {
                    warn!(
                        "🔄️💳️ Payment for order {} is confirmed, but auto-assignment failed: {e}. The order stays \
                         Pending for the reconciliation sweep.",
                        order.order_number
                    );
                    None
                },
            }
        } else {
            order.agent_id
        };
        let order = self.db.fetch_order(order_id).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        let note = match assigned_agent_id {
            Some(agent_id) => {
                format!("Payment {provider_tx_id} ({}) confirmed via {source}. Assigned to agent {agent_id}.", order.total)
            },
            None => format!("Payment {provider_tx_id} ({}) confirmed via {source}. No agent assigned yet.", order.total),
        };
        if let Err(e) = self.db.append_trail_note(order_id, performed_by, &note).await {
            warn!("🔄️💳️ Could not record the confirmation note for order {}: {e}", order.order_number);
        }
        self.activate_chat(&order, &format!("customer:{}", order.customer_id)).await;
        Ok(PaymentConfirmation { success: true, order, assigned_agent_id, already_completed })
    }

    /// Scores the eligible agents for the order and ranks them. Exposed for ops tooling; assignment uses the same
    /// list internally.
    pub async fn available_agents_for_order(&self, order_id: i64) -> Result<Vec<ScoredCandidate>, DispatchError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        self.scored_candidates(&order).await
    }

    pub async fn find_nearest_agent(&self, order_id: i64) -> Result<Option<ScoredCandidate>, DispatchError> {
        let ranked = self.available_agents_for_order(order_id).await?;
        Ok(ranked.into_iter().next())
    }

    /// One bounded assignment attempt: score, rank, then walk the short-list in order. An agent that went busy
    /// between scoring and the assignment transaction is skipped; running out of candidates is a value, not an
    /// error.
    pub async fn assign_agent_to_order(&self, order_id: i64) -> Result<AssignmentOutcome, DispatchError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(DispatchError::OrderNotFound(order_id))?;
        let ranked = self.scored_candidates(&order).await?;
        if ranked.is_empty() {
            info!("🔄️🧭️ No suitable agents for order {}. It stays in the queue.", order.order_number);
            return Ok(AssignmentOutcome::NoCandidates);
        }
        for candidate in ranked {
            match self.db.assign_agent(order_id, candidate.agent_id).await {
                Ok(order) => {
                    let agent_id = candidate.agent_id;
                    self.activate_chat(&order, &format!("agent:{agent_id}")).await;
                    self.call_order_assigned_hook(&order, agent_id).await;
                    return Ok(AssignmentOutcome::Assigned { order, agent_id });
                },
                Err(DispatchError::AgentUnavailable(agent_id)) => {
                    debug!("🔄️🧭️ Agent {agent_id} became unavailable before order {order_id} could be assigned. Trying the next candidate.");
                    continue;
                },
                Err(e) => return Err(e),
            }
        }
        info!("🔄️🧭️ Every short-listed agent for order {order_id} became unavailable. It stays in the queue.");
        Ok(AssignmentOutcome::NoCandidates)
    }

    /// Handles an agent declining a job, then immediately tries to place the order with someone else. Agents that
    /// have already rejected the order are excluded from the retry.
    pub async fn handle_agent_rejection(
        &self,
        order_id: i64,
        agent_id: i64,
        reason: &str,
    ) -> Result<RejectionResolution, DispatchError> {
        let outcome = self.db.record_rejection(order_id, agent_id, reason).await?;
        match &outcome {
            RejectionOutcome::AwaitingReassignment { order, .. } => {
                self.call_agent_rejected_hook(order, agent_id, reason).await;
                let reassignment = match self.assign_agent_to_order(order_id).await {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        warn!("🔄️🧭️ Reassignment of order {} failed: {e}. The sweep will retry.", order.order_number);
                        None
                    },
                };
                Ok(RejectionResolution { outcome, reassignment })
            },
            RejectionOutcome::Cancelled(order) => {
                self.call_agent_rejected_hook(order, agent_id, reason).await;
                self.call_order_cancelled_hook(order, "maximum rejections reached").await;
                Ok(RejectionResolution { outcome, reassignment: None })
            },
        }
    }

    /// Applies a lifecycle transition on behalf of `actor`. Permission and transition checks live in the backend;
    /// this layer adds the cancellation hook.
    pub async fn update_order_status(
        &self,
        order_id: i64,
        new_status: OrderStatusType,
        actor: &Actor,
    ) -> Result<Order, DispatchError> {
        let order = self.db.update_order_status(order_id, new_status, actor).await?;
        if new_status == OrderStatusType::Cancelled {
            self.call_order_cancelled_hook(&order, &format!("cancelled by {actor}")).await;
        }
        Ok(order)
    }

    /// Paid orders still waiting for an agent, oldest first.
    pub async fn pending_agent_assignment_orders(&self, limit: i64) -> Result<Vec<Order>, DispatchError> {
        self.db.pending_agent_assignment_orders(limit).await
    }

    pub async fn validate_status_consistency(&self, order_id: i64) -> Result<StatusConsistencyReport, DispatchError> {
        let report = self.db.status_consistency(order_id).await?;
        if !report.consistent {
            warn!(
                "🔄️🗃️ Order {order_id} drift: shopping list is {} but ({}, {}) implies {}",
                report.actual_list_status, report.order_status, report.payment_status, report.expected_list_status
            );
        }
        Ok(report)
    }

    //----------------------------------- scoring and distance resolution --------------------------------------------

    /// Resolves a distance through the external service, falling back to the great-circle distance when the service
    /// is down. Degraded mode is logged but never fails dispatch.
    async fn resolve_distance(&self, from: Coordinate, to: Coordinate) -> f64 {
        match self.distance.calculate_distance(from, to).await {
            Ok(d) => d,
            Err(e) => {
                warn!("🔄️🧭️ Distance service degraded ({e}). Falling back to the Haversine estimate.");
                haversine_distance(from, to)
            },
        }
    }

    async fn scored_candidates(&self, order: &Order) -> Result<Vec<ScoredCandidate>, DispatchError> {
        let list = self
            .db
            .fetch_shopping_list(order.shopping_list_id)
            .await?
            .ok_or(DispatchError::ShoppingListNotFound(order.shopping_list_id))?;
        let market =
            self.db.fetch_market(list.market_id).await?.ok_or(DispatchError::MarketNotFound(list.market_id))?;
        let excluded = self.db.rejected_agent_ids(order.id).await?;
        let candidates = self.db.eligible_agents(list.market_id, &excluded).await?;
        let now = Utc::now();
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut distances = Vec::with_capacity(candidate.locations.len());
            for location in &candidate.locations {
                let distance_km = self.resolve_distance(location.coordinate(), market.coordinate()).await;
                distances.push(LocationDistance {
                    location_type: location.location_type,
                    distance_km,
                    radius_km: location.radius_km,
                });
            }
            scored.push(scoring::score_candidate(
                candidate.profile.id,
                candidate.profile.account_age_days(now),
                candidate.active_in_market,
                candidate.active_elsewhere,
                &distances,
            ));
        }
        Ok(scoring::rank_candidates(scored))
    }

    //----------------------------------------- side-effect helpers --------------------------------------------------

    /// Chat activation is fire-and-forget. A chat outage must never undo a committed payment or assignment.
    async fn activate_chat(&self, order: &Order, participant: &str) {
        if let Err(e) = self.chat.activate_chat(order.id, participant).await {
            warn!("🔄️💬️ Chat activation for order {} failed: {e}", order.order_number);
        }
    }

    async fn call_payment_confirmed_hook(&self, order: &Order) {
        for emitter in &self.producers.payment_confirmed_producer {
            debug!("🔄️💳️ Notifying payment confirmed subscribers");
            emitter.publish_event(PaymentConfirmedEvent::new(order.clone())).await;
        }
    }

    async fn call_order_assigned_hook(&self, order: &Order, agent_id: i64) {
        for emitter in &self.producers.order_assigned_producer {
            debug!("🔄️🧭️ Notifying order assigned subscribers");
            emitter.publish_event(OrderAssignedEvent::new(order.clone(), agent_id)).await;
        }
    }

    async fn call_agent_rejected_hook(&self, order: &Order, agent_id: i64, reason: &str) {
        for emitter in &self.producers.agent_rejected_producer {
            debug!("🔄️🧭️ Notifying agent rejected subscribers");
            emitter.publish_event(AgentRejectedEvent::new(order.clone(), agent_id, reason)).await;
        }
    }

    async fn call_order_cancelled_hook(&self, order: &Order, reason: &str) {
        for emitter in &self.producers.order_cancelled_producer {
            debug!("🔄️📦️ Notifying order cancelled subscribers");
            emitter.publish_event(OrderCancelledEvent::new(order.clone(), reason)).await;
        }
    }
}
