use chrono::Duration;
use dsp_common::geo::Coordinate;
use thiserror::Error;

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
    },
    traits::data_objects::{AgentCandidate, PaymentConfirmOutcome, RejectionOutcome, StatusConsistencyReport},
};

/// After this many distinct agents reject an order, the order is cancelled instead of being reassigned.
pub const MAX_REJECTIONS: i64 = 5;

/// This trait defines the behaviour a storage backend must provide to power the dispatch engine.
///
/// This behaviour includes:
/// * Checkout: creating an order and its shopping list in one atomic transaction.
/// * The order lifecycle state machine, including the actor permission gate and all status side effects.
/// * Payment confirmation bookkeeping (idempotent).
/// * Agent candidate queries for the scoring engine, and the assignment/rejection transactions.
/// * The append-only order trail.
///
/// Every method that writes more than one entity must do so inside a single transaction; the transaction is the unit
/// of rollback.
#[allow(async_fn_in_trait)]
pub trait DispatchDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Converts a priced shopping list into an order. The shopping list and order rows are created together in one
    /// transaction; the order number is generated here and never changes.
    async fn create_order(&self, order: NewOrder) -> Result<Order, DispatchError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, DispatchError>;

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, DispatchError>;

    async fn fetch_shopping_list(&self, list_id: i64) -> Result<Option<ShoppingList>, DispatchError>;

    async fn fetch_market(&self, market_id: i64) -> Result<Option<Market>, DispatchError>;

    async fn fetch_agent(&self, agent_id: i64) -> Result<Option<AgentProfile>, DispatchError>;

    /// The agent candidate repository. Returns agents passing every hard eligibility filter (KYC verified, active,
    /// Available, accepting orders, not excluded), joined with their active locations and their active-order
    /// workload split into the target market vs elsewhere.
    ///
    /// `exclude` must always contain the ids of agents that have already rejected the order being dispatched.
    async fn eligible_agents(&self, market_id: i64, exclude: &[i64]) -> Result<Vec<AgentCandidate>, DispatchError>;

    /// Ids of agents that have rejected this order, in rejection order.
    async fn rejected_agent_ids(&self, order_id: i64) -> Result<Vec<i64>, DispatchError>;

    async fn rejections_for_order(&self, order_id: i64) -> Result<Vec<RejectedAgent>, DispatchError>;

    /// Idempotently marks the order's payment as completed.
    ///
    /// In a single transaction: load the order and shopping list, short-circuit if the payment is already
    /// `Completed`, otherwise record the payment id and processing time, advance the shopping list to `Accepted`,
    /// complete the matching pending payment record, and write a `payment_completed` trail row.
    async fn mark_payment_completed(
        &self,
        order_id: i64,
        provider_tx_id: &str,
        performed_by: &Actor,
    ) -> Result<PaymentConfirmOutcome, DispatchError>;

    /// Assigns the agent to the order in a single transaction.
    ///
    /// The order must be `Pending` or `Accepted` (the latter supports reassignment). The agent's availability is
    /// re-checked inside the transaction; an agent that stopped accepting orders in the meantime loses the race and
    /// the call fails with [`DispatchError::AgentUnavailable`].
    async fn assign_agent(&self, order_id: i64, agent_id: i64) -> Result<Order, DispatchError>;

    /// Records an agent declining a job they have not started.
    ///
    /// The agent must be the current assignee and the order must be `Accepted`. A repeat rejection by the same agent
    /// fails. When the rejection count reaches the maximum the order is cancelled outright; otherwise the order
    /// returns to `Pending` awaiting reassignment. The rejecting agent is released to `Available` either way.
    async fn record_rejection(
        &self,
        order_id: i64,
        agent_id: i64,
        reason: &str,
    ) -> Result<RejectionOutcome, DispatchError>;

    /// Applies an order status transition, enforcing the actor permission gate and the transition table, setting
    /// per-transition timestamps exactly once, keeping the shopping list in lock-step, releasing the agent on
    /// terminal statuses, and writing one trail row.
    async fn update_order_status(
        &self,
        order_id: i64,
        new_status: OrderStatusType,
        actor: &Actor,
    ) -> Result<Order, DispatchError>;

    /// Paid orders still awaiting an agent, oldest first. The background sweep feeds these back into assignment.
    async fn pending_agent_assignment_orders(&self, limit: i64) -> Result<Vec<Order>, DispatchError>;

    /// The only availability writer outside assignment and the lifecycle machine. Going `Available` requires a
    /// verified KYC; `kyc_complete` is auto-healed to match `is_kyc_verified` when the two disagree.
    async fn update_agent_presence(
        &self,
        agent_id: i64,
        status: AgentStatus,
        is_accepting_orders: bool,
    ) -> Result<AgentProfile, DispatchError>;

    /// Overwrites the agent's live GPS position. There is at most one active current-location row per agent.
    async fn record_current_location(&self, agent_id: i64, position: Coordinate)
        -> Result<AgentLocation, DispatchError>;

    async fn add_service_area(
        &self,
        agent_id: i64,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<AgentLocation, DispatchError>;

    /// Registers a pending provider transaction for the order. Idempotent on the (order, provider) pair: if a
    /// pending record already exists it is returned unchanged.
    async fn upsert_pending_payment(&self, record: NewPaymentRecord) -> Result<PaymentRecord, DispatchError>;

    /// Pending payment records that have not been updated for at least `older_than`. The expiry sweep re-queries the
    /// provider for these rather than assuming an outcome.
    async fn stale_pending_payments(&self, older_than: Duration) -> Result<Vec<PaymentRecord>, DispatchError>;

    async fn mark_payment_record(
        &self,
        record_id: i64,
        status: PaymentStatusType,
        raw_response: Option<&serde_json::Value>,
    ) -> Result<(), DispatchError>;

    /// Appends a free-form note to the order trail. Notes may be added even after an order reaches a terminal
    /// status.
    async fn append_trail_note(&self, order_id: i64, actor: &Actor, note: &str) -> Result<(), DispatchError>;

    async fn order_trail(&self, order_id: i64) -> Result<Vec<OrderTrailEntry>, DispatchError>;

    /// Read-only reconciliation check: compares the stored shopping list status against the status implied by the
    /// order's (status, payment status) pair.
    async fn status_consistency(&self, order_id: i64) -> Result<StatusConsistencyReport, DispatchError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), DispatchError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(i64),
    #[error("The requested shopping list {0} does not exist")]
    ShoppingListNotFound(i64),
    #[error("The requested agent {0} does not exist")]
    AgentNotFound(i64),
    #[error("The requested market {0} does not exist")]
    MarketNotFound(i64),
    #[error("The requested payment record {0} does not exist")]
    PaymentRecordNotFound(i64),
    #[error("Orders cannot move from {from} to {to}")]
    InvalidTransition { from: crate::db_types::OrderStatusType, to: crate::db_types::OrderStatusType },
    #[error("{0} is not allowed to perform this transition")]
    Forbidden(String),
    #[error("Agent {agent_id} has already rejected order {order_id}")]
    DuplicateRejection { order_id: i64, agent_id: i64 },
    #[error("Order {order_id} cannot be rejected: {reason}")]
    RejectionNotAllowed { order_id: i64, reason: String },
    #[error("Agent {0} cannot go online before completing KYC verification")]
    KycNotVerified(i64),
    #[error("Agent {0} is no longer available for assignment")]
    AgentUnavailable(i64),
    #[error("Order amounts must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("The payment provider request failed: {0}")]
    PaymentProviderFailure(String),
}

impl From<sqlx::Error> for DispatchError {
    fn from(e: sqlx::Error) -> Self {
        DispatchError::DatabaseError(e.to_string())
    }
}
