use serde::{Deserialize, Serialize};

use crate::db_types::Order;

/// Fired after a payment confirmation commits. Carries the order as it was at confirmation time; an agent may or may
/// not have been assigned yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmedEvent {
    pub order: Order,
}

impl PaymentConfirmedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAssignedEvent {
    pub order: Order,
    pub agent_id: i64,
}

impl OrderAssignedEvent {
    pub fn new(order: Order, agent_id: i64) -> Self {
        Self { order, agent_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRejectedEvent {
    pub order: Order,
    pub agent_id: i64,
    pub reason: String,
}

impl AgentRejectedEvent {
    pub fn new(order: Order, agent_id: i64, reason: impl Into<String>) -> Self {
        Self { order, agent_id, reason: reason.into() }
    }
}

/// Fired when an order reaches `Cancelled`, whether by a customer, an admin, or the rejection limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderCancelledEvent {
    pub fn new(order: Order, reason: impl Into<String>) -> Self {
        Self { order, reason: reason.into() }
    }
}
