use serde::{Deserialize, Serialize};

use crate::db_types::{
    AgentLocation,
    AgentProfile,
    Order,
    OrderStatusType,
    PaymentStatusType,
    ShoppingListStatusType,
};

//--------------------------------------  AgentCandidate  ------------------------------------------------------------
/// An eligible agent as returned by the candidate repository, carrying everything the scoring engine needs.
#[derive(Debug, Clone)]
pub struct AgentCandidate {
    pub profile: AgentProfile,
    pub locations: Vec<AgentLocation>,
    /// Active (`Accepted`/`InProgress`) orders in the target market.
    pub active_in_market: i64,
    /// Active orders in any other market.
    pub active_elsewhere: i64,
}

//------------------------------------ PaymentConfirmOutcome ---------------------------------------------------------
/// Result of the transactional payment-completion step.
#[derive(Debug, Clone)]
pub enum PaymentConfirmOutcome {
    /// The payment was marked completed by this call.
    Confirmed(Order),
    /// The payment was already completed; nothing was changed. Guards duplicate webhooks and webhook/poll races.
    AlreadyCompleted(Order),
}

impl PaymentConfirmOutcome {
    pub fn order(&self) -> &Order {
        match self {
            PaymentConfirmOutcome::Confirmed(o) | PaymentConfirmOutcome::AlreadyCompleted(o) => o,
        }
    }
}

//-------------------------------------- RejectionOutcome ------------------------------------------------------------
#[derive(Debug, Clone)]
pub enum RejectionOutcome {
    /// The rejection was recorded and the order returned to `Pending`. `excluded` holds every agent that has
    /// rejected this order, for the reassignment query.
    AwaitingReassignment { order: Order, excluded: Vec<i64> },
    /// The rejection count reached the maximum and the order was cancelled.
    Cancelled(Order),
}

//-------------------------------------- AssignmentOutcome -----------------------------------------------------------
/// Result of a bounded assignment attempt. No exceptions-as-control-flow: "nobody suitable" is a value.
#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    Assigned { order: Order, agent_id: i64 },
    /// No eligible candidate scored non-negative. The order stays `Pending` for the background sweep.
    NoCandidates,
}

impl AssignmentOutcome {
    pub fn assigned_agent_id(&self) -> Option<i64> {
        match self {
            AssignmentOutcome::Assigned { agent_id, .. } => Some(*agent_id),
            AssignmentOutcome::NoCandidates => None,
        }
    }
}

//----------------------------------- StatusConsistencyReport --------------------------------------------------------
/// Drift report between the stored shopping list status and the status implied by the order. Used for operational
/// reconciliation; never written back automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConsistencyReport {
    pub order_id: i64,
    pub order_status: OrderStatusType,
    pub payment_status: PaymentStatusType,
    pub expected_list_status: ShoppingListStatusType,
    pub actual_list_status: ShoppingListStatusType,
    pub consistent: bool,
}
