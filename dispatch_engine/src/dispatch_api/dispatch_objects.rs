use serde::{Deserialize, Serialize};

use crate::{
    db_types::Order,
    traits::{AssignmentOutcome, RejectionOutcome},
};

/// The result of a payment confirmation, including the outcome of the auto-assignment attempt that follows it.
///
/// `success` reports the payment side only. Assignment is best-effort: a payment with nobody available to take the
/// job is still a confirmed payment, so `assigned_agent_id` may be `None` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub success: bool,
    pub order: Order,
    pub assigned_agent_id: Option<i64>,
    /// True when this call changed nothing because the payment was already confirmed.
    pub already_completed: bool,
}

/// The result of handling an agent rejection: the recorded outcome plus the reassignment attempt that follows a
/// non-terminal rejection.
#[derive(Debug, Clone)]
pub struct RejectionResolution {
    pub outcome: RejectionOutcome,
    /// `None` when the rejection cancelled the order (no reassignment is attempted).
    pub reassignment: Option<AssignmentOutcome>,
}

impl RejectionResolution {
    pub fn new_agent_id(&self) -> Option<i64> {
        self.reassignment.as_ref().and_then(|r| r.assigned_agent_id())
    }
}
