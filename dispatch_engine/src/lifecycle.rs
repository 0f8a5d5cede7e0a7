//! The order lifecycle state machine.
//!
//! Pure functions only: the transition table, the actor permission gate, and the single-source-of-truth mapping from
//! order state to shopping list state. The transactional application of a transition (timestamps, side effects,
//! trail rows) lives in the storage backend; it calls into this module for every decision so that the rules exist in
//! exactly one place.

use crate::{
    db_types::{Actor, Order, OrderStatusType, PaymentStatusType, ShoppingListStatusType},
    traits::DispatchError,
};

use OrderStatusType::*;

/// The transitions an agent actor may request on an order assigned to them. Customers can only cancel; everything
/// else is reserved for the system.
pub const AGENT_FORWARD_STATES: [OrderStatusType; 6] =
    [Accepted, InProgress, Shopping, ShoppingCompleted, Delivery, Completed];

/// The strict transition table. Anything not listed here is rejected.
pub fn is_valid_transition(from: OrderStatusType, to: OrderStatusType) -> bool {
    matches!(
        (from, to),
        (Pending, Accepted | Cancelled)
            | (Accepted, InProgress | Cancelled)
            | (InProgress, Shopping | Cancelled)
            | (Shopping, ShoppingCompleted | Cancelled)
            | (ShoppingCompleted, Delivery | Cancelled)
            | (Delivery, Completed | Cancelled)
    )
}

/// The permission gate. Runs *before* the transition table check.
///
/// * An agent may only move an order they are currently assigned to, and only into forward work states.
/// * A customer may only cancel their own order, and not once it is completed.
/// * The system actor may request anything; the transition table still applies.
pub fn check_actor_permission(actor: &Actor, order: &Order, new_status: OrderStatusType) -> Result<(), DispatchError> {
    match actor {
        Actor::System => Ok(()),
        Actor::Agent(id) => {
            if order.agent_id != Some(*id) {
                return Err(DispatchError::Forbidden(format!(
                    "{actor} is not assigned to order {}",
                    order.order_number
                )));
            }
            if !AGENT_FORWARD_STATES.contains(&new_status) {
                return Err(DispatchError::Forbidden(format!("{actor} may not move an order to {new_status}")));
            }
            Ok(())
        },
        Actor::Customer(id) => {
            if order.customer_id != *id {
                return Err(DispatchError::Forbidden(format!("{actor} does not own order {}", order.order_number)));
            }
            if new_status != Cancelled {
                return Err(DispatchError::Forbidden(format!("{actor} may only cancel their order")));
            }
            if order.status == Completed {
                return Err(DispatchError::Forbidden("completed orders cannot be cancelled".to_string()));
            }
            Ok(())
        },
    }
}

/// The shopping list status implied by an order's (status, payment status) pair.
///
/// This mapping is the single source of truth; every order-status write and the consistency validator go through it.
pub fn shopping_list_status_for(
    order_status: OrderStatusType,
    payment_status: PaymentStatusType,
) -> ShoppingListStatusType {
    match order_status {
        Completed => ShoppingListStatusType::Completed,
        Cancelled => ShoppingListStatusType::Cancelled,
        _ if payment_status != PaymentStatusType::Completed => ShoppingListStatusType::Draft,
        Pending | Accepted => ShoppingListStatusType::Accepted,
        InProgress | Shopping | ShoppingCompleted | Delivery => ShoppingListStatusType::Processing,
    }
}

/// The orders-table column stamped when a status is first entered, if any. Timestamps are set exactly once; the
/// backend wraps the column in COALESCE so that re-entering a status never overwrites it.
pub fn timestamp_column(status: OrderStatusType) -> Option<&'static str> {
    match status {
        Accepted => Some("accepted_at"),
        Shopping => Some("shopping_started_at"),
        ShoppingCompleted => Some("shopping_completed_at"),
        Delivery => Some("delivery_started_at"),
        Completed => Some("completed_at"),
        Cancelled => Some("cancelled_at"),
        Pending | InProgress => None,
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use dsp_common::Kobo;

    use super::*;
    use crate::db_types::{Order, OrderNumber};

    const ALL: [OrderStatusType; 8] =
        [Pending, Accepted, InProgress, Shopping, ShoppingCompleted, Delivery, Completed, Cancelled];

    fn order(status: OrderStatusType, agent_id: Option<i64>) -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_number: OrderNumber::from("ORD-TEST-1"),
            customer_id: 10,
            agent_id,
            shopping_list_id: 1,
            status,
            payment_status: PaymentStatusType::Completed,
            payment_id: None,
            total: Kobo::from_naira(50),
            created_at: now,
            updated_at: now,
            accepted_at: None,
            shopping_started_at: None,
            shopping_completed_at: None,
            delivery_started_at: None,
            completed_at: None,
            cancelled_at: None,
            payment_processed_at: Some(now),
        }
    }

    #[test]
    fn transition_table_is_exhaustive() {
        let allowed = [
            (Pending, Accepted),
            (Pending, Cancelled),
            (Accepted, InProgress),
            (Accepted, Cancelled),
            (InProgress, Shopping),
            (InProgress, Cancelled),
            (Shopping, ShoppingCompleted),
            (Shopping, Cancelled),
            (ShoppingCompleted, Delivery),
            (ShoppingCompleted, Cancelled),
            (Delivery, Completed),
            (Delivery, Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(is_valid_transition(from, to), expected, "({from}, {to})");
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!is_valid_transition(Completed, to));
            assert!(!is_valid_transition(Cancelled, to));
        }
    }

    #[test]
    fn assigned_agent_may_move_forward() {
        let order = order(Accepted, Some(7));
        assert!(check_actor_permission(&Actor::Agent(7), &order, InProgress).is_ok());
        assert!(check_actor_permission(&Actor::Agent(7), &order, Completed).is_ok());
    }

    #[test]
    fn unassigned_agent_is_forbidden() {
        let order = order(Accepted, Some(7));
        let err = check_actor_permission(&Actor::Agent(8), &order, InProgress).unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));
    }

    #[test]
    fn agent_cannot_cancel() {
        let order = order(Accepted, Some(7));
        let err = check_actor_permission(&Actor::Agent(7), &order, Cancelled).unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));
    }

    #[test]
    fn customer_may_only_cancel_their_own_unfinished_order() {
        let order = order(Shopping, Some(7));
        assert!(check_actor_permission(&Actor::Customer(10), &order, Cancelled).is_ok());
        assert!(check_actor_permission(&Actor::Customer(11), &order, Cancelled).is_err());
        assert!(check_actor_permission(&Actor::Customer(10), &order, Completed).is_err());
        let done = self::order(Completed, Some(7));
        assert!(check_actor_permission(&Actor::Customer(10), &done, Cancelled).is_err());
    }

    #[test]
    fn system_passes_the_gate() {
        let order = order(Pending, None);
        for to in ALL {
            assert!(check_actor_permission(&Actor::System, &order, to).is_ok());
        }
    }

    #[test]
    fn shopping_list_mapping() {
        use PaymentStatusType as P;
        use ShoppingListStatusType as L;
        assert_eq!(shopping_list_status_for(Pending, P::Pending), L::Draft);
        assert_eq!(shopping_list_status_for(Accepted, P::Failed), L::Draft);
        assert_eq!(shopping_list_status_for(Pending, P::Completed), L::Accepted);
        assert_eq!(shopping_list_status_for(Accepted, P::Completed), L::Accepted);
        assert_eq!(shopping_list_status_for(InProgress, P::Completed), L::Processing);
        assert_eq!(shopping_list_status_for(Shopping, P::Completed), L::Processing);
        assert_eq!(shopping_list_status_for(ShoppingCompleted, P::Completed), L::Processing);
        assert_eq!(shopping_list_status_for(Delivery, P::Completed), L::Processing);
        assert_eq!(shopping_list_status_for(Completed, P::Completed), L::Completed);
        assert_eq!(shopping_list_status_for(Cancelled, P::Pending), L::Cancelled);
    }
}
