// service/order_state.rs
use std::fmt;

use crate::{models::ordermodel::OrderStatus, service::error::ServiceError};

/// Who is allowed to drive a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Client,
    Freelancer,
    Admin,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Accept,
    Reject,
    Deliver,
    RequestRevision,
    Complete,
    Cancel,
    OpenDispute,
    /// Dispute settled with a non-zero freelancer share.
    ResolveForFreelancer,
    /// Dispute settled with nothing going to the freelancer.
    ResolveForClient,
    AutoComplete,
}

impl OrderAction {
    pub const ALL: [OrderAction; 10] = [
        OrderAction::Accept,
        OrderAction::Reject,
        OrderAction::Deliver,
        OrderAction::RequestRevision,
        OrderAction::Complete,
        OrderAction::Cancel,
        OrderAction::OpenDispute,
        OrderAction::ResolveForFreelancer,
        OrderAction::ResolveForClient,
        OrderAction::AutoComplete,
    ];

    pub fn allowed_from(&self) -> &'static [OrderStatus] {
        match self {
            OrderAction::Accept | OrderAction::Reject => &[OrderStatus::Pending],
            OrderAction::Deliver => &[OrderStatus::InProgress, OrderStatus::RevisionRequested],
            OrderAction::RequestRevision
            | OrderAction::Complete
            | OrderAction::AutoComplete => &[OrderStatus::Delivered],
            OrderAction::Cancel => &[OrderStatus::Pending, OrderStatus::InProgress],
            OrderAction::OpenDispute => &[
                OrderStatus::InProgress,
                OrderStatus::Delivered,
                OrderStatus::RevisionRequested,
            ],
            OrderAction::ResolveForFreelancer | OrderAction::ResolveForClient => {
                &[OrderStatus::Disputed]
            }
        }
    }

    pub fn target(&self) -> OrderStatus {
        match self {
            OrderAction::Accept => OrderStatus::InProgress,
            OrderAction::Deliver => OrderStatus::Delivered,
            OrderAction::RequestRevision => OrderStatus::RevisionRequested,
            OrderAction::OpenDispute => OrderStatus::Disputed,
            OrderAction::Complete
            | OrderAction::AutoComplete
            | OrderAction::ResolveForFreelancer => OrderStatus::Completed,
            OrderAction::Reject | OrderAction::Cancel | OrderAction::ResolveForClient => {
                OrderStatus::Cancelled
            }
        }
    }

    pub fn actor(&self) -> Actor {
        match self {
            OrderAction::Accept | OrderAction::Reject | OrderAction::Deliver => Actor::Freelancer,
            OrderAction::RequestRevision
            | OrderAction::Complete
            | OrderAction::Cancel
            | OrderAction::OpenDispute => Actor::Client,
            OrderAction::ResolveForFreelancer | OrderAction::ResolveForClient => Actor::Admin,
            OrderAction::AutoComplete => Actor::System,
        }
    }

    /// Name written to the order timeline.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderAction::Accept => "order_accepted",
            OrderAction::Reject => "order_rejected",
            OrderAction::Deliver => "order_delivered",
            OrderAction::RequestRevision => "revision_requested",
            OrderAction::Complete => "order_completed",
            OrderAction::Cancel => "order_cancelled",
            OrderAction::OpenDispute => "dispute_opened",
            OrderAction::ResolveForFreelancer | OrderAction::ResolveForClient => "dispute_resolved",
            OrderAction::AutoComplete => "order_auto_completed",
        }
    }

    pub fn is_allowed_from(&self, status: OrderStatus) -> bool {
        self.allowed_from().contains(&status)
    }

    /// Source states as text, for `status::text = ANY($n)` guards.
    pub fn allowed_from_sql(&self) -> Vec<String> {
        self.allowed_from()
            .iter()
            .map(|status| status.to_str().to_string())
            .collect()
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            OrderAction::Accept => "accept",
            OrderAction::Reject => "reject",
            OrderAction::Deliver => "deliver",
            OrderAction::RequestRevision => "request a revision on",
            OrderAction::Complete => "complete",
            OrderAction::Cancel => "cancel",
            OrderAction::OpenDispute => "open a dispute on",
            OrderAction::ResolveForFreelancer | OrderAction::ResolveForClient => "resolve",
            OrderAction::AutoComplete => "auto-complete",
        };
        f.write_str(verb)
    }
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Completed | OrderStatus::Cancelled)
}

/// Returns the status `action` leads to, or the transition error for `current`.
pub fn next_status(current: OrderStatus, action: OrderAction) -> Result<OrderStatus, ServiceError> {
    if action.is_allowed_from(current) {
        Ok(action.target())
    } else {
        Err(ServiceError::InvalidOrderTransition {
            action,
            status: current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUSES: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::InProgress,
        OrderStatus::Delivered,
        OrderStatus::RevisionRequested,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Disputed,
    ];

    #[test]
    fn happy_path_small_order() {
        let mut status = OrderStatus::Pending;
        for action in [
            OrderAction::Accept,
            OrderAction::Deliver,
            OrderAction::RequestRevision,
            OrderAction::Deliver,
            OrderAction::Complete,
        ] {
            status = next_status(status, action).unwrap();
        }
        assert_eq!(status, OrderStatus::Completed);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for action in OrderAction::ALL {
            assert!(next_status(OrderStatus::Completed, action).is_err());
            assert!(next_status(OrderStatus::Cancelled, action).is_err());
        }
    }

    #[test]
    fn complete_requires_delivery() {
        for status in STATUSES {
            let result = next_status(status, OrderAction::Complete);
            assert_eq!(result.is_ok(), status == OrderStatus::Delivered, "{status}");
        }
    }

    #[test]
    fn cancel_only_before_delivery() {
        assert!(next_status(OrderStatus::Pending, OrderAction::Cancel).is_ok());
        assert!(next_status(OrderStatus::InProgress, OrderAction::Cancel).is_ok());
        assert!(next_status(OrderStatus::Delivered, OrderAction::Cancel).is_err());
        assert!(next_status(OrderStatus::Disputed, OrderAction::Cancel).is_err());
    }

    #[test]
    fn dispute_windows() {
        let allowed: Vec<_> = STATUSES
            .into_iter()
            .filter(|s| OrderAction::OpenDispute.is_allowed_from(*s))
            .collect();
        assert_eq!(
            allowed,
            vec![
                OrderStatus::InProgress,
                OrderStatus::Delivered,
                OrderStatus::RevisionRequested
            ]
        );
    }

    #[test]
    fn disputed_orders_only_leave_through_resolution() {
        for action in OrderAction::ALL {
            let ok = next_status(OrderStatus::Disputed, action).is_ok();
            assert_eq!(ok, action.actor() == Actor::Admin, "{action:?}");
        }
        assert_eq!(
            OrderAction::ResolveForFreelancer.target(),
            OrderStatus::Completed
        );
        assert_eq!(OrderAction::ResolveForClient.target(), OrderStatus::Cancelled);
    }

    #[test]
    fn revision_cycle_returns_to_delivery() {
        assert_eq!(
            next_status(OrderStatus::RevisionRequested, OrderAction::Deliver).unwrap(),
            OrderStatus::Delivered
        );
        assert!(next_status(OrderStatus::RevisionRequested, OrderAction::RequestRevision).is_err());
    }

    #[test]
    fn every_target_differs_from_its_sources() {
        for action in OrderAction::ALL {
            assert!(!action.allowed_from().contains(&action.target()), "{action:?}");
        }
    }

    #[test]
    fn sql_guard_lists_source_states() {
        assert_eq!(
            OrderAction::Deliver.allowed_from_sql(),
            vec!["in_progress".to_string(), "revision_requested".to_string()]
        );
    }

    #[test]
    fn actors_match_roles() {
        assert_eq!(OrderAction::Accept.actor(), Actor::Freelancer);
        assert_eq!(OrderAction::Complete.actor(), Actor::Client);
        assert_eq!(OrderAction::AutoComplete.actor(), Actor::System);
    }
}
