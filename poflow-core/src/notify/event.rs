//! Workflow event outbox types and room fan-out computation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::approval::UserRole;

/// A delivery room a subscriber may join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// A single user's notifications
    User(Uuid),
    /// Everyone in a company
    Company(i64),
    /// Everyone holding a role
    Role(UserRole),
    /// Watchers of one order
    Order(i64),
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Room::User(id) => write!(f, "user_{}", id),
            Room::Company(id) => write!(f, "company_{}", id),
            Room::Role(role) => write!(f, "role_{}", role),
            Room::Order(id) => write!(f, "order_{}", id),
        }
    }
}

/// Workflow events emitted by state transitions and drained after commit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An approver must act on a newly pending order
    ApprovalRequested {
        order_id: i64,
        order_number: String,
        company_id: i64,
        requested_by: Uuid,
        approver: Uuid,
        approver_role: UserRole,
        order_amount: i64,
        timestamp: DateTime<Utc>,
    },
    /// A staged chain advanced to its next step
    StepAdvanced {
        order_id: i64,
        order_number: String,
        company_id: i64,
        step_order: u32,
        required_role: UserRole,
        timestamp: DateTime<Utc>,
    },
    /// Every required approver signed off
    OrderApproved {
        order_id: i64,
        order_number: String,
        company_id: i64,
        creator: Uuid,
        approved_by: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// The order was rejected
    OrderRejected {
        order_id: i64,
        order_number: String,
        company_id: i64,
        creator: Uuid,
        rejected_by: Uuid,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// The order was sent to the vendor
    OrderSent {
        order_id: i64,
        order_number: String,
        company_id: i64,
        creator: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// Vendor delivery confirmed
    DeliveryCompleted {
        order_id: i64,
        order_number: String,
        company_id: i64,
        creator: Uuid,
        confirmed_by: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// The order this event is about
    pub fn order_id(&self) -> i64 {
        match self {
            WorkflowEvent::ApprovalRequested { order_id, .. }
            | WorkflowEvent::StepAdvanced { order_id, .. }
            | WorkflowEvent::OrderApproved { order_id, .. }
            | WorkflowEvent::OrderRejected { order_id, .. }
            | WorkflowEvent::OrderSent { order_id, .. }
            | WorkflowEvent::DeliveryCompleted { order_id, .. } => *order_id,
        }
    }

    /// Rooms this event fans out to. Every event reaches the order room and
    /// the company room; requests also target the resolved approver, results
    /// also target the order creator.
    pub fn rooms(&self) -> Vec<Room> {
        match self {
            WorkflowEvent::ApprovalRequested {
                order_id,
                company_id,
                approver,
                approver_role,
                ..
            } => vec![
                Room::Order(*order_id),
                Room::Company(*company_id),
                Room::User(*approver),
                Room::Role(*approver_role),
            ],
            WorkflowEvent::StepAdvanced {
                order_id,
                company_id,
                required_role,
                ..
            } => vec![
                Room::Order(*order_id),
                Room::Company(*company_id),
                Room::Role(*required_role),
            ],
            WorkflowEvent::OrderApproved {
                order_id,
                company_id,
                creator,
                ..
            }
            | WorkflowEvent::OrderRejected {
                order_id,
                company_id,
                creator,
                ..
            }
            | WorkflowEvent::OrderSent {
                order_id,
                company_id,
                creator,
                ..
            }
            | WorkflowEvent::DeliveryCompleted {
                order_id,
                company_id,
                creator,
                ..
            } => vec![
                Room::Order(*order_id),
                Room::Company(*company_id),
                Room::User(*creator),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_keys() {
        assert_eq!(Room::Company(3).to_string(), "company_3");
        assert_eq!(
            Room::Role(UserRole::Executive).to_string(),
            "role_executive"
        );
        assert_eq!(Room::Order(42).to_string(), "order_42");
    }

    #[test]
    fn test_request_event_targets_approver() {
        let approver = Uuid::new_v4();
        let event = WorkflowEvent::ApprovalRequested {
            order_id: 1,
            order_number: "PO-1".to_string(),
            company_id: 9,
            requested_by: Uuid::new_v4(),
            approver,
            approver_role: UserRole::HqManagement,
            order_amount: 3_000_000,
            timestamp: Utc::now(),
        };

        let rooms = event.rooms();
        assert!(rooms.contains(&Room::Order(1)));
        assert!(rooms.contains(&Room::Company(9)));
        assert!(rooms.contains(&Room::User(approver)));
        assert!(rooms.contains(&Room::Role(UserRole::HqManagement)));
    }

    #[test]
    fn test_result_event_targets_creator() {
        let creator = Uuid::new_v4();
        let event = WorkflowEvent::OrderRejected {
            order_id: 2,
            order_number: "PO-2".to_string(),
            company_id: 9,
            creator,
            rejected_by: Uuid::new_v4(),
            reason: Some("over budget".to_string()),
            timestamp: Utc::now(),
        };

        assert!(event.rooms().contains(&Room::User(creator)));
        assert_eq!(event.order_id(), 2);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = WorkflowEvent::OrderSent {
            order_id: 3,
            order_number: "PO-3".to_string(),
            company_id: 1,
            creator: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"order_sent\""));
    }
}
