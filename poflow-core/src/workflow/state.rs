//! Two-axis order state machine with pure, outbox-producing transitions

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::approval::UserRole;
use crate::models::order::{ApprovalBypassReason, ApprovalStatus, OrderStatus, PurchaseOrder};
use crate::notify::event::WorkflowEvent;
use crate::workflow::error::{WorkflowError, WorkflowResult};

/// Workflow-level events that drive the `(orderStatus, approvalStatus)` pair.
/// Only the orchestrator applies these; no other component writes either axis.
#[derive(Debug, Clone)]
pub enum TransitionEvent {
    /// Route resolved to direct approval; the order skips the chain
    SubmitDirect {
        actor: Uuid,
        bypass: ApprovalBypassReason,
    },
    /// Route requires approval; register the next approver
    SubmitForApproval {
        next_approver: Uuid,
        approver_role: UserRole,
    },
    /// Every step (or the direct approver) signed off
    ChainApproved { approver: Uuid },
    /// A step or authority rejected the order
    ChainRejected {
        rejector: Uuid,
        reason: Option<String>,
    },
    /// A rejected order returns to drafting for a new cycle
    Resubmit,
    /// The order was handed to the vendor channel
    MarkSent,
    /// Vendor delivery confirmed
    ConfirmDelivery { actor: Uuid },
}

impl TransitionEvent {
    fn name(&self) -> &'static str {
        match self {
            TransitionEvent::SubmitDirect { .. } => "submit_direct",
            TransitionEvent::SubmitForApproval { .. } => "submit_for_approval",
            TransitionEvent::ChainApproved { .. } => "chain_approved",
            TransitionEvent::ChainRejected { .. } => "chain_rejected",
            TransitionEvent::Resubmit => "resubmit",
            TransitionEvent::MarkSent => "mark_sent",
            TransitionEvent::ConfirmDelivery { .. } => "confirm_delivery",
        }
    }
}

/// A transition's updated order plus the events to dispatch after commit
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub order: PurchaseOrder,
    pub events: Vec<WorkflowEvent>,
}

/// Apply a transition to an order. Pure: returns the updated order and the
/// notification outbox, touches nothing else. Illegal `(status pair, event)`
/// combinations are rejected exhaustively.
pub fn apply(
    order: &PurchaseOrder,
    event: TransitionEvent,
    now: DateTime<Utc>,
) -> WorkflowResult<TransitionResult> {
    let axes = (order.order_status, order.approval_status);
    let mut updated = order.clone();
    updated.updated_at = now;

    let events = match (&event, axes) {
        (
            TransitionEvent::SubmitDirect { actor, bypass },
            (OrderStatus::Draft, ApprovalStatus::NotRequired),
        ) => {
            updated.order_status = OrderStatus::Created;
            updated.approval_status = ApprovalStatus::NotRequired;
            updated.approval_bypass_reason = Some(*bypass);
            updated.approved_by = Some(*actor);
            updated.approved_at = Some(now);
            vec![]
        }

        (
            TransitionEvent::SubmitForApproval {
                next_approver,
                approver_role,
            },
            (OrderStatus::Draft, ApprovalStatus::NotRequired),
        ) => {
            updated.order_status = OrderStatus::Created;
            updated.approval_status = ApprovalStatus::Pending;
            updated.next_approver_id = Some(*next_approver);
            updated.current_approver_role = Some(*approver_role);
            updated.approval_requested_at = Some(now);
            vec![WorkflowEvent::ApprovalRequested {
                order_id: order.id,
                order_number: order.order_number.clone(),
                company_id: order.company_id,
                requested_by: order.created_by,
                approver: *next_approver,
                approver_role: *approver_role,
                order_amount: order.total_amount,
                timestamp: now,
            }]
        }

        (
            TransitionEvent::ChainApproved { approver },
            (OrderStatus::Created, ApprovalStatus::Pending),
        ) => {
            updated.approval_status = ApprovalStatus::Approved;
            updated.approved_by = Some(*approver);
            updated.approved_at = Some(now);
            updated.next_approver_id = None;
            updated.current_approver_role = None;
            vec![WorkflowEvent::OrderApproved {
                order_id: order.id,
                order_number: order.order_number.clone(),
                company_id: order.company_id,
                creator: order.created_by,
                approved_by: *approver,
                timestamp: now,
            }]
        }

        (
            TransitionEvent::ChainRejected { rejector, reason },
            (OrderStatus::Created, ApprovalStatus::Pending),
        ) => {
            updated.approval_status = ApprovalStatus::Rejected;
            updated.rejected_by = Some(*rejector);
            updated.rejected_at = Some(now);
            updated.rejection_reason = reason.clone();
            updated.next_approver_id = None;
            updated.current_approver_role = None;
            vec![WorkflowEvent::OrderRejected {
                order_id: order.id,
                order_number: order.order_number.clone(),
                company_id: order.company_id,
                creator: order.created_by,
                rejected_by: *rejector,
                reason: reason.clone(),
                timestamp: now,
            }]
        }

        (TransitionEvent::Resubmit, (OrderStatus::Created, ApprovalStatus::Rejected)) => {
            updated.order_status = OrderStatus::Draft;
            updated.approval_status = ApprovalStatus::NotRequired;
            updated.approval_bypass_reason = None;
            updated.next_approver_id = None;
            updated.current_approver_role = None;
            updated.approved_by = None;
            updated.approved_at = None;
            updated.rejected_by = None;
            updated.rejected_at = None;
            updated.rejection_reason = None;
            updated.approval_requested_at = None;
            vec![]
        }

        (
            TransitionEvent::MarkSent,
            (OrderStatus::Created, ApprovalStatus::Approved)
            | (OrderStatus::Created, ApprovalStatus::NotRequired),
        ) => {
            updated.order_status = OrderStatus::Sent;
            updated.sent_at = Some(now);
            vec![WorkflowEvent::OrderSent {
                order_id: order.id,
                order_number: order.order_number.clone(),
                company_id: order.company_id,
                creator: order.created_by,
                timestamp: now,
            }]
        }

        (TransitionEvent::ConfirmDelivery { actor }, (OrderStatus::Sent, _)) => {
            updated.order_status = OrderStatus::Delivered;
            updated.delivered_at = Some(now);
            vec![WorkflowEvent::DeliveryCompleted {
                order_id: order.id,
                order_number: order.order_number.clone(),
                company_id: order.company_id,
                creator: order.created_by,
                confirmed_by: *actor,
                timestamp: now,
            }]
        }

        _ => {
            return Err(WorkflowError::IllegalTransition {
                order_status: order.order_status,
                approval_status: order.approval_status,
                event: event.name(),
            })
        }
    };

    Ok(TransitionResult {
        order: updated,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_order() -> PurchaseOrder {
        let now = Utc::now();
        PurchaseOrder {
            id: 1,
            order_number: "PO-1".to_string(),
            company_id: 1,
            created_by: Uuid::new_v4(),
            vendor_id: None,
            total_amount: 2_000_000,
            order_status: OrderStatus::Draft,
            approval_status: ApprovalStatus::NotRequired,
            approval_bypass_reason: None,
            next_approver_id: None,
            approval_level: 0,
            current_approver_role: None,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            approval_requested_at: None,
            sent_at: None,
            delivered_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_direct_submission_sets_bypass() {
        let order = draft_order();
        let actor = Uuid::new_v4();

        let result = apply(
            &order,
            TransitionEvent::SubmitDirect {
                actor,
                bypass: ApprovalBypassReason::DirectApproval,
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(result.order.order_status, OrderStatus::Created);
        assert_eq!(result.order.approval_status, ApprovalStatus::NotRequired);
        assert_eq!(
            result.order.approval_bypass_reason,
            Some(ApprovalBypassReason::DirectApproval)
        );
        assert_eq!(result.order.approved_by, Some(actor));
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_submission_for_approval_emits_request() {
        let order = draft_order();
        let approver = Uuid::new_v4();

        let result = apply(
            &order,
            TransitionEvent::SubmitForApproval {
                next_approver: approver,
                approver_role: UserRole::HqManagement,
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(result.order.approval_status, ApprovalStatus::Pending);
        assert_eq!(result.order.next_approver_id, Some(approver));
        assert!(result.order.approval_requested_at.is_some());
        assert_eq!(result.events.len(), 1);
        assert!(matches!(
            result.events[0],
            WorkflowEvent::ApprovalRequested { .. }
        ));
    }

    #[test]
    fn test_full_staged_lifecycle() {
        let approver = Uuid::new_v4();
        let order = draft_order();

        let pending = apply(
            &order,
            TransitionEvent::SubmitForApproval {
                next_approver: approver,
                approver_role: UserRole::Executive,
            },
            Utc::now(),
        )
        .unwrap()
        .order;

        let approved = apply(
            &pending,
            TransitionEvent::ChainApproved { approver },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(approved.order.approval_status, ApprovalStatus::Approved);
        assert!(approved.order.next_approver_id.is_none());

        let sent = apply(&approved.order, TransitionEvent::MarkSent, Utc::now()).unwrap();
        assert_eq!(sent.order.order_status, OrderStatus::Sent);

        let delivered = apply(
            &sent.order,
            TransitionEvent::ConfirmDelivery {
                actor: Uuid::new_v4(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(delivered.order.order_status, OrderStatus::Delivered);
        assert!(delivered.order.is_terminal());
    }

    #[test]
    fn test_rejection_then_resubmission() {
        let order = draft_order();
        let approver = Uuid::new_v4();

        let pending = apply(
            &order,
            TransitionEvent::SubmitForApproval {
                next_approver: approver,
                approver_role: UserRole::Executive,
            },
            Utc::now(),
        )
        .unwrap()
        .order;

        let rejected = apply(
            &pending,
            TransitionEvent::ChainRejected {
                rejector: approver,
                reason: Some("over budget".to_string()),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(rejected.order.approval_status, ApprovalStatus::Rejected);
        assert!(rejected.order.is_terminal());

        let redrafted = apply(&rejected.order, TransitionEvent::Resubmit, Utc::now()).unwrap();
        assert_eq!(redrafted.order.order_status, OrderStatus::Draft);
        assert_eq!(redrafted.order.approval_status, ApprovalStatus::NotRequired);
        assert!(redrafted.order.rejection_reason.is_none());
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let order = draft_order();

        // Cannot send a draft
        let err = apply(&order, TransitionEvent::MarkSent, Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::IllegalTransition { .. }));

        // Cannot approve an order that was never submitted
        let err = apply(
            &order,
            TransitionEvent::ChainApproved {
                approver: Uuid::new_v4(),
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::IllegalTransition { .. }));

        // Cannot send a pending order before the chain approves
        let pending = apply(
            &order,
            TransitionEvent::SubmitForApproval {
                next_approver: Uuid::new_v4(),
                approver_role: UserRole::Admin,
            },
            Utc::now(),
        )
        .unwrap()
        .order;
        let err = apply(&pending, TransitionEvent::MarkSent, Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::IllegalTransition { .. }));
    }
}
