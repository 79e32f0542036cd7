//! Purchase order data model and the two-axis status vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::approval::UserRole;

/// Order lifecycle status (first axis)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order is being drafted by its creator
    Draft,
    /// Order is finalized and registered
    Created,
    /// Order has been sent to the vendor
    Sent,
    /// Vendor delivery confirmed (terminal)
    Delivered,
}

/// Approval outcome status (second axis)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// No approval chain applies to this order
    NotRequired,
    /// Waiting on one or more approvers
    Pending,
    /// Every required approver signed off
    Approved,
    /// An approver rejected the order (terminal for this cycle)
    Rejected,
}

/// Recorded justification when an order skips the approval requirement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalBypassReason {
    /// Acting role's direct-approve sub-limit covered the amount
    DirectApproval,
    /// Amount below the small-order auto-approval threshold
    AmountThreshold,
    /// Order marked as emergency
    Emergency,
    /// Recent delivered order exists for the same vendor
    RepeatOrder,
    /// Created by the bulk import pipeline
    ExcelAutomation,
}

/// A purchase order with both status axes and approval bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Unique order identifier
    pub id: i64,
    /// Human-readable order number (e.g. PO-2026-0042)
    pub order_number: String,
    /// Owning company
    pub company_id: i64,
    /// User who created the order
    pub created_by: Uuid,
    /// Vendor the order is addressed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<i64>,
    /// Total amount in whole KRW
    pub total_amount: i64,
    /// Lifecycle axis
    pub order_status: OrderStatus,
    /// Approval axis
    pub approval_status: ApprovalStatus,
    /// Why the approval requirement was bypassed, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_bypass_reason: Option<ApprovalBypassReason>,
    /// User expected to act next on a pending order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_approver_id: Option<Uuid>,
    /// Escalation depth into the authority chain
    #[serde(default)]
    pub approval_level: u32,
    /// Role expected to act next on a pending order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_approver_role: Option<UserRole>,
    /// User who finalized the approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Uuid>,
    /// When the approval was finalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// User who rejected the order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<Uuid>,
    /// When the order was rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    /// Reason recorded at rejection time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// When the approval chain was first requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_requested_at: Option<DateTime<Utc>>,
    /// When the order was sent to the vendor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    /// When delivery was confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// Free-form notes (scanned for the emergency marker)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Whether the order has reached a state no workflow action can change
    pub fn is_terminal(&self) -> bool {
        matches!(self.order_status, OrderStatus::Delivered)
            || matches!(
                (self.order_status, self.approval_status),
                (OrderStatus::Created, ApprovalStatus::Rejected)
            )
    }
}

/// Order history record appended on every workflow action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHistoryRecord {
    /// Unique record identifier
    pub id: Uuid,
    /// Order this record belongs to
    pub order_id: i64,
    /// Acting user, if the action was user-initiated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    /// Action name (e.g. "submitted", "step_approved", "rejected")
    pub action: String,
    /// Additional structured context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// When the action occurred
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ApprovalStatus::NotRequired).unwrap(),
            "\"not_required\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Delivered).unwrap(),
            "\"delivered\""
        );
        assert_eq!(
            serde_json::to_string(&ApprovalBypassReason::ExcelAutomation).unwrap(),
            "\"excel_automation\""
        );
    }

    #[test]
    fn test_terminal_detection() {
        let now = Utc::now();
        let mut order = PurchaseOrder {
            id: 1,
            order_number: "PO-1".to_string(),
            company_id: 1,
            created_by: Uuid::new_v4(),
            vendor_id: None,
            total_amount: 1000,
            order_status: OrderStatus::Created,
            approval_status: ApprovalStatus::Pending,
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
        };
        assert!(!order.is_terminal());

        order.approval_status = ApprovalStatus::Rejected;
        assert!(order.is_terminal());

        order.approval_status = ApprovalStatus::Approved;
        order.order_status = OrderStatus::Delivered;
        assert!(order.is_terminal());
    }
}
