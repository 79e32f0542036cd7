//! Approval configuration records, step templates/instances, and routing types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::ApprovalBypassReason;

/// Closed set of user roles recognized by the approval engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// On-site staff, no approval authority by default
    FieldWorker,
    /// Project-level approver
    ProjectManager,
    /// Headquarters management
    HqManagement,
    /// Executive level
    Executive,
    /// Administrator, universally authorized
    Admin,
}

impl UserRole {
    /// The snake_case name used in configuration and room keys
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::FieldWorker => "field_worker",
            UserRole::ProjectManager => "project_manager",
            UserRole::HqManagement => "hq_management",
            UserRole::Executive => "executive",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acting user identity supplied by the authentication context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Role used for authority and room grouping
    pub role: UserRole,
    /// Company the user belongs to
    pub company_id: i64,
    /// Soft-disable flag
    pub is_active: bool,
}

/// Per-role monetary approval authority, admin-managed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalAuthority {
    /// Role this authority applies to (unique among active rows)
    pub role: UserRole,
    /// Ceiling this role may ever approve (whole KRW)
    pub max_amount: i64,
    /// Whether the role may approve without a chain
    pub can_direct_approve: bool,
    /// Direct-approve sub-limit, never above `max_amount`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_approve_limit: Option<i64>,
    /// Soft-disable flag
    pub is_active: bool,
}

/// Approval mode configured per company
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Single authorized role approves without a chain
    Direct,
    /// Ordered chain of role-gated steps
    Staged,
}

/// Per-company workflow settings; at most one active row per company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalWorkflowSettings {
    /// Company these settings apply to
    pub company_id: i64,
    /// Direct or staged routing
    pub approval_mode: ApprovalMode,
    /// Roles allowed to approve directly in direct mode
    #[serde(default)]
    pub direct_approval_roles: Vec<UserRole>,
    /// Amount thresholds for the staged bands (reporting only)
    #[serde(default)]
    pub staged_approval_thresholds: Vec<i64>,
    /// Whether every stage must approve even when one approver covers the amount
    #[serde(default)]
    pub require_all_stages: bool,
    /// Drop skippable foreign-role steps when the actor's authority covers the amount
    #[serde(default)]
    pub skip_lower_stages: bool,
    /// Soft-active flag
    pub is_active: bool,
    /// Creation timestamp; the latest active row wins
    pub created_at: DateTime<Utc>,
}

/// Reusable, amount-banded definition of one stage in a staged chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalStepTemplate {
    /// Unique template row identifier
    pub id: i64,
    /// Owning company
    pub company_id: i64,
    /// Template group name
    pub template_name: String,
    /// Position within the chain (unique within a template)
    pub step_order: u32,
    /// Role that must act on this step
    pub required_role: UserRole,
    /// Lower bound of the amount band (inclusive)
    pub min_amount: i64,
    /// Upper bound of the amount band; `None` = unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<i64>,
    /// Dropped for high-priority orders with long chains
    #[serde(default)]
    pub is_optional: bool,
    /// May be removed when a lower-stage skip applies
    #[serde(default)]
    pub can_skip: bool,
    /// Soft-disable flag
    pub is_active: bool,
}

impl ApprovalStepTemplate {
    /// Whether this template's amount band covers the given amount
    pub fn covers(&self, amount: i64) -> bool {
        amount >= self.min_amount && self.max_amount.map_or(true, |max| amount <= max)
    }
}

/// Status of a materialized step instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting on its required role
    Pending,
    /// Signed off
    Approved,
    /// Rejected; terminates the chain
    Rejected,
    /// Skipped by an authorized actor
    Skipped,
}

/// Order-specific occurrence of a step template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalStepInstance {
    /// Unique instance identifier
    pub id: Uuid,
    /// Order this instance belongs to
    pub order_id: i64,
    /// Template row this instance was materialized from
    pub template_id: i64,
    /// Position within the chain
    pub step_order: u32,
    /// Role that must act on this step
    pub required_role: UserRole,
    /// Specific user assigned, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<Uuid>,
    /// Step state; terminal once decided
    pub status: StepStatus,
    /// User who decided the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Uuid>,
    /// When the step was decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Reason recorded on rejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Free-form approval comments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Soft-disable flag; cleared on chains short-circuited by a rejection
    pub is_active: bool,
}

/// Result of resolving a user + amount against the configured authorities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityCheck {
    /// The acting user may approve on the spot
    pub can_direct_approve: bool,
    /// Direct-approve sub-limit that applied, if any
    pub direct_approve_limit: Option<i64>,
    /// A chain or a named approver is required
    pub requires_approval: bool,
    /// Resolved next approver when approval is required
    pub next_approver: Option<Uuid>,
    /// Bypass justification when approval is not required
    pub bypass_reason: Option<ApprovalBypassReason>,
}

/// Result of the auto-approval criteria scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoApprovalCheck {
    /// Whether an auto-approval condition matched
    pub should_auto_approve: bool,
    /// Which condition matched
    pub reason: Option<ApprovalBypassReason>,
}

/// One level of the required-approver chain for an amount
#[derive(Debug, Clone)]
pub struct Approver {
    /// Resolved user at this level
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Role at this level
    pub role: UserRole,
    /// 1-based chain position
    pub level: u32,
    /// Whether this level can direct-approve
    pub can_direct_approve: bool,
    /// Monetary ceiling at this level
    pub approval_limit: i64,
}

/// Priority attached to a routing request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// Inputs to a routing decision
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// Amount being routed
    pub order_amount: i64,
    /// Company whose settings apply
    pub company_id: i64,
    /// Acting user
    pub current_user_id: Uuid,
    /// Acting user's role
    pub current_user_role: UserRole,
    /// Order priority; high priority trims optional stages
    pub priority: OrderPriority,
}

/// Outcome of routing: who may approve now, or what staged chain applies
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// Direct or staged
    pub approval_mode: ApprovalMode,
    /// Whether the acting user may approve directly
    pub can_direct_approve: bool,
    /// Selected chain for staged mode, ordered by step
    pub staged_steps: Vec<ApprovalStepTemplate>,
    /// Name of the template group the chain came from
    pub template_name: Option<String>,
    /// Human-readable explanation of the decision
    pub reasoning: String,
}

/// Chain progress summary for an order
#[derive(Debug, Clone)]
pub struct ApprovalProgress {
    /// Total active instances
    pub total_steps: usize,
    /// Approved or skipped instances
    pub completed_steps: usize,
    /// 0..=100
    pub progress_percentage: u32,
    /// The instance currently awaiting action
    pub current_step: Option<ApprovalStepInstance>,
}

/// Action applied to a pending step instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Approve,
    Reject,
    Skip,
}

/// What a committed step means for the rest of the chain
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// More steps remain; `next_step` is now the sole active pending instance
    Advanced { next_step: ApprovalStepInstance },
    /// No active pending instance remains
    ChainApproved,
    /// The chain was rejected; all other pending instances were deactivated
    ChainRejected,
}

/// Reporting summary over a user's pending approvals; wait time is read-only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalStats {
    /// Orders awaiting this user's authority
    pub pending_count: usize,
    /// Pending orders waiting at least the urgency threshold
    pub urgent_count: usize,
    /// Mean wait in whole days
    pub average_wait_days: i64,
    /// Sum of pending order amounts
    pub pending_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_round_trip() {
        for role in [
            UserRole::FieldWorker,
            UserRole::ProjectManager,
            UserRole::HqManagement,
            UserRole::Executive,
            UserRole::Admin,
        ] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
            let back: UserRole = serde_json::from_str(&json).unwrap();
            assert_eq!(back, role);
        }
    }

    #[test]
    fn test_template_amount_band() {
        let template = ApprovalStepTemplate {
            id: 1,
            company_id: 1,
            template_name: "default".to_string(),
            step_order: 1,
            required_role: UserRole::ProjectManager,
            min_amount: 1_000_000,
            max_amount: Some(5_000_000),
            is_optional: false,
            can_skip: false,
            is_active: true,
        };
        assert!(!template.covers(999_999));
        assert!(template.covers(1_000_000));
        assert!(template.covers(5_000_000));
        assert!(!template.covers(5_000_001));

        let unbounded = ApprovalStepTemplate {
            max_amount: None,
            ..template
        };
        assert!(unbounded.covers(i64::MAX));
    }
}
