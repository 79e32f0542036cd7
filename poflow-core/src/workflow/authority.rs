//! Authority resolution: who may approve what amount, and on whose behalf

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::models::approval::{
    ApprovalAuthority, Approver, AuthorityCheck, AutoApprovalCheck, User, UserRole,
};
use crate::models::order::{ApprovalBypassReason, PurchaseOrder};
use crate::store::OrderStore;
use crate::workflow::error::{WorkflowError, WorkflowResult};

/// Resolves users and amounts against the configured per-role authorities
pub struct AuthorityResolver {
    store: Arc<OrderStore>,
    /// Orders strictly below this amount auto-approve (whole KRW)
    auto_approval_threshold: i64,
}

impl AuthorityResolver {
    pub fn new(store: Arc<OrderStore>, auto_approval_threshold: i64) -> Self {
        Self {
            store,
            auto_approval_threshold,
        }
    }

    /// Decide whether a user may approve an amount directly, within their own
    /// authority, or must escalate to the next covering role.
    pub fn check_authority(&self, user: &User, amount: i64) -> WorkflowResult<AuthorityCheck> {
        let authority = self.store.authority_for_role(user.role);

        let Some(authority) = authority else {
            // Admins are universally authorized even without a configured row
            if user.role == UserRole::Admin {
                return Ok(AuthorityCheck {
                    can_direct_approve: true,
                    direct_approve_limit: None,
                    requires_approval: false,
                    next_approver: None,
                    bypass_reason: Some(ApprovalBypassReason::DirectApproval),
                });
            }
            let next = self.find_next_approver(amount, 0)?;
            return Ok(AuthorityCheck {
                can_direct_approve: false,
                direct_approve_limit: None,
                requires_approval: true,
                next_approver: Some(next.id),
                bypass_reason: None,
            });
        };

        // Direct approval only applies when a sub-limit is actually
        // configured; the flag alone never bypasses the chain.
        if authority.can_direct_approve {
            if let Some(limit) = authority.direct_approve_limit {
                if amount <= limit {
                    debug!(role = %user.role, amount, "direct approval within limit");
                    return Ok(AuthorityCheck {
                        can_direct_approve: true,
                        direct_approve_limit: authority.direct_approve_limit,
                        requires_approval: false,
                        next_approver: None,
                        bypass_reason: Some(ApprovalBypassReason::DirectApproval),
                    });
                }
            }
        }

        if amount <= authority.max_amount {
            // Within the role's ceiling: the user approves through the
            // regular flow, acting as their own next approver.
            return Ok(AuthorityCheck {
                can_direct_approve: false,
                direct_approve_limit: authority.direct_approve_limit,
                requires_approval: true,
                next_approver: Some(user.id),
                bypass_reason: None,
            });
        }

        let next = self.find_next_approver(amount, 0)?;
        Ok(AuthorityCheck {
            can_direct_approve: false,
            direct_approve_limit: authority.direct_approve_limit,
            requires_approval: true,
            next_approver: Some(next.id),
            bypass_reason: None,
        })
    }

    /// Resolve the user at the given level of the covering-authority chain.
    /// Falls back to an executive, then an admin; errs when no candidate
    /// exists so an uncoverable amount can never slip through unapproved.
    pub fn find_next_approver(&self, amount: i64, level: usize) -> WorkflowResult<User> {
        let chain = self.store.authorities_covering(amount);

        if let Some(authority) = chain.get(level) {
            if let Some(user) = self.store.find_user_by_role(authority.role) {
                return Ok(user);
            }
        }

        for fallback in [UserRole::Executive, UserRole::Admin] {
            if let Some(user) = self.store.find_user_by_role(fallback) {
                debug!(amount, role = %fallback, "falling back for next approver");
                return Ok(user);
            }
        }

        Err(WorkflowError::ConfigurationMissing(format!(
            "no approver covers amount {}",
            amount
        )))
    }

    /// Scan the auto-approval criteria for an order. First match wins.
    pub fn check_auto_approval(&self, order: &PurchaseOrder) -> AutoApprovalCheck {
        if order.total_amount < self.auto_approval_threshold {
            return AutoApprovalCheck {
                should_auto_approve: true,
                reason: Some(ApprovalBypassReason::AmountThreshold),
            };
        }

        if let Some(notes) = &order.notes {
            let lowered = notes.to_lowercase();
            if lowered.contains("emergency") || notes.contains("긴급") {
                return AutoApprovalCheck {
                    should_auto_approve: true,
                    reason: Some(ApprovalBypassReason::Emergency),
                };
            }
        }

        if order.approval_bypass_reason == Some(ApprovalBypassReason::ExcelAutomation) {
            return AutoApprovalCheck {
                should_auto_approve: true,
                reason: Some(ApprovalBypassReason::ExcelAutomation),
            };
        }

        if let Some(vendor_id) = order.vendor_id {
            if self.store.has_delivered_order_for_vendor(vendor_id) {
                return AutoApprovalCheck {
                    should_auto_approve: true,
                    reason: Some(ApprovalBypassReason::RepeatOrder),
                };
            }
        }

        AutoApprovalCheck {
            should_auto_approve: false,
            reason: None,
        }
    }

    /// The ordered approver chain an amount would pass through. Stops at the
    /// first level with a configured direct-approve limit, since higher
    /// levels never act.
    pub fn required_approvers(&self, amount: i64) -> Vec<Approver> {
        let chain = self.store.authorities_covering(amount);
        let mut approvers = Vec::new();

        for (index, authority) in chain.iter().enumerate() {
            let Some(user) = self.store.find_user_by_role(authority.role) else {
                continue;
            };
            approvers.push(Approver {
                user_id: user.id,
                name: user.name,
                role: authority.role,
                level: (index + 1) as u32,
                can_direct_approve: authority.can_direct_approve,
                approval_limit: authority.max_amount,
            });
            if authority.can_direct_approve && authority.direct_approve_limit.is_some() {
                break;
            }
        }

        approvers
    }

    /// The authority row configured for a role, if any
    pub fn authority_for_role(&self, role: UserRole) -> Option<ApprovalAuthority> {
        self.store.authority_for_role(role)
    }

    /// Whether a user's configured ceiling covers an amount
    pub fn covers_amount(&self, user_id: Uuid, amount: i64) -> bool {
        self.store
            .get_user(user_id)
            .and_then(|u| self.store.authority_for_role(u.role))
            .map(|a| a.max_amount >= amount)
            .unwrap_or(false)
    }
}
