//! Workflow orchestrator: the single entry point that ties authority,
//! routing, step instances, the state machine, and notification fan-out
//! together. Every status-axis mutation flows through here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::models::approval::{
    ApprovalProgress, ApprovalStats, Approver, AuthorityCheck, AutoApprovalCheck, OrderPriority,
    RoutingContext, StepAction, StepOutcome, User, UserRole,
};
use crate::models::configuration::EngineConfig;
use crate::models::order::{
    ApprovalBypassReason, ApprovalStatus, OrderHistoryRecord, OrderStatus, PurchaseOrder,
};
use crate::notify::dispatcher::NotificationDispatcher;
use crate::services::logging;
use crate::notify::event::WorkflowEvent;
use crate::store::OrderStore;
use crate::workflow::authority::AuthorityResolver;
use crate::workflow::error::{WorkflowError, WorkflowResult};
use crate::workflow::routing::RoutingService;
use crate::workflow::settings_cache::SettingsCache;
use crate::workflow::state::{self, TransitionEvent};
use crate::workflow::steps::StepInstanceManager;

/// Inputs for a new purchase order
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub company_id: i64,
    pub vendor_id: Option<i64>,
    pub total_amount: i64,
    pub notes: Option<String>,
    pub priority: OrderPriority,
}

/// Snapshot of an order's workflow position for status queries
#[derive(Debug, Clone)]
pub struct WorkflowStatus {
    pub order: PurchaseOrder,
    pub progress: ApprovalProgress,
    pub history: Vec<OrderHistoryRecord>,
}

/// Coordinates the full order approval lifecycle
pub struct WorkflowOrchestrator {
    store: Arc<OrderStore>,
    authority: AuthorityResolver,
    routing: RoutingService,
    steps: StepInstanceManager,
    dispatcher: NotificationDispatcher,
    settings_cache: Arc<SettingsCache>,
    urgent_wait_days: i64,
}

impl WorkflowOrchestrator {
    pub fn new(
        store: Arc<OrderStore>,
        dispatcher: NotificationDispatcher,
        config: &EngineConfig,
    ) -> Self {
        let settings_cache = Arc::new(SettingsCache::new(Duration::from_secs(
            config.settings_cache_ttl_seconds,
        )));
        Self {
            authority: AuthorityResolver::new(store.clone(), config.auto_approval_threshold),
            routing: RoutingService::new(store.clone(), settings_cache.clone()),
            steps: StepInstanceManager::new(store.clone()),
            store,
            dispatcher,
            settings_cache,
            urgent_wait_days: config.urgent_wait_days,
        }
    }

    /// The notification dispatcher, for registering subscribers and sinks
    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Drop cached workflow settings for a company after an admin update
    pub fn invalidate_settings(&self, company_id: i64) {
        self.settings_cache.invalidate(company_id);
    }

    /// Whether a user may approve the given amount, and who acts next if not
    pub fn check_approval_authority(
        &self,
        user: &User,
        amount: i64,
    ) -> WorkflowResult<AuthorityCheck> {
        self.authority.check_authority(user, amount)
    }

    /// The auto-approval criteria scan for an order
    pub fn check_auto_approval(&self, order: &PurchaseOrder) -> AutoApprovalCheck {
        self.authority.check_auto_approval(order)
    }

    /// The approver chain an amount would pass through
    pub fn required_approvers(&self, amount: i64) -> Vec<Approver> {
        self.authority.required_approvers(amount)
    }

    /// Create an order and route it into the approval flow. Routing failures
    /// never block creation: the order is parked pending admin review instead.
    pub async fn create_order_with_workflow(
        &self,
        request: NewOrder,
        creator: &User,
    ) -> WorkflowResult<PurchaseOrder> {
        let now = Utc::now();
        let id = self.store.next_order_id();
        let order = PurchaseOrder {
            id,
            order_number: format!("PO-{}-{:04}", now.format("%Y"), id),
            company_id: request.company_id,
            created_by: creator.id,
            vendor_id: request.vendor_id,
            total_amount: request.total_amount,
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
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        self.store.create_order(order.clone())?;
        self.record(
            id,
            Some(creator.id),
            "created",
            Some(json!({ "amount": order.total_amount })),
        )?;

        match self.submit(&order, creator, request.priority) {
            Ok((submitted, events)) => {
                info!(
                    order_id = id,
                    approval_status = ?submitted.approval_status,
                    "order created and routed"
                );
                self.dispatcher.dispatch_all(events).await;
                Ok(submitted)
            }
            Err(e) => {
                logging::log_error(
                    &e.to_string(),
                    Some(&format!("routing order {}, parking for admin review", id)),
                );
                let parked = self
                    .store
                    .update_order(id, |o| {
                        o.order_status = OrderStatus::Created;
                        o.approval_status = ApprovalStatus::Pending;
                        o.current_approver_role = Some(UserRole::Admin);
                        o.approval_requested_at = Some(now);
                        o.updated_at = now;
                    })?
                    .ok_or_else(|| WorkflowError::NotFound(format!("order {}", id)))?;
                self.record(
                    id,
                    None,
                    "routing_failed",
                    Some(json!({ "error": e.to_string() })),
                )?;
                Ok(parked)
            }
        }
    }

    /// Route a draft order: staged chain, direct approval, auto-approval, or
    /// escalation to the next covering authority.
    fn submit(
        &self,
        order: &PurchaseOrder,
        creator: &User,
        priority: OrderPriority,
    ) -> WorkflowResult<(PurchaseOrder, Vec<WorkflowEvent>)> {
        let ctx = RoutingContext {
            order_amount: order.total_amount,
            company_id: order.company_id,
            current_user_id: creator.id,
            current_user_role: creator.role,
            priority,
        };
        let decision = self.routing.determine_route(&ctx)?;

        let event = if !decision.staged_steps.is_empty() {
            let instances = self.steps.create_instances(order.id, &decision)?;
            let first = &instances[0];
            let approver = match self.store.find_user_by_role(first.required_role) {
                Some(user) => user,
                None => self.authority.find_next_approver(order.total_amount, 0)?,
            };
            TransitionEvent::SubmitForApproval {
                next_approver: approver.id,
                approver_role: first.required_role,
            }
        } else if decision.can_direct_approve {
            TransitionEvent::SubmitDirect {
                actor: creator.id,
                bypass: ApprovalBypassReason::DirectApproval,
            }
        } else {
            let auto = self.authority.check_auto_approval(order);
            if auto.should_auto_approve {
                TransitionEvent::SubmitDirect {
                    actor: creator.id,
                    bypass: auto.reason.unwrap_or(ApprovalBypassReason::AmountThreshold),
                }
            } else {
                let check = self.authority.check_authority(creator, order.total_amount)?;
                if check.can_direct_approve {
                    TransitionEvent::SubmitDirect {
                        actor: creator.id,
                        bypass: check
                            .bypass_reason
                            .unwrap_or(ApprovalBypassReason::DirectApproval),
                    }
                } else {
                    let approver_id = match check.next_approver {
                        Some(id) => id,
                        None => self.authority.find_next_approver(order.total_amount, 0)?.id,
                    };
                    let approver_role = self
                        .store
                        .get_user(approver_id)
                        .map(|u| u.role)
                        .unwrap_or(UserRole::Admin);
                    TransitionEvent::SubmitForApproval {
                        next_approver: approver_id,
                        approver_role,
                    }
                }
            }
        };

        let result = state::apply(order, event, Utc::now())?;
        let committed = self.commit(result.order)?;
        self.record(
            order.id,
            Some(creator.id),
            "submitted",
            Some(json!({ "approval_status": committed.approval_status })),
        )?;
        Ok((committed, result.events))
    }

    /// Drive an order one step forward along its lifecycle. Idempotent: a
    /// terminal order, or one waiting on approvers, is returned unchanged
    /// and no notification is emitted.
    pub async fn process_next_step(
        &self,
        order_id: i64,
        actor: &User,
    ) -> WorkflowResult<PurchaseOrder> {
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", order_id)))?;
        if order.is_terminal() {
            return Ok(order);
        }

        match (order.order_status, order.approval_status) {
            (OrderStatus::Draft, ApprovalStatus::NotRequired) => {
                let (submitted, events) = self.submit(&order, actor, OrderPriority::default())?;
                self.dispatcher.dispatch_all(events).await;
                Ok(submitted)
            }
            (OrderStatus::Created, ApprovalStatus::Approved | ApprovalStatus::NotRequired) => {
                let result = state::apply(&order, TransitionEvent::MarkSent, Utc::now())?;
                let committed = self.commit(result.order)?;
                self.record(order_id, Some(actor.id), "sent", None)?;
                self.dispatcher.dispatch_all(result.events).await;
                Ok(committed)
            }
            // Waiting on approvers, or already with the vendor
            _ => Ok(order),
        }
    }

    /// Approve one step of a staged chain
    pub async fn approve_step(
        &self,
        step_id: Uuid,
        actor: &User,
        comment: Option<String>,
    ) -> WorkflowResult<(PurchaseOrder, StepOutcome)> {
        self.act_on_step(step_id, StepAction::Approve, actor, comment)
            .await
    }

    /// Reject one step, terminating the whole chain
    pub async fn reject_step(
        &self,
        step_id: Uuid,
        actor: &User,
        reason: Option<String>,
    ) -> WorkflowResult<(PurchaseOrder, StepOutcome)> {
        self.act_on_step(step_id, StepAction::Reject, actor, reason)
            .await
    }

    /// Skip one step, advancing the chain without a decision on the merits
    pub async fn skip_step(
        &self,
        step_id: Uuid,
        actor: &User,
        comment: Option<String>,
    ) -> WorkflowResult<(PurchaseOrder, StepOutcome)> {
        self.act_on_step(step_id, StepAction::Skip, actor, comment)
            .await
    }

    async fn act_on_step(
        &self,
        step_id: Uuid,
        action: StepAction,
        actor: &User,
        note: Option<String>,
    ) -> WorkflowResult<(PurchaseOrder, StepOutcome)> {
        let (step, outcome) = self
            .steps
            .process_step(step_id, action, actor, note.clone())?;
        let order = self
            .store
            .get_order(step.order_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", step.order_id)))?;
        let now = Utc::now();

        let (order, events) = match &outcome {
            StepOutcome::Advanced { next_step } => {
                let approver_id = self
                    .store
                    .find_user_by_role(next_step.required_role)
                    .map(|u| u.id);
                let required_role = next_step.required_role;
                let updated = self
                    .store
                    .update_order(order.id, |o| {
                        o.next_approver_id = approver_id;
                        o.current_approver_role = Some(required_role);
                        o.approval_level += 1;
                        o.updated_at = now;
                    })?
                    .ok_or_else(|| WorkflowError::NotFound(format!("order {}", order.id)))?;
                let events = vec![WorkflowEvent::StepAdvanced {
                    order_id: updated.id,
                    order_number: updated.order_number.clone(),
                    company_id: updated.company_id,
                    step_order: next_step.step_order,
                    required_role,
                    timestamp: now,
                }];
                (updated, events)
            }
            StepOutcome::ChainApproved => {
                let result = state::apply(
                    &order,
                    TransitionEvent::ChainApproved { approver: actor.id },
                    now,
                )?;
                (self.commit(result.order)?, result.events)
            }
            StepOutcome::ChainRejected => {
                let result = state::apply(
                    &order,
                    TransitionEvent::ChainRejected {
                        rejector: actor.id,
                        reason: note.clone(),
                    },
                    now,
                )?;
                (self.commit(result.order)?, result.events)
            }
        };

        let action_name = match action {
            StepAction::Approve => "step_approved",
            StepAction::Reject => "step_rejected",
            StepAction::Skip => "step_skipped",
        };
        self.record(
            order.id,
            Some(actor.id),
            action_name,
            Some(json!({ "step_id": step_id })),
        )?;
        self.dispatcher.dispatch_all(events).await;
        Ok((order, outcome))
    }

    /// Approve a pending order that has no staged chain (direct mode)
    pub async fn approve_order(
        &self,
        order_id: i64,
        actor: &User,
    ) -> WorkflowResult<PurchaseOrder> {
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", order_id)))?;
        self.ensure_no_staged_chain(order_id)?;
        self.ensure_order_authority(&order, actor)?;

        let result = state::apply(
            &order,
            TransitionEvent::ChainApproved { approver: actor.id },
            Utc::now(),
        )?;
        let committed = self.commit(result.order)?;
        self.record(order_id, Some(actor.id), "approved", None)?;
        self.dispatcher.dispatch_all(result.events).await;
        Ok(committed)
    }

    /// Reject a pending order that has no staged chain (direct mode)
    pub async fn reject_order(
        &self,
        order_id: i64,
        actor: &User,
        reason: Option<String>,
    ) -> WorkflowResult<PurchaseOrder> {
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", order_id)))?;
        self.ensure_no_staged_chain(order_id)?;
        self.ensure_order_authority(&order, actor)?;

        let result = state::apply(
            &order,
            TransitionEvent::ChainRejected {
                rejector: actor.id,
                reason: reason.clone(),
            },
            Utc::now(),
        )?;
        let committed = self.commit(result.order)?;
        self.record(
            order_id,
            Some(actor.id),
            "rejected",
            reason.map(|r| json!({ "reason": r })),
        )?;
        self.dispatcher.dispatch_all(result.events).await;
        Ok(committed)
    }

    /// Confirm vendor delivery of a sent order
    pub async fn confirm_delivery(
        &self,
        order_id: i64,
        actor: &User,
    ) -> WorkflowResult<PurchaseOrder> {
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", order_id)))?;
        let result = state::apply(
            &order,
            TransitionEvent::ConfirmDelivery { actor: actor.id },
            Utc::now(),
        )?;
        let committed = self.commit(result.order)?;
        self.record(order_id, Some(actor.id), "delivered", None)?;
        self.dispatcher.dispatch_all(result.events).await;
        Ok(committed)
    }

    /// Return a rejected order to its creator for a new approval cycle
    pub async fn resubmit(&self, order_id: i64, actor: &User) -> WorkflowResult<PurchaseOrder> {
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", order_id)))?;
        if order.created_by != actor.id && actor.role != UserRole::Admin {
            return Err(WorkflowError::PermissionDenied(
                "only the creator or an admin may resubmit a rejected order".to_string(),
            ));
        }

        let result = state::apply(&order, TransitionEvent::Resubmit, Utc::now())?;
        // The old chain must not satisfy idempotent instance creation
        self.store.deactivate_instances(order_id)?;
        let committed = self.commit(result.order)?;
        self.record(order_id, Some(actor.id), "resubmitted", None)?;
        Ok(committed)
    }

    /// Current workflow position for an order
    pub fn get_workflow_status(&self, order_id: i64) -> WorkflowResult<WorkflowStatus> {
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", order_id)))?;
        Ok(WorkflowStatus {
            progress: self.routing.approval_progress(order_id),
            history: self.store.history_for_order(order_id),
            order,
        })
    }

    /// Pending orders awaiting this user's action
    pub fn pending_approvals(&self, user: &User) -> Vec<PurchaseOrder> {
        self.store
            .pending_orders()
            .into_iter()
            .filter(|o| {
                o.next_approver_id == Some(user.id)
                    || o.current_approver_role == Some(user.role)
                    || user.role == UserRole::Admin
            })
            .collect()
    }

    /// Reporting summary over a user's pending approvals. Read-only: wait
    /// times are computed from `approval_requested_at`, nothing is mutated.
    pub fn approval_stats(&self, user: &User, now: DateTime<Utc>) -> ApprovalStats {
        let pending = self.pending_approvals(user);
        let waits: Vec<i64> = pending
            .iter()
            .map(|o| (now - o.approval_requested_at.unwrap_or(o.created_at)).num_days())
            .collect();

        ApprovalStats {
            pending_count: pending.len(),
            urgent_count: waits.iter().filter(|&&w| w >= self.urgent_wait_days).count(),
            average_wait_days: if waits.is_empty() {
                0
            } else {
                waits.iter().sum::<i64>() / waits.len() as i64
            },
            pending_amount: pending.iter().map(|o| o.total_amount).sum(),
        }
    }

    fn ensure_no_staged_chain(&self, order_id: i64) -> WorkflowResult<()> {
        if self.steps.next_pending_step(order_id).is_some() {
            return Err(WorkflowError::PermissionDenied(format!(
                "order {} has a staged chain, decide its steps instead",
                order_id
            )));
        }
        Ok(())
    }

    fn ensure_order_authority(&self, order: &PurchaseOrder, actor: &User) -> WorkflowResult<()> {
        if actor.role == UserRole::Admin || order.next_approver_id == Some(actor.id) {
            return Ok(());
        }
        let check = self.authority.check_authority(actor, order.total_amount)?;
        if check.can_direct_approve || check.next_approver == Some(actor.id) {
            return Ok(());
        }
        logging::log_permission_denied(
            "decide_order",
            order.id,
            Some(&actor.name),
            "authority does not cover the order amount",
        );
        Err(WorkflowError::PermissionDenied(format!(
            "role {} may not decide order {}",
            actor.role, order.id
        )))
    }

    fn commit(&self, order: PurchaseOrder) -> WorkflowResult<PurchaseOrder> {
        let id = order.id;
        self.store
            .update_order(id, move |o| *o = order)?
            .ok_or_else(|| WorkflowError::NotFound(format!("order {}", id)))
    }

    fn record(
        &self,
        order_id: i64,
        user_id: Option<Uuid>,
        action: &str,
        details: Option<serde_json::Value>,
    ) -> WorkflowResult<()> {
        self.store.append_history(OrderHistoryRecord {
            id: Uuid::new_v4(),
            order_id,
            user_id,
            action: action.to_string(),
            details,
            created_at: Utc::now(),
        })?;
        logging::log_workflow_action(action, order_id, None);
        Ok(())
    }
}
