//! Step instance lifecycle: materialization from templates and decided actions

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::approval::{
    ApprovalStepInstance, RouteDecision, StepAction, StepOutcome, StepStatus, User, UserRole,
};
use crate::store::{OrderStore, StepUpdate};
use crate::workflow::error::{WorkflowError, WorkflowResult};

/// Materializes staged chains into per-order step instances and applies
/// approve/reject/skip actions with optimistic concurrency.
pub struct StepInstanceManager {
    store: Arc<OrderStore>,
}

impl StepInstanceManager {
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }

    /// Materialize the routed chain for an order. Idempotent: when active
    /// instances already exist for the order, they are returned unchanged so a
    /// retried creation call never produces a duplicate chain. Instances
    /// deactivated by a resubmission do not block a new chain.
    pub fn create_instances(
        &self,
        order_id: i64,
        decision: &RouteDecision,
    ) -> WorkflowResult<Vec<ApprovalStepInstance>> {
        if decision.staged_steps.is_empty() {
            return Ok(vec![]);
        }

        let existing: Vec<ApprovalStepInstance> = self
            .store
            .instances_for_order(order_id)
            .into_iter()
            .filter(|i| i.is_active)
            .collect();
        if !existing.is_empty() {
            debug!(order_id, count = existing.len(), "step instances already exist");
            return Ok(existing);
        }

        let instances: Vec<ApprovalStepInstance> = decision
            .staged_steps
            .iter()
            .map(|template| ApprovalStepInstance {
                id: Uuid::new_v4(),
                order_id,
                template_id: template.id,
                step_order: template.step_order,
                required_role: template.required_role,
                assigned_user_id: None,
                status: StepStatus::Pending,
                approved_by: None,
                approved_at: None,
                rejection_reason: None,
                comments: None,
                is_active: true,
            })
            .collect();

        self.store.insert_instances(instances.clone())?;
        info!(order_id, steps = instances.len(), "created approval step instances");
        Ok(instances)
    }

    /// Decide one pending step. The status check and the write happen under a
    /// single store lock, so of two concurrent deciders exactly one wins; the
    /// loser gets `ConcurrentModification` and no side effects.
    pub fn process_step(
        &self,
        step_id: Uuid,
        action: StepAction,
        actor: &User,
        note: Option<String>,
    ) -> WorkflowResult<(ApprovalStepInstance, StepOutcome)> {
        let step = self
            .store
            .get_instance(step_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("step {}", step_id)))?;

        if actor.role != step.required_role && actor.role != UserRole::Admin {
            return Err(WorkflowError::PermissionDenied(format!(
                "step {} requires role {}, actor is {}",
                step.step_order, step.required_role, actor.role
            )));
        }

        let now = Utc::now();
        let actor_id = actor.id;
        let outcome = self.store.update_step_if_pending(step_id, |s| {
            match action {
                StepAction::Approve => {
                    s.status = StepStatus::Approved;
                    s.approved_by = Some(actor_id);
                    s.approved_at = Some(now);
                    s.comments = note.clone();
                }
                StepAction::Reject => {
                    s.status = StepStatus::Rejected;
                    s.approved_by = Some(actor_id);
                    s.approved_at = Some(now);
                    s.rejection_reason = note.clone();
                }
                StepAction::Skip => {
                    s.status = StepStatus::Skipped;
                    s.approved_by = Some(actor_id);
                    s.approved_at = Some(now);
                    s.comments = note.clone();
                }
            }
        })?;

        let updated = match outcome {
            StepUpdate::Updated(step) => step,
            StepUpdate::NotPending(status) => {
                return Err(WorkflowError::ConcurrentModification(format!(
                    "step {} was already decided or deactivated ({:?})",
                    step_id, status
                )))
            }
            StepUpdate::Missing => {
                return Err(WorkflowError::NotFound(format!("step {}", step_id)))
            }
        };

        let chain_outcome = if action == StepAction::Reject {
            // A rejection terminates the chain; later steps never fire
            let deactivated = self
                .store
                .deactivate_other_pending_steps(updated.order_id, step_id)?;
            info!(
                order_id = updated.order_id,
                step = updated.step_order,
                deactivated,
                "step rejected, chain terminated"
            );
            StepOutcome::ChainRejected
        } else {
            match self.next_pending_step(updated.order_id) {
                Some(next_step) => StepOutcome::Advanced { next_step },
                None => {
                    info!(order_id = updated.order_id, "all steps decided, chain approved");
                    StepOutcome::ChainApproved
                }
            }
        };

        Ok((updated, chain_outcome))
    }

    /// The lowest-ordered active pending step for an order, if any
    pub fn next_pending_step(&self, order_id: i64) -> Option<ApprovalStepInstance> {
        self.store.active_pending_instances(order_id).into_iter().next()
    }

    /// All instances for an order, ordered by step
    pub fn instances_for_order(&self, order_id: i64) -> Vec<ApprovalStepInstance> {
        self.store.instances_for_order(order_id)
    }
}
