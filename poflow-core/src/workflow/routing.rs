//! Routing: choose between direct approval and a staged chain for an order

use std::sync::Arc;

use tracing::debug;

use crate::models::approval::{
    ApprovalMode, ApprovalProgress, RouteDecision, RoutingContext, StepStatus, UserRole,
};
use crate::store::OrderStore;
use crate::workflow::error::WorkflowResult;
use crate::workflow::settings_cache::SettingsCache;

/// Decides how an order enters the approval flow, driven by per-company
/// settings and the amount-banded step templates.
pub struct RoutingService {
    store: Arc<OrderStore>,
    settings_cache: Arc<SettingsCache>,
}

impl RoutingService {
    pub fn new(store: Arc<OrderStore>, settings_cache: Arc<SettingsCache>) -> Self {
        Self {
            store,
            settings_cache,
        }
    }

    /// Resolve the route for one order
    pub fn determine_route(&self, ctx: &RoutingContext) -> WorkflowResult<RouteDecision> {
        let Some(settings) = self.settings_cache.get(ctx.company_id, &self.store) else {
            return Ok(RouteDecision {
                approval_mode: ApprovalMode::Direct,
                can_direct_approve: ctx.current_user_role == UserRole::Admin,
                staged_steps: vec![],
                template_name: None,
                reasoning: "no workflow settings configured, admin approval only".to_string(),
            });
        };

        match settings.approval_mode {
            ApprovalMode::Direct => {
                let can = ctx.current_user_role == UserRole::Admin
                    || settings.direct_approval_roles.contains(&ctx.current_user_role);
                Ok(RouteDecision {
                    approval_mode: ApprovalMode::Direct,
                    can_direct_approve: can,
                    staged_steps: vec![],
                    template_name: None,
                    reasoning: if can {
                        format!("role {} may approve directly", ctx.current_user_role)
                    } else {
                        format!("role {} is not a direct approval role", ctx.current_user_role)
                    },
                })
            }
            ApprovalMode::Staged => self.staged_route(ctx, &settings),
        }
    }

    fn staged_route(
        &self,
        ctx: &RoutingContext,
        settings: &crate::models::approval::ApprovalWorkflowSettings,
    ) -> WorkflowResult<RouteDecision> {
        let mut steps = self
            .store
            .templates_for_amount(ctx.company_id, ctx.order_amount);

        // Long chains get trimmed to their mandatory steps under high priority
        if ctx.priority == crate::models::approval::OrderPriority::High && steps.len() > 2 {
            let before = steps.len();
            steps.retain(|s| !s.is_optional);
            debug!(
                dropped = before - steps.len(),
                "dropped optional steps for high priority order"
            );
        }

        if steps.is_empty() {
            // No band matched the amount; route like an unconfigured company
            return Ok(RouteDecision {
                approval_mode: ApprovalMode::Direct,
                can_direct_approve: ctx.current_user_role == UserRole::Admin,
                staged_steps: vec![],
                template_name: None,
                reasoning: format!(
                    "no step template covers amount {}, admin approval only",
                    ctx.order_amount
                ),
            });
        }

        if settings.skip_lower_stages && self.actor_covers(ctx) {
            steps.retain(|s| !(s.can_skip && s.required_role != ctx.current_user_role));
            if steps.is_empty() {
                // The whole chain was skippable below the actor's own authority
                return Ok(RouteDecision {
                    approval_mode: ApprovalMode::Direct,
                    can_direct_approve: true,
                    staged_steps: vec![],
                    template_name: None,
                    reasoning: format!(
                        "authority of {} covers amount {}, all lower stages skipped",
                        ctx.current_user_role, ctx.order_amount
                    ),
                });
            }
        }

        let template_name = steps.first().map(|s| s.template_name.clone());
        let chain: Vec<String> = steps.iter().map(|s| s.required_role.to_string()).collect();
        Ok(RouteDecision {
            approval_mode: ApprovalMode::Staged,
            can_direct_approve: false,
            staged_steps: steps,
            template_name,
            reasoning: format!("staged chain: {}", chain.join(" -> ")),
        })
    }

    /// Whether the acting user's own authority ceiling covers the amount
    fn actor_covers(&self, ctx: &RoutingContext) -> bool {
        self.store
            .authority_for_role(ctx.current_user_role)
            .map(|a| a.max_amount >= ctx.order_amount)
            .unwrap_or(false)
    }

    /// Chain progress for an order, over its active instances
    pub fn approval_progress(&self, order_id: i64) -> ApprovalProgress {
        let instances: Vec<_> = self
            .store
            .instances_for_order(order_id)
            .into_iter()
            .filter(|i| i.is_active)
            .collect();

        let total_steps = instances.len();
        let completed_steps = instances
            .iter()
            .filter(|i| matches!(i.status, StepStatus::Approved | StepStatus::Skipped))
            .count();
        let current_step = instances
            .iter()
            .find(|i| i.status == StepStatus::Pending)
            .cloned();

        ApprovalProgress {
            total_steps,
            completed_steps,
            progress_percentage: if total_steps == 0 {
                0
            } else {
                (completed_steps * 100 / total_steps) as u32
            },
            current_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::approval::{
        ApprovalAuthority, ApprovalStepTemplate, ApprovalWorkflowSettings, OrderPriority,
    };
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn service(dir: &std::path::Path) -> (RoutingService, Arc<OrderStore>) {
        let store = Arc::new(OrderStore::new(dir.join("orders.json")).unwrap());
        let cache = Arc::new(SettingsCache::new(Duration::ZERO));
        (RoutingService::new(store.clone(), cache), store)
    }

    fn staged_settings(skip_lower_stages: bool) -> ApprovalWorkflowSettings {
        ApprovalWorkflowSettings {
            company_id: 1,
            approval_mode: ApprovalMode::Staged,
            direct_approval_roles: vec![],
            staged_approval_thresholds: vec![1_000_000, 10_000_000],
            require_all_stages: false,
            skip_lower_stages,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn template(
        id: i64,
        step_order: u32,
        role: UserRole,
        is_optional: bool,
        can_skip: bool,
    ) -> ApprovalStepTemplate {
        ApprovalStepTemplate {
            id,
            company_id: 1,
            template_name: "standard".to_string(),
            step_order,
            required_role: role,
            min_amount: 0,
            max_amount: None,
            is_optional,
            can_skip,
            is_active: true,
        }
    }

    fn ctx(amount: i64, role: UserRole, priority: OrderPriority) -> RoutingContext {
        RoutingContext {
            order_amount: amount,
            company_id: 1,
            current_user_id: Uuid::new_v4(),
            current_user_role: role,
            priority,
        }
    }

    #[test]
    fn test_unconfigured_company_falls_back_to_admin() {
        let dir = tempdir().unwrap();
        let (service, _store) = service(dir.path());

        let decision = service
            .determine_route(&ctx(1_000_000, UserRole::FieldWorker, OrderPriority::Medium))
            .unwrap();
        assert_eq!(decision.approval_mode, ApprovalMode::Direct);
        assert!(!decision.can_direct_approve);

        let decision = service
            .determine_route(&ctx(1_000_000, UserRole::Admin, OrderPriority::Medium))
            .unwrap();
        assert!(decision.can_direct_approve);
    }

    #[test]
    fn test_direct_mode_checks_role_membership() {
        let dir = tempdir().unwrap();
        let (service, store) = service(dir.path());
        store
            .insert_settings(ApprovalWorkflowSettings {
                approval_mode: ApprovalMode::Direct,
                direct_approval_roles: vec![UserRole::HqManagement, UserRole::Executive],
                ..staged_settings(false)
            })
            .unwrap();

        let decision = service
            .determine_route(&ctx(5_000_000, UserRole::HqManagement, OrderPriority::Medium))
            .unwrap();
        assert!(decision.can_direct_approve);

        let decision = service
            .determine_route(&ctx(5_000_000, UserRole::FieldWorker, OrderPriority::Medium))
            .unwrap();
        assert!(!decision.can_direct_approve);
    }

    #[test]
    fn test_staged_route_selects_covering_templates() {
        let dir = tempdir().unwrap();
        let (service, store) = service(dir.path());
        store.insert_settings(staged_settings(false)).unwrap();

        let mut banded = template(1, 1, UserRole::ProjectManager, false, false);
        banded.max_amount = Some(5_000_000);
        store.insert_template(banded).unwrap();
        let mut high = template(2, 2, UserRole::Executive, false, false);
        high.min_amount = 5_000_001;
        store.insert_template(high).unwrap();

        let decision = service
            .determine_route(&ctx(3_000_000, UserRole::FieldWorker, OrderPriority::Medium))
            .unwrap();
        assert_eq!(decision.approval_mode, ApprovalMode::Staged);
        assert_eq!(decision.staged_steps.len(), 1);
        assert_eq!(decision.staged_steps[0].required_role, UserRole::ProjectManager);
        assert_eq!(decision.template_name.as_deref(), Some("standard"));
    }

    #[test]
    fn test_high_priority_drops_optional_steps_in_long_chains() {
        let dir = tempdir().unwrap();
        let (service, store) = service(dir.path());
        store.insert_settings(staged_settings(false)).unwrap();
        store
            .insert_template(template(1, 1, UserRole::ProjectManager, true, false))
            .unwrap();
        store
            .insert_template(template(2, 2, UserRole::HqManagement, false, false))
            .unwrap();
        store
            .insert_template(template(3, 3, UserRole::Executive, false, false))
            .unwrap();

        // Medium priority keeps the whole chain
        let decision = service
            .determine_route(&ctx(3_000_000, UserRole::FieldWorker, OrderPriority::Medium))
            .unwrap();
        assert_eq!(decision.staged_steps.len(), 3);

        // High priority drops the optional stage
        let decision = service
            .determine_route(&ctx(3_000_000, UserRole::FieldWorker, OrderPriority::High))
            .unwrap();
        assert_eq!(decision.staged_steps.len(), 2);
        assert!(decision.staged_steps.iter().all(|s| !s.is_optional));
    }

    #[test]
    fn test_skip_lower_stages_requires_covering_authority() {
        let dir = tempdir().unwrap();
        let (service, store) = service(dir.path());
        store.insert_settings(staged_settings(true)).unwrap();
        store
            .insert_template(template(1, 1, UserRole::ProjectManager, false, true))
            .unwrap();
        store
            .insert_template(template(2, 2, UserRole::Executive, false, false))
            .unwrap();
        store
            .insert_authority(ApprovalAuthority {
                role: UserRole::HqManagement,
                max_amount: 30_000_000,
                can_direct_approve: false,
                direct_approve_limit: None,
                is_active: true,
            })
            .unwrap();

        // hq covers the amount: the skippable pm step drops, the executive stays
        let decision = service
            .determine_route(&ctx(3_000_000, UserRole::HqManagement, OrderPriority::Medium))
            .unwrap();
        let roles: Vec<_> = decision.staged_steps.iter().map(|s| s.required_role).collect();
        assert_eq!(roles, vec![UserRole::Executive]);

        // A field worker has no covering authority, the chain is untouched
        let decision = service
            .determine_route(&ctx(3_000_000, UserRole::FieldWorker, OrderPriority::Medium))
            .unwrap();
        assert_eq!(decision.staged_steps.len(), 2);
    }

    #[test]
    fn test_fully_skipped_chain_becomes_direct() {
        let dir = tempdir().unwrap();
        let (service, store) = service(dir.path());
        store.insert_settings(staged_settings(true)).unwrap();
        store
            .insert_template(template(1, 1, UserRole::ProjectManager, false, true))
            .unwrap();
        store
            .insert_authority(ApprovalAuthority {
                role: UserRole::Executive,
                max_amount: 100_000_000,
                can_direct_approve: false,
                direct_approve_limit: None,
                is_active: true,
            })
            .unwrap();

        let decision = service
            .determine_route(&ctx(3_000_000, UserRole::Executive, OrderPriority::Medium))
            .unwrap();
        assert_eq!(decision.approval_mode, ApprovalMode::Direct);
        assert!(decision.can_direct_approve);
        assert!(decision.staged_steps.is_empty());
    }

    #[test]
    fn test_no_covering_template_falls_back_to_admin() {
        let dir = tempdir().unwrap();
        let (service, store) = service(dir.path());
        store.insert_settings(staged_settings(false)).unwrap();
        let mut banded = template(1, 1, UserRole::ProjectManager, false, false);
        banded.min_amount = 10_000_000;
        store.insert_template(banded).unwrap();

        let decision = service
            .determine_route(&ctx(1_000_000, UserRole::FieldWorker, OrderPriority::Medium))
            .unwrap();
        assert_eq!(decision.approval_mode, ApprovalMode::Direct);
        assert!(!decision.can_direct_approve);
        assert!(decision.staged_steps.is_empty());
    }
}
