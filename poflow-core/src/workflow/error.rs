//! Typed error taxonomy for the approval workflow engine

use crate::models::order::{ApprovalStatus, OrderStatus};
use thiserror::Error;

/// Errors surfaced by workflow operations
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// No authority, settings, or template covers the request and no fallback exists
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The acting role may not perform this step action
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Unknown order, step, or user
    #[error("not found: {0}")]
    NotFound(String),

    /// The step was decided by a concurrent request; refresh and retry
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The requested transition is not legal from the current status pair
    #[error("illegal transition from {order_status:?}/{approval_status:?} on {event}")]
    IllegalTransition {
        order_status: OrderStatus,
        approval_status: ApprovalStatus,
        event: &'static str,
    },

    /// Underlying storage failure
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Workflow result alias
pub type WorkflowResult<T> = Result<T, WorkflowError>;
