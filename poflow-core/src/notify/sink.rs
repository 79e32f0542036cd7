//! Notification sink trait for external delivery channels

use crate::notify::event::WorkflowEvent;
use anyhow::Result;
use async_trait::async_trait;

/// Trait for delivering workflow events to an external channel (email, push).
/// Delivery is best-effort; implementations must not block workflow actions.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name used in delivery-failure logs
    fn name(&self) -> &str;

    /// Deliver one event
    async fn send(&self, event: &WorkflowEvent) -> Result<()>;
}
