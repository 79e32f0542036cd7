//! Logging service

use crate::models::LogLevel;

/// Initialize logging with the specified level
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match level {
        LogLevel::Error => "poflow=error",
        LogLevel::Warn => "poflow=warn",
        LogLevel::Info => "poflow=info",
        LogLevel::Debug => "poflow=debug",
        LogLevel::Trace => "poflow=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Log a workflow action against an order
pub fn log_workflow_action(action: &str, order_id: i64, details: Option<&str>) {
    tracing::info!(
        action = action,
        order_id = order_id,
        details = details.unwrap_or(""),
        "Workflow action"
    );
}

/// Log a denied approval attempt (always logged regardless of level)
pub fn log_permission_denied(action: &str, order_id: i64, user: Option<&str>, details: &str) {
    tracing::warn!(
        action = action,
        order_id = order_id,
        user = user.unwrap_or("unknown"),
        details = details,
        "Permission denied"
    );
}

/// Log a system error
pub fn log_error(error: &str, context: Option<&str>) {
    tracing::error!(
        error = error,
        context = context.unwrap_or(""),
        "System error occurred"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_logging() {
        INIT.call_once(|| {
            let _ = init_logging(LogLevel::Info);
        });
    }

    #[test]
    fn test_logging_initialization() {
        // Just test that initialization doesn't panic
        let _ = init_logging(LogLevel::Info);
    }

    #[test]
    fn test_log_functions() {
        init_test_logging();

        // These should not panic
        log_workflow_action("submitted", 1, Some("test details"));
        log_permission_denied("approve", 1, Some("test-user"), "test details");
        log_error("test error", Some("test context"));
    }
}
