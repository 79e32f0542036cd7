//! Approval workflow engine: authority resolution, routing, step instances,
//! the order state machine, and the orchestrator that ties them together

pub mod authority;
pub mod error;
pub mod orchestrator;
pub mod routing;
pub mod settings_cache;
pub mod state;
pub mod steps;

pub use authority::AuthorityResolver;
pub use error::{WorkflowError, WorkflowResult};
pub use orchestrator::{NewOrder, WorkflowOrchestrator, WorkflowStatus};
pub use routing::RoutingService;
pub use settings_cache::SettingsCache;
pub use state::{TransitionEvent, TransitionResult};
pub use steps::StepInstanceManager;
