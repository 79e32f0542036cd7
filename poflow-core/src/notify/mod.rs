//! Notification fan-out: event outbox types, rooms, dispatcher, and sinks

pub mod dispatcher;
pub mod event;
pub mod sink;

pub use dispatcher::*;
pub use event::*;
pub use sink::*;
