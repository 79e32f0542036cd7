//! Data models for poflow

pub mod approval;
pub mod configuration;
pub mod order;

pub use approval::*;
pub use configuration::*;
pub use order::*;
