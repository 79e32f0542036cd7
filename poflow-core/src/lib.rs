//! # Poflow Core Library
//!
//! Purchase order approval workflow engine: data models, JSON persistence,
//! the routing and authority services, and notification fan-out.

pub mod models;
pub mod notify;
pub mod services;
pub mod store;
pub mod workflow;
