//! JSON-file-backed repository for orders and approval configuration

pub mod json_store;

pub use json_store::*;
