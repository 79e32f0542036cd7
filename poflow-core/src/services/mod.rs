//! Ambient services: logging setup and helpers

pub mod logging;
