//! Shared helpers for the integration tests
#![allow(dead_code)]

pub mod broker;

pub use broker::*;
pub use venues::*;
