//! Integration tests and shared fixtures

pub mod e2e;
pub mod fixtures;
