//! Shared test utilities for csrgen integration tests.
//!
//! - `TestHarness` for isolated jobs and database directories
//! - Stub generators standing in for the external tool

pub mod generators;
pub mod harness;

pub use generators::*;
pub use harness::{wait_for, TestHarness};
