//! StackSet Reconciler: keeps a per-account CloudFormation StackSet deployed
//! to exactly the requested regions
//!
//! This crate compares a desired region set against the live stack set,
//! applies a single corrective action and waits for the remote operation to
//! settle into a terminal outcome.

pub mod controller;
pub mod driver;
pub mod error;
pub mod stackset;
pub mod telemetry;

pub use crate::error::{Error, Result};
