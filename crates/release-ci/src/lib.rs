//! release-ci — CI Trigger Client for GitHub Actions workflow dispatch.

pub mod client;

pub use client::{CiDispatchError, CiTriggerClient, CiTriggerConfig};
