//! Controller for the Tigera Manager (web console)
//!
//! Waits for the manager's dependencies (API server, license, Elasticsearch,
//! authentication, multi-cluster secrets), renders the manager with its
//! certificates and reports progress on the `manager` TigeraStatus.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod handler;
pub mod runner;

pub use client::{KubeManagerClient, ManagerClient};
pub use controller::{error_policy, reconcile, Context, ControllerConfig};
pub use runner::{required_crds_present, run};
