//! Uptime monitors kept in step with the served datasets.
//!
//! [`planner`] computes the expected monitor set and the actions needed to
//! reach it; [`synchronizer`] applies them through a [`MonitorClient`]
//! wrapped with retries and optional dry-run gating. [`MonitorSnapshot`]
//! serves a JSON export of the service for offline dry runs.

pub mod client;
pub mod error;
pub mod planner;
pub mod snapshot;
pub mod synchronizer;

pub use client::{DryRunClient, MonitorClient, MonitorResult, RetryingClient};
pub use error::MonitorError;
pub use planner::{
    erddap_name_from_url, slug_from_name, Monitor, MonitorKind, MonitorPlan, MonitorPlanner,
    MonitorSpec, StatusPage,
};
pub use snapshot::MonitorSnapshot;
pub use synchronizer::{MonitorSyncReport, MonitorSynchronizer};
