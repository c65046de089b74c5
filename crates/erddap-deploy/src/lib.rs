//! Validation, reconciliation and deployment of ERDDAP `datasets.xml` configuration.
//!
//! A reference configuration (usually a git working copy of `datasets.d/*.xml`
//! fragments) is merged into one [`ConfigCollection`], checked against the
//! [`validation`] rules, diffed against the server's active `datasets.xml` and
//! written over it by the [`Reconciler`]. The [`monitor`] module keeps an
//! uptime monitoring service in step with the served datasets.

pub mod config;
pub mod datasets;
pub mod error;
pub mod monitor;
pub mod secrets;
pub mod sync;
pub mod validation;

pub use config::{DeployConfig, MonitorSettings, RepositorySettings, RuleConfig};
pub use datasets::{
    diff, CollectionOptions, ConfigCollection, ConfigDocument, DatasetChange, DatasetComparator,
    DiffReport, Differ, SaveSource, SerializedComparator, StructuralComparator, Variable,
};
pub use error::{DeployError, Result};
pub use monitor::{
    MonitorClient, MonitorError, MonitorPlanner, MonitorSnapshot, MonitorSyncReport,
    MonitorSynchronizer,
};
pub use secrets::{Secrets, SubstitutionReport};
pub use sync::{GitRepository, LocalDirectory, ReconcileReport, ReconcileState, Reconciler, RepositorySync};
pub use validation::{Rule, RuleOutcome, RuleSet, ValidationReport, Violation};
