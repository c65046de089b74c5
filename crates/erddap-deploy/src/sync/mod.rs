//! Repository sync and reconciliation of the active datasets.xml.

pub mod git;
pub mod reconciler;

pub use git::{format_git_error, GitRepository, LocalDirectory, RepositorySync};
pub use reconciler::{write_hard_flags, ReconcileReport, ReconcileState, Reconciler};
