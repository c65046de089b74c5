//! Read-only monitoring service state loaded from a JSON export.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{MonitorClient, MonitorResult};
use super::error::MonitorError;
use super::planner::{Monitor, MonitorSpec, StatusPage};
use crate::error::{DeployError, Result};

/// Monitors and status pages as exported from the monitoring service.
///
/// Reads are served from memory; every mutation fails with
/// [`MonitorError::Api`], so it is meant to sit behind a
/// [`DryRunClient`](super::DryRunClient).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSnapshot {
    pub monitors: Vec<Monitor>,
    pub status_pages: Vec<StatusPage>,
}

impl MonitorSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DeployError::Config(format!("Invalid monitor snapshot: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| DeployError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    fn read_only<T>(&self, operation: &str) -> MonitorResult<T> {
        Err(MonitorError::Api(format!(
            "{} is not supported on a read-only monitor snapshot",
            operation
        )))
    }
}

impl MonitorClient for MonitorSnapshot {
    fn list_monitors(&self) -> MonitorResult<Vec<Monitor>> {
        Ok(self.monitors.clone())
    }

    fn get_monitor(&self, id: u64) -> MonitorResult<Monitor> {
        self.monitors
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))
    }

    fn add_monitor(&self, _spec: &MonitorSpec) -> MonitorResult<u64> {
        self.read_only("add_monitor")
    }

    fn pause_monitor(&self, _id: u64) -> MonitorResult<()> {
        self.read_only("pause_monitor")
    }

    fn resume_monitor(&self, _id: u64) -> MonitorResult<()> {
        self.read_only("resume_monitor")
    }

    fn delete_monitor(&self, _id: u64) -> MonitorResult<()> {
        self.read_only("delete_monitor")
    }

    fn list_status_pages(&self) -> MonitorResult<Vec<StatusPage>> {
        Ok(self.status_pages.clone())
    }

    fn add_status_page(&self, _slug: &str, _title: &str) -> MonitorResult<()> {
        self.read_only("add_status_page")
    }

    fn save_status_page(&self, _slug: &str, _page: &Value) -> MonitorResult<()> {
        self.read_only("save_status_page")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "monitors": [
            {"id": 1, "name": "data.example.org", "pathName": "data.example.org", "active": true},
            {"id": 2, "name": "index.html", "pathName": "data.example.org / index.html",
             "active": false, "url": "https://data.example.org/index.html", "parent": 1}
        ],
        "statusPages": [{"id": 7, "slug": "data-example-org", "title": "ERDDAP Status"}]
    }"#;

    #[test]
    fn test_reads_export() {
        let snapshot = MonitorSnapshot::from_json(EXPORT).unwrap();
        assert_eq!(snapshot.list_monitors().unwrap().len(), 2);
        assert_eq!(snapshot.get_monitor(2).unwrap().parent, Some(1));
        assert!(!snapshot.get_monitor(2).unwrap().active);
        assert!(matches!(snapshot.get_monitor(9), Err(MonitorError::NotFound(_))));
        assert_eq!(snapshot.list_status_pages().unwrap()[0].slug, "data-example-org");
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let snapshot = MonitorSnapshot::from_json("{}").unwrap();
        assert!(snapshot.monitors.is_empty());
        assert!(snapshot.status_pages.is_empty());
        assert!(MonitorSnapshot::from_json("[]").is_err());
    }

    #[test]
    fn test_mutations_are_rejected() {
        let snapshot = MonitorSnapshot::default();
        assert!(matches!(snapshot.pause_monitor(1), Err(MonitorError::Api(_))));
        assert!(matches!(
            snapshot.add_status_page("x", "y"),
            Err(MonitorError::Api(_))
        ));
    }
}
