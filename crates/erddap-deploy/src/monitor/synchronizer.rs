//! Applies a [`MonitorPlan`] through a [`MonitorClient`].

use indexmap::IndexMap;
use serde::Serialize;

use super::client::{DryRunClient, MonitorClient, RetryingClient};
use super::planner::{MonitorPlan, MonitorPlanner};
use crate::config::MonitorSettings;
use crate::datasets::ConfigDocument;
use crate::error::Result;

/// Summary of one synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSyncReport {
    pub parent_created: bool,
    pub added: Vec<String>,
    pub paused: Vec<String>,
    pub resumed: Vec<String>,
    pub deleted: Vec<String>,
    /// Monitors no longer expected but kept because pruning is off.
    pub kept_stale: Vec<String>,
    pub status_page_created: bool,
}

/// Keeps the monitoring service in step with a dataset collection.
pub struct MonitorSynchronizer {
    client: Box<dyn MonitorClient>,
    planner: MonitorPlanner,
    settings: MonitorSettings,
}

impl MonitorSynchronizer {
    /// Wraps `client` with timeout retries, and with dry-run gating when configured.
    pub fn new(client: impl MonitorClient + 'static, settings: &MonitorSettings) -> Result<Self> {
        let retrying = RetryingClient::new(client);
        let client: Box<dyn MonitorClient> = if settings.dry_run {
            Box::new(DryRunClient::new(retrying))
        } else {
            Box::new(retrying)
        };
        Ok(Self {
            client,
            planner: MonitorPlanner::new(settings)?,
            settings: settings.clone(),
        })
    }

    pub fn planner(&self) -> &MonitorPlanner {
        &self.planner
    }

    /// Computes the plan without applying it.
    pub fn plan(&self, datasets: &IndexMap<String, ConfigDocument>) -> Result<MonitorPlan> {
        let monitors = self.client.list_monitors()?;
        let expected = self.planner.expected_monitors(datasets);
        Ok(self.planner.plan(&expected, &monitors))
    }

    pub fn sync(&self, datasets: &IndexMap<String, ConfigDocument>) -> Result<MonitorSyncReport> {
        let mut report = MonitorSyncReport::default();
        let monitors = self.client.list_monitors()?;
        log::info!(
            "Found {} erddap dataset monitors",
            monitors.iter().filter(|m| self.planner.owns(m)).count()
        );
        if datasets.is_empty() {
            log::warn!("No datasets, monitors left untouched");
            return Ok(report);
        }
        log::info!("Found {} datasets", datasets.len());

        let parent_id = match self.planner.find_parent(&monitors) {
            Some(parent) => parent.id,
            None => {
                log::info!("Adding parent {}", self.planner.name());
                report.parent_created = true;
                self.client.add_monitor(&self.planner.parent_spec())?
            }
        };

        let expected = self.planner.expected_monitors(datasets);
        let plan = self.planner.plan(&expected, &monitors);
        log::info!("{} monitors are missing", plan.add.len());

        for mut spec in plan.add {
            spec.parent = Some(parent_id);
            log::info!("Adding monitor {}", spec.name);
            let id = self.client.add_monitor(&spec)?;
            if !spec.active {
                self.client.pause_monitor(id)?;
            }
            report.added.push(spec.path_name);
        }

        for monitor in plan.pause {
            log::info!("Pausing monitor {}", monitor.path_name);
            self.client.pause_monitor(monitor.id)?;
            report.paused.push(monitor.path_name);
        }

        for monitor in plan.resume {
            log::info!("Resuming monitor {}", monitor.path_name);
            self.client.resume_monitor(monitor.id)?;
            report.resumed.push(monitor.path_name);
        }

        for monitor in plan.stale {
            if self.settings.prune {
                log::info!("Deleting monitor {}", monitor.path_name);
                self.client.delete_monitor(monitor.id)?;
                report.deleted.push(monitor.path_name);
            } else {
                report.kept_stale.push(monitor.path_name);
            }
        }
        if !report.kept_stale.is_empty() {
            log::warn!(
                "The following monitors no longer match a dataset: {:?}",
                report.kept_stale
            );
        }

        report.status_page_created = self.maintain_status_page()?;
        log::info!("Uptime monitoring update completed");
        Ok(report)
    }

    /// Creates the status page when absent, then saves its groups.
    fn maintain_status_page(&self) -> Result<bool> {
        let slug = self.planner.slug();
        let exists = self
            .client
            .list_status_pages()?
            .iter()
            .any(|page| page.slug == slug);

        if !exists {
            let title = format!("ERDDAP Status: {}", self.planner.name());
            log::info!("Adding status page {} with title {}", slug, title);
            self.client.add_status_page(slug, &title)?;
        }

        let monitors = self.client.list_monitors()?;
        let page = self
            .planner
            .status_page(&monitors, self.settings.status_page.as_ref());
        log::info!("Updating status page {}", slug);
        self.client.save_status_page(slug, &page)?;
        Ok(!exists)
    }
}
