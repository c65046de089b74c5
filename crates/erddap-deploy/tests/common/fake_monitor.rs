//! In-memory monitoring service.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use erddap_deploy::monitor::{
    Monitor, MonitorClient, MonitorError, MonitorKind, MonitorResult, MonitorSpec, StatusPage,
};

#[derive(Debug, Default)]
pub struct FakeState {
    pub monitors: Vec<Monitor>,
    pub status_pages: Vec<StatusPage>,
    pub saved_pages: Vec<(String, Value)>,
    /// Mutating calls, e.g. `"add data.example.org / index.html"` or `"pause 3"`.
    pub mutations: Vec<String>,
    next_id: u64,
}

/// Cloneable handle; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeMonitorClient {
    state: Rc<RefCell<FakeState>>,
}

impl FakeMonitorClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing monitor and returns its id.
    pub fn seed(&self, path_name: &str, active: bool) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.monitors.push(Monitor {
            id,
            name: path_name.rsplit(" / ").next().unwrap_or(path_name).to_string(),
            path_name: path_name.to_string(),
            active,
            url: None,
            parent: None,
        });
        id
    }

    pub fn monitor(&self, path_name: &str) -> Option<Monitor> {
        self.state
            .borrow()
            .monitors
            .iter()
            .find(|m| m.path_name == path_name)
            .cloned()
    }

    pub fn monitor_count(&self) -> usize {
        self.state.borrow().monitors.len()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.borrow().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.borrow_mut().mutations.clear();
    }

    pub fn saved_pages(&self) -> Vec<(String, Value)> {
        self.state.borrow().saved_pages.clone()
    }

    fn set_active(&self, id: u64, active: bool, verb: &str) -> MonitorResult<()> {
        let mut state = self.state.borrow_mut();
        let monitor = state
            .monitors
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))?;
        monitor.active = active;
        state.mutations.push(format!("{} {}", verb, id));
        Ok(())
    }
}

impl MonitorClient for FakeMonitorClient {
    fn list_monitors(&self) -> MonitorResult<Vec<Monitor>> {
        Ok(self.state.borrow().monitors.clone())
    }

    fn get_monitor(&self, id: u64) -> MonitorResult<Monitor> {
        self.state
            .borrow()
            .monitors
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))
    }

    fn add_monitor(&self, spec: &MonitorSpec) -> MonitorResult<u64> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.monitors.push(Monitor {
            id,
            name: spec.name.clone(),
            path_name: spec.path_name.clone(),
            active: true,
            url: spec.url.clone(),
            parent: spec.parent,
        });
        let kind = match spec.kind {
            MonitorKind::Group => "group",
            MonitorKind::Http => "http",
        };
        state
            .mutations
            .push(format!("add {} {}", kind, spec.path_name));
        Ok(id)
    }

    fn pause_monitor(&self, id: u64) -> MonitorResult<()> {
        self.set_active(id, false, "pause")
    }

    fn resume_monitor(&self, id: u64) -> MonitorResult<()> {
        self.set_active(id, true, "resume")
    }

    fn delete_monitor(&self, id: u64) -> MonitorResult<()> {
        let mut state = self.state.borrow_mut();
        let before = state.monitors.len();
        state.monitors.retain(|m| m.id != id);
        if state.monitors.len() == before {
            return Err(MonitorError::NotFound(id.to_string()));
        }
        state.mutations.push(format!("delete {}", id));
        Ok(())
    }

    fn list_status_pages(&self) -> MonitorResult<Vec<StatusPage>> {
        Ok(self.state.borrow().status_pages.clone())
    }

    fn add_status_page(&self, slug: &str, title: &str) -> MonitorResult<()> {
        let mut state = self.state.borrow_mut();
        state.status_pages.push(StatusPage {
            id: None,
            slug: slug.to_string(),
            title: title.to_string(),
        });
        state.mutations.push(format!("add_page {}", slug));
        Ok(())
    }

    fn save_status_page(&self, slug: &str, page: &Value) -> MonitorResult<()> {
        let mut state = self.state.borrow_mut();
        state.saved_pages.push((slug.to_string(), page.clone()));
        Ok(())
    }
}
