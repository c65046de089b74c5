//! Expected monitor set for a deployment and the actions to reach it.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::MonitorSettings;
use crate::datasets::ConfigDocument;
use crate::error::{DeployError, Result};

static URL_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(.+)$").expect("valid URL regex"));
static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9-]+").expect("valid slug regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid dash regex"));

/// Server pages watched for every deployment.
pub const SERVER_PAGES: [&str; 3] = ["index.html", "tabledap/index.html", "griddap/index.html"];

/// Dataset id fragments marking a realtime dataset.
const REALTIME_TERMS: [&str; 3] = ["realtime", "real-time", "5min"];

/// Window checked by realtime data monitors.
const REALTIME_WINDOW: &str = "1day";

/// Kind of monitor understood by the monitoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Http,
    Group,
}

/// A monitor as reported by the monitoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: u64,
    pub name: String,
    /// Full path including parent groups, e.g. `"data.example.org / index.html"`.
    pub path_name: String,
    pub active: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub parent: Option<u64>,
}

/// A monitor to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    pub name: String,
    pub description: String,
    pub path_name: String,
    #[serde(rename = "type")]
    pub kind: MonitorKind,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub interval: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
}

/// A status page as reported by the monitoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPage {
    #[serde(default)]
    pub id: Option<u64>,
    pub slug: String,
    pub title: String,
}

/// Actions that bring the actual monitor set in line with the expected one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorPlan {
    pub add: Vec<MonitorSpec>,
    pub pause: Vec<Monitor>,
    pub resume: Vec<Monitor>,
    /// Monitors under the instance prefix that no longer match a dataset.
    pub stale: Vec<Monitor>,
}

impl MonitorPlan {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.pause.is_empty() && self.resume.is_empty() && self.stale.is_empty()
    }
}

/// Derives the instance name from a server URL by dropping the scheme.
pub fn erddap_name_from_url(url: &str) -> Result<String> {
    URL_HOST
        .captures(url.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('/').to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DeployError::Config(format!("Cannot derive an instance name from URL '{}'", url)))
}

/// Status page slug for an instance name.
pub fn slug_from_name(name: &str) -> String {
    let slug = NON_SLUG.replace_all(name, "-").to_lowercase();
    let slug = DASHES.replace_all(&slug, "-");
    let slug = slug.trim_end_matches('-');
    slug.strip_suffix("-erddap").unwrap_or(slug).to_string()
}

/// `tabledap` or `griddap`, from the dataset type.
pub fn erddap_protocol(dataset: &ConfigDocument) -> Option<&'static str> {
    if dataset.is_table() {
        Some("tabledap")
    } else if dataset.is_grid() {
        Some("griddap")
    } else {
        None
    }
}

fn is_realtime(dataset_id: &str) -> bool {
    let id = dataset_id.to_lowercase();
    REALTIME_TERMS.iter().any(|term| id.contains(term))
}

/// Computes monitors and status page content for one server instance.
#[derive(Debug, Clone)]
pub struct MonitorPlanner {
    name: String,
    url: String,
    slug: String,
    page_interval: u64,
    data_interval: u64,
}

impl MonitorPlanner {
    pub fn new(settings: &MonitorSettings) -> Result<Self> {
        let url = settings.erddap_url.trim_end_matches('/').to_string();
        let name = match settings.erddap_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => erddap_name_from_url(&url)?,
        };
        let slug = match settings.status_page_slug.as_deref().filter(|s| !s.is_empty()) {
            Some(slug) => slug.to_string(),
            None => slug_from_name(&name),
        };
        Ok(Self {
            name,
            url,
            slug,
            page_interval: settings.page_interval,
            data_interval: settings.data_interval,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Path prefix scoping this instance's monitors.
    pub fn path_prefix(&self) -> String {
        format!("{} / ", self.name)
    }

    /// True when `monitor` belongs to this instance.
    pub fn owns(&self, monitor: &Monitor) -> bool {
        monitor.path_name.starts_with(&self.path_prefix())
    }

    /// Finds the group monitor all instance monitors hang under.
    pub fn find_parent<'a>(&self, monitors: &'a [Monitor]) -> Option<&'a Monitor> {
        monitors.iter().find(|m| m.path_name == self.name)
    }

    pub fn parent_spec(&self) -> MonitorSpec {
        MonitorSpec {
            name: self.name.clone(),
            description: format!("ERDDAP server {}", self.url),
            path_name: self.name.clone(),
            kind: MonitorKind::Group,
            active: true,
            url: None,
            interval: self.page_interval,
            parent: None,
        }
    }

    fn http_spec(&self, name: String, description: String, active: bool, interval: u64) -> MonitorSpec {
        MonitorSpec {
            path_name: format!("{}{}", self.path_prefix(), name),
            url: Some(format!("{}/{}", self.url, name)),
            name,
            description,
            kind: MonitorKind::Http,
            active,
            interval,
            parent: None,
        }
    }

    /// Server page monitors, one page monitor per dataset, and a data monitor
    /// for every realtime dataset.
    pub fn expected_monitors(&self, datasets: &IndexMap<String, ConfigDocument>) -> Vec<MonitorSpec> {
        let mut monitors: Vec<MonitorSpec> = SERVER_PAGES
            .iter()
            .map(|page| {
                self.http_spec(
                    page.to_string(),
                    format!("ERDDAP Page Monitor for {}", page),
                    true,
                    self.page_interval,
                )
            })
            .collect();

        for dataset in datasets.values() {
            let Some(protocol) = erddap_protocol(dataset) else {
                log::warn!(
                    "No monitor for dataset {}: unknown protocol for type {}",
                    dataset.dataset_id,
                    dataset.dataset_type
                );
                continue;
            };
            monitors.push(self.http_spec(
                format!("{}/{}.html", protocol, dataset.dataset_id),
                format!("ERDDAP Dataset Page Monitor for {}", dataset.dataset_id),
                dataset.active,
                self.page_interval,
            ));
            if is_realtime(&dataset.dataset_id) {
                monitors.push(self.http_spec(
                    format!(
                        "{}/{}.htmlTable?&time>now-{}",
                        protocol, dataset.dataset_id, REALTIME_WINDOW
                    ),
                    format!(
                        "ERDDAP Dataset Realtime Monitor for {}: last {}",
                        dataset.dataset_id, REALTIME_WINDOW
                    ),
                    dataset.active,
                    self.data_interval,
                ));
            }
        }
        monitors
    }

    /// Diffs expected monitors against the service's monitors, matched by path name.
    pub fn plan(&self, expected: &[MonitorSpec], actual: &[Monitor]) -> MonitorPlan {
        let owned: Vec<&Monitor> = actual.iter().filter(|m| self.owns(m)).collect();
        let actual_paths: HashSet<&str> = owned.iter().map(|m| m.path_name.as_str()).collect();
        let expected_active: HashMap<&str, bool> = expected
            .iter()
            .map(|m| (m.path_name.as_str(), m.active))
            .collect();

        let mut plan = MonitorPlan {
            add: expected
                .iter()
                .filter(|m| !actual_paths.contains(m.path_name.as_str()))
                .cloned()
                .collect(),
            ..MonitorPlan::default()
        };

        for monitor in owned {
            match expected_active.get(monitor.path_name.as_str()) {
                Some(false) if monitor.active => plan.pause.push(monitor.clone()),
                Some(true) if !monitor.active => plan.resume.push(monitor.clone()),
                Some(_) => {}
                None => plan.stale.push(monitor.clone()),
            }
        }
        plan
    }

    /// Status page body with one public group per monitor category.
    ///
    /// `extra` fields override the generated ones, except `slug`.
    pub fn status_page(&self, monitors: &[Monitor], extra: Option<&serde_json::Map<String, Value>>) -> Value {
        let owned: Vec<&Monitor> = monitors.iter().filter(|m| self.owns(m)).collect();

        let mut page = json!({
            "title": format!("ERDDAP Status: {}", self.name),
            "description": format!(
                "ERDDAP Status Page for {} available at <a href=\"{}\">{}</a>",
                self.name, self.url, self.url
            ),
            "showTags": true,
            "domainNameList": [self.url],
            "footerText": format!("<a href={}>{}</a>", self.url, self.name),
            "publicGroupList": [
                {
                    "name": "ERDDAP Pages",
                    "weight": 1,
                    "monitorList": monitor_ids(&owned, |p| p.contains("index.html")),
                },
                {
                    "name": "ERDDAP Datasets",
                    "weight": 1,
                    "monitorList": monitor_ids(&owned, |p| !p.contains("index.html") && !p.contains("now-")),
                },
                {
                    "name": "ERDDAP Realtime Datasets",
                    "weight": 1,
                    "monitorList": monitor_ids(&owned, |p| p.contains("now-")),
                },
            ],
        });

        if let (Some(extra), Some(fields)) = (extra, page.as_object_mut()) {
            for (key, value) in extra {
                if key != "slug" {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        page
    }
}

fn monitor_ids(monitors: &[&Monitor], include: impl Fn(&str) -> bool) -> Vec<Value> {
    monitors
        .iter()
        .filter(|m| include(&m.path_name))
        .map(|m| json!({ "id": m.id }))
        .collect()
}
