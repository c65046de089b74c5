//! Deployment and validation settings.
//!
//! Settings come from a YAML file, from `ERDDAP_*` environment pairs, or both
//! (environment applied on top of the file). Environment pairs are passed in
//! explicitly so the core never touches the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datasets::CollectionOptions;
use crate::error::{DeployError, Result};
use crate::secrets::Secrets;

/// Placeholder expanded by [`DeployConfig::resolve_path`].
pub const BIG_PARENT_DIRECTORY_PLACEHOLDER: &str = "{bigParentDirectory}";

/// Top-level deployment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    /// Glob expression(s) for the reference datasets.xml, `|`-separated alternatives.
    pub datasets_xml: String,

    /// Whether `**` in `datasets_xml` descends directories.
    pub recursive: bool,

    /// Path of the datasets.xml the server actually reads.
    pub active_datasets_xml: PathBuf,

    /// The server's bigParentDirectory.
    pub big_parent_directory: PathBuf,

    /// Encoding of datasets.xml files.
    pub encoding: String,

    /// JSON object of explicit secrets.
    #[serde(skip_serializing)]
    pub secrets: Option<String>,

    /// Where the reference configuration comes from.
    pub repository: RepositorySettings,

    /// Whether to write a hard flag for each changed dataset.
    pub hard_flag: bool,

    /// Directory receiving hard flags; may contain `{bigParentDirectory}`.
    pub hard_flag_dir: String,

    /// Validate the active datasets.xml instead of the reference one.
    pub check_active: bool,

    pub rules: RuleConfig,

    pub monitor: MonitorSettings,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            datasets_xml: "**/datasets.d/*.xml|**/datasets.xml".to_string(),
            recursive: true,
            active_datasets_xml: PathBuf::from("/usr/local/tomcat/content/erddap/datasets.xml"),
            big_parent_directory: PathBuf::from("/erddapData"),
            encoding: "UTF-8".to_string(),
            secrets: None,
            repository: RepositorySettings::default(),
            hard_flag: false,
            hard_flag_dir: format!("{}/erddap/hardFlag", BIG_PARENT_DIRECTORY_PLACEHOLDER),
            check_active: false,
            rules: RuleConfig::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

/// Git repository holding the reference configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositorySettings {
    /// Remote URL to clone from.
    pub repo: Option<String>,
    /// Branch to check out.
    pub branch: Option<String>,
    /// Whether to pull from the remote before loading.
    pub pull: bool,
    /// Local working copy.
    pub local_repo_path: PathBuf,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo: None,
            branch: None,
            pull: false,
            local_repo_path: PathBuf::from("datasets-repo"),
        }
    }
}

/// Type exemptions and switches for the dataset validation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleConfig {
    /// Types skipped by every cross-reference rule.
    pub passthrough_types: Vec<String>,
    /// Type prefixes skipped by every cross-reference rule.
    pub passthrough_type_prefixes: Vec<String>,
    /// Additional types skipped by the cdm_timeseries_variables rule.
    pub timeseries_exempt_types: Vec<String>,
    /// Whether every non-coordinate variable needs a valid ioos_category.
    pub ioos_category_required: bool,
    /// Variables exempt from the ioos_category rule.
    pub coordinate_variables: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            passthrough_types: vec!["EDDTableFromErddap".to_string()],
            passthrough_type_prefixes: vec!["EDDGrid".to_string()],
            timeseries_exempt_types: vec!["EDDTableFromSOS".to_string()],
            ioos_category_required: false,
            coordinate_variables: ["latitude", "longitude", "time", "depth"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RuleConfig {
    /// Whether the cross-reference rules skip this dataset type.
    pub fn is_passthrough(&self, dataset_type: &str) -> bool {
        self.passthrough_types.iter().any(|t| t == dataset_type)
            || self
                .passthrough_type_prefixes
                .iter()
                .any(|p| dataset_type.starts_with(p.as_str()))
    }

    pub fn is_timeseries_exempt(&self, dataset_type: &str) -> bool {
        self.is_passthrough(dataset_type)
            || self.timeseries_exempt_types.iter().any(|t| t == dataset_type)
    }

    pub fn is_coordinate_variable(&self, name: &str) -> bool {
        self.coordinate_variables.iter().any(|c| c == name)
    }
}

/// Settings for keeping uptime monitors in step with the datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Public URL of the ERDDAP server, e.g. `https://data.example.org/erddap`.
    pub erddap_url: String,
    /// Instance name used as the monitor group and path prefix; derived from the URL when empty.
    pub erddap_name: Option<String>,
    /// Status page slug; derived from the instance name when empty.
    pub status_page_slug: Option<String>,
    /// Extra fields merged into the saved status page.
    pub status_page: Option<serde_json::Map<String, serde_json::Value>>,
    /// Check interval of page monitors, in seconds.
    pub page_interval: u64,
    /// Check interval of realtime data monitors, in seconds.
    pub data_interval: u64,
    /// Log mutations instead of performing them.
    pub dry_run: bool,
    /// Delete monitors that no longer match a dataset instead of only warning.
    pub prune: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            erddap_url: String::new(),
            erddap_name: None,
            status_page_slug: None,
            status_page: None,
            page_interval: 60,
            data_interval: 3600,
            dry_run: false,
            prune: false,
        }
    }
}

impl DeployConfig {
    /// Loads settings from a YAML file; missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| DeployError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Builds settings from defaults overlaid with `ERDDAP_*` environment pairs.
    pub fn from_env_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();
        config.apply_env_vars(vars)?;
        Ok(config)
    }

    /// Builds settings from an optional YAML file overlaid with `ERDDAP_*` pairs.
    pub fn from_sources<I>(config_file: Option<&Path>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = match config_file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_vars(vars)?;
        Ok(config)
    }

    /// Builds settings from the process environment, starting from
    /// `ERDDAP_CONFIG_FILE` when it is set.
    pub fn from_env() -> Result<Self> {
        let config_file = std::env::var_os("ERDDAP_CONFIG_FILE").map(PathBuf::from);
        Self::from_sources(config_file.as_deref(), std::env::vars())
    }

    /// Overrides fields from `ERDDAP_*` environment pairs. Unknown names are ignored.
    pub fn apply_env_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "ERDDAP_DATASETS_XML" => self.datasets_xml = value,
                "ERDDAP_RECURSIVE" => self.recursive = parse_bool(&key, &value)?,
                "ERDDAP_ACTIVE_DATASETS_XML" => self.active_datasets_xml = PathBuf::from(value),
                "ERDDAP_bigParentDirectory" | "bigParentDirectory" => {
                    self.big_parent_directory = PathBuf::from(value)
                }
                "ERDDAP_ENCODING" => self.encoding = value,
                "ERDDAP_SECRETS" => self.secrets = Some(value),
                "ERDDAP_DATASETS_REPO" => self.repository.repo = non_empty(value),
                "ERDDAP_DATASETS_REPO_BRANCH" => self.repository.branch = non_empty(value),
                "ERDDAP_DATASETS_REPO_PULL" => self.repository.pull = parse_bool(&key, &value)?,
                "ERDDAP_DATASETS_REPO_DIR" => {
                    self.repository.local_repo_path = PathBuf::from(value)
                }
                "ERDDAP_HARD_FLAG" => self.hard_flag = parse_bool(&key, &value)?,
                "ERDDAP_HARD_FLAG_DIR" => self.hard_flag_dir = value,
                "ERDDAP_TEST_ACTIVE" => self.check_active = parse_bool(&key, &value)?,
                "ERDDAP_variablesMustHaveIoosCategory" => {
                    self.rules.ioos_category_required = matches!(value.as_str(), "true" | "True" | "1")
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Expands `{bigParentDirectory}` in a path template.
    pub fn resolve_path(&self, template: &str) -> PathBuf {
        PathBuf::from(template.replace(
            BIG_PARENT_DIRECTORY_PLACEHOLDER,
            &self.big_parent_directory.to_string_lossy(),
        ))
    }

    /// The resolved hard flag directory.
    pub fn hard_flag_dir(&self) -> PathBuf {
        self.resolve_path(&self.hard_flag_dir)
    }

    /// Environment secrets overlaid with the explicit `secrets` JSON.
    pub fn load_secrets<I>(&self, env_vars: I) -> Result<Secrets>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let from_env = Secrets::from_env_vars(env_vars);
        let explicit = match &self.secrets {
            Some(json) if !json.trim().is_empty() => Secrets::from_json(json)?,
            _ => Secrets::new(),
        };
        Ok(from_env.overlay(explicit))
    }

    pub fn collection_options(&self) -> CollectionOptions {
        CollectionOptions {
            recursive: self.recursive,
            encoding: self.encoding.clone(),
        }
    }

    /// Options for the active datasets.xml, which is a single literal path.
    pub fn active_collection_options(&self) -> CollectionOptions {
        CollectionOptions {
            recursive: false,
            encoding: self.encoding.clone(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DeployError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
