//! Reconciler: sync repo → load reference → diff against active → write.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::git::{GitRepository, RepositorySync};
use crate::config::DeployConfig;
use crate::datasets::{CollectionOptions, ConfigCollection, DiffReport, Differ, SaveSource};
use crate::error::{DeployError, Result};
use crate::secrets::Secrets;

/// Maximum number of retries for transient errors.
const MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Progress of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Init,
    RepoSynced,
    Loaded,
    Diffed,
    Reconciled,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileState::Init => "INIT",
            ReconcileState::RepoSynced => "REPO_SYNCED",
            ReconcileState::Loaded => "LOADED",
            ReconcileState::Diffed => "DIFFED",
            ReconcileState::Reconciled => "RECONCILED",
            ReconcileState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// Changed dataset ids, reference on the left and active on the right.
    pub diff: DiffReport,
    /// No active datasets.xml existed before this run.
    pub first_deployment: bool,
    /// Whether the active datasets.xml was (re)written.
    pub active_written: bool,
    /// Hard flag files written, one per changed dataset.
    pub flags_written: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
}

/// Makes the active datasets.xml match the reference one.
///
/// A run is a one-shot batch: concurrent runs against the same active path
/// must be serialized by the caller.
pub struct Reconciler {
    repository: Box<dyn RepositorySync>,
    reference_locator: String,
    reference_options: CollectionOptions,
    active_path: PathBuf,
    active_options: CollectionOptions,
    secrets: Secrets,
    hard_flag_dir: Option<PathBuf>,
    differ: Differ,
    retry_base_delay: Duration,
    state: ReconcileState,
}

impl Reconciler {
    /// `reference_locator` is resolved against the synced repository directory.
    pub fn new(
        repository: impl RepositorySync + 'static,
        reference_locator: impl Into<String>,
        active_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository: Box::new(repository),
            reference_locator: reference_locator.into(),
            reference_options: CollectionOptions::default(),
            active_path: active_path.into(),
            active_options: CollectionOptions {
                recursive: false,
                ..CollectionOptions::default()
            },
            secrets: Secrets::new(),
            hard_flag_dir: None,
            differ: Differ::new(),
            retry_base_delay: RETRY_BASE_DELAY,
            state: ReconcileState::Init,
        }
    }

    /// Builds a reconciler over a git working copy from deployment settings.
    pub fn from_config(config: &DeployConfig, secrets: Secrets) -> Self {
        let mut reconciler = Self::new(
            GitRepository::new(config.repository.clone()),
            config.datasets_xml.clone(),
            config.active_datasets_xml.clone(),
        )
        .with_secrets(secrets)
        .with_reference_options(config.collection_options())
        .with_active_options(config.active_collection_options());
        if config.hard_flag {
            reconciler = reconciler.with_hard_flag_dir(config.hard_flag_dir());
        }
        reconciler
    }

    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_reference_options(mut self, options: CollectionOptions) -> Self {
        self.reference_options = options;
        self
    }

    pub fn with_active_options(mut self, options: CollectionOptions) -> Self {
        self.active_options = options;
        self
    }

    /// Enables hard flags, written into `dir`.
    pub fn with_hard_flag_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hard_flag_dir = Some(dir.into());
        self
    }

    pub fn with_differ(mut self, differ: Differ) -> Self {
        self.differ = differ;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Runs the reconciliation once. Any error leaves the state at `FAILED`.
    ///
    /// An active datasets.xml already written is not rolled back on a later failure.
    pub fn run(&mut self) -> Result<ReconcileReport> {
        self.state = ReconcileState::Init;
        match self.run_inner() {
            Ok(report) => Ok(report),
            Err(e) => {
                log::error!("Reconcile failed in state {}: {}", self.state, e);
                self.state = ReconcileState::Failed;
                Err(e)
            }
        }
    }

    fn run_inner(&mut self) -> Result<ReconcileReport> {
        let started_at = Utc::now();

        let repo_dir = self.sync_repository()?;
        self.transition(ReconcileState::RepoSynced);

        let reference = self.load_reference(&repo_dir)?;
        let mut active = ConfigCollection::for_file(
            &self.active_path,
            self.secrets.clone(),
            self.active_options.clone(),
        );
        active.load()?;
        self.transition(ReconcileState::Loaded);

        let first_deployment = !active.is_loaded();
        let diff = if first_deployment {
            log::info!(
                "Active datasets.xml not found in {}",
                self.active_path.display()
            );
            DiffReport::all_new(reference.datasets().keys())
        } else {
            self.differ.diff(&reference, &active)
        };
        log::info!("{} dataset(s) changed", diff.len());
        self.transition(ReconcileState::Diffed);

        let mut active_written = false;
        let mut flags_written = Vec::new();
        if first_deployment || !diff.is_empty() {
            active_written = reference.save(&self.active_path, SaveSource::Original, None)?;
            if let Some(dir) = &self.hard_flag_dir {
                flags_written = write_hard_flags(dir, diff.ids())?;
            }
        }
        self.transition(ReconcileState::Reconciled);

        Ok(ReconcileReport {
            diff,
            first_deployment,
            active_written,
            flags_written,
            started_at,
        })
    }

    /// Syncs the repository, retrying transient errors with exponential backoff.
    fn sync_repository(&self) -> Result<PathBuf> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_base_delay * (1 << (attempt - 1));
                log::info!(
                    "Retrying repository sync (attempt {}/{}) after {:?}...",
                    attempt + 1,
                    MAX_RETRIES + 1,
                    delay
                );
                std::thread::sleep(delay);
            }

            match self.repository.sync() {
                Ok(dir) => return Ok(dir),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    log::warn!("Repository sync failed with retryable error: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DeployError::GitOperation("Repository sync failed after all retries".to_string())
        }))
    }

    fn load_reference(&self, repo_dir: &Path) -> Result<ConfigCollection> {
        let locator = locator_in(repo_dir, &self.reference_locator);
        let mut reference = ConfigCollection::new(
            locator.clone(),
            self.secrets.clone(),
            self.reference_options.clone(),
        );
        reference.load()?;

        if reference.raw_text().is_none() || reference.is_empty() {
            return Err(DeployError::NoReferenceConfig(locator));
        }
        reference.ensure_unique_ids()?;
        Ok(reference)
    }

    fn transition(&mut self, next: ReconcileState) {
        log::debug!("Reconcile {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Resolves every relative `|`-separated alternative against `dir`.
fn locator_in(dir: &Path, locator: &str) -> String {
    locator
        .split('|')
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .map(|alt| {
            if Path::new(alt).is_absolute() {
                alt.to_string()
            } else {
                dir.join(alt).to_string_lossy().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Writes an empty marker file named after each dataset id into `dir`.
///
/// Existing flags are overwritten, so repeated calls are harmless. Ids that are
/// not a single plain file name are skipped with a warning.
pub fn write_hard_flags<'a>(
    dir: &Path,
    dataset_ids: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| DeployError::CreateDirectory {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut written = Vec::new();
    for id in dataset_ids {
        if !is_plain_file_name(id) {
            log::warn!("Skipping hard flag for dataset id {:?}: not a plain file name", id);
            continue;
        }
        let path = dir.join(id);
        log::info!("Generate hard flag for {}", id);
        fs::write(&path, "").map_err(|e| DeployError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        written.push(path);
    }
    Ok(written)
}

fn is_plain_file_name(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == id
    )
}
