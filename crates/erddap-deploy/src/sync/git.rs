//! Local working copy of the reference configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use walkdir::WalkDir;

use crate::config::RepositorySettings;
use crate::error::{classify_git_error, DeployError, Result};

/// Brings a local directory holding the reference configuration up to date.
pub trait RepositorySync {
    /// Synchronizes and returns the directory the reference configuration lives in.
    fn sync(&self) -> Result<PathBuf>;
}

/// An existing directory used as-is.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    path: PathBuf,
}

impl LocalDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RepositorySync for LocalDirectory {
    fn sync(&self) -> Result<PathBuf> {
        if self.path.is_dir() {
            Ok(self.path.clone())
        } else {
            Err(DeployError::MissingRepository)
        }
    }
}

/// Git working copy driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepository {
    repo_path: PathBuf,
    settings: RepositorySettings,
}

impl GitRepository {
    pub fn new(settings: RepositorySettings) -> Self {
        Self {
            repo_path: settings.local_repo_path.clone(),
            settings,
        }
    }

    /// Returns the repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    /// Checks if the directory is a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// True when the local path is missing or has no entries.
    pub fn needs_clone(&self) -> bool {
        if !self.repo_path.exists() {
            return true;
        }
        WalkDir::new(&self.repo_path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .next()
            .is_none()
    }

    /// Clones the configured remote into the local path.
    pub fn clone_remote(&self) -> Result<()> {
        let url = self
            .settings
            .repo
            .as_deref()
            .ok_or(DeployError::MissingRepository)?;

        if let Some(parent) = self.repo_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DeployError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        log::info!("Clone repo {} to {}", url, self.repo_path.display());
        let output = Command::new("git")
            .args(["clone", url])
            .arg(&self.repo_path)
            .output()
            .map_err(|e| DeployError::GitOperation(e.to_string()))?;
        if !output.status.success() {
            return Err(classify_git_error(&format_git_error(&output)));
        }
        Ok(())
    }

    /// Checks out a branch, creating a local tracking branch when needed.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        if !self.is_git_repo() {
            return Err(DeployError::GitNotInitialized(self.repo_path.clone()));
        }

        let output = self.run_git(&["checkout", branch])?;
        if output.status.success() {
            return Ok(());
        }

        let remote_ref = format!("origin/{}", branch);
        let output = self.run_git(&["checkout", "-b", branch, &remote_ref])?;
        if output.status.success() {
            return Ok(());
        }

        Err(DeployError::GitOperation(format_git_error(&output)))
    }

    /// Pulls the current branch from `origin`.
    pub fn pull(&self) -> Result<()> {
        if !self.is_git_repo() {
            return Err(DeployError::GitNotInitialized(self.repo_path.clone()));
        }

        let output = match self.settings.branch.as_deref() {
            Some(branch) => self.run_git(&["pull", "origin", branch])?,
            None => self.run_git(&["pull", "origin"])?,
        };
        if output.status.success() {
            log::debug!("{}", String::from_utf8_lossy(&output.stdout).trim());
            Ok(())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    /// Gets the current branch name.
    pub fn current_branch(&self) -> Result<String> {
        let output = self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !output.status.success() {
            return Err(DeployError::GitOperation(format_git_error(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_git(&self, args: &[&str]) -> Result<Output> {
        run_git_in(&self.repo_path, args)
    }
}

impl RepositorySync for GitRepository {
    fn sync(&self) -> Result<PathBuf> {
        if self.needs_clone() {
            self.clone_remote()?;
        } else if !self.is_git_repo() {
            if self.settings.branch.is_some() || self.settings.pull {
                return Err(DeployError::GitNotInitialized(self.repo_path.clone()));
            }
            log::debug!(
                "{} is not a git repository, using it as-is",
                self.repo_path.display()
            );
            return Ok(self.repo_path.clone());
        }

        if let Some(branch) = &self.settings.branch {
            log::info!("Checkout branch {}", branch);
            self.checkout(branch)?;
        }
        if self.settings.pull {
            log::info!("Pull {}", self.repo_path.display());
            self.pull()?;
        }
        match self.current_branch() {
            Ok(branch) => log::info!("Using {} on branch {}", self.repo_path.display(), branch),
            Err(e) => log::debug!("Cannot read current branch: {}", e),
        }
        Ok(self.repo_path.clone())
    }
}

fn run_git_in(dir: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .map_err(|e| DeployError::GitOperation(e.to_string()))
}

/// Formats a git error with both stdout and stderr.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .current_dir(dir)
            .args(["-c", "user.email=test@example.org", "-c", "user.name=test"])
            .args(args)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", format_git_error(&output));
    }

    fn source_repo(dir: &Path) {
        fs::create_dir_all(dir.join("datasets.d")).unwrap();
        fs::write(
            dir.join("datasets.d/dataset1.xml"),
            r#"<dataset type="EDDTableFromNcFiles" datasetID="dataset1"/>"#,
        )
        .unwrap();
        git(dir, &["init"]);
        git(dir, &["add", "."]);
        git(dir, &["commit", "-m", "initial"]);
    }

    fn settings(repo: Option<&Path>, local: &Path) -> RepositorySettings {
        RepositorySettings {
            repo: repo.map(|p| p.to_string_lossy().to_string()),
            branch: None,
            pull: false,
            local_repo_path: local.to_path_buf(),
        }
    }

    #[test]
    fn test_local_directory() {
        let dir = TempDir::new().unwrap();
        assert_eq!(LocalDirectory::new(dir.path()).sync().unwrap(), dir.path());
        assert!(matches!(
            LocalDirectory::new(dir.path().join("missing")).sync(),
            Err(DeployError::MissingRepository)
        ));
    }

    #[test]
    fn test_missing_repository_without_url() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::new(settings(None, &dir.path().join("clone")));
        assert!(repo.needs_clone());
        assert!(matches!(repo.sync(), Err(DeployError::MissingRepository)));
    }

    #[test]
    fn test_plain_directory_is_used_as_is() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("datasets.xml"), "<erddapDatasets/>").unwrap();
        let repo = GitRepository::new(settings(None, dir.path()));
        assert!(!repo.needs_clone());
        assert_eq!(repo.sync().unwrap(), dir.path());

        let mut with_pull = settings(None, dir.path());
        with_pull.pull = true;
        assert!(matches!(
            GitRepository::new(with_pull).sync(),
            Err(DeployError::GitNotInitialized(_))
        ));
    }

    #[test]
    fn test_clone_checkout_and_pull() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        source_repo(&source);

        let local = dir.path().join("work/clone");
        let repo = GitRepository::new(settings(Some(&source), &local));
        assert_eq!(repo.sync().unwrap(), local);
        assert!(repo.is_git_repo());
        assert!(local.join("datasets.d/dataset1.xml").exists());

        let branch = repo.current_branch().unwrap();
        let mut again = settings(Some(&source), &local);
        again.branch = Some(branch.clone());
        again.pull = true;

        fs::write(
            source.join("datasets.d/dataset2.xml"),
            r#"<dataset type="EDDTableFromNcFiles" datasetID="dataset2"/>"#,
        )
        .unwrap();
        git(&source, &["add", "."]);
        git(&source, &["commit", "-m", "second"]);

        GitRepository::new(again).sync().unwrap();
        assert!(local.join("datasets.d/dataset2.xml").exists());
    }

    #[test]
    fn test_clone_into_nested_relative_path() {
        // Relative to the test's working directory, which is the package root.
        let scratch = tempfile::Builder::new()
            .prefix(".clone-test")
            .tempdir_in(".")
            .unwrap();
        assert!(scratch.path().is_relative());
        let source = scratch.path().join("source");
        source_repo(&source);

        let local = scratch.path().join("work/datasets-repo");
        let repo = GitRepository::new(settings(Some(&source), &local));
        let synced = repo.sync().unwrap();

        assert_eq!(synced, local);
        assert!(synced.join("datasets.d/dataset1.xml").exists());
        assert!(!scratch.path().join("work").join(&local).exists());
    }

    #[test]
    fn test_checkout_requires_repo() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::new(settings(None, dir.path()));
        assert!(matches!(
            repo.checkout("main"),
            Err(DeployError::GitNotInitialized(_))
        ));
    }
}
