//! Isolated datasets.xml trees for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use erddap_deploy::{CollectionOptions, ConfigCollection, Secrets};

/// Directory holding the checked-in fixtures.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// A temp directory with a copy of the fixture tree under `repo/`.
pub struct DatasetsHarness {
    temp_dir: TempDir,
    /// Reference configuration, as a synced repository would hold it.
    pub repo_dir: PathBuf,
    /// Path of the active datasets.xml.
    pub active_path: PathBuf,
    /// Hard flag directory.
    pub flag_dir: PathBuf,
}

impl DatasetsHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let repo_dir = temp_dir.path().join("repo");
        copy_tree(&fixtures_dir(), &repo_dir);

        Self {
            active_path: temp_dir.path().join("content/erddap/datasets.xml"),
            flag_dir: temp_dir.path().join("erddapData/erddap/hardFlag"),
            repo_dir,
            temp_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Glob over the three `datasets.d` fragments.
    pub fn fragments_glob(&self) -> String {
        format!("{}/datasets.d/*.xml", self.repo_dir.display())
    }

    /// Recursive glob over every fixture file.
    pub fn all_files_glob(&self) -> String {
        format!("{}/**/*.xml", self.repo_dir.display())
    }

    pub fn read_fragment(&self, name: &str) -> String {
        fs::read_to_string(self.repo_dir.join("datasets.d").join(name))
            .expect("Failed to read fragment")
    }

    pub fn write_fragment(&self, name: &str, content: &str) {
        fs::write(self.repo_dir.join("datasets.d").join(name), content)
            .expect("Failed to write fragment");
    }

    pub fn remove_fragment(&self, name: &str) {
        fs::remove_file(self.repo_dir.join("datasets.d").join(name))
            .expect("Failed to remove fragment");
    }

    /// Loads the `datasets.d` fragments.
    pub fn load_reference(&self, secrets: Secrets) -> ConfigCollection {
        ConfigCollection::open(self.fragments_glob(), secrets, CollectionOptions::default())
            .expect("Failed to load reference")
    }

    pub fn flag_names(&self) -> Vec<String> {
        if !self.flag_dir.exists() {
            return Vec::new();
        }
        let mut names: Vec<String> = fs::read_dir(&self.flag_dir)
            .expect("Failed to read flag dir")
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from) {
        let entry = entry.expect("Failed to walk fixtures");
        let relative = entry.path().strip_prefix(from).unwrap();
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).expect("Failed to create fixture dir");
        } else {
            fs::copy(entry.path(), &target).expect("Failed to copy fixture");
        }
    }
}
