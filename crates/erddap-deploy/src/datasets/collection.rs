//! Loading of one or many datasets.xml fragments into a single collection.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;

use super::document::{ConfigDocument, DATASET_TAG};
use super::xml::{parse_document, XmlElement};
use crate::error::{DeployError, Result};
use crate::secrets::{Secrets, SubstitutionReport};

/// Root element wrapping every dataset in datasets.xml.
pub const ROOT_TAG: &str = "erddapDatasets";

/// Separator between alternative glob expressions in a source locator.
pub const LOCATOR_SEPARATOR: char = '|';

static EMPTY_DATASETS: LazyLock<IndexMap<String, ConfigDocument>> = LazyLock::new(IndexMap::new);

/// Options controlling how a collection finds and decodes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Whether `**` in glob expressions descends into subdirectories.
    pub recursive: bool,
    /// Encoding of the source files and of the generated XML declaration.
    pub encoding: String,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            encoding: "UTF-8".to_string(),
        }
    }
}

/// Which representation [`ConfigCollection::save`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveSource {
    /// The merged, secret-substituted text, byte for byte.
    #[default]
    Original,
    /// The parsed tree, re-serialized with a fresh XML declaration.
    Parsed,
}

/// Immutable result of one successful [`ConfigCollection::load`].
#[derive(Debug)]
pub struct CollectionSnapshot {
    files: Vec<PathBuf>,
    raw_text: String,
    root: XmlElement,
    datasets: IndexMap<String, ConfigDocument>,
    duplicate_ids: Vec<String>,
    substitution: SubstitutionReport,
}

impl CollectionSnapshot {
    /// Files that were merged, in merge order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Merged text after wrapping and secret substitution.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Datasets keyed by `datasetID`, in document order.
    pub fn datasets(&self) -> &IndexMap<String, ConfigDocument> {
        &self.datasets
    }

    /// Ids that appeared on more than one `<dataset>` element.
    pub fn duplicate_ids(&self) -> &[String] {
        &self.duplicate_ids
    }

    pub fn substitution(&self) -> &SubstitutionReport {
        &self.substitution
    }
}

/// A datasets.xml configuration assembled from the files matching a locator.
///
/// The collection starts empty; [`ConfigCollection::load`] builds a fresh
/// snapshot from disk and swaps it in only once every step succeeded.
#[derive(Debug, Clone)]
pub struct ConfigCollection {
    source_locator: String,
    /// The locator is a single file path, not a glob expression.
    literal: bool,
    options: CollectionOptions,
    secrets: Secrets,
    snapshot: Option<Arc<CollectionSnapshot>>,
}

impl ConfigCollection {
    /// Creates an unloaded collection.
    pub fn new(source_locator: impl Into<String>, secrets: Secrets, options: CollectionOptions) -> Self {
        Self {
            source_locator: source_locator.into(),
            literal: false,
            options,
            secrets,
            snapshot: None,
        }
    }

    /// Creates an unloaded collection over exactly one file.
    ///
    /// The path is taken literally: glob metacharacters and `|` are not special.
    pub fn for_file(path: impl AsRef<Path>, secrets: Secrets, options: CollectionOptions) -> Self {
        Self {
            source_locator: path.as_ref().to_string_lossy().to_string(),
            literal: true,
            options,
            secrets,
            snapshot: None,
        }
    }

    /// Creates a collection and loads it immediately.
    pub fn open(
        source_locator: impl Into<String>,
        secrets: Secrets,
        options: CollectionOptions,
    ) -> Result<Self> {
        let mut collection = Self::new(source_locator, secrets, options);
        collection.load()?;
        Ok(collection)
    }

    /// Creates a collection over exactly one file and loads it immediately.
    pub fn open_file(
        path: impl AsRef<Path>,
        secrets: Secrets,
        options: CollectionOptions,
    ) -> Result<Self> {
        let mut collection = Self::for_file(path, secrets, options);
        collection.load()?;
        Ok(collection)
    }

    pub fn source_locator(&self) -> &str {
        &self.source_locator
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    /// Re-globs, re-reads, re-substitutes and re-parses the configuration.
    ///
    /// When no file matches, the collection is left empty and `Ok` is returned.
    /// On error the previous snapshot stays in place.
    pub fn load(&mut self) -> Result<()> {
        ensure_utf8(&self.options.encoding)?;

        let files = self.resolve_files()?;
        if files.is_empty() {
            log::warn!(
                "No datasets.xml file(s) found for: {}, recursive={}",
                self.source_locator,
                self.options.recursive
            );
            self.snapshot = None;
            return Ok(());
        }

        let snapshot = self.build_snapshot(files)?;
        log::info!("Loaded {} datasets", snapshot.datasets.len());
        self.snapshot = Some(Arc::new(snapshot));
        Ok(())
    }

    fn resolve_files(&self) -> Result<Vec<PathBuf>> {
        if self.literal {
            let path = PathBuf::from(&self.source_locator);
            return Ok(if path.is_file() { vec![path] } else { Vec::new() });
        }

        let alternatives: Vec<&str> = self
            .source_locator
            .split(LOCATOR_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        for alternative in &alternatives {
            let files = expand_glob(alternative, self.options.recursive)?;
            if !files.is_empty() {
                log::info!(
                    "Found {} files matching datasets.xml with search path {}: {:?}",
                    files.len(),
                    alternative,
                    files
                );
                return Ok(files);
            }
        }
        Ok(Vec::new())
    }

    fn build_snapshot(&self, files: Vec<PathBuf>) -> Result<CollectionSnapshot> {
        let mut fragments = Vec::with_capacity(files.len());
        for file in &files {
            let content = fs::read_to_string(file).map_err(|e| DeployError::ReadFile {
                path: file.clone(),
                source: e,
            })?;
            fragments.push(content);
        }

        let merged = wrap_fragments(&fragments, &self.options.encoding);
        let (raw_text, substitution) = self.secrets.substitute(&merged);

        let root = parse_document(&raw_text)?;
        let mut datasets: IndexMap<String, ConfigDocument> = IndexMap::new();
        let mut duplicate_ids = Vec::new();
        for element in root.children_named(DATASET_TAG) {
            let source = &raw_text[element.span.clone()];
            let document = ConfigDocument::from_element(element, source)?;
            let id = document.dataset_id.clone();
            if datasets.insert(id.clone(), document).is_some() {
                log::warn!("Duplicate datasetID {}: the last definition wins", id);
                if !duplicate_ids.contains(&id) {
                    duplicate_ids.push(id);
                }
            }
        }

        Ok(CollectionSnapshot {
            files,
            raw_text,
            root,
            datasets,
            duplicate_ids,
            substitution,
        })
    }

    /// Returns the current snapshot, if the last load found any file.
    pub fn snapshot(&self) -> Option<Arc<CollectionSnapshot>> {
        self.snapshot.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.snapshot.as_deref().map(CollectionSnapshot::raw_text)
    }

    pub fn datasets(&self) -> &IndexMap<String, ConfigDocument> {
        match &self.snapshot {
            Some(snapshot) => &snapshot.datasets,
            None => &EMPTY_DATASETS,
        }
    }

    pub fn dataset(&self, dataset_id: &str) -> Option<&ConfigDocument> {
        self.datasets().get(dataset_id)
    }

    pub fn len(&self) -> usize {
        self.datasets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets().is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        self.snapshot
            .as_deref()
            .map(CollectionSnapshot::files)
            .unwrap_or(&[])
    }

    pub fn duplicate_ids(&self) -> &[String] {
        self.snapshot
            .as_deref()
            .map(CollectionSnapshot::duplicate_ids)
            .unwrap_or(&[])
    }

    /// Fails when any `datasetID` was defined more than once.
    pub fn ensure_unique_ids(&self) -> Result<()> {
        let duplicates = self.duplicate_ids();
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(DeployError::DuplicateDatasetId(duplicates.to_vec()))
        }
    }

    /// Writes the configuration to `output`.
    ///
    /// Returns `Ok(false)` without writing when nothing has been loaded.
    pub fn save(&self, output: &Path, source: SaveSource, encoding: Option<&str>) -> Result<bool> {
        let Some(snapshot) = self.snapshot.as_deref() else {
            log::warn!("No datasets.xml to save");
            return Ok(false);
        };

        let content = match source {
            SaveSource::Original => {
                if let Some(requested) = encoding {
                    if !requested.eq_ignore_ascii_case(&self.options.encoding) {
                        return Err(DeployError::EncodingMismatch {
                            from: self.options.encoding.clone(),
                            to: requested.to_string(),
                        });
                    }
                }
                snapshot.raw_text.clone()
            }
            SaveSource::Parsed => {
                let encoding = encoding.unwrap_or(&self.options.encoding);
                ensure_utf8(encoding)?;
                format!(
                    "<?xml version=\"1.0\" encoding=\"{}\"?>\n{}",
                    encoding,
                    snapshot.root.to_xml_string()
                )
            }
        };

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DeployError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(output, content).map_err(|e| DeployError::WriteFile {
            path: output.to_path_buf(),
            source: e,
        })?;
        log::info!("Saved datasets.xml to {}", output.display());
        Ok(true)
    }
}

/// Expands one glob expression into matching files, sorted lexicographically.
///
/// Without `recursive`, `**` only matches a single path component.
fn expand_glob(pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let pattern = if recursive {
        pattern.to_string()
    } else {
        pattern.replace("**", "*")
    };
    let paths = glob::glob(&pattern).map_err(|e| DeployError::InvalidGlob {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable path while globbing {}: {}", pattern, e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

/// Joins fragments with newlines and wraps them in `<erddapDatasets>` unless already wrapped.
fn wrap_fragments(fragments: &[String], encoding: &str) -> String {
    let open = format!("<{}>", ROOT_TAG);
    let close = format!("</{}>", ROOT_TAG);
    let joined = fragments.join("\n");
    if joined.contains(&open) || joined.contains(&close) {
        return joined;
    }

    let body: Vec<&str> = fragments.iter().map(|f| strip_xml_declaration(f)).collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"{}\"?>{}{}{}",
        encoding,
        open,
        body.join("\n"),
        close
    )
}

fn strip_xml_declaration(fragment: &str) -> &str {
    let trimmed = fragment.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    fragment
}

fn ensure_utf8(encoding: &str) -> Result<()> {
    if encoding.eq_ignore_ascii_case("utf-8") || encoding.eq_ignore_ascii_case("utf8") {
        Ok(())
    } else {
        Err(DeployError::UnsupportedEncoding(encoding.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DATASET_A: &str = r#"<dataset type="EDDTableFromNcFiles" datasetID="a">
    <addAttributes><att name="title">{TITLE}</att></addAttributes>
</dataset>"#;
    const DATASET_B: &str = r#"<dataset type="EDDGridFromDap" datasetID="b" active="false"/>"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn locator(dir: &Path, pattern: &str) -> String {
        format!("{}/{}", dir.display(), pattern)
    }

    #[test]
    fn test_wrap_fragments() {
        let wrapped = wrap_fragments(&[DATASET_B.to_string()], "UTF-8");
        assert!(wrapped.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><erddapDatasets>"));
        assert!(wrapped.ends_with("</erddapDatasets>"));

        let already = "<erddapDatasets></erddapDatasets>".to_string();
        assert_eq!(wrap_fragments(&[already.clone()], "UTF-8"), already);
    }

    #[test]
    fn test_wrap_strips_fragment_declarations() {
        let fragment = format!("<?xml version=\"1.0\"?>\n{}", DATASET_B);
        let wrapped = wrap_fragments(&[fragment.clone(), fragment], "UTF-8");
        assert_eq!(wrapped.matches("<?xml").count(), 1);
        assert!(parse_document(&wrapped).is_ok());
    }

    #[test]
    fn test_load_merges_files_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "datasets.d/2.xml", DATASET_B);
        write(dir.path(), "datasets.d/1.xml", DATASET_A);

        let collection = ConfigCollection::open(
            locator(dir.path(), "datasets.d/*.xml"),
            Secrets::new().with("TITLE", "Hello"),
            CollectionOptions::default(),
        )
        .unwrap();

        let ids: Vec<&str> = collection.datasets().keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(collection.files().len(), 2);
        assert_eq!(collection.dataset("a").unwrap().attr("title"), Some("Hello"));
        assert!(!collection.dataset("b").unwrap().active);
    }

    #[test]
    fn test_first_matching_alternative_wins() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "datasets.xml", "<erddapDatasets></erddapDatasets>");
        write(dir.path(), "datasets.d/a.xml", DATASET_A);

        let locator = format!(
            "{}|{}|{}",
            locator(dir.path(), "missing/*.xml"),
            locator(dir.path(), "datasets.d/*.xml"),
            locator(dir.path(), "datasets.xml")
        );
        let collection = ConfigCollection::open(locator, Secrets::new(), CollectionOptions::default()).unwrap();
        assert_eq!(collection.len(), 1);
        assert!(collection.dataset("a").is_some());
    }

    #[test]
    fn test_no_match_leaves_collection_empty() {
        let dir = TempDir::new().unwrap();
        let collection = ConfigCollection::open(
            locator(dir.path(), "*.xml"),
            Secrets::new(),
            CollectionOptions::default(),
        )
        .unwrap();
        assert!(!collection.is_loaded());
        assert!(collection.is_empty());
        assert!(collection.raw_text().is_none());
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "d/a.xml", DATASET_A);
        let mut collection = ConfigCollection::open(
            locator(dir.path(), "d/*.xml"),
            Secrets::new(),
            CollectionOptions::default(),
        )
        .unwrap();
        assert_eq!(collection.len(), 1);

        fs::write(&file, "<dataset type=\"x\" datasetID=\"broken\">").unwrap();
        assert!(matches!(collection.load(), Err(DeployError::ParseXml { .. })));
        assert!(collection.dataset("a").is_some());
    }

    #[test]
    fn test_duplicate_ids_are_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "d/1.xml", DATASET_B);
        write(dir.path(), "d/2.xml", DATASET_B);
        let collection = ConfigCollection::open(
            locator(dir.path(), "d/*.xml"),
            Secrets::new(),
            CollectionOptions::default(),
        )
        .unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.duplicate_ids(), ["b".to_string()]);
        assert!(matches!(
            collection.ensure_unique_ids(),
            Err(DeployError::DuplicateDatasetId(ids)) if ids == vec!["b".to_string()]
        ));
    }

    #[test]
    fn test_save_original_and_parsed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "d/a.xml", DATASET_A);
        let collection = ConfigCollection::open(
            locator(dir.path(), "d/*.xml"),
            Secrets::new().with("TITLE", "Saved"),
            CollectionOptions::default(),
        )
        .unwrap();

        let original = dir.path().join("out/original.xml");
        assert!(collection.save(&original, SaveSource::Original, None).unwrap());
        assert_eq!(fs::read_to_string(&original).unwrap(), collection.raw_text().unwrap());

        let parsed = dir.path().join("out/parsed.xml");
        assert!(collection.save(&parsed, SaveSource::Parsed, Some("utf-8")).unwrap());
        let text = fs::read_to_string(&parsed).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<erddapDatasets>"));
        assert!(text.contains(">Saved</att>"));

        assert!(matches!(
            collection.save(&original, SaveSource::Original, Some("ISO-8859-1")),
            Err(DeployError::EncodingMismatch { .. })
        ));
    }

    #[test]
    fn test_open_file_takes_path_literally() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "content[1]/a|b*.xml", DATASET_A);

        let path = dir.path().join("content[1]/a|b*.xml");
        let collection =
            ConfigCollection::open_file(&path, Secrets::new(), CollectionOptions::default()).unwrap();
        assert!(collection.is_loaded());
        assert_eq!(collection.files(), &[path.clone()]);

        let missing = ConfigCollection::open_file(
            dir.path().join("content[1]/other.xml"),
            Secrets::new(),
            CollectionOptions::default(),
        )
        .unwrap();
        assert!(!missing.is_loaded());
    }

    #[test]
    fn test_save_without_load_is_noop() {
        let dir = TempDir::new().unwrap();
        let collection = ConfigCollection::new("nothing", Secrets::new(), CollectionOptions::default());
        let out = dir.path().join("datasets.xml");
        assert!(!collection.save(&out, SaveSource::Original, None).unwrap());
        assert!(!out.exists());
    }
}
