//! Per-dataset comparison of two collections.

use std::fmt;

use indexmap::IndexMap;

use super::collection::ConfigCollection;
use super::document::ConfigDocument;

/// Decides whether two datasets with the same id count as unchanged.
pub trait DatasetComparator {
    fn equivalent(&self, left: &ConfigDocument, right: &ConfigDocument) -> bool;
}

/// Byte equality of the serialized `<dataset>` fragments.
///
/// Attribute reordering and whitespace edits count as changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializedComparator;

impl DatasetComparator for SerializedComparator {
    fn equivalent(&self, left: &ConfigDocument, right: &ConfigDocument) -> bool {
        left.to_xml() == right.to_xml()
    }
}

/// Compares the parsed model: type, active flag, global attributes and variables.
///
/// Formatting and attribute order are ignored; variable order is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralComparator;

impl DatasetComparator for StructuralComparator {
    fn equivalent(&self, left: &ConfigDocument, right: &ConfigDocument) -> bool {
        left.dataset_type == right.dataset_type
            && left.active == right.active
            && left.attrs.len() == right.attrs.len()
            && left.attrs.iter().all(|(k, v)| right.attrs.get(k) == Some(v))
            && left.variables.len() == right.variables.len()
            && left
                .variables
                .iter()
                .zip(&right.variables)
                .all(|(a, b)| {
                    a.source_name == b.source_name
                        && a.destination_name == b.destination_name
                        && a.data_type == b.data_type
                        && a.attrs.len() == b.attrs.len()
                        && a.attrs.iter().all(|(k, v)| b.attrs.get(k) == Some(v))
                })
    }
}

/// How one dataset id differs between the two sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetChange {
    /// Present on the right side only.
    NotInLeft,
    /// Present on the left side only.
    NotInRight,
    /// Present on both sides with a different definition.
    Modified { diff: String },
}

impl DatasetChange {
    /// The line diff, when the dataset exists on both sides.
    pub fn line_diff(&self) -> Option<&str> {
        match self {
            DatasetChange::Modified { diff } => Some(diff),
            _ => None,
        }
    }
}

/// Changed dataset ids; unchanged ids are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    changes: IndexMap<String, DatasetChange>,
}

impl DiffReport {
    /// Report marking every id as present on the left only, as on a first deployment.
    pub fn all_new<'a>(ids: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            changes: ids
                .into_iter()
                .map(|id| (id.clone(), DatasetChange::NotInRight))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, dataset_id: &str) -> Option<&DatasetChange> {
        self.changes.get(dataset_id)
    }

    pub fn contains(&self, dataset_id: &str) -> bool {
        self.changes.contains_key(dataset_id)
    }

    /// Changed ids in report order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatasetChange)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, change) in &self.changes {
            match change {
                DatasetChange::NotInLeft => writeln!(f, "{} not in left", id)?,
                DatasetChange::NotInRight => writeln!(f, "{} not in right", id)?,
                DatasetChange::Modified { diff } => {
                    writeln!(f, "{} modified", id)?;
                    f.write_str(diff)?;
                }
            }
        }
        Ok(())
    }
}

/// Computes [`DiffReport`]s with a pluggable [`DatasetComparator`].
pub struct Differ {
    comparator: Box<dyn DatasetComparator>,
}

impl Differ {
    /// Differ using [`SerializedComparator`].
    pub fn new() -> Self {
        Self::with_comparator(SerializedComparator)
    }

    pub fn with_comparator(comparator: impl DatasetComparator + 'static) -> Self {
        Self {
            comparator: Box::new(comparator),
        }
    }

    /// Compares `left` against `right` over the union of their dataset ids.
    pub fn diff(&self, left: &ConfigCollection, right: &ConfigCollection) -> DiffReport {
        self.diff_datasets(left.datasets(), right.datasets())
    }

    pub fn diff_datasets(
        &self,
        left: &IndexMap<String, ConfigDocument>,
        right: &IndexMap<String, ConfigDocument>,
    ) -> DiffReport {
        let ids = left
            .keys()
            .chain(right.keys().filter(|id| !left.contains_key(*id)));

        let mut changes = IndexMap::new();
        for id in ids {
            let change = match (left.get(id), right.get(id)) {
                (None, _) => DatasetChange::NotInLeft,
                (_, None) => DatasetChange::NotInRight,
                (Some(l), Some(r)) if self.comparator.equivalent(l, r) => continue,
                (Some(l), Some(r)) => DatasetChange::Modified {
                    diff: line_diff(l.to_xml(), r.to_xml()),
                },
            };
            changes.insert(id.clone(), change);
        }
        DiffReport { changes }
    }
}

impl Default for Differ {
    fn default() -> Self {
        Self::new()
    }
}

/// Compares two collections with the default serialized-text comparison.
pub fn diff(left: &ConfigCollection, right: &ConfigCollection) -> DiffReport {
    Differ::new().diff(left, right)
}

/// Line diff of `left` against `right`: `-` lines only in left, `+` only in right.
pub fn line_diff(left: &str, right: &str) -> String {
    let a: Vec<&str> = left.lines().collect();
    let b: Vec<&str> = right.lines().collect();

    // lcs[i][j] = length of the longest common subsequence of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        if i < a.len() && j < b.len() && a[i] == b[j] {
            out.push_str("  ");
            out.push_str(a[i]);
            i += 1;
            j += 1;
        } else if j < b.len() && (i == a.len() || lcs[i][j + 1] >= lcs[i + 1][j]) {
            out.push_str("+ ");
            out.push_str(b[j]);
            j += 1;
        } else {
            out.push_str("- ");
            out.push_str(a[i]);
            i += 1;
        }
        out.push('\n');
    }
    out
}
