//! datasets.xml model: parsing, merging, comparison.
//!
//! - [`xml`] - element tree with source spans
//! - [`document`] - `<dataset>` / `<dataVariable>` model
//! - [`collection`] - glob, merge, secret substitution, load/save
//! - [`diff`] - per-dataset change report between two collections

pub mod collection;
pub mod diff;
pub mod document;
pub mod xml;

pub use collection::{CollectionOptions, CollectionSnapshot, ConfigCollection, SaveSource, ROOT_TAG};
pub use diff::{
    diff, DatasetChange, DatasetComparator, DiffReport, Differ, SerializedComparator,
    StructuralComparator,
};
pub use document::{ConfigDocument, Variable};
pub use xml::{XmlElement, XmlNode};
