//! Parsed `<dataset>` and `<dataVariable>` elements.

use indexmap::IndexMap;

use super::xml::XmlElement;
use crate::error::{DeployError, Result};

/// Name of the dataset-level element inside `<erddapDatasets>`.
pub const DATASET_TAG: &str = "dataset";

/// A `<dataVariable>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub source_name: Option<String>,
    pub destination_name: Option<String>,
    pub data_type: Option<String>,
    /// `<addAttributes>` entries, last one wins on duplicate names.
    pub attrs: IndexMap<String, String>,
}

impl Variable {
    /// Builds a variable from its `<dataVariable>` element. Missing children yield `None`.
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            source_name: child_text(element, "sourceName"),
            destination_name: child_text(element, "destinationName"),
            data_type: child_text(element, "dataType"),
            attrs: add_attributes(element),
        }
    }

    /// The name the variable is served under: destination name, else source name.
    pub fn name(&self) -> Option<&str> {
        self.destination_name
            .as_deref()
            .or(self.source_name.as_deref())
    }
}

/// One `<dataset>` entry of datasets.xml.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    pub dataset_id: String,
    pub dataset_type: String,
    pub active: bool,
    /// Global attributes gathered from every `<addAttributes>` under the dataset.
    pub attrs: IndexMap<String, String>,
    pub variables: Vec<Variable>,
    source: String,
}

impl ConfigDocument {
    /// Parses a `<dataset>` element; `source` is the exact text the element was read from.
    pub fn from_element(element: &XmlElement, source: &str) -> Result<Self> {
        let dataset_type = element
            .attr("type")
            .ok_or_else(|| DeployError::MalformedConfig {
                message: format!(
                    "<{}> without a 'type' attribute (datasetID={})",
                    element.name,
                    element.attr("datasetID").unwrap_or("?")
                ),
            })?
            .to_string();
        let dataset_id = element
            .attr("datasetID")
            .ok_or_else(|| DeployError::MalformedConfig {
                message: format!(
                    "<{}> of type {} without a 'datasetID' attribute",
                    element.name, dataset_type
                ),
            })?
            .to_string();
        let active = element.attr("active").unwrap_or("true") == "true";

        let variables = element
            .descendants_named("dataVariable")
            .into_iter()
            .map(Variable::from_element)
            .collect();

        Ok(Self {
            dataset_id,
            dataset_type,
            active,
            attrs: add_attributes(element),
            variables,
            source: source.to_string(),
        })
    }

    /// Canonical serialized form, byte-identical to the source fragment.
    pub fn to_xml(&self) -> &str {
        &self.source
    }

    /// Returns a global attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Variable names as served, falling back to the source name.
    pub fn variable_destination_names(&self) -> Vec<&str> {
        self.variables.iter().filter_map(Variable::name).collect()
    }

    pub fn variable_source_names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter_map(|v| v.source_name.as_deref())
            .collect()
    }

    /// True when the type is served through tabledap.
    pub fn is_table(&self) -> bool {
        self.dataset_type.starts_with("EDDTable")
    }

    /// True when the type is served through griddap.
    pub fn is_grid(&self) -> bool {
        self.dataset_type.starts_with("EDDGrid")
    }
}

impl PartialEq for ConfigDocument {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ConfigDocument {}

impl std::fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn child_text(element: &XmlElement, name: &str) -> Option<String> {
    element
        .child(name)
        .map(|el| el.text().trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Collects `<att name="...">` entries from every `<addAttributes>` at any depth.
fn add_attributes(element: &XmlElement) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    for add in element.descendants_named("addAttributes") {
        for att in add.children_named("att") {
            if let Some(name) = att.attr("name") {
                attrs.insert(name.to_string(), att.text());
            }
        }
    }
    attrs
}
