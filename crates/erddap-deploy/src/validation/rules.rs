//! Structural rules evaluated against each dataset and against a whole collection.

use std::fmt;

use serde::Serialize;

use super::vocabulary::{is_cdm_data_type, is_edd_type, is_ioos_category};
use crate::config::RuleConfig;
use crate::datasets::{ConfigCollection, ConfigDocument};

/// A single named check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Collection has raw text and at least one dataset.
    NotEmpty,
    /// No `datasetID` defined twice.
    UniqueDatasetIds,
    /// Dataset `type` is a known EDD type.
    DatasetType,
    /// `cdm_data_type` is a known sampling geometry.
    CdmDataType,
    /// Every `subsetVariables` entry is a declared variable.
    SubsetVariables,
    /// `cdm_timeseries_variables` is present and references declared variables.
    CdmTimeseriesVariables,
    /// `cdm_profile_variables` is present and references declared variables.
    CdmProfileVariables,
    /// Non-coordinate variables carry a valid `ioos_category`.
    IoosCategory,
}

impl Rule {
    /// Rules evaluated once per dataset.
    pub const DATASET_RULES: [Rule; 6] = [
        Rule::DatasetType,
        Rule::CdmDataType,
        Rule::SubsetVariables,
        Rule::CdmTimeseriesVariables,
        Rule::CdmProfileVariables,
        Rule::IoosCategory,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::NotEmpty => "not_empty",
            Rule::UniqueDatasetIds => "unique_dataset_ids",
            Rule::DatasetType => "dataset_type",
            Rule::CdmDataType => "cdm_data_type",
            Rule::SubsetVariables => "subset_variables",
            Rule::CdmTimeseriesVariables => "cdm_timeseries_variables",
            Rule::CdmProfileVariables => "cdm_profile_variables",
            Rule::IoosCategory => "ioos_category",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed check, labelled with what failed and the offending values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule: Rule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    pub values: Vec<String>,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Pass,
    /// The rule does not apply to this dataset.
    Skipped,
    Fail(Vec<Violation>),
}

impl RuleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RuleOutcome::Fail(_))
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            RuleOutcome::Fail(v) => v,
            _ => &[],
        }
    }
}

/// Aggregated outcome of [`RuleSet::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Number of (rule, dataset) evaluations that applied.
    pub checks_run: usize,
    pub checks_skipped: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn record(&mut self, outcome: RuleOutcome) {
        match outcome {
            RuleOutcome::Pass => self.checks_run += 1,
            RuleOutcome::Skipped => self.checks_skipped += 1,
            RuleOutcome::Fail(violations) => {
                self.checks_run += 1;
                self.violations.extend(violations);
            }
        }
    }
}

/// Evaluates [`Rule`]s with the type exemptions from a [`RuleConfig`].
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    config: RuleConfig,
    filter: Option<String>,
}

impl RuleSet {
    pub fn new(config: RuleConfig) -> Self {
        Self {
            config,
            filter: None,
        }
    }

    /// Restricts [`RuleSet::validate`] to rules whose name contains `keyword`.
    ///
    /// A leading `not ` inverts the selection. Matching ignores case.
    pub fn with_filter(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.filter = Some(keyword.trim().to_lowercase()).filter(|k| !k.is_empty());
        self
    }

    /// Whether `validate` evaluates `rule`.
    pub fn selects(&self, rule: Rule) -> bool {
        match self.filter.as_deref() {
            None => true,
            Some(filter) => match filter.strip_prefix("not ") {
                Some(excluded) => !rule.name().contains(excluded.trim()),
                None => rule.name().contains(filter),
            },
        }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Runs the collection rules and every dataset rule on every dataset,
    /// limited to the rules the filter selects.
    pub fn validate(&self, collection: &ConfigCollection) -> ValidationReport {
        let mut report = ValidationReport::default();
        if self.selects(Rule::NotEmpty) {
            report.record(self.check_not_empty(collection));
        }
        if self.selects(Rule::UniqueDatasetIds) {
            report.record(self.check_unique_ids(collection));
        }
        let rules: Vec<Rule> = Rule::DATASET_RULES
            .into_iter()
            .filter(|rule| self.selects(*rule))
            .collect();
        for dataset in collection.datasets().values() {
            for rule in &rules {
                report.record(self.check(*rule, dataset));
            }
        }
        log::info!(
            "Validation ran {} checks ({} skipped), {} violations",
            report.checks_run,
            report.checks_skipped,
            report.violations.len()
        );
        report
    }

    /// Evaluates a dataset rule. Collection rules are skipped here.
    pub fn check(&self, rule: Rule, dataset: &ConfigDocument) -> RuleOutcome {
        match rule {
            Rule::NotEmpty | Rule::UniqueDatasetIds => RuleOutcome::Skipped,
            Rule::DatasetType => self.check_dataset_type(dataset),
            Rule::CdmDataType => self.check_cdm_data_type(dataset),
            Rule::SubsetVariables => self.check_subset_variables(dataset),
            Rule::CdmTimeseriesVariables => self.check_cdm_timeseries_variables(dataset),
            Rule::CdmProfileVariables => self.check_cdm_profile_variables(dataset),
            Rule::IoosCategory => self.check_ioos_category(dataset),
        }
    }

    /// Evaluates every dataset rule against one dataset.
    pub fn check_dataset(&self, dataset: &ConfigDocument) -> Vec<(Rule, RuleOutcome)> {
        Rule::DATASET_RULES
            .iter()
            .map(|rule| (*rule, self.check(*rule, dataset)))
            .collect()
    }

    pub fn check_not_empty(&self, collection: &ConfigCollection) -> RuleOutcome {
        let message = match (collection.raw_text(), collection.is_empty()) {
            (None, _) => "datasets.xml is empty",
            (Some(_), true) => "datasets is empty",
            (Some(_), false) => return RuleOutcome::Pass,
        };
        RuleOutcome::Fail(vec![Violation {
            rule: Rule::NotEmpty,
            dataset_id: None,
            variable: None,
            values: vec![collection.source_locator().to_string()],
            message: message.to_string(),
        }])
    }

    pub fn check_unique_ids(&self, collection: &ConfigCollection) -> RuleOutcome {
        let duplicates = collection.duplicate_ids();
        if duplicates.is_empty() {
            return RuleOutcome::Pass;
        }
        RuleOutcome::Fail(vec![Violation {
            rule: Rule::UniqueDatasetIds,
            dataset_id: None,
            variable: None,
            values: duplicates.to_vec(),
            message: format!("Dataset IDs are not unique: {:?}", duplicates),
        }])
    }

    fn check_dataset_type(&self, dataset: &ConfigDocument) -> RuleOutcome {
        if is_edd_type(&dataset.dataset_type) {
            return RuleOutcome::Pass;
        }
        fail(
            Rule::DatasetType,
            dataset,
            vec![dataset.dataset_type.clone()],
            format!(
                "Dataset {} has invalid type {}",
                dataset.dataset_id, dataset.dataset_type
            ),
        )
    }

    fn check_cdm_data_type(&self, dataset: &ConfigDocument) -> RuleOutcome {
        if self.config.is_passthrough(&dataset.dataset_type) {
            return RuleOutcome::Skipped;
        }
        match dataset.attr("cdm_data_type") {
            Some(value) if is_cdm_data_type(value) => RuleOutcome::Pass,
            Some(value) => fail(
                Rule::CdmDataType,
                dataset,
                vec![value.to_string()],
                format!(
                    "Dataset {} has invalid cdm_data_type {}",
                    dataset.dataset_id, value
                ),
            ),
            None => fail(
                Rule::CdmDataType,
                dataset,
                Vec::new(),
                format!("Dataset {} has no cdm_data_type", dataset.dataset_id),
            ),
        }
    }

    fn check_subset_variables(&self, dataset: &ConfigDocument) -> RuleOutcome {
        if self.config.is_passthrough(&dataset.dataset_type) {
            return RuleOutcome::Skipped;
        }
        let unknown = unknown_variables(dataset, dataset.attr("subsetVariables").unwrap_or(""));
        if unknown.is_empty() {
            return RuleOutcome::Pass;
        }
        fail(
            Rule::SubsetVariables,
            dataset,
            unknown.clone(),
            format!(
                "Dataset {} has invalid subsetVariables {:?}",
                dataset.dataset_id, unknown
            ),
        )
    }

    fn check_cdm_timeseries_variables(&self, dataset: &ConfigDocument) -> RuleOutcome {
        if self.config.is_timeseries_exempt(&dataset.dataset_type) {
            return RuleOutcome::Skipped;
        }
        self.check_cdm_variables(
            Rule::CdmTimeseriesVariables,
            dataset,
            &["TimeSeries", "TimeSeriesProfile"],
            "cdm_timeseries_variables",
        )
    }

    fn check_cdm_profile_variables(&self, dataset: &ConfigDocument) -> RuleOutcome {
        if self.config.is_passthrough(&dataset.dataset_type) {
            return RuleOutcome::Skipped;
        }
        self.check_cdm_variables(
            Rule::CdmProfileVariables,
            dataset,
            &["Profile", "TimeSeriesProfile"],
            "cdm_profile_variables",
        )
    }

    fn check_cdm_variables(
        &self,
        rule: Rule,
        dataset: &ConfigDocument,
        applies_to: &[&str],
        attribute: &str,
    ) -> RuleOutcome {
        let applies = dataset
            .attr("cdm_data_type")
            .map(str::trim)
            .is_some_and(|t| applies_to.iter().any(|a| a.eq_ignore_ascii_case(t)));
        if !applies {
            return RuleOutcome::Skipped;
        }

        let declared = dataset.attr(attribute).unwrap_or("");
        if declared.trim().is_empty() {
            return fail(
                rule,
                dataset,
                Vec::new(),
                format!("Dataset {} has no {}", dataset.dataset_id, attribute),
            );
        }

        let unknown = unknown_variables(dataset, declared);
        if unknown.is_empty() {
            return RuleOutcome::Pass;
        }
        fail(
            rule,
            dataset,
            unknown.clone(),
            format!(
                "Dataset {} has invalid {} {:?}",
                dataset.dataset_id, attribute, unknown
            ),
        )
    }

    fn check_ioos_category(&self, dataset: &ConfigDocument) -> RuleOutcome {
        if !self.config.ioos_category_required {
            return RuleOutcome::Skipped;
        }

        let mut violations = Vec::new();
        for variable in &dataset.variables {
            let name = variable.name().unwrap_or("");
            if self.config.is_coordinate_variable(name) {
                continue;
            }
            let category = variable.attrs.get("ioos_category").map(String::as_str);
            if category.is_some_and(is_ioos_category) {
                continue;
            }
            violations.push(Violation {
                rule: Rule::IoosCategory,
                dataset_id: Some(dataset.dataset_id.clone()),
                variable: Some(name.to_string()),
                values: category.map(|c| vec![c.to_string()]).unwrap_or_default(),
                message: format!(
                    "Variable {} in dataset {} has invalid ioos_category {:?}",
                    name, dataset.dataset_id, category
                ),
            });
        }

        if violations.is_empty() {
            RuleOutcome::Pass
        } else {
            RuleOutcome::Fail(violations)
        }
    }
}

fn fail(rule: Rule, dataset: &ConfigDocument, values: Vec<String>, message: String) -> RuleOutcome {
    RuleOutcome::Fail(vec![Violation {
        rule,
        dataset_id: Some(dataset.dataset_id.clone()),
        variable: None,
        values,
        message,
    }])
}

/// Entries of a comma-separated variable list that are not declared variables.
fn unknown_variables(dataset: &ConfigDocument, list: &str) -> Vec<String> {
    let known = dataset.variable_destination_names();
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty() && !known.contains(name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::xml::parse_document;

    fn dataset(dataset_type: &str, attrs: &[(&str, &str)], variables: &[(&str, Option<&str>)]) -> ConfigDocument {
        let mut xml = format!(r#"<dataset type="{}" datasetID="ds"><addAttributes>"#, dataset_type);
        for (name, value) in attrs {
            xml.push_str(&format!(r#"<att name="{}">{}</att>"#, name, value));
        }
        xml.push_str("</addAttributes>");
        for (name, category) in variables {
            xml.push_str(&format!("<dataVariable><sourceName>{}</sourceName>", name));
            if let Some(category) = category {
                xml.push_str(&format!(
                    r#"<addAttributes><att name="ioos_category">{}</att></addAttributes>"#,
                    category
                ));
            }
            xml.push_str("</dataVariable>");
        }
        xml.push_str("</dataset>");
        let root = parse_document(&xml).unwrap();
        ConfigDocument::from_element(&root, &xml).unwrap()
    }

    fn rules() -> RuleSet {
        RuleSet::default()
    }

    #[test]
    fn test_cdm_data_type() {
        let ok = dataset("EDDTableFromNcFiles", &[("cdm_data_type", "timeseries")], &[]);
        assert_eq!(rules().check(Rule::CdmDataType, &ok), RuleOutcome::Pass);

        let bad = dataset("EDDTableFromNcFiles", &[("cdm_data_type", "Swath")], &[]);
        let outcome = rules().check(Rule::CdmDataType, &bad);
        assert_eq!(outcome.violations()[0].values, vec!["Swath".to_string()]);
        assert_eq!(outcome.violations()[0].dataset_id.as_deref(), Some("ds"));

        let missing = dataset("EDDTableFromNcFiles", &[], &[]);
        assert!(rules().check(Rule::CdmDataType, &missing).is_failure());
    }

    #[test]
    fn test_passthrough_types_are_skipped() {
        let grid = dataset("EDDGridFromDap", &[("cdm_data_type", "Swath")], &[]);
        let erddap = dataset("EDDTableFromErddap", &[("subsetVariables", "nope")], &[]);
        assert_eq!(rules().check(Rule::CdmDataType, &grid), RuleOutcome::Skipped);
        assert_eq!(rules().check(Rule::SubsetVariables, &erddap), RuleOutcome::Skipped);
    }

    #[test]
    fn test_subset_variables() {
        let ds = dataset(
            "EDDTableFromNcFiles",
            &[("subsetVariables", "station, depth ,, missing")],
            &[("station", None), ("depth", None)],
        );
        let outcome = rules().check(Rule::SubsetVariables, &ds);
        assert_eq!(outcome.violations()[0].values, vec!["missing".to_string()]);

        let empty = dataset("EDDTableFromNcFiles", &[], &[]);
        assert_eq!(rules().check(Rule::SubsetVariables, &empty), RuleOutcome::Pass);
    }

    #[test]
    fn test_cdm_timeseries_variables() {
        let ds = dataset(
            "EDDTableFromNcFiles",
            &[("cdm_data_type", "TimeSeries"), ("cdm_timeseries_variables", "foo,bar")],
            &[("foo", None)],
        );
        let outcome = rules().check(Rule::CdmTimeseriesVariables, &ds);
        assert_eq!(outcome.violations().len(), 1);
        assert_eq!(outcome.violations()[0].values, vec!["bar".to_string()]);

        let missing = dataset("EDDTableFromNcFiles", &[("cdm_data_type", "TimeSeries")], &[]);
        assert!(rules().check(Rule::CdmTimeseriesVariables, &missing).is_failure());

        let sos = dataset("EDDTableFromSOS", &[("cdm_data_type", "TimeSeries")], &[]);
        assert_eq!(rules().check(Rule::CdmTimeseriesVariables, &sos), RuleOutcome::Skipped);

        let point = dataset("EDDTableFromNcFiles", &[("cdm_data_type", "Point")], &[]);
        assert_eq!(rules().check(Rule::CdmTimeseriesVariables, &point), RuleOutcome::Skipped);
    }

    #[test]
    fn test_cdm_profile_variables() {
        let ds = dataset(
            "EDDTableFromNcFiles",
            &[("cdm_data_type", "TimeSeriesProfile"), ("cdm_profile_variables", "cast")],
            &[("cast", None)],
        );
        assert_eq!(rules().check(Rule::CdmProfileVariables, &ds), RuleOutcome::Pass);

        // SOS is only exempt from the timeseries rule
        let sos = dataset("EDDTableFromSOS", &[("cdm_data_type", "Profile")], &[]);
        assert!(rules().check(Rule::CdmProfileVariables, &sos).is_failure());
    }

    #[test]
    fn test_ioos_category() {
        let ds = dataset(
            "EDDTableFromNcFiles",
            &[],
            &[
                ("time", None),
                ("temperature", Some("Temperature")),
                ("salinity", None),
                ("oxygen", Some("Oxygen")),
            ],
        );
        assert_eq!(rules().check(Rule::IoosCategory, &ds), RuleOutcome::Skipped);

        let strict = RuleSet::new(RuleConfig {
            ioos_category_required: true,
            ..RuleConfig::default()
        });
        let outcome = strict.check(Rule::IoosCategory, &ds);
        let variables: Vec<_> = outcome
            .violations()
            .iter()
            .map(|v| v.variable.clone().unwrap())
            .collect();
        assert_eq!(variables, vec!["salinity".to_string(), "oxygen".to_string()]);
        assert_eq!(outcome.violations()[1].values, vec!["Oxygen".to_string()]);
    }

    #[test]
    fn test_dataset_type() {
        let ds = dataset("EDDTableFromNowhere", &[], &[]);
        assert!(rules().check(Rule::DatasetType, &ds).is_failure());
        let results = rules().check_dataset(&ds);
        assert_eq!(results.len(), Rule::DATASET_RULES.len());
    }
}
