//! Structural validation of a dataset collection.

pub mod rules;
pub mod vocabulary;

pub use rules::{Rule, RuleOutcome, RuleSet, ValidationReport, Violation};
pub use vocabulary::{is_cdm_data_type, is_edd_type, is_ioos_category};
