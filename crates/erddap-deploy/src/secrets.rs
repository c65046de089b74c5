//! Secret placeholders substituted into datasets.xml before parsing.
//!
//! A secret named `DB_PASSWORD` replaces every `{DB_PASSWORD}` token in the
//! raw configuration text. Secrets come from two places, merged in this order:
//!
//! 1. **Environment** - entries prefixed with `ERDDAP_SECRET_`, prefix stripped
//! 2. **Explicit** - values handed in by the caller (including the
//!    `ERDDAP_SECRETS` JSON object), which win on key collision
//!
//! The core never reads the process environment itself; callers pass the
//! variables in through [`Secrets::from_env_vars`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use regex::{Captures, Regex};
use secrecy::{ExposeSecret, SecretString};
use std::sync::LazyLock;

use crate::error::{DeployError, Result};

/// Prefix marking an environment variable as a datasets.xml secret.
pub const SECRET_ENV_PREFIX: &str = "ERDDAP_SECRET_";

/// Identifier-shaped placeholders, used to report tokens no secret resolved.
static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Named secret values, held as [`SecretString`] so they never show up in `Debug` output.
#[derive(Default)]
pub struct Secrets {
    values: BTreeMap<String, SecretString>,
}

impl Secrets {
    /// Creates an empty secret set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects secrets from `(name, value)` environment pairs.
    ///
    /// Only names starting with [`SECRET_ENV_PREFIX`] are kept, with the prefix removed.
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut secrets = Self::new();
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(SECRET_ENV_PREFIX) {
                if !name.is_empty() {
                    secrets.insert(name, value);
                }
            }
        }
        if !secrets.is_empty() {
            log::debug!(
                "Found environment variable secrets: {:?}",
                secrets.keys().collect::<Vec<_>>()
            );
        }
        secrets
    }

    /// Parses a JSON object of `name -> value` secrets.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: HashMap<String, String> =
            serde_json::from_str(json).map_err(|e| DeployError::InvalidSecrets(e.to_string()))?;
        let mut secrets = Self::new();
        for (key, value) in map {
            secrets.insert(key, value);
        }
        Ok(secrets)
    }

    /// Adds or replaces a secret.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(name.into(), SecretString::from(value.into()));
    }

    /// Builder-style [`Secrets::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Merges `explicit` over `self`; explicit values win on collision.
    pub fn overlay(mut self, explicit: Secrets) -> Self {
        self.values.extend(explicit.values);
        self
    }

    /// Returns the secret value for `name`.
    pub fn expose(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|v| v.expose_secret())
    }

    /// Iterates over the secret names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replaces every `{NAME}` placeholder with its secret in a single pass.
    ///
    /// Replacement text is never rescanned, so a secret value containing a
    /// placeholder-shaped token is inserted verbatim.
    pub fn substitute(&self, text: &str) -> (String, SubstitutionReport) {
        let mut report = SubstitutionReport::default();

        let output = match self.placeholder_pattern() {
            None => text.to_string(),
            Some(Ok(pattern)) => {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                let replaced = pattern.replace_all(text, |caps: &Captures<'_>| {
                    let name = &caps[1];
                    match self.values.get(name) {
                        Some(value) => {
                            *counts.entry(name.to_string()).or_default() += 1;
                            value.expose_secret().to_string()
                        }
                        None => caps[0].to_string(),
                    }
                });
                let replaced = replaced.into_owned();
                report.replaced = counts;
                replaced
            }
            Some(Err(e)) => {
                log::error!("Cannot build secret placeholder pattern: {}", e);
                text.to_string()
            }
        };

        for name in self.values.keys() {
            match report.replaced.get(name) {
                Some(count) => log::debug!("Replaced {} x {{{}}}", count, name),
                None => {
                    log::warn!("Secret {} not found in datasets.xml", name);
                    report.unused.push(name.clone());
                }
            }
        }

        for caps in RE_PLACEHOLDER.captures_iter(&output) {
            let name = caps[1].to_string();
            if !self.values.contains_key(&name) && !report.unresolved.contains(&name) {
                log::warn!("Placeholder {{{}}} has no matching secret", name);
                report.unresolved.push(name);
            }
        }

        (output, report)
    }
}

impl Secrets {
    /// Matches `{NAME}` for every secret name, taken literally.
    fn placeholder_pattern(&self) -> Option<std::result::Result<Regex, regex::Error>> {
        if self.values.is_empty() {
            return None;
        }
        let names: Vec<String> = self.values.keys().map(|k| regex::escape(k)).collect();
        Some(Regex::new(&format!(r"\{{({})\}}", names.join("|"))))
    }
}

impl Clone for Secrets {
    fn clone(&self) -> Self {
        Self {
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), SecretString::from(v.expose_secret().to_string())))
                .collect(),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of a [`Secrets::substitute`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionReport {
    /// Number of replacements per secret name.
    pub replaced: BTreeMap<String, usize>,
    /// Secrets that had no placeholder in the text.
    pub unused: Vec<String>,
    /// Placeholders left in the text because no secret matched.
    pub unresolved: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_env_vars_strips_prefix() {
        let secrets = Secrets::from_env_vars(env(&[
            ("ERDDAP_SECRET_test", "one"),
            ("ERDDAP_SECRET_test2", "two"),
            ("ERDDAP_DATASETS_XML", "ignored"),
            ("PATH", "/usr/bin"),
        ]));
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets.expose("test"), Some("one"));
        assert_eq!(secrets.expose("test2"), Some("two"));
    }

    #[test]
    fn test_explicit_secret_wins() {
        let env_secrets = Secrets::from_env_vars(env(&[("ERDDAP_SECRET_test", "env")]));
        let merged = env_secrets.overlay(Secrets::new().with("test", "explicit"));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.expose("test"), Some("explicit"));
    }

    #[test]
    fn test_from_json() {
        let secrets = Secrets::from_json(r#"{"A": "1", "B": "2"}"#).unwrap();
        assert_eq!(secrets.expose("A"), Some("1"));
        assert_eq!(secrets.expose("B"), Some("2"));
        assert!(Secrets::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_substitute_replaces_every_occurrence() {
        let secrets = Secrets::new().with("TEST_SECRET", "TEST_VALUE");
        let (out, report) = secrets.substitute("<a>{TEST_SECRET}</a><b>{TEST_SECRET}</b>");
        assert_eq!(out, "<a>TEST_VALUE</a><b>TEST_VALUE</b>");
        assert!(!out.contains("TEST_SECRET"));
        assert_eq!(report.replaced.get("TEST_SECRET"), Some(&2));
        assert!(report.unused.is_empty());
    }

    #[test]
    fn test_substitute_is_single_pass() {
        let secrets = Secrets::new().with("A", "{B}").with("B", "b");
        let (out, report) = secrets.substitute("{A}");
        assert_eq!(out, "{B}");
        assert_eq!(report.unused, vec!["B".to_string()]);
    }

    #[test]
    fn test_unused_and_unresolved_are_reported() {
        let secrets = Secrets::new().with("KNOWN", "x");
        let (out, report) = secrets.substitute("<a>{UNKNOWN}</a>");
        assert_eq!(out, "<a>{UNKNOWN}</a>");
        assert_eq!(report.unused, vec!["KNOWN".to_string()]);
        assert_eq!(report.unresolved, vec!["UNKNOWN".to_string()]);
    }

    #[test]
    fn test_substitute_matches_names_literally() {
        let secrets = Secrets::new()
            .with("DB-PASS", "hunter2")
            .with("db.password", "s3cret")
            .with("a+b", "plus");
        let (out, report) =
            secrets.substitute("<a>{DB-PASS}</a><b>{db.password}</b><c>{dbXpassword}</c><d>{a+b}</d>");
        assert_eq!(out, "<a>hunter2</a><b>s3cret</b><c>{dbXpassword}</c><d>plus</d>");
        assert!(report.unused.is_empty());
        assert_eq!(report.replaced.get("DB-PASS"), Some(&1));
    }

    #[test]
    fn test_debug_hides_values() {
        let secrets = Secrets::new().with("TOKEN", "super-secret");
        let debug = format!("{:?}", secrets);
        assert!(debug.contains("TOKEN"));
        assert!(!debug.contains("super-secret"));
    }
}
