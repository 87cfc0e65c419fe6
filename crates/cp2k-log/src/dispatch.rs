//! Version dispatch: maps a program version id to the rule trees that read
//! its output.

use crate::error::{ParseWarning, PatternError};
use crate::rule::{MatchRule, RunMode};
use crate::rules;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// How many leading lines are searched for the version banner.
pub const HEADER_PROBE_LINES: usize = 200;

/// Version every unrecognised id falls back to.
pub const DEFAULT_VERSION: &str = "2.6.2";

static VERSION_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*CP2K\|\s+version string:\s+(.+?)\s*$").unwrap());

static VERSION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)+)").unwrap());

/// Output layout families. Versions of one dialect share a rule tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Upper-case `STEP NUMBER =` blocks after every MD step.
    Legacy,
    /// `MD| Step number` blocks after every MD step.
    Modern,
}

/// Builds the rule trees for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleTreeFactory {
    dialect: Dialect,
}

impl RuleTreeFactory {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The `section_run` rule with the shared prefix as its children.
    pub fn run(&self) -> Result<MatchRule, PatternError> {
        rules::run()
    }

    /// Rules replacing the prefix once `mode` has been recognised.
    pub fn body(&self, mode: RunMode) -> Result<Vec<MatchRule>, PatternError> {
        match mode {
            RunMode::SinglePoint => rules::single_point(),
            RunMode::GeometryOptimization => rules::geometry_optimization(),
            RunMode::MolecularDynamics => rules::molecular_dynamics(self.dialect),
        }
    }
}

/// Outcome of a lookup.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Version whose rules were selected.
    pub version: String,
    pub factory: RuleTreeFactory,
    pub warning: Option<ParseWarning>,
}

impl Selection {
    pub fn is_fallback(&self) -> bool {
        self.warning.is_some()
    }
}

/// Maps CP2K versions to the dialect of rules that reads their output.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    entries: BTreeMap<String, Dialect>,
    default: String,
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VersionRegistry {
    /// Registry of the versions this crate ships rules for.
    pub fn builtin() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            default: DEFAULT_VERSION.to_string(),
        };
        for version in ["2.5.1", "2.6.2"] {
            registry.register(version, Dialect::Legacy);
        }
        for version in ["5.1", "6.1", "7.1"] {
            registry.register(version, Dialect::Modern);
        }
        registry
    }

    /// Adds or replaces the dialect used for `version`.
    pub fn register(&mut self, version: &str, dialect: Dialect) {
        self.entries.insert(version.to_string(), dialect);
    }

    pub fn versions(&self) -> impl Iterator<Item = (&str, Dialect)> {
        self.entries.iter().map(|(v, d)| (v.as_str(), *d))
    }

    pub fn default_version(&self) -> &str {
        &self.default
    }

    /// Exact lookup. A miss logs, yields the default version's rules and
    /// carries an `UnknownVersion` warning.
    pub fn select(&self, version_id: &str) -> Selection {
        let requested = version_id.trim();
        if let Some(dialect) = self.entries.get(requested) {
            return Selection {
                version: requested.to_string(),
                factory: RuleTreeFactory::new(*dialect),
                warning: None,
            };
        }
        log::warn!(
            "no rules registered for version `{requested}`, falling back to {}",
            self.default
        );
        self.fallback(Some(requested.to_string()))
    }

    /// Default rules when no version id could be found at all.
    pub fn select_default(&self) -> Selection {
        log::warn!("no version banner found, using rules for {}", self.default);
        self.fallback(None)
    }

    fn fallback(&self, requested: Option<String>) -> Selection {
        let dialect = self
            .entries
            .get(&self.default)
            .copied()
            .unwrap_or(Dialect::Legacy);
        Selection {
            version: self.default.clone(),
            factory: RuleTreeFactory::new(dialect),
            warning: Some(ParseWarning::UnknownVersion {
                requested,
                fallback: self.default.clone(),
            }),
        }
    }
}

/// Pulls the numeric id out of a free-form version string
/// (`CP2K version 2.6.2` gives `2.6.2`).
pub fn extract_version_id(banner: &str) -> Option<String> {
    VERSION_ID
        .captures(banner)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Searches leading log lines for the version banner.
pub fn detect_version<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    lines
        .iter()
        .take(HEADER_PROBE_LINES)
        .find_map(|line| {
            VERSION_BANNER
                .captures(line.as_ref())
                .and_then(|c| c.get(1))
        })
        .and_then(|m| extract_version_id(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_lookup() {
        let registry = VersionRegistry::builtin();
        let selection = registry.select("7.1");
        assert_eq!(selection.version, "7.1");
        assert_eq!(selection.factory.dialect(), Dialect::Modern);
        assert!(!selection.is_fallback());
    }

    #[test]
    fn test_unknown_version_falls_back() {
        let registry = VersionRegistry::builtin();
        let selection = registry.select("9.9.9");
        assert_eq!(selection.version, DEFAULT_VERSION);
        assert_eq!(
            selection.warning,
            Some(ParseWarning::UnknownVersion {
                requested: Some("9.9.9".into()),
                fallback: DEFAULT_VERSION.into()
            })
        );
    }

    #[test]
    fn test_extract_version_id() {
        assert_eq!(extract_version_id("CP2K version 2.6.2").as_deref(), Some("2.6.2"));
        assert_eq!(
            extract_version_id("CP2K version 7.1 (Development Version)").as_deref(),
            Some("7.1")
        );
        assert_eq!(extract_version_id("development"), None);
    }

    #[test]
    fn test_detect_version_in_header() {
        let lines = [
            " **** **** ******  **  PROGRAM STARTED AT               2016-02-03 15:49:07.513",
            " CP2K| version string:                                          CP2K version 2.5.1",
        ];
        assert_eq!(detect_version(&lines).as_deref(), Some("2.5.1"));
        assert_eq!(detect_version(&lines[..1]), None);
    }

    #[test]
    fn test_every_dialect_builds() {
        for dialect in [Dialect::Legacy, Dialect::Modern] {
            let factory = RuleTreeFactory::new(dialect);
            factory.run().unwrap();
            for mode in [
                RunMode::SinglePoint,
                RunMode::GeometryOptimization,
                RunMode::MolecularDynamics,
            ] {
                assert!(!factory.body(mode).unwrap().is_empty());
            }
        }
    }
}
