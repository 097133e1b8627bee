//! # Failure Classification
//!
//! Maps the raw diagnostic text of a failed task onto a small taxonomy that
//! decides what the orchestrator does next: retry in a later round, repair
//! privileges and retry once, accept as already done, or stop.
//!
//! Classification is textual. Oracle-style `ORA-nnnnn`/`PLS-nnnnn` codes and
//! MySQL-style `ERROR nnnn` codes are recognized, with plain-language phrases
//! as a fallback for clients that print neither.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a task failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    /// A referenced object does not exist yet
    MissingObject,
    PermissionDenied,
    SyntaxError,
    /// Existing data violates the statement (unique keys, FK validation)
    DataConflict,
    /// The object already exists
    DuplicateObject,
    Timeout,
    Unknown,
}

impl FailureCategory {
    /// Eligible for another round in iterative mode
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MissingObject | Self::Timeout)
    }

    /// Counts as done rather than failed
    pub fn is_soft_success(&self) -> bool {
        matches!(self, Self::DuplicateObject)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingObject => "MISSING_OBJECT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::SyntaxError => "SYNTAX_ERROR",
            Self::DataConflict => "DATA_CONFLICT",
            Self::DuplicateObject => "DUPLICATE_OBJECT",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{label}")
    }
}

/// Turns diagnostic text into a [`FailureCategory`]
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, diagnostic: &str) -> FailureCategory;
}

/// Code and phrase tables for one category
#[derive(Debug, Clone, Default)]
pub struct CategoryRule {
    pub category: Option<FailureCategory>,
    pub ora_codes: Vec<u32>,
    /// Inclusive ranges of Oracle codes
    pub ora_ranges: Vec<(u32, u32)>,
    pub mysql_codes: Vec<u32>,
    /// Lowercase phrases
    pub phrases: Vec<&'static str>,
}

impl CategoryRule {
    fn new(category: FailureCategory) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    fn matches(&self, signals: &Signals) -> bool {
        signals.ora.iter().any(|code| {
            self.ora_codes.contains(code)
                || self.ora_ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(code))
        }) || signals.mysql.iter().any(|code| self.mysql_codes.contains(code))
            || self.phrases.iter().any(|p| signals.lowered.contains(p))
    }
}

/// Error codes and normalized text pulled from one diagnostic
struct Signals {
    ora: Vec<u32>,
    mysql: Vec<u32>,
    pls: bool,
    lowered: String,
}

impl Signals {
    fn extract(diagnostic: &str) -> Self {
        let upper = diagnostic.to_ascii_uppercase();
        Self {
            ora: codes_after(&upper, "ORA-"),
            mysql: codes_after(&upper, "ERROR "),
            pls: !codes_after(&upper, "PLS-").is_empty(),
            lowered: diagnostic.to_lowercase(),
        }
    }
}

/// Numbers immediately following each occurrence of `prefix`
fn codes_after(text: &str, prefix: &str) -> Vec<u32> {
    text.match_indices(prefix)
        .filter_map(|(idx, _)| {
            let digits: String = text[idx + prefix.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
        .collect()
}

/// Rule-table classifier. Rules are checked in order, first match wins, so
/// specific codes come before the broad syntax range.
#[derive(Debug, Clone)]
pub struct StandardFailureClassifier {
    rules: Vec<CategoryRule>,
}

impl Default for StandardFailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardFailureClassifier {
    pub fn new() -> Self {
        let timeout = CategoryRule {
            ora_codes: vec![12170, 3136, 1013],
            phrases: vec!["timed out", "timeout expired"],
            ..CategoryRule::new(FailureCategory::Timeout)
        };
        let duplicate = CategoryRule {
            ora_codes: vec![955, 2260, 2261, 2275, 1408, 1430],
            mysql_codes: vec![1050, 1061, 1826, 1304],
            phrases: vec!["already exists", "name is already used by an existing object"],
            ..CategoryRule::new(FailureCategory::DuplicateObject)
        };
        let permission = CategoryRule {
            ora_codes: vec![1031, 1749, 1720, 1039, 41900],
            mysql_codes: vec![1142, 1143, 1044, 1227, 1370],
            phrases: vec!["insufficient privileges", "permission denied", "command denied"],
            ..CategoryRule::new(FailureCategory::PermissionDenied)
        };
        let data_conflict = CategoryRule {
            ora_codes: vec![1, 2298, 2299, 2437, 1452, 2296, 2293, 1400],
            mysql_codes: vec![1062, 1452, 1451, 1215],
            phrases: vec!["unique constraint", "duplicate entry", "cannot validate"],
            ..CategoryRule::new(FailureCategory::DataConflict)
        };
        let missing = CategoryRule {
            ora_codes: vec![942, 4043, 4042, 2289, 6550, 6575, 4063, 980, 904, 2270],
            mysql_codes: vec![1146, 1305, 1049, 1054, 1356],
            phrases: vec!["does not exist", "not found", "unknown table"],
            ..CategoryRule::new(FailureCategory::MissingObject)
        };
        let syntax = CategoryRule {
            ora_ranges: vec![(900, 999)],
            mysql_codes: vec![1064, 1149],
            phrases: vec!["syntax error", "invalid sql statement"],
            ..CategoryRule::new(FailureCategory::SyntaxError)
        };

        Self {
            rules: vec![timeout, duplicate, permission, data_conflict, missing, syntax],
        }
    }

    /// Classifier with caller-supplied rules, checked in order
    pub fn with_rules(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }
}

impl FailureClassifier for StandardFailureClassifier {
    fn classify(&self, diagnostic: &str) -> FailureCategory {
        let signals = Signals::extract(diagnostic);
        if let Some(category) = self
            .rules
            .iter()
            .find(|rule| rule.matches(&signals))
            .and_then(|rule| rule.category)
        {
            return category;
        }
        // Compilation errors without a recognized ORA code
        if signals.pls {
            return FailureCategory::SyntaxError;
        }
        FailureCategory::Unknown
    }
}

/// Cut a diagnostic to `max_len` characters, marking the cut with `...`
pub fn truncate_diagnostic(diagnostic: &str, max_len: usize) -> String {
    let trimmed = diagnostic.trim();
    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_len).collect();
    cut.push_str("...");
    cut
}
