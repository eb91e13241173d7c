//! # Validation
//!
//! Rules applied to the cross-catalog correlation key and to tag values.
//!
//! ## Barcode Rules
//! ```text
//! raw barcode ──► trim ──► empty? ──► absent (item not matchable)
//!                             │
//!                             └──► printable ASCII, no spaces? ──► valid
//!                                                  │
//!                                                  └──► warning, still matched
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// =============================================================================
// Barcodes
// =============================================================================

/// Trims a raw barcode; blank barcodes count as absent.
pub fn normalize_barcode(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

/// Checks that a normalised barcode only holds printable, non-space ASCII.
pub fn validate_barcode(barcode: &str) -> Result<(), ValidationError> {
    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }
    if !barcode.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ValidationError::InvalidCharacters {
            field: "barcode".to_string(),
            value: barcode.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Tags
// =============================================================================

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ' ' | '-')
}

/// Strips every character outside `[A-Za-z0-9._ -]` and trims the result.
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| is_tag_char(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

// =============================================================================
// Sync Problems
// =============================================================================

/// A data-quality finding on a catalog item.
///
/// Errors make the item ineligible for sync; warnings are only reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "severity", content = "message", rename_all = "snake_case")]
pub enum SyncProblem {
    Warning(String),
    Error(String),
}

impl SyncProblem {
    pub fn is_error(&self) -> bool {
        matches!(self, SyncProblem::Error(_))
    }

    pub fn message(&self) -> &str {
        match self {
            SyncProblem::Warning(message) | SyncProblem::Error(message) => message,
        }
    }
}

impl std::fmt::Display for SyncProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncProblem::Warning(message) => write!(f, "warning: {}", message),
            SyncProblem::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Problems derived from an item's barcodes and variation count.
pub fn check_barcodes(barcodes: &[String], variation_count: usize) -> Vec<SyncProblem> {
    let mut problems = Vec::new();
    if barcodes.is_empty() {
        problems.push(SyncProblem::Error("item has no barcodes".to_string()));
        return problems;
    }
    if barcodes.len() < variation_count {
        problems.push(SyncProblem::Warning(
            "not all variations have a barcode".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    let mut repeated = BTreeSet::new();
    for barcode in barcodes {
        if !seen.insert(barcode.as_str()) {
            repeated.insert(barcode.as_str());
        }
        if let Err(err) = validate_barcode(barcode) {
            problems.push(SyncProblem::Warning(err.to_string()));
        }
    }
    for barcode in repeated {
        problems.push(SyncProblem::Warning(format!(
            "barcode {} is used by more than one variation",
            barcode
        )));
    }
    problems
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_barcode() {
        assert_eq!(normalize_barcode(Some(" 400638 ")).as_deref(), Some("400638"));
        assert_eq!(normalize_barcode(Some("   ")), None);
        assert_eq!(normalize_barcode(None), None);
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("4006381333931").is_ok());
        assert!(validate_barcode("").is_err());
        assert_eq!(
            validate_barcode("40 06"),
            Err(ValidationError::InvalidCharacters {
                field: "barcode".to_string(),
                value: "40 06".to_string(),
            })
        );
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("wool"), "wool");
        assert_eq!(sanitize_tag("  Größe: L "), "Gre L");
        assert_eq!(sanitize_tag("v1.2_beta-x"), "v1.2_beta-x");
        assert_eq!(sanitize_tag("#!?"), "");
    }

    #[test]
    fn test_check_barcodes() {
        let none: Vec<String> = Vec::new();
        let problems = check_barcodes(&none, 0);
        assert_eq!(problems, vec![SyncProblem::Error("item has no barcodes".into())]);

        let one = vec!["B1".to_string()];
        let problems = check_barcodes(&one, 2);
        assert_eq!(problems.len(), 1);
        assert!(!problems[0].is_error());

        assert!(check_barcodes(&one, 0).is_empty());
    }

    #[test]
    fn test_check_barcodes_reports_repeats_once() {
        let barcodes: Vec<String> = ["B1", "B3", "B3", "B3"].iter().map(|b| b.to_string()).collect();
        let problems = check_barcodes(&barcodes, 4);
        assert_eq!(
            problems,
            vec![SyncProblem::Warning("barcode B3 is used by more than one variation".into())]
        );
    }
}
