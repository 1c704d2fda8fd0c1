//! Reference-ID shapes returned by the target when a submission is accepted

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known reference-ID families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Request,
    Volunteer,
    ShoeDonation,
    MoneyDonation,
    Generic,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Request => "request",
            ReferenceKind::Volunteer => "volunteer",
            ReferenceKind::ShoeDonation => "shoe_donation",
            ReferenceKind::MoneyDonation => "money_donation",
            ReferenceKind::Generic => "generic",
        };
        f.write_str(s)
    }
}

/// A reference ID found in page text or an API body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceId {
    pub kind: ReferenceKind,
    pub id: String,
}

// Specific shapes first; the generic shape is only a fallback.
static PATTERNS: Lazy<Vec<(ReferenceKind, Regex)>> = Lazy::new(|| {
    [
        (ReferenceKind::Request, r"\bREQ-\d{8}-[A-Z0-9]{4}\b"),
        (ReferenceKind::Volunteer, r"\bVOL-[A-Z0-9]{8}\b"),
        (ReferenceKind::ShoeDonation, r"\bDS-[A-Z0-9]+(?:-[A-Z0-9]+)*\b"),
        (ReferenceKind::MoneyDonation, r"\bDM-[A-Z0-9]+(?:-[A-Z0-9]+)*\b"),
        (ReferenceKind::Generic, r"\b[A-Z]{2,3}-[A-Z]{4}-\d{4}\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("static reference pattern")))
    .collect()
});

/// Find the first reference ID in `text`, preferring the specific shapes
pub fn find_reference(text: &str) -> Option<ReferenceId> {
    PATTERNS.iter().find_map(|(kind, re)| {
        re.find(text).map(|m| ReferenceId {
            kind: *kind,
            id: m.as_str().to_string(),
        })
    })
}

/// Find a reference ID of one family only
pub fn find_reference_of(kind: ReferenceKind, text: &str) -> Option<String> {
    PATTERNS
        .iter()
        .find(|(k, _)| *k == kind)
        .and_then(|(_, re)| re.find(text))
        .map(|m| m.as_str().to_string())
}

/// Classify a bare identifier; `None` when it matches no registered shape
pub fn classify(id: &str) -> Option<ReferenceKind> {
    find_reference(id)
        .filter(|found| found.id == id)
        .map(|found| found.kind)
}
