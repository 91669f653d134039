//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
//! Key canonicalization.
//!
//! A single declarative [`AliasTable`] maps each canonical umbrella key to the
//! historical spellings that collapse into it and to the hints used to detect
//! members of its feature group. Both the canonicalizer and the group
//! expansion in [`crate::resolver`] consult the same table.

use std::collections::HashSet;

use crate::section::{AppSection, SectionKey};

/// Canonical key of the attendance umbrella section.
pub const ATTENDANCE: &str = "attendance";

/// Keys that are removed from every working set.
pub const DEPRECATED_KEYS: &[&str] = &["employeeInfo"];

/// One canonical key with its aliases and group detection hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasEntry {
    /// Canonical spelling.
    pub canonical: &'static str,
    /// Historical spellings collapsed into `canonical` (case-insensitive).
    pub aliases: &'static [&'static str],
    /// Lowercase fragments identifying members of the feature group.
    pub group_hints: &'static [&'static str],
}

impl AliasEntry {
    fn names(&self, raw: &str) -> bool {
        self.canonical.eq_ignore_ascii_case(raw)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(raw))
    }

    /// Whether `section` belongs to this entry's feature group, judged by its
    /// key prefix, group tag or path segments.
    pub fn matches(&self, section: &AppSection) -> bool {
        let key = section.key.folded();
        if self.names(&key) {
            return true;
        }
        let group = section.group.as_deref().map(str::to_lowercase);
        self.group_hints.iter().any(|hint| {
            key.starts_with(hint)
                || group.as_deref() == Some(*hint)
                || section
                    .path
                    .split('/')
                    .map(|segment| segment.trim().to_lowercase())
                    .any(|segment| segment.starts_with(hint))
        })
    }
}

/// Declarative alias mapping shared by canonicalization and group expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasTable {
    entries: &'static [AliasEntry],
}

static STANDARD: AliasTable = AliasTable {
    entries: &[AliasEntry {
        canonical: ATTENDANCE,
        aliases: &[
            "attendanceManagement",
            "attendance_management",
            "attendance-management",
            "attendances",
            "timekeeping",
        ],
        group_hints: &["attendance", "timekeeping"],
    }],
};

impl AliasTable {
    /// Build a table from static entries.
    pub const fn new(entries: &'static [AliasEntry]) -> Self {
        Self { entries }
    }

    /// Table used by the application.
    pub fn standard() -> &'static AliasTable {
        &STANDARD
    }

    /// All entries in declaration order.
    pub fn entries(&self) -> &'static [AliasEntry] {
        self.entries
    }

    /// Entry whose canonical key equals `canonical` (case-insensitive).
    pub fn entry(&self, canonical: &str) -> Option<&'static AliasEntry> {
        self.entries
            .iter()
            .find(|entry| entry.canonical.eq_ignore_ascii_case(canonical))
    }

    /// Whether `raw` names a key that is always dropped.
    pub fn is_deprecated(&self, raw: &str) -> bool {
        let raw = raw.trim();
        DEPRECATED_KEYS
            .iter()
            .any(|deprecated| deprecated.eq_ignore_ascii_case(raw))
    }

    /// Canonical form of a single key; `None` for blank or deprecated keys.
    pub fn canonicalize_key(&self, raw: &str) -> Option<SectionKey> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.is_deprecated(trimmed) {
            return None;
        }
        let canonical = self
            .entries
            .iter()
            .find(|entry| entry.names(trimmed))
            .map(|entry| entry.canonical)
            .unwrap_or(trimmed);
        Some(SectionKey::new(canonical))
    }

    /// Canonicalize a list, dropping blanks, deprecated keys and duplicates
    /// by lowercase identity while keeping first-occurrence order.
    pub fn canonicalize_keys<I, S>(&self, raw: I) -> Vec<SectionKey>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(|key| self.canonicalize_key(key.as_ref()))
            .filter(|key| seen.insert(key.folded()))
            .collect()
    }
}

/// Canonicalize one key with the standard table.
pub fn canonicalize_key(raw: &str) -> Option<SectionKey> {
    AliasTable::standard().canonicalize_key(raw)
}

/// Canonicalize a key list with the standard table.
pub fn canonicalize_keys<I, S>(raw: I) -> Vec<SectionKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    AliasTable::standard().canonicalize_keys(raw)
}
