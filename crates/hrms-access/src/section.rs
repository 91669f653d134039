//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical::AliasTable;

/// Stable identifier of a navigable feature area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionKey(String);

impl SectionKey {
    /// Wrap a raw key without validation.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase identity used for case-insensitive comparisons.
    pub fn folded(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SectionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SectionKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SectionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A navigable feature unit of the administration application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSection {
    /// Canonical section key.
    pub key: SectionKey,
    /// Display name.
    pub label: String,
    /// Relative URL segment.
    pub path: String,
    /// Optional feature group tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl AppSection {
    /// Construct an ungrouped section.
    pub fn new(key: impl Into<SectionKey>, label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            path: path.into(),
            group: None,
        }
    }

    /// Attach a feature group tag.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Ordered, canonical list of sections known to the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AppSection>", into = "Vec<AppSection>")]
pub struct SectionCatalog {
    sections: Vec<AppSection>,
}

impl SectionCatalog {
    /// Build a catalog, canonicalizing keys with the standard alias table.
    ///
    /// Deprecated keys are dropped and later duplicates (by lowercase key)
    /// are ignored, so the first declaration of a key wins.
    pub fn new(sections: impl IntoIterator<Item = AppSection>) -> Self {
        Self::with_aliases(sections, AliasTable::standard())
    }

    /// Build a catalog against an explicit alias table.
    pub fn with_aliases(sections: impl IntoIterator<Item = AppSection>, aliases: &AliasTable) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for mut section in sections {
            let Some(key) = aliases.canonicalize_key(section.key.as_str()) else {
                debug!(key = %section.key, "dropping deprecated or blank catalog key");
                continue;
            };
            if !seen.insert(key.folded()) {
                debug!(key = %key, "ignoring duplicate catalog key");
                continue;
            }
            section.key = key;
            kept.push(section);
        }
        Self { sections: kept }
    }

    /// Built-in catalog used whenever the backing store cannot supply one.
    pub fn fallback() -> Self {
        Self::new([
            AppSection::new("overview", "Overview", "/overview"),
            AppSection::new("employees", "Employees", "/employees"),
            AppSection::new("departments", "Departments", "/departments"),
            AppSection::new("roles", "Roles", "/roles"),
            AppSection::new("shifts", "Shifts", "/shifts"),
            AppSection::new("attendance", "Attendance", "/attendance").with_group("attendance"),
            AppSection::new("attendanceOverview", "Attendance overview", "/attendance/overview")
                .with_group("attendance"),
            AppSection::new("attendanceEdit", "Edit attendance", "/attendance/edit")
                .with_group("attendance"),
            AppSection::new("attendanceReport", "Attendance report", "/attendance/report")
                .with_group("attendance"),
            AppSection::new("reports", "Reports", "/reports"),
            AppSection::new("permissions", "Permissions", "/permissions"),
            AppSection::new("settings", "Settings", "/settings"),
        ])
    }

    /// Sections in declaration order.
    pub fn sections(&self) -> &[AppSection] {
        &self.sections
    }

    /// Iterate over sections in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &AppSection> {
        self.sections.iter()
    }

    /// All canonical keys in declaration order.
    pub fn keys(&self) -> Vec<SectionKey> {
        self.sections.iter().map(|s| s.key.clone()).collect()
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the catalog holds no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Find a section by key, ignoring case.
    pub fn get(&self, key: &str) -> Option<&AppSection> {
        let folded = key.trim().to_lowercase();
        self.sections.iter().find(|s| s.key.folded() == folded)
    }

    /// Whether the catalog contains the key, ignoring case.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Canonicalize raw keys and keep those the catalog knows, in input order,
    /// using the catalog's spelling.
    pub fn sanitize<I, S>(&self, raw: I, aliases: &AliasTable) -> Vec<SectionKey>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        aliases
            .canonicalize_keys(raw)
            .into_iter()
            .filter_map(|key| self.get(key.as_str()).map(|s| s.key.clone()))
            .collect()
    }

    /// Keys of every section belonging to the group rooted at `canonical`.
    pub fn group_keys(&self, aliases: &AliasTable, canonical: &str) -> Vec<SectionKey> {
        let Some(entry) = aliases.entry(canonical) else {
            return Vec::new();
        };
        self.sections
            .iter()
            .filter(|section| entry.matches(section))
            .map(|section| section.key.clone())
            .collect()
    }

    /// Keys of the attendance feature group.
    pub fn attendance_keys(&self, aliases: &AliasTable) -> Vec<SectionKey> {
        self.group_keys(aliases, crate::canonical::ATTENDANCE)
    }

    /// Catalog keys whose lowercase identity appears in `folded`, in catalog order.
    pub(crate) fn retain_folded(&self, folded: &HashSet<String>) -> Vec<SectionKey> {
        self.sections
            .iter()
            .filter(|section| folded.contains(&section.key.folded()))
            .map(|section| section.key.clone())
            .collect()
    }
}

impl From<Vec<AppSection>> for SectionCatalog {
    fn from(sections: Vec<AppSection>) -> Self {
        Self::new(sections)
    }
}

impl From<SectionCatalog> for Vec<AppSection> {
    fn from(catalog: SectionCatalog) -> Self {
        catalog.sections
    }
}
