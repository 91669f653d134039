//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use std::fmt;

use hrms_common::config::AccessConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::section::SectionKey;

/// Roles that are always granted every section and can never be restricted.
pub const LOCKED_ROLES: [&str; 2] = ["ADMIN", "DIRECTOR"];

/// Stored grants per role.
pub type RoleAccessMap = IndexMap<RoleKey, Vec<SectionKey>>;

/// Whether the raw role key names a locked role.
pub fn is_locked_role(raw: &str) -> bool {
    let normalised = raw.trim().to_uppercase();
    LOCKED_ROLES.iter().any(|locked| *locked == normalised)
}

/// Upper-cased, trimmed role identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleKey(String);

impl RoleKey {
    /// Normalise a raw role key; `None` when blank.
    pub fn normalise(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    /// Borrow the normalised key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the [`LOCKED_ROLES`].
    pub fn is_locked(&self) -> bool {
        LOCKED_ROLES.contains(&self.0.as_str())
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoleKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RoleKey::normalise(&value).ok_or_else(|| "role key cannot be blank".to_owned())
    }
}

impl From<RoleKey> for String {
    fn from(value: RoleKey) -> Self {
        value.0
    }
}

/// An actor classification administered outside this service.
///
/// The locked flag is always derived from the key; a stored flag is ignored
/// on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RoleRecord")]
pub struct Role {
    /// Normalised role key.
    pub key: RoleKey,
    /// Display name.
    pub label: String,
    /// Locked roles see every section regardless of stored grants.
    pub locked: bool,
}

#[derive(Deserialize)]
struct RoleRecord {
    key: RoleKey,
    #[serde(default)]
    label: String,
}

impl From<RoleRecord> for Role {
    fn from(record: RoleRecord) -> Self {
        Role::new(record.key, record.label)
    }
}

impl Role {
    /// Construct a role; the locked flag is derived from the key.
    pub fn new(key: RoleKey, label: impl Into<String>) -> Self {
        let locked = key.is_locked();
        Self {
            key,
            label: label.into(),
            locked,
        }
    }

    /// Whether the role is one of the [`LOCKED_ROLES`].
    pub fn is_locked(&self) -> bool {
        self.key.is_locked()
    }

    /// Built-in role list used when the backing store cannot supply one.
    pub fn fallback_roles() -> Vec<Role> {
        [
            ("ADMIN", "Administrator"),
            ("DIRECTOR", "Director"),
            ("MANAGER", "Manager"),
            ("HR", "Human resources"),
            ("EMPLOYEE", "Employee"),
        ]
        .into_iter()
        .filter_map(|(key, label)| RoleKey::normalise(key).map(|key| Role::new(key, label)))
        .collect()
    }
}

/// Default visible sections per non-locked role.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleDefaults {
    table: IndexMap<RoleKey, Vec<SectionKey>>,
}

impl RoleDefaults {
    /// A table with no defaults for any role.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in defaults. Roles without an entry fall through to the baseline.
    pub fn builtin() -> Self {
        Self::from_entries([
            ("MANAGER", vec!["overview", "employees", "shifts", "attendance"]),
            (
                "HR",
                vec!["overview", "employees", "departments", "shifts", "attendance"],
            ),
            ("EMPLOYEE", vec![]),
        ])
    }

    /// Build a table from raw role/section pairs. Locked and blank roles are skipped.
    pub fn from_entries<I, R, K, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (R, K)>,
        R: AsRef<str>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = entries
            .into_iter()
            .filter_map(|(role, keys)| {
                let role = RoleKey::normalise(role.as_ref())?;
                if role.is_locked() {
                    return None;
                }
                let keys = keys
                    .into_iter()
                    .map(|key| SectionKey::new(key.as_ref().trim()))
                    .collect();
                Some((role, keys))
            })
            .collect();
        Self { table }
    }

    /// Configured table when `access.role_defaults` is set, built-in otherwise.
    pub fn from_config(config: &AccessConfig) -> Self {
        match &config.role_defaults {
            Some(table) => Self::from_entries(table),
            None => Self::builtin(),
        }
    }

    /// Defaults for a role; empty when the role has none.
    pub fn get(&self, role: &RoleKey) -> &[SectionKey] {
        self.table.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over configured roles in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&RoleKey, &[SectionKey])> {
        self.table.iter().map(|(role, keys)| (role, keys.as_slice()))
    }
}
