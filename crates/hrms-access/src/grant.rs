//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canonical::AliasTable;
use crate::role::{Role, RoleAccessMap, RoleDefaults, RoleKey};
use crate::section::{SectionCatalog, SectionKey};

/// Raw body of a grant update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    /// Target role key.
    #[serde(default)]
    pub role: Option<String>,
    /// Requested section keys, possibly in alias spellings.
    #[serde(default)]
    pub sections: Option<Vec<String>>,
}

impl GrantRequest {
    /// Convenience constructor.
    pub fn new<I, S>(role: impl Into<String>, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role: Some(role.into()),
            sections: Some(sections.into_iter().map(Into::into).collect()),
        }
    }
}

/// Validated grant ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecord {
    /// Normalised role key.
    pub role: RoleKey,
    /// Canonical catalog keys in request order.
    pub sections: Vec<SectionKey>,
}

/// Reasons a grant update is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantError {
    /// No role key supplied.
    #[error("role is required")]
    MissingRole,
    /// No section keys supplied.
    #[error("at least one section is required")]
    EmptySections,
    /// None of the supplied keys name a catalog section.
    #[error("no recognised sections in request")]
    NoRecognisedSections,
    /// ADMIN and DIRECTOR cannot be restricted.
    #[error("role {0} always has full access and cannot be changed")]
    LockedRole(RoleKey),
    /// The role is not administered.
    #[error("unknown role {0}")]
    UnknownRole(RoleKey),
}

impl GrantError {
    /// Stable label used in metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            GrantError::MissingRole => "missing-role",
            GrantError::EmptySections => "empty-sections",
            GrantError::NoRecognisedSections => "no-recognised-sections",
            GrantError::LockedRole(_) => "locked-role",
            GrantError::UnknownRole(_) => "unknown-role",
        }
    }
}

/// Validate a grant update against the known roles and the catalog.
pub fn prepare_grant(
    request: &GrantRequest,
    catalog: &SectionCatalog,
    roles: &[Role],
    aliases: &AliasTable,
) -> Result<GrantRecord, GrantError> {
    let role = request
        .role
        .as_deref()
        .and_then(RoleKey::normalise)
        .ok_or(GrantError::MissingRole)?;
    if role.is_locked() {
        return Err(GrantError::LockedRole(role));
    }
    if !roles.iter().any(|known| known.key == role) {
        return Err(GrantError::UnknownRole(role));
    }
    let raw = match request.sections.as_deref() {
        Some(raw) if raw.iter().any(|key| !key.trim().is_empty()) => raw,
        _ => return Err(GrantError::EmptySections),
    };
    let sections = catalog.sanitize(raw, aliases);
    if sections.is_empty() {
        return Err(GrantError::NoRecognisedSections);
    }
    Ok(GrantRecord { role, sections })
}

/// Per-role section lists as shown to administrators.
///
/// Locked roles list the whole catalog. A role with a non-empty stored grant
/// lists that grant sanitized against the catalog, even when nothing
/// survives; the resolver honours the same entry. Only roles without a
/// stored grant fall back to their defaults.
pub fn role_access_view(
    catalog: &SectionCatalog,
    roles: &[Role],
    stored: &RoleAccessMap,
    defaults: &RoleDefaults,
    aliases: &AliasTable,
) -> IndexMap<RoleKey, Vec<SectionKey>> {
    roles
        .iter()
        .map(|role| {
            let sections = if role.is_locked() {
                catalog.keys()
            } else {
                match stored.get(&role.key).filter(|keys| !keys.is_empty()) {
                    Some(granted) => catalog.sanitize(granted, aliases),
                    None => catalog.sanitize(defaults.get(&role.key), aliases),
                }
            };
            (role.key.clone(), sections)
        })
        .collect()
}
