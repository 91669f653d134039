//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
//! Access resolution.
//!
//! [`resolve`] is a pure function of its inputs: the caller owns fetching and
//! caching of the catalog, stored grants and session snapshot, and may call it
//! again whenever any of them changes.

use std::collections::HashSet;

use hrms_common::config::AccessConfig;
pub use hrms_common::config::OverridePrecedence;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::canonical::AliasTable;
use crate::role::{RoleAccessMap, RoleDefaults, RoleKey};
use crate::section::{SectionCatalog, SectionKey};

/// Tunables for [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Ordering between stored role grants and session hints.
    pub precedence: OverridePrecedence,
    /// Grant the attendance group when no other source applies.
    pub implicit_attendance: bool,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            precedence: OverridePrecedence::ServerFirst,
            implicit_attendance: true,
        }
    }
}

impl From<&AccessConfig> for ResolverPolicy {
    fn from(config: &AccessConfig) -> Self {
        Self {
            precedence: config.precedence,
            implicit_attendance: config.implicit_attendance,
        }
    }
}

/// Which rule produced a [`ResolvedAccess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessSource {
    /// ADMIN or DIRECTOR: the whole catalog.
    Locked,
    /// Section hint carried on the session snapshot.
    AccountOverride,
    /// Grant stored for the role.
    ServerOverride,
    /// Built-in or configured role default.
    RoleDefault,
    /// Nothing applied; only the implicit attendance group, if enabled.
    Baseline,
}

impl AccessSource {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessSource::Locked => "locked",
            AccessSource::AccountOverride => "account-override",
            AccessSource::ServerOverride => "server-override",
            AccessSource::RoleDefault => "role-default",
            AccessSource::Baseline => "baseline",
        }
    }
}

/// Everything [`resolve`] needs, passed explicitly.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    /// Raw role key; normalised to upper case.
    pub role: &'a str,
    /// Section hint from the session snapshot.
    pub account_override: Option<&'a [SectionKey]>,
    /// Grants stored per role.
    pub server_overrides: &'a RoleAccessMap,
    /// Default sections per role.
    pub defaults: &'a RoleDefaults,
    /// Current section catalog.
    pub catalog: &'a SectionCatalog,
    /// Alias table shared with the canonicalizer.
    pub aliases: &'a AliasTable,
}

/// Final allowed-section set for one role/session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAccess {
    /// Normalised role, absent when the input role was blank.
    pub role: Option<RoleKey>,
    /// Rule that produced the set.
    pub source: AccessSource,
    /// Allowed keys in catalog order.
    pub sections: Vec<SectionKey>,
}

impl ResolvedAccess {
    /// An empty set, used when there is no session at all.
    pub fn none() -> Self {
        Self {
            role: None,
            source: AccessSource::Baseline,
            sections: Vec::new(),
        }
    }

    /// Whether `key` is allowed, ignoring case.
    pub fn contains(&self, key: &str) -> bool {
        let folded = key.trim().to_lowercase();
        self.sections.iter().any(|k| k.folded() == folded)
    }

    /// Allowed keys in catalog order.
    pub fn keys(&self) -> &[SectionKey] {
        &self.sections
    }

    /// Number of allowed keys.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether nothing is allowed.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Canonicalize `keys`, add every member of each umbrella group present, and
/// keep only catalog keys (catalog order).
///
/// Adding an umbrella key can only add keys to the output.
pub fn expand_groups<S: AsRef<str>>(
    keys: &[S],
    catalog: &SectionCatalog,
    aliases: &AliasTable,
) -> Vec<SectionKey> {
    let canonical = aliases.canonicalize_keys(keys);
    let mut folded: HashSet<String> = canonical.iter().map(SectionKey::folded).collect();
    for entry in aliases.entries() {
        if folded.contains(&entry.canonical.to_lowercase()) {
            folded.extend(
                catalog
                    .group_keys(aliases, entry.canonical)
                    .iter()
                    .map(SectionKey::folded),
            );
        }
    }
    catalog.retain_folded(&folded)
}

/// Compute the allowed-section set. Never fails: malformed input narrows the
/// result, except for locked roles which always receive the whole catalog.
pub fn resolve(input: &ResolveInput<'_>, policy: &ResolverPolicy) -> ResolvedAccess {
    let role = RoleKey::normalise(input.role);
    let (source, sections) = select(role.as_ref(), input, policy);
    trace!(
        role = role.as_ref().map(RoleKey::as_str).unwrap_or(""),
        source = source.as_str(),
        allowed = sections.len(),
        "section access resolved"
    );
    ResolvedAccess {
        role,
        source,
        sections,
    }
}

fn select(
    role: Option<&RoleKey>,
    input: &ResolveInput<'_>,
    policy: &ResolverPolicy,
) -> (AccessSource, Vec<SectionKey>) {
    let expand = |keys: &[SectionKey]| expand_groups(keys, input.catalog, input.aliases);

    // Without a role neither the session hint nor any stored grant applies.
    if let Some(role) = role {
        if role.is_locked() {
            return (AccessSource::Locked, expand(input.catalog.keys().as_slice()));
        }

        let account = input
            .account_override
            .filter(|keys| !keys.is_empty())
            .map(|keys| (AccessSource::AccountOverride, keys));
        let server = input
            .server_overrides
            .get(role)
            .filter(|keys| !keys.is_empty())
            .map(|keys| (AccessSource::ServerOverride, keys.as_slice()));

        let chosen = match policy.precedence {
            OverridePrecedence::AccountFirst => account.or(server),
            OverridePrecedence::ServerFirst => server.or(account),
        };
        if let Some((source, keys)) = chosen {
            return (source, expand(keys));
        }

        let defaults = input.defaults.get(role);
        if !defaults.is_empty() {
            return (AccessSource::RoleDefault, expand(defaults));
        }
    }

    let baseline: Vec<SectionKey> = if policy.implicit_attendance {
        vec![SectionKey::new(crate::canonical::ATTENDANCE)]
    } else {
        Vec::new()
    };
    (AccessSource::Baseline, expand(baseline.as_slice()))
}
