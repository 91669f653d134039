//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
//! Navigation gating for the application shell.
//!
//! The gate collects its three dependencies (section catalog, stored role
//! grants, session snapshot) as they arrive in any order and re-resolves
//! access after each one. Fetch failures substitute built-in data instead of
//! blocking the shell.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::canonical::AliasTable;
use crate::resolver::{resolve, ResolveInput, ResolvedAccess, ResolverPolicy};
use crate::role::{RoleAccessMap, RoleDefaults};
use crate::section::{AppSection, SectionCatalog, SectionKey};
use crate::session::AccountSession;

/// One entry of the navigation menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Section key.
    pub key: SectionKey,
    /// Display label.
    pub label: String,
    /// Route path.
    pub path: String,
}

impl From<&AppSection> for MenuItem {
    fn from(section: &AppSection) -> Self {
        Self {
            key: section.key.clone(),
            label: section.label.clone(),
            path: section.path.clone(),
        }
    }
}

/// Lifecycle of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// At least one dependency has not arrived yet.
    Loading,
    /// Access has been resolved from the current dependencies.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Catalog,
    Overrides,
}

/// Identifies one in-flight fetch; results carrying an outdated ticket are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    resource: Resource,
    generation: u64,
}

/// Result of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The active section changed.
    Navigated,
    /// The target is already active.
    AlreadyActive,
    /// The target is not in the resolved set; nothing changed.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionSlot {
    Pending,
    Absent,
    Present(AccountSession),
}

/// Filters the menu and guards navigation using resolved access.
#[derive(Debug, Clone)]
pub struct NavigationGate {
    policy: ResolverPolicy,
    defaults: RoleDefaults,
    aliases: &'static AliasTable,
    catalog: Option<SectionCatalog>,
    overrides: Option<RoleAccessMap>,
    session: SessionSlot,
    catalog_generation: u64,
    overrides_generation: u64,
    active: Option<SectionKey>,
    resolved: Option<ResolvedAccess>,
}

impl NavigationGate {
    /// Gate in the `Loading` state with no dependencies yet.
    pub fn new(policy: ResolverPolicy, defaults: RoleDefaults) -> Self {
        Self {
            policy,
            defaults,
            aliases: AliasTable::standard(),
            catalog: None,
            overrides: None,
            session: SessionSlot::Pending,
            catalog_generation: 0,
            overrides_generation: 0,
            active: None,
            resolved: None,
        }
    }

    /// Use a different alias table.
    pub fn with_aliases(mut self, aliases: &'static AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GateState {
        if self.resolved.is_some() {
            GateState::Ready
        } else {
            GateState::Loading
        }
    }

    /// Resolved access, once ready.
    pub fn resolved(&self) -> Option<&ResolvedAccess> {
        self.resolved.as_ref()
    }

    /// Catalog in use, once it has arrived.
    pub fn catalog(&self) -> Option<&SectionCatalog> {
        self.catalog.as_ref()
    }

    /// Currently rendered section.
    pub fn active_section(&self) -> Option<&SectionKey> {
        self.active.as_ref()
    }

    /// Start a catalog fetch, superseding any earlier one.
    pub fn begin_catalog_fetch(&mut self) -> FetchTicket {
        self.catalog_generation += 1;
        FetchTicket {
            resource: Resource::Catalog,
            generation: self.catalog_generation,
        }
    }

    /// Start a role-grant fetch, superseding any earlier one.
    pub fn begin_overrides_fetch(&mut self) -> FetchTicket {
        self.overrides_generation += 1;
        FetchTicket {
            resource: Resource::Overrides,
            generation: self.overrides_generation,
        }
    }

    /// Apply a catalog fetch result. Returns `false` when the ticket is stale.
    pub fn apply_catalog<E: fmt::Display>(
        &mut self,
        ticket: FetchTicket,
        result: Result<SectionCatalog, E>,
    ) -> bool {
        if !self.is_current(ticket, Resource::Catalog) {
            debug!(generation = ticket.generation, "ignoring superseded catalog response");
            return false;
        }
        let catalog = match result {
            Ok(catalog) if !catalog.is_empty() => catalog,
            Ok(_) => {
                warn!("catalog fetch returned no sections; using built-in catalog");
                SectionCatalog::fallback()
            }
            Err(err) => {
                warn!(error = %err, "catalog fetch failed; using built-in catalog");
                SectionCatalog::fallback()
            }
        };
        self.catalog = Some(catalog);
        self.recompute();
        true
    }

    /// Apply a role-grant fetch result. Returns `false` when the ticket is stale.
    pub fn apply_overrides<E: fmt::Display>(
        &mut self,
        ticket: FetchTicket,
        result: Result<RoleAccessMap, E>,
    ) -> bool {
        if !self.is_current(ticket, Resource::Overrides) {
            debug!(generation = ticket.generation, "ignoring superseded role grant response");
            return false;
        }
        let overrides = result.unwrap_or_else(|err| {
            warn!(error = %err, "role grant fetch failed; continuing without stored grants");
            RoleAccessMap::new()
        });
        self.overrides = Some(overrides);
        self.recompute();
        true
    }

    /// Apply the session snapshot read from client storage. A missing
    /// snapshot behaves like [`NavigationGate::logout`].
    pub fn apply_session(&mut self, session: Option<AccountSession>) {
        match session {
            Some(session) => {
                self.session = SessionSlot::Present(session);
                self.recompute();
            }
            None => self.logout(),
        }
    }

    /// Drop the session; nothing stays reachable.
    pub fn logout(&mut self) {
        self.session = SessionSlot::Absent;
        self.active = None;
        self.recompute();
    }

    /// Record the section rendered at mount, before any access check.
    pub fn mount_at(&mut self, key: &str) {
        self.active = self.aliases.canonicalize_key(key);
    }

    /// Whether navigation to `key` would be accepted.
    pub fn is_reachable(&self, key: &str) -> bool {
        let Some(key) = self.aliases.canonicalize_key(key) else {
            return false;
        };
        if self.is_active(&key) {
            return true;
        }
        self.resolved
            .as_ref()
            .is_some_and(|access| access.contains(key.as_str()))
    }

    /// Menu items the session may see, in catalog order. Empty while loading.
    pub fn menu(&self) -> Vec<MenuItem> {
        let (Some(catalog), Some(access)) = (&self.catalog, &self.resolved) else {
            return Vec::new();
        };
        catalog
            .iter()
            .filter(|section| access.contains(section.key.as_str()) || self.is_active(&section.key))
            .map(MenuItem::from)
            .collect()
    }

    /// Move to `key` if it is reachable.
    pub fn navigate(&mut self, key: &str) -> NavigationOutcome {
        let Some(target) = self.aliases.canonicalize_key(key) else {
            return NavigationOutcome::Rejected;
        };
        if self.is_active(&target) {
            return NavigationOutcome::AlreadyActive;
        }
        if !self.is_reachable(target.as_str()) {
            debug!(section = %target, "navigation rejected");
            return NavigationOutcome::Rejected;
        }
        let target = self
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.get(target.as_str()))
            .map(|section| section.key.clone())
            .unwrap_or(target);
        self.active = Some(target);
        NavigationOutcome::Navigated
    }

    fn is_current(&self, ticket: FetchTicket, resource: Resource) -> bool {
        let current = match resource {
            Resource::Catalog => self.catalog_generation,
            Resource::Overrides => self.overrides_generation,
        };
        ticket.resource == resource && ticket.generation == current
    }

    fn is_active(&self, key: &SectionKey) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.folded() == key.folded())
    }

    fn recompute(&mut self) {
        let (Some(catalog), Some(overrides)) = (&self.catalog, &self.overrides) else {
            return;
        };
        let was_loading = self.resolved.is_none();
        let resolved = match &self.session {
            SessionSlot::Pending => return,
            SessionSlot::Absent => ResolvedAccess::none(),
            SessionSlot::Present(session) => {
                let hint = session.account_override(self.aliases);
                resolve(
                    &ResolveInput {
                        role: &session.role,
                        account_override: hint.as_deref(),
                        server_overrides: overrides,
                        defaults: &self.defaults,
                        catalog,
                        aliases: self.aliases,
                    },
                    &self.policy,
                )
            }
        };
        if was_loading {
            info!(
                source = resolved.source.as_str(),
                allowed = resolved.len(),
                "navigation ready"
            );
        }
        self.resolved = Some(resolved);
    }
}
