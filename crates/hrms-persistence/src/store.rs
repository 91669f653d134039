//! ---
//! hrms_section: "03-persistence"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Storage backends for catalog, roles and role grants."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use hrms_access::{Role, RoleAccessMap, RoleKey, SectionCatalog, SectionKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{PersistenceError, Result};

/// Everything a store persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDocument {
    /// Section catalog.
    #[serde(default)]
    pub catalog: SectionCatalog,
    /// Administered roles.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Stored grants per non-locked role.
    #[serde(default)]
    pub role_access: RoleAccessMap,
}

impl AccessDocument {
    /// Built-in catalog and roles with no stored grants.
    pub fn fallback() -> Self {
        Self {
            catalog: SectionCatalog::fallback(),
            roles: Role::fallback_roles(),
            role_access: RoleAccessMap::new(),
        }
    }

    /// Drop any grants stored for locked roles.
    pub fn without_locked_grants(mut self) -> Self {
        self.role_access.retain(|role, _| {
            if role.is_locked() {
                warn!(role = %role, "ignoring stored grant for locked role");
                false
            } else {
                true
            }
        });
        self
    }

    /// Replace the grant for `role`, returning the previous one.
    pub fn replace(
        &mut self,
        role: &RoleKey,
        sections: &[SectionKey],
    ) -> Result<Option<Vec<SectionKey>>> {
        if role.is_locked() {
            return Err(PersistenceError::LockedRole(role.to_string()));
        }
        Ok(self.role_access.insert(role.clone(), sections.to_vec()))
    }
}

/// Source of the catalog, roles and stored grants.
pub trait AccessStore: Send + Sync {
    /// Section catalog.
    fn catalog(&self) -> Result<SectionCatalog>;
    /// Administered roles.
    fn roles(&self) -> Result<Vec<Role>>;
    /// Stored grants; never contains locked roles.
    fn role_access(&self) -> Result<RoleAccessMap>;
    /// Replace the stored grant for `role`, returning the previous one.
    fn replace_role_access(
        &self,
        role: &RoleKey,
        sections: &[SectionKey],
    ) -> Result<Option<Vec<SectionKey>>>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RwLock<AccessDocument>,
}

impl MemoryStore {
    /// Store holding `document`.
    pub fn new(document: AccessDocument) -> Self {
        Self {
            document: RwLock::new(document.without_locked_grants()),
        }
    }

    /// Store seeded with the built-in catalog and roles.
    pub fn seeded() -> Self {
        Self::new(AccessDocument::fallback())
    }

    /// Copy of the current document.
    pub fn snapshot(&self) -> AccessDocument {
        self.document.read().clone()
    }
}

impl AccessStore for MemoryStore {
    fn catalog(&self) -> Result<SectionCatalog> {
        Ok(self.document.read().catalog.clone())
    }

    fn roles(&self) -> Result<Vec<Role>> {
        Ok(self.document.read().roles.clone())
    }

    fn role_access(&self) -> Result<RoleAccessMap> {
        Ok(self.document.read().role_access.clone())
    }

    fn replace_role_access(
        &self,
        role: &RoleKey,
        sections: &[SectionKey],
    ) -> Result<Option<Vec<SectionKey>>> {
        self.document.write().replace(role, sections)
    }
}
