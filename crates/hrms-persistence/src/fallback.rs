//! ---
//! hrms_section: "03-persistence"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Storage backends for catalog, roles and role grants."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use std::sync::Arc;

use hrms_access::{AccessMetrics, Role, RoleAccessMap, RoleKey, SectionCatalog, SectionKey};
use tracing::warn;

use crate::store::AccessStore;
use crate::Result;

/// Reads from a primary store, then an optional secondary, then built-in data.
///
/// Writes only ever reach the primary.
#[derive(Clone)]
pub struct FallbackStore {
    primary: Arc<dyn AccessStore>,
    secondary: Option<Arc<dyn AccessStore>>,
    metrics: Option<AccessMetrics>,
}

impl FallbackStore {
    /// Wrap `primary`.
    pub fn new(primary: Arc<dyn AccessStore>) -> Self {
        Self {
            primary,
            secondary: None,
            metrics: None,
        }
    }

    /// Consult `secondary` when the primary read fails.
    pub fn with_secondary(mut self, secondary: Arc<dyn AccessStore>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Count fallback reads.
    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn read<T>(
        &self,
        what: &'static str,
        fetch: impl Fn(&dyn AccessStore) -> Result<T>,
        usable: impl Fn(&T) -> bool,
        builtin: impl FnOnce() -> T,
    ) -> T {
        match fetch(self.primary.as_ref()) {
            Ok(value) if usable(&value) => return value,
            Ok(_) => warn!(what, "primary store returned nothing usable"),
            Err(err) => warn!(what, error = %err, "primary store read failed"),
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_catalog_fallback();
        }
        if let Some(secondary) = &self.secondary {
            match fetch(secondary.as_ref()) {
                Ok(value) if usable(&value) => return value,
                Ok(_) => warn!(what, "secondary store returned nothing usable"),
                Err(err) => warn!(what, error = %err, "secondary store read failed"),
            }
        }
        warn!(what, "serving built-in data");
        builtin()
    }
}

impl AccessStore for FallbackStore {
    fn catalog(&self) -> Result<SectionCatalog> {
        Ok(self.read(
            "catalog",
            |store| store.catalog(),
            |catalog| !catalog.is_empty(),
            SectionCatalog::fallback,
        ))
    }

    fn roles(&self) -> Result<Vec<Role>> {
        Ok(self.read(
            "roles",
            |store| store.roles(),
            |roles| !roles.is_empty(),
            Role::fallback_roles,
        ))
    }

    fn role_access(&self) -> Result<RoleAccessMap> {
        Ok(self.read(
            "role_access",
            |store| store.role_access(),
            |_| true,
            RoleAccessMap::new,
        ))
    }

    fn replace_role_access(
        &self,
        role: &RoleKey,
        sections: &[SectionKey],
    ) -> Result<Option<Vec<SectionKey>>> {
        self.primary.replace_role_access(role, sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccessDocument, MemoryStore};
    use crate::PersistenceError;
    use hrms_access::AppSection;
    use prometheus::Registry;

    struct Offline;

    impl AccessStore for Offline {
        fn catalog(&self) -> Result<SectionCatalog> {
            Err(PersistenceError::Unavailable("offline".into()))
        }

        fn roles(&self) -> Result<Vec<Role>> {
            Err(PersistenceError::Unavailable("offline".into()))
        }

        fn role_access(&self) -> Result<RoleAccessMap> {
            Err(PersistenceError::Unavailable("offline".into()))
        }

        fn replace_role_access(
            &self,
            _role: &RoleKey,
            _sections: &[SectionKey],
        ) -> Result<Option<Vec<SectionKey>>> {
            Err(PersistenceError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn offline_primary_serves_builtin_data() {
        let metrics = AccessMetrics::new(Arc::new(Registry::new())).unwrap();
        let store = FallbackStore::new(Arc::new(Offline)).with_metrics(metrics.clone());
        assert_eq!(store.catalog().unwrap(), SectionCatalog::fallback());
        assert_eq!(store.roles().unwrap(), Role::fallback_roles());
        assert!(store.role_access().unwrap().is_empty());
        assert_eq!(metrics.catalog_fallbacks(), 3);
    }

    #[test]
    fn secondary_is_consulted_before_builtin() {
        let mut document = AccessDocument::fallback();
        document.catalog = SectionCatalog::new([AppSection::new("overview", "Overview", "/")]);
        let store =
            FallbackStore::new(Arc::new(Offline)).with_secondary(Arc::new(MemoryStore::new(document)));
        assert_eq!(store.catalog().unwrap().len(), 1);
    }

    #[test]
    fn empty_primary_catalog_falls_back() {
        let store = FallbackStore::new(Arc::new(MemoryStore::new(AccessDocument::default())));
        assert_eq!(store.catalog().unwrap(), SectionCatalog::fallback());
    }

    #[test]
    fn writes_only_reach_the_primary() {
        let secondary = Arc::new(MemoryStore::seeded());
        let store = FallbackStore::new(Arc::new(Offline)).with_secondary(secondary.clone());
        let role = RoleKey::normalise("HR").unwrap();
        assert!(store
            .replace_role_access(&role, &[SectionKey::new("overview")])
            .is_err());
        assert!(secondary.role_access().unwrap().is_empty());
    }
}
