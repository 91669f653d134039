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

use hrms_access::{
    prepare_grant, role_access_view, AccessMetrics, AliasTable, GrantRequest, RoleDefaults,
    RoleKey, SectionKey,
};
use hrms_common::config::{StoreConfig, StoreKind};
use hrms_persistence::{open_store, AccessStore, DocumentStore, FallbackStore, PersistenceError};
use prometheus::Registry;
use tempfile::tempdir;

#[test]
fn grant_round_trip_through_document_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.json");
    let store = DocumentStore::open_or_seed(&path).unwrap();

    let request = GrantRequest::new("hr", ["employees", "timekeeping", "employeeInfo"]);
    let grant = prepare_grant(
        &request,
        &store.catalog().unwrap(),
        &store.roles().unwrap(),
        AliasTable::standard(),
    )
    .unwrap();
    store
        .replace_role_access(&grant.role, &grant.sections)
        .unwrap();

    let reopened = DocumentStore::open(&path);
    let view = role_access_view(
        &reopened.catalog().unwrap(),
        &reopened.roles().unwrap(),
        &reopened.role_access().unwrap(),
        &RoleDefaults::builtin(),
        AliasTable::standard(),
    );
    assert_eq!(
        view[&RoleKey::normalise("HR").unwrap()],
        vec![SectionKey::new("employees"), SectionKey::new("attendance")]
    );
    assert_eq!(view[&RoleKey::normalise("ADMIN").unwrap()].len(), 12);
}

#[test]
fn corrupt_primary_falls_back_to_secondary_document() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let primary = dir.path().join("primary.json");
    let secondary = dir.path().join("secondary.json");
    std::fs::write(&primary, b"{ not json")?;

    let backup = DocumentStore::open_or_seed(&secondary)?;
    backup.replace_role_access(
        &RoleKey::normalise("MANAGER").unwrap(),
        &[SectionKey::new("reports")],
    )?;

    let metrics = AccessMetrics::new(Arc::new(Registry::new()))?;
    let store = open_store(
        &StoreConfig {
            kind: StoreKind::Document,
            path: Some(primary.clone()),
            fallback_path: Some(secondary),
        },
        Some(metrics.clone()),
    )?;

    let grants = store.role_access()?;
    assert_eq!(
        grants[&RoleKey::normalise("MANAGER").unwrap()],
        vec![SectionKey::new("reports")]
    );
    assert_eq!(metrics.catalog_fallbacks(), 1);

    let err = store
        .replace_role_access(&RoleKey::normalise("HR").unwrap(), &[SectionKey::new("overview")])
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Json(_)));
    Ok(())
}

#[test]
fn locked_role_writes_are_refused_end_to_end() {
    let dir = tempdir().unwrap();
    let store = FallbackStore::new(Arc::new(
        DocumentStore::open_or_seed(dir.path().join("access.json")).unwrap(),
    ));
    let err = store
        .replace_role_access(&RoleKey::normalise("ADMIN").unwrap(), &[SectionKey::new("overview")])
        .unwrap_err();
    assert!(matches!(err, PersistenceError::LockedRole(_)));
    assert!(store.role_access().unwrap().is_empty());
}
