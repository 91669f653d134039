//! ---
//! hrms_section: "03-persistence"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Storage backends for catalog, roles and role grants."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
#![warn(missing_docs)]

use std::sync::Arc;

use hrms_access::AccessMetrics;
use hrms_common::config::{StoreConfig, StoreKind};

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Wrapper for IO errors encountered while reading/writing store files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when a document fails integrity verification.
    #[error("document hash mismatch")]
    HashMismatch,
    /// Document written by an incompatible version.
    #[error("unsupported document version {0}")]
    UnsupportedVersion(u16),
    /// Grants for ADMIN and DIRECTOR are never stored.
    #[error("role {0} is locked and cannot hold stored grants")]
    LockedRole(String),
    /// The backing store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub mod document;
pub mod fallback;
pub mod store;

pub use document::{DocumentStore, DOCUMENT_VERSION};
pub use fallback::FallbackStore;
pub use store::{AccessDocument, AccessStore, MemoryStore};

/// Build the store described by `config`.
///
/// Reads always go through a [`FallbackStore`], so a missing or corrupt
/// document degrades to the secondary document and then to built-in data.
pub fn open_store(
    config: &StoreConfig,
    metrics: Option<AccessMetrics>,
) -> Result<Arc<dyn AccessStore>> {
    let primary: Arc<dyn AccessStore> = match (config.kind, &config.path) {
        (StoreKind::Memory, _) => Arc::new(MemoryStore::seeded()),
        (StoreKind::Document, Some(path)) => Arc::new(DocumentStore::open_or_seed(path)?),
        (StoreKind::Document, None) => {
            return Err(PersistenceError::Unavailable(
                "document store configured without a path".into(),
            ))
        }
    };
    let mut store = FallbackStore::new(primary);
    if let Some(path) = &config.fallback_path {
        store = store.with_secondary(Arc::new(DocumentStore::open(path)));
    }
    if let Some(metrics) = metrics {
        store = store.with_metrics(metrics);
    }
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn basic_error_display() {
        let err = PersistenceError::LockedRole("ADMIN".into());
        assert_eq!(
            format!("{err}"),
            "role ADMIN is locked and cannot hold stored grants"
        );
    }

    #[test]
    fn document_config_without_path_is_rejected() {
        let config = StoreConfig {
            kind: StoreKind::Document,
            path: None,
            fallback_path: None,
        };
        assert!(matches!(
            open_store(&config, None),
            Err(PersistenceError::Unavailable(_))
        ));
    }

    #[test]
    fn document_config_seeds_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.json");
        let config = StoreConfig {
            kind: StoreKind::Document,
            path: Some(path.clone()),
            fallback_path: None,
        };
        let store = open_store(&config, None).unwrap();
        assert!(path.exists());
        assert_eq!(store.roles().unwrap().len(), 5);
    }
}
