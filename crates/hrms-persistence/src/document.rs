//! ---
//! hrms_section: "03-persistence"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Storage backends for catalog, roles and role grants."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
//! Single JSON document store.
//!
//! The document is wrapped in an envelope carrying a SHA-256 hash of the
//! payload as written, before any normalisation applied on load. Writes go to a sibling temporary file which is then renamed over
//! the original, so readers never observe a partial document.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hrms_access::{Role, RoleAccessMap, RoleKey, SectionCatalog, SectionKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::store::{AccessDocument, AccessStore};
use crate::{PersistenceError, Result};

/// Current document envelope version.
pub const DOCUMENT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentEnvelope {
    version: u16,
    updated_at: DateTime<Utc>,
    hash: String,
    document: serde_json::Value,
}

/// Store persisted as one JSON file.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Store at `path`; the file is not touched until first use.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `path`, writing the built-in document when the file is missing.
    pub fn open_or_seed(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self::open(path);
        if !store.path.exists() {
            info!(path = %store.path.display(), "seeding access document");
            store.save(&AccessDocument::fallback())?;
        }
        Ok(store)
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and verify the document.
    pub fn load(&self) -> Result<AccessDocument> {
        let bytes = fs::read(&self.path)?;
        let envelope: DocumentEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != DOCUMENT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(envelope.version));
        }
        if compute_hash(&envelope.document)? != envelope.hash {
            return Err(PersistenceError::HashMismatch);
        }
        let document: AccessDocument = serde_json::from_value(envelope.document)?;
        Ok(document.without_locked_grants())
    }

    /// Replace the document atomically.
    pub fn save(&self, document: &AccessDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_value(document)?;
        let envelope = DocumentEnvelope {
            version: DOCUMENT_VERSION,
            updated_at: Utc::now(),
            hash: compute_hash(&payload)?,
            document: payload,
        };

        let staging = self.staging_path();
        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            writer.write_all(&serde_json::to_vec_pretty(&envelope)?)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), "access document written");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl AccessStore for DocumentStore {
    fn catalog(&self) -> Result<SectionCatalog> {
        Ok(self.load()?.catalog)
    }

    fn roles(&self) -> Result<Vec<Role>> {
        Ok(self.load()?.roles)
    }

    fn role_access(&self) -> Result<RoleAccessMap> {
        Ok(self.load()?.role_access)
    }

    fn replace_role_access(
        &self,
        role: &RoleKey,
        sections: &[SectionKey],
    ) -> Result<Option<Vec<SectionKey>>> {
        let _guard = self.write_lock.lock();
        let mut document = self.load()?;
        let previous = document.replace(role, sections)?;
        self.save(&document)?;
        Ok(previous)
    }
}

fn compute_hash(document: &serde_json::Value) -> Result<String> {
    let serialized = serde_json::to_vec(document)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn seeded_document_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("access.json");
        let store = DocumentStore::open_or_seed(&path).unwrap();
        assert_eq!(store.load().unwrap(), AccessDocument::fallback());
        assert!(!store.staging_path().exists());
    }

    #[test]
    fn grants_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.json");
        let role = RoleKey::normalise("MANAGER").unwrap();
        DocumentStore::open_or_seed(&path)
            .unwrap()
            .replace_role_access(&role, &[SectionKey::new("reports")])
            .unwrap();

        let reopened = DocumentStore::open(&path);
        assert_eq!(
            reopened.role_access().unwrap()[&role],
            vec![SectionKey::new("reports")]
        );
    }

    #[test]
    fn tampered_document_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.json");
        DocumentStore::open_or_seed(&path).unwrap();

        let mut envelope: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        envelope["document"]["roleAccess"] = serde_json::json!({"EMPLOYEE": ["settings"]});
        fs::write(&path, serde_json::to_vec_pretty(&envelope).unwrap()).unwrap();

        assert!(matches!(
            DocumentStore::open(&path).load(),
            Err(PersistenceError::HashMismatch)
        ));
    }

    #[test]
    fn stored_locked_flag_does_not_break_verification() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("access.json"));
        let mut document = AccessDocument::fallback();
        let manager = document
            .roles
            .iter_mut()
            .find(|role| role.key.as_str() == "MANAGER")
            .unwrap();
        manager.locked = true;
        store.save(&document).unwrap();

        let loaded = store.load().unwrap();
        let manager = loaded
            .roles
            .iter()
            .find(|role| role.key.as_str() == "MANAGER")
            .unwrap();
        assert!(!manager.locked);
    }

    #[test]
    fn missing_document_is_an_io_error() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("absent.json"));
        assert!(matches!(store.catalog(), Err(PersistenceError::Io(_))));
    }
}
