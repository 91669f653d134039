//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::canonical::AliasTable;
use crate::role::RoleKey;
use crate::section::SectionKey;

/// Storage key under which the session snapshot blob is kept.
pub const SESSION_STORAGE_KEY: &str = "hrms.account";

/// Client-held snapshot of the signed-in account. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSession {
    /// Raw role key as stored by the client.
    pub role: String,
    /// Display name.
    #[serde(default)]
    pub full_name: String,
    /// Optional section hint, possibly in an older alias spelling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_sections: Option<Vec<String>>,
}

impl AccountSession {
    /// Session without a section hint.
    pub fn new(role: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            full_name: full_name.into(),
            allowed_sections: None,
        }
    }

    /// Attach a section hint.
    pub fn with_allowed_sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_sections = Some(sections.into_iter().map(Into::into).collect());
        self
    }

    /// Parse a stored blob; malformed blobs yield `None`.
    pub fn from_blob(blob: &str) -> Option<Self> {
        match serde_json::from_str(blob) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(error = %err, "discarding malformed session snapshot");
                None
            }
        }
    }

    /// Serialise for storage.
    pub fn to_blob(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Normalised role key, if any.
    pub fn role_key(&self) -> Option<RoleKey> {
        RoleKey::normalise(&self.role)
    }

    /// Canonicalized section hint; `None` when absent or empty after canonicalization.
    pub fn account_override(&self, aliases: &AliasTable) -> Option<Vec<SectionKey>> {
        let keys = aliases.canonicalize_keys(self.allowed_sections.as_deref()?);
        (!keys.is_empty()).then_some(keys)
    }
}

/// Key-value storage holding the session snapshot blob.
pub trait SessionStorage: Send + Sync {
    /// Read a stored value.
    fn get(&self, key: &str) -> Option<String>;
    /// Write a value.
    fn set(&self, key: &str, value: String);
    /// Remove a value.
    fn remove(&self, key: &str);

    /// Read the session snapshot under [`SESSION_STORAGE_KEY`].
    fn load_session(&self) -> Option<AccountSession> {
        self.get(SESSION_STORAGE_KEY)
            .and_then(|blob| AccountSession::from_blob(&blob))
    }

    /// Persist the session snapshot.
    fn save_session(&self, session: &AccountSession) -> serde_json::Result<()> {
        self.set(SESSION_STORAGE_KEY, session.to_blob()?);
        Ok(())
    }

    /// Drop the session snapshot (logout).
    fn clear_session(&self) {
        self.remove(SESSION_STORAGE_KEY);
    }
}

/// In-process [`SessionStorage`].
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySessionStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.write().insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}
