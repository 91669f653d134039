//! ---
//! hrms_section: "02-access-control"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Section catalog, access resolution and navigation gating."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
//! Hash-chained record of role grant changes.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::grant::GrantRecord;
use crate::role::RoleKey;
use crate::section::SectionKey;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One grant change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// When the change was stored.
    pub timestamp: DateTime<Utc>,
    /// Who requested it.
    pub actor: String,
    /// Role whose grant changed.
    pub role: RoleKey,
    /// Grant before the change; empty when none was stored.
    pub previous: Vec<SectionKey>,
    /// Grant after the change.
    pub sections: Vec<SectionKey>,
    /// SHA-256 over the entry contents and `previous_hash`.
    pub hash: String,
    /// Hash of the preceding entry.
    pub previous_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        timestamp: DateTime<Utc>,
        actor: &str,
        role: &RoleKey,
        previous: &[SectionKey],
        sections: &[SectionKey],
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(actor.as_bytes());
        hasher.update(role.as_str().as_bytes());
        for list in [previous, sections] {
            hasher.update((list.len() as u64).to_be_bytes());
            for key in list {
                hasher.update(key.as_str().as_bytes());
                hasher.update([0]);
            }
        }
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn expected_hash(&self, previous_hash: &str) -> String {
        Self::compute_hash(
            self.timestamp,
            &self.actor,
            &self.role,
            &self.previous,
            &self.sections,
            previous_hash,
        )
    }
}

/// Grant audit log backed by a newline-delimited JSON file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    last_hash: String,
}

impl AuditLog {
    /// Open (or prepare) the log at `path`, loading the head hash from existing entries.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let last_hash = read_entries(&path)?
            .last()
            .map(|entry| entry.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_owned());
        Ok(Self { path, last_hash })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a grant change.
    pub fn record_grant(
        &mut self,
        actor: &str,
        previous: &[SectionKey],
        grant: &GrantRecord,
    ) -> Result<AuditEntry> {
        let timestamp = Utc::now();
        let hash = AuditEntry::compute_hash(
            timestamp,
            actor,
            &grant.role,
            previous,
            &grant.sections,
            &self.last_hash,
        );
        let entry = AuditEntry {
            timestamp,
            actor: actor.to_owned(),
            role: grant.role.clone(),
            previous: previous.to_vec(),
            sections: grant.sections.clone(),
            hash: hash.clone(),
            previous_hash: self.last_hash.clone(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open audit log {}", self.path.display()))?;
        file.write_all(serde_json::to_string(&entry)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        self.last_hash = hash;
        Ok(entry)
    }

    /// All recorded entries, oldest first.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        read_entries(&self.path)
    }

    /// Whether the hash chain is intact.
    pub fn verify(&self) -> Result<bool> {
        let mut previous = GENESIS_HASH.to_owned();
        for entry in read_entries(&self.path)? {
            if entry.previous_hash != previous || entry.expected_hash(&previous) != entry.hash {
                return Ok(false);
            }
            previous = entry.hash;
        }
        Ok(true)
    }
}

fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path)
        .with_context(|| format!("unable to open audit log {}", path.display()))?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}
