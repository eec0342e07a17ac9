use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::bridge::UserDescriptor;
use super::AuthSource;

/// Last-resolved minimal identity, persisted to cut perceived latency on
/// the next load. Never authoritative: always re-validated by a fresh
/// resolution before anything trusts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub user: UserDescriptor,
    pub source: AuthSource,
    /// Stable client identifier, kept across re-saves.
    pub client_id: String,
    pub saved_at_millis: u64,
}

/// One namespaced JSON file in the platform data directory.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn open() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "lapidary")
            .context("no platform data directory available")?;
        let dir = dirs.data_dir();
        fs::create_dir_all(dir)
            .with_context(|| format!("creating data dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join("identity.json"),
        })
    }

    /// Store backed by an explicit file, for tests.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Option<StoredIdentity> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable persisted identity");
                None
            }
        }
    }

    pub fn save(
        &self,
        user: &UserDescriptor,
        source: AuthSource,
        now_millis: u64,
    ) -> Result<()> {
        // Keep the client id stable across re-saves.
        let client_id = self
            .load()
            .map(|existing| existing.client_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let identity = StoredIdentity {
            user: user.clone(),
            source,
            client_id,
            saved_at_millis: now_millis,
        };
        let raw = serde_json::to_string_pretty(&identity)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    pub fn clear(&self) {
        if self.path.exists() {
            if let Err(err) = fs::remove_file(&self.path) {
                tracing::warn!(error = %err, "failed to clear persisted identity");
            }
        }
    }
}
