//! Durable local identity.
//!
//! The node id sent in the identity handshake must survive restarts, so it
//! is persisted as a small JSON document. A missing or corrupt file yields
//! a fresh id; writes go through the atomic temp-then-rename path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::utils::atomic_write::atomic_write;

#[derive(Debug, Serialize, Deserialize)]
struct IdentityFile {
    node_id: String,
}

/// Loads or creates the persisted local node id.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the persisted node id, generating and persisting a new one if
    /// the file is missing, unreadable or does not hold a valid UUID.
    pub fn get_or_create(&self) -> Result<String> {
        if let Ok(raw) = std::fs::read_to_string(&self.path) {
            match serde_json::from_str::<IdentityFile>(&raw) {
                Ok(file) if Uuid::parse_str(&file.node_id).is_ok() => return Ok(file.node_id),
                _ => warn!(
                    event = "identity_file_corrupt",
                    path = %self.path.display(),
                    "Identity file does not hold a UUID, regenerating"
                ),
            }
        }

        let id = Uuid::new_v4().to_string();
        let json = serde_json::to_string_pretty(&IdentityFile {
            node_id: id.clone(),
        })?;
        atomic_write(&self.path, json.as_bytes())
            .with_context(|| format!("persisting identity to {}", self.path.display()))?;
        info!(event = "identity_created", node_id = %id);
        Ok(id)
    }
}
