//! Venue and state files.
//!
//! The venue file is TOML and deserializes straight into `VenueContext`.
//! The state file is a JSON snapshot of the in-memory store; it is read
//! before a command and written back after a successful one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use revassign_engine::config::VenueContext;
use revassign_engine::store::InMemoryStore;
use tracing::debug;

use crate::error::CliError;

/// Loads the venue context from a TOML file.
pub fn load_venue(path: &Path) -> Result<VenueContext> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read venue file {:?}", path))?;
    parse_venue(path, &contents)
}

fn parse_venue(path: &Path, contents: &str) -> Result<VenueContext> {
    toml::from_str(contents).map_err(|e| {
        CliError::InvalidVenue {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
        .into()
    })
}

/// A loaded state snapshot and where to write it back.
pub struct StateFile {
    path: PathBuf,
    store: Arc<InMemoryStore>,
}

impl StateFile {
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::StateNotFound(path.to_path_buf()).into());
        }
        let store = InMemoryStore::load(path)
            .await
            .with_context(|| format!("Failed to load state from {:?}", path))?;
        debug!(path = %path.display(), "loaded state");
        Ok(Self {
            path: path.to_path_buf(),
            store: Arc::new(store),
        })
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        self.store.clone()
    }

    pub async fn save(&self) -> Result<()> {
        self.store
            .save(&self.path)
            .await
            .with_context(|| format!("Failed to write state to {:?}", self.path))?;
        debug!(path = %self.path.display(), "saved state");
        Ok(())
    }
}
