//! Local persistence for the API key.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error, Result};

pub const API_KEY_STORAGE_KEY: &str = "API_KEY";

/// A small JSON key-value file holding the API key.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored API key, if one has been saved.
    pub fn load(&self) -> Result<Option<String>, Error> {
        let values = self.read()?;
        Ok(values
            .get(API_KEY_STORAGE_KEY)
            .filter(|v| !v.is_empty())
            .cloned())
    }

    pub fn save(&self, api_key: &str) -> Result<(), Error> {
        let mut values = self.read()?;
        values.insert(API_KEY_STORAGE_KEY.to_string(), api_key.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(&values)?;
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        tracing::debug!("Saved API key to {}", self.path.display());
        Ok(())
    }

    fn read(&self) -> Result<BTreeMap<String, String>, Error> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let values: BTreeMap<String, String> = serde_json::from_str(&data)
            .with_context(|| format!("Invalid credentials file {}", self.path.display()))?;
        Ok(values)
    }
}
