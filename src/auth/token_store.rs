use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const TMP_EXTENSION: &str = "json.tmp";

/// Access/refresh token pair as returned by `POST /token/`.
///
/// Both tokens are replaced together on login; only `access` is swapped on a
/// silent refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Durable storage for the token pair, a single JSON file under the state
/// directory. Plaintext at rest, matching the backend's expectations.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the persisted pair, or `None` when nobody is logged in.
    pub fn load(&self) -> Result<Option<TokenPair>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading token file {}", self.path.display()))
            }
        };
        let pair: TokenPair = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing token file {}", self.path.display()))?;
        Ok(Some(pair))
    }

    pub fn save(&self, pair: &TokenPair) -> Result<()> {
        let json = serde_json::to_vec_pretty(pair).context("serialising token pair")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("ensuring token dir {}", parent.display()))?;
        }
        let tmp_path = self.path.with_extension(TMP_EXTENSION);
        fs::write(&tmp_path, &json)
            .with_context(|| format!("writing temporary token file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("persisting token file {}", self.path.display()))?;
        Ok(())
    }

    /// Removes the persisted pair. Idempotent.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("removing token file {}", self.path.display()))
            }
        }
    }
}
