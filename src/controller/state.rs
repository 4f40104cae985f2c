use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::forecast::sources::LiveState;

/// Where a cycle gets its live sensor readings from.
#[async_trait]
pub trait StateProvider: Send + Sync {
    async fn load(&self) -> Result<LiveState>;
}

/// Reads the live state from a JSON file on every call.
///
/// A missing file yields an empty state, so networks driven only by
/// constants run without one.
#[derive(Debug, Clone)]
pub struct FileStateProvider {
    path: PathBuf,
}

impl FileStateProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateProvider for FileStateProvider {
    async fn load(&self) -> Result<LiveState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, using empty state");
                return Ok(LiveState::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading state from {}", self.path.display()))
            }
        };
        let state: LiveState = serde_json::from_str(&raw)
            .with_context(|| format!("parsing state from {}", self.path.display()))?;
        debug!(sensors = state.len(), "live state loaded");
        Ok(state)
    }
}

/// Fixed state, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticState(pub LiveState);

#[async_trait]
impl StateProvider for StaticState {
    async fn load(&self) -> Result<LiveState> {
        Ok(self.0.clone())
    }
}
