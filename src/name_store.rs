//! Remembers the display name between runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;

const NAME_KEY: &str = "player_name";

/// Key-value persistence for client preferences.
pub trait NameStore: Send + Sync {
    fn load_name(&self) -> anyhow::Result<Option<String>>;
    fn save_name(&self, name: &str) -> anyhow::Result<()>;
}

/// Keeps the name in a small JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileNameStore {
    path: PathBuf,
}

impl JsonFileNameStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_all(&self) -> anyhow::Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("malformed name file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }
}

impl NameStore for JsonFileNameStore {
    fn load_name(&self) -> anyhow::Result<Option<String>> {
        Ok(self.read_all()?.remove(NAME_KEY))
    }

    fn save_name(&self, name: &str) -> anyhow::Result<()> {
        let mut values = self.read_all().unwrap_or_default();
        values.insert(NAME_KEY.to_string(), name.to_string());
        let text = serde_json::to_string_pretty(&values)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

/// In-process store, for tests.
#[derive(Debug, Default)]
pub struct MemoryNameStore {
    name: Mutex<Option<String>>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameStore for MemoryNameStore {
    fn load_name(&self) -> anyhow::Result<Option<String>> {
        let name = self
            .name
            .lock()
            .map_err(|_| anyhow::anyhow!("name store lock poisoned"))?;
        Ok(name.clone())
    }

    fn save_name(&self, name: &str) -> anyhow::Result<()> {
        let mut slot = self
            .name
            .lock()
            .map_err(|_| anyhow::anyhow!("name store lock poisoned"))?;
        *slot = Some(name.to_string());
        Ok(())
    }
}
