/// JSON-file registry: `{ "servers": [...], "settings": {...} }` on disk.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
use super::ServerRegistry;
use crate::error::RegistryError;
use crate::model::{ServerProfile, Settings};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "mountify";
const FILE_NAME: &str = "registry.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    servers: Vec<ServerProfile>,
    #[serde(default)]
    settings: Settings,
}

pub struct JsonFileRegistry {
    path: PathBuf,
    /// Serialises this process's read-modify-write of the document.
    lock: Mutex<()>,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Registry at `<config dir>/mountify/registry.json`.
    pub fn open_default() -> Result<Self, RegistryError> {
        let dir = dirs::config_dir().ok_or(RegistryError::NoConfigDir)?;
        Ok(Self::new(dir.join(APP_DIR).join(FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Document, RegistryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Document::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn write(&self, doc: &Document) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let text = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Registry written to {}", self.path.display());
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut Document)) -> Result<(), RegistryError> {
        let _guard = self.lock.lock();
        let mut doc = self.read()?;
        f(&mut doc);
        self.write(&doc)
    }

    fn io_error(&self, source: std::io::Error) -> RegistryError {
        RegistryError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl ServerRegistry for JsonFileRegistry {
    fn servers(&self) -> Result<Vec<ServerProfile>, RegistryError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.servers)
    }

    fn set_servers(&self, servers: &[ServerProfile]) -> Result<(), RegistryError> {
        self.modify(|doc| doc.servers = servers.to_vec())
    }

    fn update_servers(
        &self,
        f: &mut dyn FnMut(&mut Vec<ServerProfile>) -> bool,
    ) -> Result<Vec<ServerProfile>, RegistryError> {
        let _guard = self.lock.lock();
        let mut doc = self.read()?;
        if f(&mut doc.servers) {
            self.write(&doc)?;
        }
        Ok(doc.servers)
    }

    fn settings(&self) -> Result<Settings, RegistryError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.settings)
    }

    fn set_settings(&self, settings: &Settings) -> Result<(), RegistryError> {
        self.modify(|doc| doc.settings = settings.clone())
    }
}
