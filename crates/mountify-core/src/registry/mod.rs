/// Server registry: the persisted profile list and settings.
///
/// Every read-modify-write of the profile list goes through
/// [`ServerRegistry::update_servers`], which holds the backend's lock across
/// the whole cycle. Concurrent updates to different profiles never clobber
/// each other, and a profile deleted in the meantime is not resurrected.
pub mod json;

pub use json::JsonFileRegistry;

use crate::error::RegistryError;
use crate::model::{ServerProfile, Settings};
use parking_lot::RwLock;

/// Storage backend for server profiles and settings.
pub trait ServerRegistry: Send + Sync {
    fn servers(&self) -> Result<Vec<ServerProfile>, RegistryError>;
    fn set_servers(&self, servers: &[ServerProfile]) -> Result<(), RegistryError>;

    /// Apply `f` to the stored list as one serialised read-modify-write.
    ///
    /// `f` returns whether it changed anything; the list is only written
    /// back when it did. Returns the list as stored afterwards. `f` must not
    /// call back into the registry.
    fn update_servers(
        &self,
        f: &mut dyn FnMut(&mut Vec<ServerProfile>) -> bool,
    ) -> Result<Vec<ServerProfile>, RegistryError>;

    fn settings(&self) -> Result<Settings, RegistryError>;
    fn set_settings(&self, settings: &Settings) -> Result<(), RegistryError>;

    fn server(&self, id: &str) -> Result<Option<ServerProfile>, RegistryError> {
        Ok(self.servers()?.into_iter().find(|s| s.id == id))
    }
}

/// Apply `f` to the profile with `id` atomically.
///
/// Returns the full updated list, or `None` when the profile no longer
/// exists (nothing is written in that case).
pub fn update_server<F>(
    registry: &dyn ServerRegistry,
    id: &str,
    f: F,
) -> Result<Option<Vec<ServerProfile>>, RegistryError>
where
    F: FnOnce(&mut ServerProfile),
{
    let mut f = Some(f);
    let mut found = false;
    let servers = registry.update_servers(&mut |servers: &mut Vec<ServerProfile>| {
        match servers.iter_mut().find(|s| s.id == id) {
            Some(profile) => {
                if let Some(f) = f.take() {
                    f(profile);
                }
                found = true;
                true
            }
            None => false,
        }
    })?;
    Ok(found.then_some(servers))
}

/// Volatile registry, used by tests and by embedders that persist elsewhere.
#[derive(Default)]
pub struct InMemoryRegistry {
    servers: RwLock<Vec<ServerProfile>>,
    settings: RwLock<Settings>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(servers: Vec<ServerProfile>) -> Self {
        Self {
            servers: RwLock::new(servers),
            settings: RwLock::new(Settings::default()),
        }
    }
}

impl ServerRegistry for InMemoryRegistry {
    fn servers(&self) -> Result<Vec<ServerProfile>, RegistryError> {
        Ok(self.servers.read().clone())
    }

    fn set_servers(&self, servers: &[ServerProfile]) -> Result<(), RegistryError> {
        *self.servers.write() = servers.to_vec();
        Ok(())
    }

    fn update_servers(
        &self,
        f: &mut dyn FnMut(&mut Vec<ServerProfile>) -> bool,
    ) -> Result<Vec<ServerProfile>, RegistryError> {
        let mut servers = self.servers.write();
        f(&mut servers);
        Ok(servers.clone())
    }

    fn settings(&self) -> Result<Settings, RegistryError> {
        Ok(self.settings.read().clone())
    }

    fn set_settings(&self, settings: &Settings) -> Result<(), RegistryError> {
        *self.settings.write() = settings.clone();
        Ok(())
    }
}
