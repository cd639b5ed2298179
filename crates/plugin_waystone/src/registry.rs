//! Server-wide locations: the spawn point and the named warps, kept inside
//! the plugin config document.

use tracing::{error, info};
use waystone_events::ConfigStore;

use crate::error::PersistError;
use crate::types::{Location, PluginConfig};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationRegistry {
    config: PluginConfig,
}

impl LocationRegistry {
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn set_spawn(&mut self, location: Location) {
        self.config.spawn_location = Some(location);
    }

    pub fn spawn(&self) -> Option<Location> {
        self.config.spawn_location
    }

    pub fn set_warp(&mut self, name: &str, location: Location) {
        self.config.warp_locations.insert(name, location);
    }

    pub fn delete_warp(&mut self, name: &str) -> bool {
        self.config.warp_locations.remove(name)
    }

    pub fn warp(&self, name: &str) -> Option<Location> {
        self.config.warp_locations.get(name)
    }

    pub fn list_warps(&self) -> impl Iterator<Item = (&str, &Location)> + '_ {
        self.config.warp_locations.iter()
    }

    pub fn save(&self, store: &dyn ConfigStore, path: &str) -> Result<(), PersistError> {
        let json =
            serde_json::to_string_pretty(&self.config).map_err(|source| PersistError::Serialize {
                path: path.to_string(),
                source,
            })?;
        store.store_raw(path, &json)?;
        Ok(())
    }

    /// Reads the config from `path`, writing the defaults when nothing is
    /// stored yet.
    pub fn load(store: &dyn ConfigStore, path: &str) -> Result<Self, PersistError> {
        let Some(json) = store.load_raw(path)? else {
            info!("📂 No plugin config at {}, writing defaults", path);
            let registry = Self::default();
            if let Err(e) = registry.save(store, path) {
                error!("❌ Failed to write default plugin config: {}", e);
            }
            return Ok(registry);
        };

        let config: PluginConfig =
            serde_json::from_str(&json).map_err(|source| PersistError::Parse {
                path: path.to_string(),
                source,
            })?;

        info!(
            "📂 Loaded plugin config from {} ({} warps)",
            path,
            config.warp_locations.len()
        );
        Ok(Self { config })
    }
}
