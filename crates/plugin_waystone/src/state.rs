//! Shared plugin state.
//!
//! One `WaystoneState` is built when the plugin registers and is shared by
//! the command handlers and event listeners through an `Arc`. Locks are
//! only taken for the duration of a single mutation and never across a
//! storage write.

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use waystone_events::{CommandResult, ConfigStore, PlayerId};

use crate::directory::PlayerDirectory;
use crate::error::PersistError;
use crate::registry::LocationRegistry;
use crate::types::{Location, PluginConfig};

pub const DATA_ROOT: &str = "Waystone";

pub fn player_data_path(world_name: &str) -> String {
    format!("{}/{}/PlayerData.json", DATA_ROOT, world_name)
}

pub fn plugin_config_path() -> String {
    format!("{}/Waystone.json", DATA_ROOT)
}

/// What a caller sees when saving fails after a successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveFailurePolicy {
    /// Log the failure; the command still reports its normal result.
    #[default]
    LogOnly,
    /// Log the failure and turn the command result into an error.
    NotifyCaller,
}

pub struct WaystoneState {
    store: Arc<dyn ConfigStore>,
    policy: SaveFailurePolicy,
    world_name: RwLock<Option<String>>,
    directory: Mutex<PlayerDirectory>,
    registry: Mutex<LocationRegistry>,
    /// Set when the stored document could not be read. It is then never
    /// written until a later load succeeds.
    directory_unreadable: AtomicBool,
    registry_unreadable: AtomicBool,
    /// Pre-teleport positions for `/back`. Never persisted.
    last_locations: DashMap<PlayerId, Location>,
}

impl WaystoneState {
    pub fn new(store: Arc<dyn ConfigStore>, policy: SaveFailurePolicy) -> Self {
        Self {
            store,
            policy,
            world_name: RwLock::new(None),
            directory: Mutex::new(PlayerDirectory::new()),
            registry: Mutex::new(LocationRegistry::default()),
            directory_unreadable: AtomicBool::new(false),
            registry_unreadable: AtomicBool::new(false),
            last_locations: DashMap::new(),
        }
    }

    pub fn policy(&self) -> SaveFailurePolicy {
        self.policy
    }

    pub fn world_name(&self) -> Option<String> {
        self.world_name.read().clone()
    }

    /// Loads both documents for `world_name`. A document that cannot be read
    /// is logged and replaced by an empty one in memory, and the stored copy
    /// is kept out of every later save.
    pub fn load(&self, world_name: &str) {
        *self.world_name.write() = Some(world_name.to_string());

        let directory_path = player_data_path(world_name);
        let directory = match PlayerDirectory::load(self.store.as_ref(), &directory_path) {
            Ok(directory) => {
                self.directory_unreadable.store(false, Ordering::SeqCst);
                directory
            }
            Err(e) => {
                error!("❌ Failed to load player data, it will not be overwritten: {}", e);
                self.directory_unreadable.store(true, Ordering::SeqCst);
                PlayerDirectory::new()
            }
        };

        let registry = match LocationRegistry::load(self.store.as_ref(), &plugin_config_path()) {
            Ok(registry) => {
                self.registry_unreadable.store(false, Ordering::SeqCst);
                registry
            }
            Err(e) => {
                error!("❌ Failed to load plugin config, it will not be overwritten: {}", e);
                self.registry_unreadable.store(true, Ordering::SeqCst);
                LocationRegistry::default()
            }
        };

        *self.directory.lock() = directory;
        *self.registry.lock() = registry;
        info!("🧭 Waystone data loaded for world {}", world_name);
    }

    /// Writes both documents. Both writes are attempted; the first error is
    /// returned. A document that failed to load is skipped.
    pub fn save_all(&self) -> Result<(), PersistError> {
        let Some(world_name) = self.world_name() else {
            warn!("⚠️ Save requested before any world was loaded");
            return Err(PersistError::NotLoaded);
        };

        let directory_path = player_data_path(&world_name);
        let directory_result = if self.directory_unreadable.load(Ordering::SeqCst) {
            Err(PersistError::Unreadable {
                path: directory_path,
            })
        } else {
            let json = self.directory.lock().to_json(&directory_path);
            json.and_then(|json| Ok(self.store.store_raw(&directory_path, &json)?))
        };

        let registry_result = if self.registry_unreadable.load(Ordering::SeqCst) {
            Err(PersistError::Unreadable {
                path: plugin_config_path(),
            })
        } else {
            let registry = self.registry.lock().clone();
            registry.save(self.store.as_ref(), &plugin_config_path())
        };

        directory_result.and(registry_result)?;
        info!("💾 Waystone data saved");
        Ok(())
    }

    /// Saves and applies the failure policy to `result`.
    pub fn persist(&self, result: CommandResult) -> CommandResult {
        match self.save_all() {
            Ok(()) => result,
            Err(e) => {
                error!("❌ Waystone data could not be saved: {}", e);
                match self.policy {
                    SaveFailurePolicy::LogOnly => result,
                    SaveFailurePolicy::NotifyCaller => {
                        CommandResult::error(format!("Changes could not be saved: {}", e))
                    }
                }
            }
        }
    }

    pub fn directory(&self) -> MutexGuard<'_, PlayerDirectory> {
        self.directory.lock()
    }

    pub fn registry(&self) -> MutexGuard<'_, LocationRegistry> {
        self.registry.lock()
    }

    pub fn config(&self) -> PluginConfig {
        self.registry.lock().config().clone()
    }

    pub fn last_location(&self, player_id: &PlayerId) -> Option<Location> {
        self.last_locations.get(player_id).map(|l| *l)
    }

    pub fn remember_location(&self, player_id: &PlayerId, location: Location) {
        self.last_locations.insert(player_id.clone(), location);
    }

    pub fn forget_location(&self, player_id: &PlayerId) -> Option<Location> {
        self.last_locations.remove(player_id).map(|(_, l)| l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waystone_events::MemoryStore;

    fn state_with(store: Arc<MemoryStore>, policy: SaveFailurePolicy) -> WaystoneState {
        WaystoneState::new(store, policy)
    }

    #[test]
    fn test_paths() {
        assert_eq!(player_data_path("overworld"), "Waystone/overworld/PlayerData.json");
        assert_eq!(plugin_config_path(), "Waystone/Waystone.json");
    }

    #[test]
    fn test_first_load_writes_both_documents() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone(), SaveFailurePolicy::LogOnly);

        state.load("overworld");

        assert_eq!(
            store.paths(),
            vec![
                "Waystone/Waystone.json".to_string(),
                "Waystone/overworld/PlayerData.json".to_string(),
            ]
        );
        assert_eq!(state.world_name().as_deref(), Some("overworld"));
    }

    #[test]
    fn test_save_before_load_is_refused() {
        let state = state_with(Arc::new(MemoryStore::new()), SaveFailurePolicy::LogOnly);
        assert!(matches!(state.save_all(), Err(PersistError::NotLoaded)));
    }

    #[test]
    fn test_corrupt_document_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.insert(&player_data_path("w"), "[[[");
        let state = state_with(store.clone(), SaveFailurePolicy::LogOnly);

        state.load("w");
        assert!(state.directory().is_empty());
        assert_eq!(store.get(&player_data_path("w")).as_deref(), Some("[[["));
    }

    #[test]
    fn test_unreadable_document_is_never_overwritten() {
        let store = Arc::new(MemoryStore::new());
        store.insert(&plugin_config_path(), "{ \"PlayerMaxHomes\": 3, }");
        let state = state_with(store.clone(), SaveFailurePolicy::LogOnly);
        state.load("w");

        state.registry().set_warp("town", Location::new(1.0, 2.0, 3.0, 0.0));
        assert!(matches!(
            state.save_all(),
            Err(PersistError::Unreadable { ref path }) if *path == plugin_config_path()
        ));
        assert_eq!(
            store.get(&plugin_config_path()).as_deref(),
            Some("{ \"PlayerMaxHomes\": 3, }")
        );
        // the readable document is still written
        assert!(store.get(&player_data_path("w")).is_some());

        store.insert(&plugin_config_path(), "{ \"PlayerMaxHomes\": 3 }");
        state.load("w");
        assert!(state.save_all().is_ok());
        assert_eq!(state.config().player_max_homes, 3);
    }

    #[test]
    fn test_persist_applies_policy() {
        let store = Arc::new(MemoryStore::new());
        let quiet = state_with(store.clone(), SaveFailurePolicy::LogOnly);
        let loud = state_with(store.clone(), SaveFailurePolicy::NotifyCaller);
        quiet.load("w");
        loud.load("w");

        store.set_fail_writes(true);
        assert_eq!(quiet.persist(CommandResult::ok_with("done")), CommandResult::ok_with("done"));
        assert!(!loud.persist(CommandResult::ok_with("done")).is_success());

        store.set_fail_writes(false);
        assert!(loud.persist(CommandResult::ok()).is_success());
    }

    #[test]
    fn test_last_location_is_one_shot() {
        let state = state_with(Arc::new(MemoryStore::new()), SaveFailurePolicy::LogOnly);
        let id = PlayerId::new("uid-1");

        state.remember_location(&id, Location::new(1.0, 2.0, 3.0, 0.0));
        state.remember_location(&id, Location::new(4.0, 5.0, 6.0, 0.0));
        assert_eq!(state.last_location(&id), Some(Location::new(4.0, 5.0, 6.0, 0.0)));

        assert!(state.forget_location(&id).is_some());
        assert!(state.forget_location(&id).is_none());
    }
}
