//! The player directory: one record per player id, plus the home
//! operations that act on a single record.

use std::collections::BTreeMap;
use tracing::{error, info};
use waystone_events::{ConfigStore, PlayerId};

use crate::error::{HomeLimitReached, PersistError};
use crate::types::{Location, PlayerRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerDirectory {
    records: BTreeMap<PlayerId, PlayerRecord>,
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the player's record, creating an empty one on first lookup.
    pub fn get(&mut self, player_id: &PlayerId) -> &mut PlayerRecord {
        self.records.entry(player_id.clone()).or_default()
    }

    /// Looks a record up without creating it.
    pub fn peek(&self, player_id: &PlayerId) -> Option<&PlayerRecord> {
        self.records.get(player_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self, path: &str) -> Result<String, PersistError> {
        serde_json::to_string_pretty(&self.records).map_err(|source| PersistError::Serialize {
            path: path.to_string(),
            source,
        })
    }

    /// Writes the whole directory. On failure the stored copy from the
    /// previous save is left as it was.
    pub fn save(&self, store: &dyn ConfigStore, path: &str) -> Result<(), PersistError> {
        let json = self.to_json(path)?;
        store.store_raw(path, &json)?;
        Ok(())
    }

    /// Reads the directory from `path`. When nothing is stored yet, an empty
    /// directory is returned and written straight away.
    pub fn load(store: &dyn ConfigStore, path: &str) -> Result<Self, PersistError> {
        let Some(json) = store.load_raw(path)? else {
            info!("📂 No player data at {}, starting empty", path);
            let directory = Self::new();
            if let Err(e) = directory.save(store, path) {
                error!("❌ Failed to write initial player data: {}", e);
            }
            return Ok(directory);
        };

        let records = serde_json::from_str(&json).map_err(|source| PersistError::Parse {
            path: path.to_string(),
            source,
        })?;

        let directory = Self { records };
        info!("📂 Loaded {} player records from {}", directory.len(), path);
        Ok(directory)
    }
}

/// Stores `location` under `name`, replacing any home of that name.
///
/// Rejected only once the player holds *more* than `max_homes` homes, so
/// `max_homes + 1` homes can be set before the limit bites.
pub fn set_home(
    record: &mut PlayerRecord,
    name: &str,
    location: Location,
    max_homes: i64,
) -> Result<(), HomeLimitReached> {
    if record.homes.len() as i64 > max_homes {
        return Err(HomeLimitReached { max: max_homes });
    }

    record.homes.insert(name, location);
    Ok(())
}

/// Returns whether a home was removed; an unknown name is not an error.
pub fn delete_home(record: &mut PlayerRecord, name: &str) -> bool {
    record.homes.remove(name)
}

pub fn get_home(record: &PlayerRecord, name: &str) -> Option<Location> {
    record.homes.get(name)
}

/// Homes in the order they were first set.
pub fn list_homes(record: &PlayerRecord) -> impl Iterator<Item = (&str, &Location)> + '_ {
    record.homes.iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waystone_events::MemoryStore;

    const PATH: &str = "Waystone/world/PlayerData.json";

    fn spot(x: f64) -> Location {
        Location::new(x, 64.0, -x, 0.5)
    }

    #[test]
    fn test_get_creates_record_once() {
        let mut directory = PlayerDirectory::new();
        let id = PlayerId::new("uid-1");

        directory.get(&id).death_count += 1;
        directory.get(&id).death_count += 1;

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.peek(&id).map(|r| r.death_count), Some(2));
        assert!(directory.peek(&PlayerId::new("other")).is_none());
    }

    #[test]
    fn test_set_then_get_home() {
        let mut record = PlayerRecord::default();
        set_home(&mut record, "base", spot(1.0), 5).unwrap();
        assert_eq!(get_home(&record, "base"), Some(spot(1.0)));

        set_home(&mut record, "base", spot(2.0), 5).unwrap();
        assert_eq!(get_home(&record, "base"), Some(spot(2.0)));
        assert_eq!(record.homes.len(), 1);
    }

    #[test]
    fn test_delete_home_set_or_never_set() {
        let mut record = PlayerRecord::default();
        set_home(&mut record, "base", spot(1.0), 5).unwrap();

        assert!(delete_home(&mut record, "base"));
        assert_eq!(get_home(&record, "base"), None);

        assert!(!delete_home(&mut record, "never"));
        assert_eq!(get_home(&record, "never"), None);
    }

    #[test]
    fn test_home_limit_is_strictly_greater_than() {
        let max = 5;
        let mut record = PlayerRecord::default();

        for i in 1..=max + 1 {
            assert!(
                set_home(&mut record, &format!("h{}", i), spot(i as f64), max).is_ok(),
                "home {} should be accepted",
                i
            );
        }

        let rejected = set_home(&mut record, "one_too_many", spot(0.0), max);
        assert_eq!(rejected, Err(HomeLimitReached { max }));
        assert_eq!(record.homes.len() as i64, max + 1);
        assert_eq!(get_home(&record, "one_too_many"), None);
    }

    #[test]
    fn test_negative_limit_rejects_every_home() {
        let mut record = PlayerRecord::default();
        assert_eq!(
            set_home(&mut record, "base", spot(1.0), -1),
            Err(HomeLimitReached { max: -1 })
        );
        assert!(record.homes.is_empty());
    }

    #[test]
    fn test_list_homes_is_restartable() {
        let mut record = PlayerRecord::default();
        set_home(&mut record, "b", spot(1.0), 5).unwrap();
        set_home(&mut record, "a", spot(2.0), 5).unwrap();

        let first: Vec<&str> = list_homes(&record).map(|(name, _)| name).collect();
        let second: Vec<&str> = list_homes(&record).map(|(name, _)| name).collect();
        assert_eq!(first, vec!["b", "a"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_empty_store_writes_file() {
        let store = MemoryStore::new();
        let directory = PlayerDirectory::load(&store, PATH).unwrap();

        assert!(directory.is_empty());
        assert_eq!(store.get(PATH).as_deref(), Some("{}"));
    }

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let mut directory = PlayerDirectory::new();
        let record = directory.get(&PlayerId::new("uid-1"));
        record.player_name = "Alice".to_string();
        set_home(record, "default", spot(3.0), 5).unwrap();

        directory.save(&store, PATH).unwrap();
        let loaded = PlayerDirectory::load(&store, PATH).unwrap();
        assert_eq!(loaded, directory);
    }

    #[test]
    fn test_failed_save_keeps_previous_document() {
        let store = MemoryStore::new();
        let mut directory = PlayerDirectory::new();
        directory.save(&store, PATH).unwrap();

        directory.get(&PlayerId::new("uid-1")).death_count = 7;
        store.set_fail_writes(true);

        assert!(matches!(
            directory.save(&store, PATH),
            Err(PersistError::Storage(_))
        ));
        assert_eq!(store.get(PATH).as_deref(), Some("{}"));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_corrupt_document_is_a_parse_error() {
        let store = MemoryStore::new();
        store.insert(PATH, "{ not json");
        assert!(matches!(
            PlayerDirectory::load(&store, PATH),
            Err(PersistError::Parse { .. })
        ));
    }
}
