//! Persisted data types.
//!
//! Field names are PascalCase on disk (`PlayerMaxHomes`, `PlayerHomes`,
//! `X`, `Yaw`, ...) so existing data files load unchanged. Every field has a
//! default, and a document missing fields loads with those defaults.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use waystone_events::EntityPos;

/// A saved point in the world, including facing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64, yaw: f32) -> Self {
        Self { x, y, z, yaw }
    }

    /// Keeps the coordinates of `pos` but drops its facing.
    pub fn from_coordinates(pos: EntityPos) -> Self {
        Self::new(pos.x, pos.y, pos.z, 0.0)
    }
}

impl From<EntityPos> for Location {
    fn from(pos: EntityPos) -> Self {
        Self::new(pos.x, pos.y, pos.z, pos.yaw)
    }
}

impl From<Location> for EntityPos {
    fn from(location: Location) -> Self {
        EntityPos::new(location.x, location.y, location.z, location.yaw)
    }
}

/// Name → location mapping that remembers insertion order.
///
/// Overwriting an existing name keeps its original position. Serialized as
/// a plain JSON object, entries in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedLocations {
    entries: Vec<(String, Location)>,
}

impl NamedLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Location> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, location)| *location)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    pub fn insert(&mut self, name: impl Into<String>, location: Location) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = location,
            None => self.entries.push((name, location)),
        }
    }

    /// Returns whether `name` was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| key != name);
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Location)> + '_ {
        self.entries
            .iter()
            .map(|(name, location)| (name.as_str(), location))
    }
}

impl Serialize for NamedLocations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, location) in &self.entries {
            map.serialize_entry(name, location)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NamedLocations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NamedLocationsVisitor;

        impl<'de> Visitor<'de> for NamedLocationsVisitor {
            type Value = NamedLocations;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of names to locations")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(NamedLocations::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut locations = NamedLocations::new();
                while let Some((name, location)) = access.next_entry::<String, Location>()? {
                    locations.insert(name, location);
                }
                Ok(locations)
            }
        }

        // `null` is accepted as empty
        deserializer.deserialize_any(NamedLocationsVisitor)
    }
}

/// A string field that older files may have written as `null`.
fn null_as_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

pub const UNKNOWN_DATE: &str = "Unknown";

/// Everything the plugin remembers about one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerRecord {
    #[serde(rename = "PlayerUID", deserialize_with = "null_as_default")]
    pub player_uid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub player_name: String,
    pub death_count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub join_date: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_seen: String,
    #[serde(rename = "PlayerHomes")]
    pub homes: NamedLocations,
    /// Where the player logged out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_location: Option<Location>,
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self {
            player_uid: String::new(),
            player_name: String::new(),
            death_count: 0,
            join_date: UNKNOWN_DATE.to_string(),
            last_seen: UNKNOWN_DATE.to_string(),
            homes: NamedLocations::new(),
            last_location: None,
        }
    }
}

/// Process-wide settings plus the shared locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PluginConfig {
    pub player_max_homes: i64,
    pub player_home_teleport_cooldown_seconds: u64,
    pub player_back_teleport_cooldown_seconds: u64,
    pub player_spawn_teleport_cooldown_seconds: u64,
    pub player_warp_teleport_cooldown_seconds: u64,
    pub spawn_location: Option<Location>,
    pub warp_locations: NamedLocations,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            player_max_homes: 5,
            player_home_teleport_cooldown_seconds: 10,
            player_back_teleport_cooldown_seconds: 10,
            player_spawn_teleport_cooldown_seconds: 10,
            player_warp_teleport_cooldown_seconds: 10,
            spawn_location: None,
            warp_locations: NamedLocations::new(),
        }
    }
}

/// Local time as written to `JoinDate` and `LastSeen`.
pub fn format_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
