//! An in-process host.
//!
//! `LocalServer` implements [`ServerContext`] over plain in-memory state so
//! plugins can be run without a game engine: the console binary drives one
//! from stdin and the test suites drive one directly. Players are records
//! with a position, a ping and an inbox; activity timers run on a [`Clock`]
//! that is either the system clock or a manual one tests can advance.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::commands::{Caller, CommandRegistry, CommandResult, Privilege};
use crate::storage::{ConfigStore, MemoryStore};
use crate::{
    current_timestamp, EntityPos, EventError, EventSystem, LogLevel, PlayerCreatedEvent,
    PlayerDeathEvent, PlayerDisconnectedEvent, PlayerId, PlayerInfo, PlayerJoinedEvent, Plugin,
    PluginError, ServerContext, ServerError, ServerShutdownEvent, WorldReadyEvent,
};

/// Time source for activity timers.
#[derive(Debug)]
pub enum Clock {
    System(Instant),
    /// Milliseconds since start, moved only by [`Clock::advance`].
    Manual(AtomicU64),
}

impl Clock {
    pub fn system() -> Self {
        Clock::System(Instant::now())
    }

    pub fn manual() -> Self {
        Clock::Manual(AtomicU64::new(0))
    }

    pub fn now_millis(&self) -> u64 {
        match self {
            Clock::System(start) => start.elapsed().as_millis() as u64,
            Clock::Manual(now) => now.load(Ordering::SeqCst),
        }
    }

    /// Moves a manual clock forward; the system clock ignores this.
    pub fn advance(&self, by: Duration) {
        match self {
            Clock::System(_) => warn!("⚠️ Ignoring advance() on the system clock"),
            Clock::Manual(now) => {
                now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct LocalPlayer {
    name: String,
    position: EntityPos,
    ping: f32,
    inbox: Vec<String>,
}

pub struct LocalServer {
    world_name: String,
    events: Arc<EventSystem>,
    commands: Arc<CommandRegistry>,
    store: Arc<dyn ConfigStore>,
    clock: Clock,
    players: DashMap<PlayerId, LocalPlayer>,
    /// Everyone who has ever joined, to tell first joins apart.
    known_players: DashMap<PlayerId, String>,
    operators: RwLock<HashSet<PlayerId>>,
    /// Activity deadlines in clock milliseconds.
    timers: DashMap<(PlayerId, String), u64>,
    broadcasts: Mutex<Vec<String>>,
    plugins: tokio::sync::Mutex<Vec<Box<dyn Plugin>>>,
}

impl LocalServer {
    /// A server with an in-memory store and a manual clock.
    pub fn new(world_name: impl Into<String>) -> Arc<Self> {
        Self::with_store(world_name, Arc::new(MemoryStore::new()), Clock::manual())
    }

    pub fn with_store(
        world_name: impl Into<String>,
        store: Arc<dyn ConfigStore>,
        clock: Clock,
    ) -> Arc<Self> {
        Arc::new(Self {
            world_name: world_name.into(),
            events: Arc::new(EventSystem::new()),
            commands: Arc::new(CommandRegistry::new()),
            store,
            clock,
            players: DashMap::new(),
            known_players: DashMap::new(),
            operators: RwLock::new(HashSet::new()),
            timers: DashMap::new(),
            broadcasts: Mutex::new(Vec::new()),
            plugins: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn advance_clock(&self, by: Duration) {
        self.clock.advance(by);
    }

    // ------------------------------------------------------------------
    // Plugin lifecycle
    // ------------------------------------------------------------------

    /// Runs `pre_init` and `init`, then keeps the plugin until shutdown.
    pub async fn load_plugin(self: &Arc<Self>, mut plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        let context: Arc<dyn ServerContext> = self.clone();
        info!("🔌 Loading plugin {} v{}", plugin.name(), plugin.version());

        plugin.pre_init(context.clone()).await?;
        plugin.init(context).await?;

        info!("✅ Plugin {} loaded", plugin.name());
        self.plugins.lock().await.push(plugin);
        Ok(())
    }

    pub async fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .lock()
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Signals that the world is loaded.
    pub async fn world_ready(&self) -> Result<(), EventError> {
        info!("🌍 World {} ready", self.world_name);
        self.events
            .emit_core(
                "world_ready",
                &WorldReadyEvent {
                    world_name: self.world_name.clone(),
                    timestamp: current_timestamp(),
                },
            )
            .await
    }

    /// Emits `server_shutdown`, then shuts every plugin down in reverse load
    /// order. Plugin errors are logged and do not stop the others.
    pub async fn shutdown(self: &Arc<Self>) -> Result<(), EventError> {
        info!("🛑 Shutting down");
        self.events
            .emit_core(
                "server_shutdown",
                &ServerShutdownEvent {
                    timestamp: current_timestamp(),
                },
            )
            .await?;

        let context: Arc<dyn ServerContext> = self.clone();
        let mut plugins = self.plugins.lock().await;
        while let Some(mut plugin) = plugins.pop() {
            if let Err(e) = plugin.shutdown(context.clone()).await {
                error!("❌ Plugin {} failed to shut down: {}", plugin.name(), e);
            }
        }

        let stats = self.events.get_stats().await;
        info!(
            "📊 {} events emitted to {} handlers",
            stats.events_emitted, stats.total_handlers
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Player lifecycle
    // ------------------------------------------------------------------

    /// Brings a player online at `position`. The first connection of an id
    /// emits `player_created` before `player_joined`.
    pub async fn connect_player(
        &self,
        player_id: &PlayerId,
        player_name: &str,
        position: EntityPos,
    ) -> Result<(), EventError> {
        self.players.insert(
            player_id.clone(),
            LocalPlayer {
                name: player_name.to_string(),
                position,
                ping: 0.0,
                inbox: Vec::new(),
            },
        );

        let first_join = self
            .known_players
            .insert(player_id.clone(), player_name.to_string())
            .is_none();

        if first_join {
            info!("🆕 {} joined for the first time", player_name);
            self.events
                .emit_core(
                    "player_created",
                    &PlayerCreatedEvent {
                        player_id: player_id.clone(),
                        player_name: player_name.to_string(),
                        timestamp: current_timestamp(),
                    },
                )
                .await?;
        }

        info!("👋 {} joined", player_name);
        self.events
            .emit_core(
                "player_joined",
                &PlayerJoinedEvent {
                    player_id: player_id.clone(),
                    player_name: player_name.to_string(),
                    timestamp: current_timestamp(),
                },
            )
            .await
    }

    pub async fn disconnect_player(&self, player_id: &PlayerId) -> Result<(), ServerError> {
        let (_, player) = self
            .players
            .remove(player_id)
            .ok_or_else(|| ServerError::PlayerOffline(player_id.clone()))?;

        info!("🚪 {} left", player.name);
        self.events
            .emit_core(
                "player_disconnected",
                &PlayerDisconnectedEvent {
                    player_id: player_id.clone(),
                    player_name: player.name,
                    last_position: Some(player.position),
                    timestamp: current_timestamp(),
                },
            )
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }

    pub async fn kill_player(&self, player_id: &PlayerId, cause: Option<&str>) -> Result<(), ServerError> {
        if !self.players.contains_key(player_id) {
            return Err(ServerError::PlayerOffline(player_id.clone()));
        }

        info!("💀 {} died", player_id);
        self.events
            .emit_core(
                "player_death",
                &PlayerDeathEvent {
                    player_id: player_id.clone(),
                    cause: cause.map(str::to_string),
                    timestamp: current_timestamp(),
                },
            )
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }

    pub fn move_player(&self, player_id: &PlayerId, position: EntityPos) -> Result<(), ServerError> {
        let mut player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| ServerError::PlayerOffline(player_id.clone()))?;
        player.position = position;
        Ok(())
    }

    pub fn set_ping(&self, player_id: &PlayerId, ping: f32) -> Result<(), ServerError> {
        let mut player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| ServerError::PlayerOffline(player_id.clone()))?;
        player.ping = ping;
        Ok(())
    }

    pub fn position(&self, player_id: &PlayerId) -> Option<EntityPos> {
        self.players.get(player_id).map(|p| p.position)
    }

    /// Looks up an online player by display name.
    pub fn find_player(&self, player_name: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|entry| entry.value().name == player_name)
            .map(|entry| entry.key().clone())
    }

    /// Resolves a name to the id it was first seen with, online or not.
    pub fn known_player(&self, player_name: &str) -> Option<PlayerId> {
        self.known_players
            .iter()
            .find(|entry| entry.value() == player_name)
            .map(|entry| entry.key().clone())
    }

    pub fn online_count(&self) -> usize {
        self.players.len()
    }

    /// Lets a player run `ControlServer` commands.
    pub fn grant_operator(&self, player_id: &PlayerId) {
        self.operators.write().insert(player_id.clone());
    }

    pub fn privilege_of(&self, caller: &Caller) -> Privilege {
        match caller {
            Caller::Console => Privilege::ControlServer,
            Caller::Player(id) if self.operators.read().contains(id) => Privilege::ControlServer,
            Caller::Player(_) => Privilege::Chat,
        }
    }

    // ------------------------------------------------------------------
    // Commands and chat
    // ------------------------------------------------------------------

    pub fn run_command(&self, caller: Caller, line: &str) -> CommandResult {
        let privilege = self.privilege_of(&caller);
        self.commands.dispatch(self, caller, privilege, line)
    }

    pub fn messages(&self, player_id: &PlayerId) -> Vec<String> {
        self.players
            .get(player_id)
            .map(|p| p.inbox.clone())
            .unwrap_or_default()
    }

    /// Drains and returns the player's inbox.
    pub fn take_messages(&self, player_id: &PlayerId) -> Vec<String> {
        self.players
            .get_mut(player_id)
            .map(|mut p| std::mem::take(&mut p.inbox))
            .unwrap_or_default()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().clone()
    }
}

impl ServerContext for LocalServer {
    fn events(&self) -> Arc<EventSystem> {
        self.events.clone()
    }

    fn commands(&self) -> Arc<CommandRegistry> {
        self.commands.clone()
    }

    fn config_store(&self) -> Arc<dyn ConfigStore> {
        self.store.clone()
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => error!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Trace => trace!("{}", message),
        }
    }

    fn player(&self, player_id: &PlayerId) -> Option<PlayerInfo> {
        self.players.get(player_id).map(|p| PlayerInfo {
            player_id: player_id.clone(),
            player_name: p.name.clone(),
            position: p.position,
            ping: p.ping,
        })
    }

    fn send_message(&self, player_id: &PlayerId, message: &str) -> Result<(), ServerError> {
        let mut player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| ServerError::PlayerOffline(player_id.clone()))?;
        debug!("✉️ to {}: {}", player.name, message);
        player.inbox.push(message.to_string());
        Ok(())
    }

    fn broadcast(&self, message: &str) {
        debug!("📢 {}", message);
        for mut player in self.players.iter_mut() {
            player.inbox.push(message.to_string());
        }
        self.broadcasts.lock().push(message.to_string());
    }

    fn teleport(&self, player_id: &PlayerId, position: EntityPos) -> Result<(), ServerError> {
        self.move_player(player_id, position)?;
        debug!("✨ {} teleported to {:?}", player_id, position);
        Ok(())
    }

    fn remaining_activity_time(&self, player_id: &PlayerId, activity: &str) -> u64 {
        let now = self.clock.now_millis();
        self.timers
            .get(&(player_id.clone(), activity.to_string()))
            .map(|deadline| deadline.saturating_sub(now))
            .unwrap_or(0)
    }

    fn set_activity_running(&self, player_id: &PlayerId, activity: &str, duration_ms: u64) {
        let deadline = self.clock.now_millis().saturating_add(duration_ms);
        self.timers
            .insert((player_id.clone(), activity.to_string()), deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_activity_timer_expires_with_clock() {
        let server = LocalServer::new("test");
        let id = PlayerId::new("p1");

        assert_eq!(server.remaining_activity_time(&id, "HomeCooldown"), 0);

        server.set_activity_running(&id, "HomeCooldown", 10_000);
        assert_eq!(server.remaining_activity_time(&id, "HomeCooldown"), 10_000);
        assert_eq!(server.remaining_activity_time(&id, "WarpCooldown"), 0);

        server.advance_clock(Duration::from_millis(9_500));
        assert_eq!(server.remaining_activity_time(&id, "HomeCooldown"), 500);

        server.advance_clock(Duration::from_secs(1));
        assert_eq!(server.remaining_activity_time(&id, "HomeCooldown"), 0);
    }

    #[tokio::test]
    async fn test_first_connection_emits_created_once() {
        let server = LocalServer::new("test");
        let created = Arc::new(AtomicUsize::new(0));
        let joined = Arc::new(AtomicUsize::new(0));

        let c = created.clone();
        server
            .events()
            .on_core("player_created", move |_: PlayerCreatedEvent| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        let j = joined.clone();
        server
            .events()
            .on_core("player_joined", move |_: PlayerJoinedEvent| {
                j.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        let id = PlayerId::new("p1");
        server.connect_player(&id, "Alice", EntityPos::default()).await.unwrap();
        server.disconnect_player(&id).await.unwrap();
        server.connect_player(&id, "Alice", EntityPos::default()).await.unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(joined.load(Ordering::SeqCst), 2);
        assert_eq!(server.known_player("Alice"), Some(id));
    }

    #[tokio::test]
    async fn test_teleport_and_messaging_require_online_player() {
        let server = LocalServer::new("test");
        let id = PlayerId::new("p1");

        assert!(server.teleport(&id, EntityPos::at(1.0, 2.0, 3.0)).is_err());
        assert!(server.send_message(&id, "hi").is_err());

        server.connect_player(&id, "Alice", EntityPos::default()).await.unwrap();
        server.teleport(&id, EntityPos::new(1.0, 2.0, 3.0, 0.5)).unwrap();
        server.send_message(&id, "hi").unwrap();
        server.broadcast("everyone");

        assert_eq!(server.position(&id), Some(EntityPos::new(1.0, 2.0, 3.0, 0.5)));
        assert_eq!(server.take_messages(&id), vec!["hi", "everyone"]);
        assert!(server.messages(&id).is_empty());
        assert_eq!(server.broadcasts(), vec!["everyone"]);
    }

    #[test]
    fn test_privileges() {
        let server = LocalServer::new("test");
        let id = PlayerId::new("p1");

        assert_eq!(server.privilege_of(&Caller::Console), Privilege::ControlServer);
        assert_eq!(server.privilege_of(&Caller::Player(id.clone())), Privilege::Chat);
        server.grant_operator(&id);
        assert_eq!(server.privilege_of(&Caller::Player(id)), Privilege::ControlServer);
    }
}
