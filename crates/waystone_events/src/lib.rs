//! # Waystone Event System
//!
//! The host-side API that Waystone plugins are written against. A game server
//! (or the in-process [`LocalServer`]) owns an instance of everything in this
//! crate and hands plugins an `Arc<dyn ServerContext>`; plugins never reach
//! into the server any other way.
//!
//! ## What the host provides
//!
//! - **Events**: typed, JSON-serialized lifecycle signals (`core:*`).
//! - **Chat commands**: a [`CommandRegistry`] that parses a command line,
//!   enforces the command's [`Privilege`] and calls the plugin's handler.
//! - **Player primitives**: position lookup, teleport, messaging, ping.
//! - **Activity timers**: named per-player countdowns the host expires on its
//!   own clock. Plugins only ever start a timer or ask how much is left.
//! - **Config storage**: a [`ConfigStore`] the plugin writes whole documents to.
//!
//! ## Plugin Development
//!
//! ```rust,ignore
//! use waystone_events::*;
//!
//! struct MotdPlugin;
//!
//! impl MotdPlugin {
//!     fn new() -> Self {
//!         Self
//!     }
//! }
//!
//! #[async_trait]
//! impl SimplePlugin for MotdPlugin {
//!     fn name(&self) -> &str { "motd" }
//!     fn version(&self) -> &str { "1.0.0" }
//!
//!     async fn register_handlers(
//!         &mut self,
//!         events: Arc<EventSystem>,
//!         context: Arc<dyn ServerContext>,
//!     ) -> Result<(), PluginError> {
//!         events
//!             .on_core("player_joined", |event: PlayerJoinedEvent| {
//!                 println!("{} joined", event.player_name);
//!                 Ok(())
//!             })
//!             .await?;
//!         Ok(())
//!     }
//! }
//!
//! create_simple_plugin!(MotdPlugin);
//! ```

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
#[allow(unused_imports)] // used by create_simple_plugin! expansions
pub use futures;

pub mod commands;
pub mod local;
pub mod storage;

pub use async_trait::async_trait as plugin_async_trait;
pub use commands::{
    ArgSpec, Caller, CommandContext, CommandHandler, CommandRegistry, CommandResult, CommandSpec,
    Privilege,
};
pub use local::{Clock, LocalServer};
pub use storage::{ConfigStore, JsonFileStore, MemoryStore, StorageError};

// ============================================================================
// Core Types
// ============================================================================

/// Stable identifier of a player, as issued by the game engine.
///
/// Engines hand out opaque string ids that survive reconnects and renames;
/// this wrapper keeps them from being confused with player names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Position and facing of an entity in the world.
///
/// Double precision for coordinates so that large worlds do not drift;
/// `yaw` is the horizontal facing angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
}

impl EntityPos {
    pub fn new(x: f64, y: f64, z: f64, yaw: f32) -> Self {
        Self { x, y, z, yaw }
    }

    /// A position with no facing information.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(x, y, z, 0.0)
    }
}

/// Snapshot of an online player as the host sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub player_name: String,
    pub position: EntityPos,
    /// Round-trip latency in seconds.
    pub ping: f32,
}

// ============================================================================
// Event Traits and Core Infrastructure
// ============================================================================

/// Anything that can travel through the [`EventSystem`].
///
/// Implemented automatically for every `Serialize + DeserializeOwned` type, so
/// event structs only need the usual derives.
pub trait Event: Send + Sync + Any + std::fmt::Debug {
    fn type_name() -> &'static str
    where
        Self: Sized;

    fn serialize(&self) -> Result<Vec<u8>, EventError>;

    fn deserialize(data: &[u8]) -> Result<Self, EventError>
    where
        Self: Sized;
}

impl<T> Event for T
where
    T: Serialize + DeserializeOwned + Send + Sync + Any + std::fmt::Debug + 'static,
{
    fn type_name() -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(EventError::Serialization)
    }

    fn deserialize(data: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(data).map_err(EventError::Deserialization)
    }
}

/// Type-erased handler stored by the event system.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles an event from its serialized form.
    async fn handle(&self, data: &[u8]) -> Result<(), EventError>;

    fn handler_name(&self) -> &str;
}

/// Bridges a plain `Fn(T)` closure to [`EventHandler`].
///
/// Handlers are synchronous on purpose: the host dispatches one callback at a
/// time and every handler runs to completion before the next one starts.
pub struct TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    handler: F,
    name: String,
    _phantom: std::marker::PhantomData<T>,
}

impl<T, F> TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    pub fn new(name: String, handler: F) -> Self {
        Self {
            handler,
            name,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> EventHandler for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    async fn handle(&self, data: &[u8]) -> Result<(), EventError> {
        let event = T::deserialize(data)?;
        (self.handler)(event)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Event System
// ============================================================================

/// Routes events to the handlers registered for their key.
///
/// Keys are namespaced as `core:<event>`. Several handlers may share a key;
/// they run in
/// registration order and a failing handler is logged without stopping the
/// rest.
pub struct EventSystem {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    stats: RwLock<EventSystemStats>,
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSystem {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            stats: RwLock::new(EventSystemStats::default()),
        }
    }

    /// Registers a handler for a core server event such as `player_joined`.
    pub async fn on_core<T, F>(&self, event_name: &str, handler: F) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let event_key = format!("core:{}", event_name);
        self.register_typed_handler(event_key, handler).await
    }

    async fn register_typed_handler<T, F>(
        &self,
        event_key: String,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let handler_name = format!("{}::{}", event_key, T::type_name());
        let handler_arc: Arc<dyn EventHandler> =
            Arc::new(TypedEventHandler::new(handler_name, handler));

        self.handlers
            .write()
            .await
            .entry(event_key.clone())
            .or_default()
            .push(handler_arc);

        self.stats.write().await.total_handlers += 1;

        info!("📝 Registered handler for {}", event_key);
        Ok(())
    }

    pub async fn emit_core<T>(&self, event_name: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        let event_key = format!("core:{}", event_name);
        self.emit_event(&event_key, event).await
    }

    /// Serializes once, then runs every handler for `event_key` in order.
    async fn emit_event<T>(&self, event_key: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        let data = event.serialize()?;
        let handlers = self.handlers.read().await;

        match handlers.get(event_key) {
            Some(event_handlers) => {
                debug!(
                    "📤 Emitting {} to {} handlers",
                    event_key,
                    event_handlers.len()
                );

                for handler in event_handlers {
                    if let Err(e) = handler.handle(&data).await {
                        error!("❌ Handler {} failed: {}", handler.handler_name(), e);
                    }
                }

                self.stats.write().await.events_emitted += 1;
            }
            None => warn!("⚠️ No handlers for event: {}", event_key),
        }

        Ok(())
    }

    pub async fn get_stats(&self) -> EventSystemStats {
        self.stats.read().await.clone()
    }
}

// ============================================================================
// Core Server Events
// ============================================================================

/// The world finished loading and the server is about to accept players.
///
/// Plugins load their persisted state here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldReadyEvent {
    /// Name of the loaded world, without directory or file extension
    pub world_name: String,
    pub timestamp: u64,
}

/// A player joined this world for the very first time.
///
/// Always followed by a [`PlayerJoinedEvent`] for the same connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCreatedEvent {
    pub player_id: PlayerId,
    pub player_name: String,
    pub timestamp: u64,
}

/// A player connected (every connection, including the first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoinedEvent {
    pub player_id: PlayerId,
    pub player_name: String,
    pub timestamp: u64,
}

/// A player left the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDisconnectedEvent {
    pub player_id: PlayerId,
    pub player_name: String,
    /// Where the player was standing when the connection closed, if known
    pub last_position: Option<EntityPos>,
    pub timestamp: u64,
}

/// A player died.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDeathEvent {
    pub player_id: PlayerId,
    /// Free-form description of what killed the player
    pub cause: Option<String>,
    pub timestamp: u64,
}

/// The server is shutting down; emitted before plugins are unloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerShutdownEvent {
    pub timestamp: u64,
}

// ============================================================================
// Statistics and Error Types
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct EventSystemStats {
    pub total_handlers: usize,
    pub events_emitted: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
}

// ============================================================================
// Plugin Traits
// ============================================================================

/// High-level plugin interface.
///
/// # Lifecycle
///
/// 1. the plugin is constructed with `new()`
/// 2. `register_handlers()` wires events and chat commands
/// 3. `on_init()` runs once everything is registered
/// 4. the plugin receives events and commands
/// 5. `on_shutdown()` runs before the plugin is dropped
#[async_trait]
pub trait SimplePlugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Registers event handlers and chat commands.
    ///
    /// Handlers must be in place before this returns; the host does not
    /// deliver events to a plugin whose registration failed.
    async fn register_handlers(
        &mut self,
        events: Arc<EventSystem>,
        context: Arc<dyn ServerContext>,
    ) -> Result<(), PluginError>;

    async fn on_init(&mut self, _context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when the plugin is unloaded or the server stops. Errors are
    /// logged but do not block unloading.
    async fn on_shutdown(&mut self, _context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Low-level plugin interface the host drives.
///
/// Plugin authors implement [`SimplePlugin`] and let
/// [`create_simple_plugin!`] produce this.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    async fn pre_init(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError>;

    async fn init(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError>;

    async fn shutdown(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError>;
}

/// Generates the [`Plugin`] wrapper for a [`SimplePlugin`] type.
///
/// Every lifecycle call is wrapped so that a panicking plugin turns into a
/// `PluginError::Runtime` instead of taking the host down. The expansion
/// provides:
///
/// - `plugin_instance()` for hosts that link the plugin statically
/// - `create_plugin()` / `destroy_plugin()` C exports for hosts that load the
///   plugin as a dynamic library
#[macro_export]
macro_rules! create_simple_plugin {
    ($plugin_type:ty) => {
        mod __waystone_plugin_export {
            use super::*;
            use std::panic::AssertUnwindSafe;
            use std::sync::Arc;
            use $crate::futures::FutureExt;
            use $crate::{Plugin, PluginError, ServerContext, SimplePlugin};

            pub struct PluginWrapper {
                inner: $plugin_type,
            }

            impl PluginWrapper {
                fn panic_to_error(panic_info: Box<dyn std::any::Any + Send>) -> PluginError {
                    let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        format!("Plugin panicked: {}", s)
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        format!("Plugin panicked: {}", s)
                    } else {
                        "Plugin panicked with unknown error".to_string()
                    };

                    PluginError::Runtime(message)
                }
            }

            #[$crate::plugin_async_trait]
            impl Plugin for PluginWrapper {
                fn name(&self) -> &str {
                    self.inner.name()
                }

                fn version(&self) -> &str {
                    self.inner.version()
                }

                async fn pre_init(
                    &mut self,
                    context: Arc<dyn ServerContext>,
                ) -> Result<(), PluginError> {
                    let events = context.events();
                    AssertUnwindSafe(self.inner.register_handlers(events, context))
                        .catch_unwind()
                        .await
                        .map_err(Self::panic_to_error)?
                }

                async fn init(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
                    AssertUnwindSafe(self.inner.on_init(context))
                        .catch_unwind()
                        .await
                        .map_err(Self::panic_to_error)?
                }

                async fn shutdown(
                    &mut self,
                    context: Arc<dyn ServerContext>,
                ) -> Result<(), PluginError> {
                    AssertUnwindSafe(self.inner.on_shutdown(context))
                        .catch_unwind()
                        .await
                        .map_err(Self::panic_to_error)?
                }
            }

            pub fn plugin_instance() -> Box<dyn Plugin> {
                Box::new(PluginWrapper {
                    inner: <$plugin_type>::new(),
                })
            }

            /// # Safety
            ///
            /// The returned pointer must be released with `destroy_plugin`.
            #[no_mangle]
            #[allow(improper_ctypes_definitions)]
            pub unsafe extern "C" fn create_plugin() -> *mut dyn Plugin {
                match std::panic::catch_unwind(plugin_instance) {
                    Ok(plugin) => Box::into_raw(plugin),
                    Err(panic_info) => {
                        eprintln!("Plugin creation panicked: {:?}", panic_info);
                        std::ptr::null_mut::<PluginWrapper>() as *mut dyn Plugin
                    }
                }
            }

            /// # Safety
            ///
            /// `plugin` must come from `create_plugin` and not be used afterwards.
            #[no_mangle]
            #[allow(improper_ctypes_definitions)]
            pub unsafe extern "C" fn destroy_plugin(plugin: *mut dyn Plugin) {
                if plugin.is_null() {
                    return;
                }

                let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    drop(Box::from_raw(plugin));
                }));
            }
        }

        pub use __waystone_plugin_export::plugin_instance;
    };
}

// ============================================================================
// Server Context
// ============================================================================

/// Everything a plugin may ask of the host.
///
/// All calls are synchronous and return immediately; the host runs plugin
/// callbacks one at a time on its update thread.
pub trait ServerContext: Send + Sync {
    fn events(&self) -> Arc<EventSystem>;

    fn commands(&self) -> Arc<CommandRegistry>;

    /// Durable storage for plugin documents.
    fn config_store(&self) -> Arc<dyn ConfigStore>;

    fn log(&self, level: LogLevel, message: &str);

    /// Looks up an online player.
    fn player(&self, player_id: &PlayerId) -> Option<PlayerInfo>;

    fn send_message(&self, player_id: &PlayerId, message: &str) -> Result<(), ServerError>;

    /// Sends a chat line to every online player.
    fn broadcast(&self, message: &str);

    /// Moves the player's entity to `position`, including facing.
    fn teleport(&self, player_id: &PlayerId, position: EntityPos) -> Result<(), ServerError>;

    /// Milliseconds left on the player's named activity timer, 0 when it is
    /// not running.
    fn remaining_activity_time(&self, player_id: &PlayerId, activity: &str) -> u64;

    /// Starts (or restarts) the player's named activity timer.
    fn set_activity_running(&self, player_id: &PlayerId, activity: &str, duration_ms: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    #[error("Plugin runtime error: {0}")]
    Runtime(String),
}

impl From<EventError> for PluginError {
    fn from(e: EventError) -> Self {
        PluginError::ExecutionError(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Player {0} is not online")]
    PlayerOffline(PlayerId),
    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Current Unix time in seconds. A clock set before 1970 yields 0.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
