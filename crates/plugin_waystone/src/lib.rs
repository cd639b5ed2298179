//! # Waystone
//!
//! Teleport conveniences for a survival server: personal homes, shared
//! warps, a server spawn and a one-shot `/back`, plus light per-player
//! bookkeeping (join date, last seen, deaths).
//!
//! Player records live in `Waystone/{world}/PlayerData.json`; limits,
//! cooldowns, spawn and warps live in `Waystone/Waystone.json`. Both are
//! loaded when the world is ready and written whole on every change.

use async_trait::async_trait;
use std::sync::Arc;
use waystone_events::{
    create_simple_plugin, EventSystem, LogLevel, PluginError, ServerContext, SimplePlugin,
};

pub mod commands;
pub mod directory;
pub mod error;
pub mod listener;
pub mod registry;
pub mod state;
pub mod teleport;
pub mod types;

pub use error::{HomeLimitReached, PersistError};
pub use state::{SaveFailurePolicy, WaystoneState};
pub use types::{Location, NamedLocations, PlayerRecord, PluginConfig};

pub struct WaystonePlugin {
    name: String,
    policy: SaveFailurePolicy,
    state: Option<Arc<WaystoneState>>,
}

impl WaystonePlugin {
    pub fn new() -> Self {
        Self::with_policy(SaveFailurePolicy::default())
    }

    pub fn with_policy(policy: SaveFailurePolicy) -> Self {
        Self {
            name: "waystone".to_string(),
            policy,
            state: None,
        }
    }

    /// Shared state, available once handlers are registered.
    pub fn state(&self) -> Option<Arc<WaystoneState>> {
        self.state.clone()
    }
}

impl Default for WaystonePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimplePlugin for WaystonePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn register_handlers(
        &mut self,
        events: Arc<EventSystem>,
        context: Arc<dyn ServerContext>,
    ) -> Result<(), PluginError> {
        context.log(LogLevel::Info, "🧭 Waystone: Registering handlers...");

        let state = Arc::new(WaystoneState::new(context.config_store(), self.policy));
        listener::register_listeners(&events, state.clone()).await?;
        commands::register_commands(&context.commands(), state.clone());
        self.state = Some(state);

        context.log(LogLevel::Info, "🧭 Waystone: ✅ All handlers registered");
        Ok(())
    }

    async fn on_init(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        context.log(
            LogLevel::Info,
            &format!("🧭 Waystone {} loaded, waiting for the world", self.version()),
        );
        Ok(())
    }

    async fn on_shutdown(&mut self, context: Arc<dyn ServerContext>) -> Result<(), PluginError> {
        let Some(state) = &self.state else {
            return Ok(());
        };

        state.save_all().map_err(|e| {
            context.log(LogLevel::Error, &format!("🧭 Waystone: Save on shutdown failed: {}", e));
            PluginError::from(e)
        })?;

        context.log(LogLevel::Info, "🧭 Waystone: ✅ Data saved, shutting down");
        Ok(())
    }
}

create_simple_plugin!(WaystonePlugin);
