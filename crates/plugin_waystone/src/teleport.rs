//! Cooldown-gated teleports.
//!
//! Every teleport command goes through [`attempt`]: if the host still runs
//! the kind's activity timer the player is told how long to wait, otherwise
//! the origin is remembered for `/back`, the player is moved and the timer
//! starts. Timers are the host's; nothing here counts down.

use tracing::debug;
use waystone_events::{PlayerInfo, ServerContext, ServerError};

use crate::state::WaystoneState;
use crate::types::{Location, PluginConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeleportKind {
    Home,
    Back,
    Spawn,
    Warp,
}

impl TeleportKind {
    /// Name of the host activity timer for this kind.
    pub fn activity(self) -> &'static str {
        match self {
            TeleportKind::Home => "HomeCooldown",
            TeleportKind::Back => "BackCooldown",
            TeleportKind::Spawn => "SpawnCooldown",
            TeleportKind::Warp => "WarpCooldown",
        }
    }

    pub fn cooldown_ms(self, config: &PluginConfig) -> u64 {
        let seconds = match self {
            TeleportKind::Home => config.player_home_teleport_cooldown_seconds,
            TeleportKind::Back => config.player_back_teleport_cooldown_seconds,
            TeleportKind::Spawn => config.player_spawn_teleport_cooldown_seconds,
            TeleportKind::Warp => config.player_warp_teleport_cooldown_seconds,
        };
        seconds.saturating_mul(1000)
    }

    /// `/back` consumes the remembered origin instead of producing one.
    fn records_origin(self) -> bool {
        self != TeleportKind::Back
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportOutcome {
    Teleported,
    CoolingDown { remaining_ms: u64 },
}

pub fn cooldown_message(remaining_ms: u64) -> String {
    format!(
        "You need to wait {} seconds more to be able to teleport.",
        remaining_ms / 1000
    )
}

/// Teleports `player` to `target` unless `kind` is cooling down.
///
/// `confirmation` is sent to the player right before the move.
pub fn attempt(
    host: &dyn ServerContext,
    state: &WaystoneState,
    player: &PlayerInfo,
    kind: TeleportKind,
    target: Location,
    confirmation: &str,
) -> Result<TeleportOutcome, ServerError> {
    let remaining_ms = host.remaining_activity_time(&player.player_id, kind.activity());
    if remaining_ms > 0 {
        debug!("⏳ {} {:?} cooling down, {} ms left", player.player_name, kind, remaining_ms);
        host.send_message(&player.player_id, &cooldown_message(remaining_ms))?;
        return Ok(TeleportOutcome::CoolingDown { remaining_ms });
    }

    if kind.records_origin() {
        state.remember_location(&player.player_id, Location::from(player.position));
    }

    host.send_message(&player.player_id, confirmation)?;
    host.teleport(&player.player_id, target.into())?;

    let cooldown_ms = kind.cooldown_ms(&state.config());
    host.set_activity_running(&player.player_id, kind.activity(), cooldown_ms);

    debug!("✨ {} {:?} teleport to {:?}", player.player_name, kind, target);
    Ok(TeleportOutcome::Teleported)
}
