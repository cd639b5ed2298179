//! Core event handlers.
//!
//! Player events only touch the in-memory record; the next explicit save
//! (a command, `/xcore` or shutdown) writes them out.

use std::sync::Arc;
use tracing::debug;
use waystone_events::{
    EventError, EventSystem, PlayerCreatedEvent, PlayerDeathEvent, PlayerDisconnectedEvent,
    PlayerJoinedEvent, WorldReadyEvent,
};

use crate::state::WaystoneState;
use crate::types::{format_timestamp, Location};

pub async fn register_listeners(
    events: &EventSystem,
    state: Arc<WaystoneState>,
) -> Result<(), EventError> {
    let s = state.clone();
    events
        .on_core("world_ready", move |event: WorldReadyEvent| {
            s.load(&event.world_name);
            Ok(())
        })
        .await?;

    let s = state.clone();
    events
        .on_core("player_created", move |event: PlayerCreatedEvent| {
            let mut directory = s.directory();
            let record = directory.get(&event.player_id);
            record.player_name = event.player_name;
            record.player_uid = event.player_id.to_string();
            record.join_date = format_timestamp();
            Ok(())
        })
        .await?;

    let s = state.clone();
    events
        .on_core("player_joined", move |event: PlayerJoinedEvent| {
            let mut directory = s.directory();
            let record = directory.get(&event.player_id);
            record.player_name = event.player_name;
            record.player_uid = event.player_id.to_string();
            Ok(())
        })
        .await?;

    let s = state.clone();
    events
        .on_core("player_disconnected", move |event: PlayerDisconnectedEvent| {
            let mut directory = s.directory();
            let record = directory.get(&event.player_id);
            record.last_seen = format_timestamp();
            if let Some(position) = event.last_position {
                record.last_location = Some(Location::from(position));
            }
            Ok(())
        })
        .await?;

    let s = state;
    events
        .on_core("player_death", move |event: PlayerDeathEvent| {
            let mut directory = s.directory();
            let record = directory.get(&event.player_id);
            record.death_count += 1;
            debug!(
                "💀 {} died ({}), {} deaths",
                event.player_id,
                event.cause.as_deref().unwrap_or("unknown cause"),
                record.death_count
            );
            Ok(())
        })
        .await?;

    Ok(())
}
