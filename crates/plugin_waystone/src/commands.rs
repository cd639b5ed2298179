//! Chat commands.
//!
//! Handlers run synchronously on the host's command thread. Commands issued
//! from the console have no player to act on and succeed without doing
//! anything, except `/xcore` which only flushes data.

use std::sync::Arc;
use tracing::{debug, warn};
use waystone_events::{
    ArgSpec, CommandContext, CommandRegistry, CommandResult, CommandSpec, PlayerId, PlayerInfo,
    Privilege, ServerError,
};

use crate::directory::{delete_home, get_home, list_homes, set_home};
use crate::state::WaystoneState;
use crate::teleport::{attempt, TeleportKind, TeleportOutcome};
use crate::types::Location;

pub const DEFAULT_HOME: &str = "default";

pub const MAX_HOMES_MESSAGE: &str = "You used max number of homes ! Delete some to create new one.";
pub const NO_LAST_LOCATION: &str = "No known last location !";
pub const SPAWN_NOT_SET: &str = "Spawn is not set !";

pub fn warp_missing_message(name: &str) -> String {
    format!("Warp with name {} does not exists !", name)
}

type Handler = fn(&WaystoneState, &CommandContext<'_>) -> CommandResult;

/// Registers every Waystone command with `registry`.
pub fn register_commands(registry: &CommandRegistry, state: Arc<WaystoneState>) {
    let add = |spec: CommandSpec, handler: Handler| {
        let state = state.clone();
        registry.register(spec, move |ctx| handler(&state, ctx));
    };

    add(
        CommandSpec::new("ping").with_description("Shows the ping of a player in seconds."),
        ping,
    );
    add(
        CommandSpec::new("sethome")
            .with_description("Sets home to current position.")
            .with_arg(ArgSpec::optional("name")),
        sethome,
    );
    add(
        CommandSpec::new("home")
            .with_description("Teleports to home.")
            .with_arg(ArgSpec::optional("name")),
        home,
    );
    add(
        CommandSpec::new("delhome")
            .with_description("Deletes stored home.")
            .with_arg(ArgSpec::required("name")),
        delhome,
    );
    add(
        CommandSpec::new("homes").with_description("Shows lists of homes."),
        homes,
    );
    add(
        CommandSpec::new("back").with_description("Goes back to your previous location."),
        back,
    );
    add(
        CommandSpec::new("setspawn")
            .with_description("Sets spawn to current location.")
            .requires_privilege(Privilege::ControlServer),
        setspawn,
    );
    add(
        CommandSpec::new("spawn").with_description("Teleports to spawn."),
        spawn,
    );
    add(
        CommandSpec::new("warp")
            .with_description("Teleports to named warp.")
            .with_arg(ArgSpec::required("name")),
        warp,
    );
    add(
        CommandSpec::new("setwarp")
            .with_description("Sets warp to this location.")
            .with_arg(ArgSpec::required("name"))
            .requires_privilege(Privilege::ControlServer),
        setwarp,
    );
    add(
        CommandSpec::new("delwarp")
            .with_description("Deletes warp.")
            .with_arg(ArgSpec::required("name"))
            .requires_privilege(Privilege::ControlServer),
        delwarp,
    );
    add(
        CommandSpec::new("warplist").with_description("List of available warps."),
        warplist,
    );
    add(
        CommandSpec::new("xcore")
            .with_description("Saves all Waystone data now.")
            .requires_privilege(Privilege::ControlServer),
        xcore,
    );
}

/// The calling player, if the caller is an online player.
fn calling_player(ctx: &CommandContext<'_>) -> Option<PlayerInfo> {
    let player_id = ctx.caller.player_id()?;
    let player = ctx.host.player(player_id);
    if player.is_none() {
        debug!("Command from offline player {}", player_id);
    }
    player
}

/// Chat messages are best effort; a player who left mid-command is skipped.
fn tell(ctx: &CommandContext<'_>, player_id: &PlayerId, message: &str) {
    if let Err(e) = ctx.host.send_message(player_id, message) {
        warn!("⚠️ Could not message {}: {}", player_id, e);
    }
}

fn teleport_result(result: Result<TeleportOutcome, ServerError>) -> CommandResult {
    match result {
        Ok(_) => CommandResult::ok(),
        Err(e) => CommandResult::error(format!("Teleport failed: {}", e)),
    }
}

fn ping(_state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    if let Some(player) = calling_player(ctx) {
        ctx.host.broadcast(&format!("Ping: {}", player.ping));
    }
    CommandResult::ok()
}

fn sethome(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };

    let name = ctx.arg(0);
    let max_homes = state.config().player_max_homes;
    let outcome = {
        let mut directory = state.directory();
        let record = directory.get(&player.player_id);
        set_home(
            record,
            name.unwrap_or(DEFAULT_HOME),
            Location::from(player.position),
            max_homes,
        )
    };

    if outcome.is_err() {
        tell(ctx, &player.player_id, MAX_HOMES_MESSAGE);
        return CommandResult::ok();
    }

    match name {
        Some(name) => tell(ctx, &player.player_id, &format!("Home {} set.", name)),
        None => tell(ctx, &player.player_id, "Home set."),
    }
    state.persist(CommandResult::ok())
}

fn home(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };

    let name = ctx.arg(0).unwrap_or(DEFAULT_HOME);
    let target = {
        let mut directory = state.directory();
        get_home(directory.get(&player.player_id), name)
    };

    match target {
        Some(target) => teleport_result(attempt(
            ctx.host,
            state,
            &player,
            TeleportKind::Home,
            target,
            "Teleporting...",
        )),
        None => {
            tell(ctx, &player.player_id, "Home not set.");
            CommandResult::ok()
        }
    }
}

fn delhome(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };
    let Some(name) = ctx.arg(0) else {
        return CommandResult::ok();
    };

    let removed = {
        let mut directory = state.directory();
        delete_home(directory.get(&player.player_id), name)
    };

    if !removed {
        return CommandResult::ok();
    }

    tell(ctx, &player.player_id, &format!("{} home deleted.", name));
    state.persist(CommandResult::ok())
}

fn homes(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };

    let mut directory = state.directory();
    let record = directory.get(&player.player_id);
    let lines: Vec<String> = std::iter::once(format!("Home list ({}):", record.homes.len()))
        .chain(list_homes(record).map(|(name, _)| format!(" - {}", name)))
        .collect();
    drop(directory);

    for line in &lines {
        tell(ctx, &player.player_id, line);
    }
    CommandResult::ok()
}

fn back(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };

    let Some(target) = state.last_location(&player.player_id) else {
        return CommandResult::error(NO_LAST_LOCATION);
    };

    let result = attempt(
        ctx.host,
        state,
        &player,
        TeleportKind::Back,
        target,
        "Teleporting to last position...",
    );
    if let Ok(TeleportOutcome::Teleported) = result {
        state.forget_location(&player.player_id);
    }
    teleport_result(result)
}

fn setspawn(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };

    state.registry().set_spawn(Location::from(player.position));
    tell(ctx, &player.player_id, "Spawn set.");
    state.persist(CommandResult::ok())
}

fn spawn(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };

    let Some(target) = state.registry().spawn() else {
        return CommandResult::error(SPAWN_NOT_SET);
    };

    teleport_result(attempt(
        ctx.host,
        state,
        &player,
        TeleportKind::Spawn,
        target,
        "Teleporting...",
    ))
}

fn warp(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };
    let Some(name) = ctx.arg(0) else {
        return CommandResult::ok();
    };

    let Some(target) = state.registry().warp(name) else {
        return CommandResult::error(warp_missing_message(name));
    };

    teleport_result(attempt(
        ctx.host,
        state,
        &player,
        TeleportKind::Warp,
        target,
        &format!("Teleporting to {}...", name),
    ))
}

fn setwarp(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };
    let Some(name) = ctx.arg(0) else {
        return CommandResult::ok();
    };

    // warps are shared, so the setter's facing is not kept
    state
        .registry()
        .set_warp(name, Location::from_coordinates(player.position));
    state.persist(CommandResult::ok_with(format!("Warp {} set.", name)))
}

fn delwarp(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    if calling_player(ctx).is_none() {
        return CommandResult::ok();
    }
    let Some(name) = ctx.arg(0) else {
        return CommandResult::ok();
    };

    let removed = state.registry().delete_warp(name);
    if !removed {
        return CommandResult::error(warp_missing_message(name));
    }
    state.persist(CommandResult::ok_with(format!("Warp {} removed", name)))
}

fn warplist(state: &WaystoneState, ctx: &CommandContext<'_>) -> CommandResult {
    let Some(player) = calling_player(ctx) else {
        return CommandResult::ok();
    };

    let names: Vec<String> = state
        .registry()
        .list_warps()
        .map(|(name, _)| name.to_string())
        .collect();

    if names.is_empty() {
        return CommandResult::ok_with("There are no warps.");
    }

    tell(ctx, &player.player_id, &format!("Warp list ({}):", names.len()));
    for name in &names {
        tell(ctx, &player.player_id, &format!(" - {}", name));
    }
    CommandResult::ok()
}

fn xcore(state: &WaystoneState, _ctx: &CommandContext<'_>) -> CommandResult {
    state.persist(CommandResult::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SaveFailurePolicy;
    use waystone_events::{Caller, EntityPos, LocalServer, MemoryStore, ServerContext};

    async fn setup() -> (Arc<LocalServer>, Arc<WaystoneState>, PlayerId) {
        let server = LocalServer::new("w");
        let state = Arc::new(WaystoneState::new(
            Arc::new(MemoryStore::new()),
            SaveFailurePolicy::LogOnly,
        ));
        state.load("w");
        register_commands(&server.commands(), state.clone());

        let id = PlayerId::new("uid-1");
        server
            .connect_player(&id, "Alice", EntityPos::new(1.0, 2.0, 3.0, 0.5))
            .await
            .unwrap();
        (server, state, id)
    }

    #[tokio::test]
    async fn test_all_commands_registered() {
        let (server, _state, _id) = setup().await;
        let names = server.commands().names();
        for name in [
            "back", "delhome", "delwarp", "home", "homes", "ping", "sethome", "setspawn", "setwarp",
            "spawn", "warp", "warplist", "xcore",
        ] {
            assert!(names.contains(&name.to_string()), "missing /{}", name);
        }
        assert_eq!(names.len(), 13);
    }

    #[tokio::test]
    async fn test_console_callers_do_nothing() {
        let (server, state, _id) = setup().await;

        for line in ["/sethome", "/setspawn", "/setwarp town", "/warp town", "/back", "/warplist"] {
            assert_eq!(server.run_command(Caller::Console, line), CommandResult::ok(), "{}", line);
        }
        assert!(state.registry().spawn().is_none());
        assert!(state.registry().warp("town").is_none());
    }

    #[tokio::test]
    async fn test_ping_broadcasts() {
        let (server, _state, id) = setup().await;
        server.set_ping(&id, 0.25).unwrap();

        server.run_command(Caller::Player(id), "/ping");
        assert_eq!(server.broadcasts(), vec!["Ping: 0.25"]);
    }

    #[tokio::test]
    async fn test_homes_listing() {
        let (server, _state, id) = setup().await;
        let me = Caller::Player(id.clone());

        server.run_command(me.clone(), "/sethome");
        server.run_command(me.clone(), "/sethome mine");
        server.take_messages(&id);

        server.run_command(me, "/homes");
        assert_eq!(
            server.take_messages(&id),
            vec!["Home list (2):", " - default", " - mine"]
        );
    }

    #[tokio::test]
    async fn test_warp_is_stored_without_facing() {
        let (server, state, id) = setup().await;
        server.grant_operator(&id);

        let result = server.run_command(Caller::Player(id), "/setwarp town");
        assert_eq!(result, CommandResult::ok_with("Warp town set."));
        assert_eq!(state.registry().warp("town"), Some(Location::new(1.0, 2.0, 3.0, 0.0)));
    }

    #[tokio::test]
    async fn test_spawn_keeps_facing() {
        let (server, state, id) = setup().await;
        server.grant_operator(&id);

        server.run_command(Caller::Player(id.clone()), "/setspawn");
        assert_eq!(state.registry().spawn(), Some(Location::new(1.0, 2.0, 3.0, 0.5)));
        assert_eq!(server.take_messages(&id), vec!["Spawn set."]);
    }
}
