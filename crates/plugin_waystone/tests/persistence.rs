use std::sync::Arc;
use tempfile::TempDir;

use waystone_events::{
    Caller, Clock, EntityPos, JsonFileStore, LocalServer, PlayerId, ServerContext,
};

async fn boot(dir: &TempDir) -> Arc<LocalServer> {
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let server = LocalServer::with_store("overworld", store, Clock::manual());
    server
        .load_plugin(plugin_waystone::plugin_instance())
        .await
        .unwrap();
    server.world_ready().await.unwrap();
    server
}

#[tokio::test]
async fn test_first_boot_writes_both_documents() {
    let dir = TempDir::new().unwrap();
    let _server = boot(&dir).await;

    let players = dir.path().join("Waystone/overworld/PlayerData.json");
    let config = dir.path().join("Waystone/Waystone.json");
    assert!(players.exists());
    assert!(config.exists());

    let config = std::fs::read_to_string(config).unwrap();
    assert!(config.contains("\"PlayerMaxHomes\": 5"));
}

#[tokio::test]
async fn test_existing_documents_load() {
    let dir = TempDir::new().unwrap();
    let world_dir = dir.path().join("Waystone/overworld");
    std::fs::create_dir_all(&world_dir).unwrap();

    std::fs::write(
        world_dir.join("PlayerData.json"),
        r#"{
            "uid-alice": {
                "PlayerUID": "uid-alice",
                "PlayerName": "Alice",
                "DeathCount": 4,
                "JoinDate": "3/14/2024 9:26:53 AM",
                "LastSeen": "3/15/2024 8:00:00 PM",
                "PlayerHomes": {
                    "base": { "X": -120.5, "Y": 72.0, "Z": 33.25, "Yaw": 1.5 }
                }
            }
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("Waystone/Waystone.json"),
        r#"{
            "PlayerMaxHomes": 2,
            "PlayerHomeTeleportCooldownSeconds": 30,
            "WarpLocations": { "market": { "X": 10.0, "Y": 64.0, "Z": 10.0, "Yaw": 0.0 } }
        }"#,
    )
    .unwrap();

    let server = boot(&dir).await;
    let alice = PlayerId::new("uid-alice");
    server
        .connect_player(&alice, "Alice", EntityPos::default())
        .await
        .unwrap();
    let me = Caller::Player(alice.clone());

    server.run_command(me.clone(), "/home base");
    assert_eq!(
        server.position(&alice),
        Some(EntityPos::new(-120.5, 72.0, 33.25, 1.5))
    );
    assert_eq!(
        server.remaining_activity_time(&alice, "HomeCooldown"),
        30_000
    );

    server.run_command(me.clone(), "/warp market");
    assert_eq!(
        server.position(&alice),
        Some(EntityPos::new(10.0, 64.0, 10.0, 0.0))
    );

    // a limit of 2 still allows a third home
    server.run_command(me.clone(), "/sethome two");
    server.run_command(me.clone(), "/sethome three");
    server.take_messages(&alice);
    server.run_command(me, "/sethome four");
    assert_eq!(
        server.take_messages(&alice),
        vec!["You used max number of homes ! Delete some to create new one."]
    );
}

#[tokio::test]
async fn test_homes_survive_restart() {
    let dir = TempDir::new().unwrap();
    let alice = PlayerId::new("uid-alice");

    {
        let server = boot(&dir).await;
        server
            .connect_player(&alice, "Alice", EntityPos::at(5.0, 6.0, 7.0))
            .await
            .unwrap();
        server.run_command(Caller::Player(alice.clone()), "/sethome");
        server.shutdown().await.unwrap();
    }

    let server = boot(&dir).await;
    server
        .connect_player(&alice, "Alice", EntityPos::default())
        .await
        .unwrap();
    server.run_command(Caller::Player(alice.clone()), "/home");
    assert_eq!(server.position(&alice), Some(EntityPos::at(5.0, 6.0, 7.0)));
}

#[tokio::test]
async fn test_unreadable_config_keeps_its_warps_on_disk() {
    let dir = TempDir::new().unwrap();
    let world_dir = dir.path().join("Waystone/overworld");
    std::fs::create_dir_all(&world_dir).unwrap();
    std::fs::write(
        world_dir.join("PlayerData.json"),
        r#"{ "uid-bob": { "PlayerUID": "uid-bob", "PlayerName": "Bob",
             "PlayerHomes": { "base": { "X": 1.0, "Y": 2.0, "Z": 3.0, "Yaw": 0.0 } } } }"#,
    )
    .unwrap();
    let config_path = dir.path().join("Waystone/Waystone.json");
    let broken_config =
        r#"{ "WarpLocations": { "town": { "X": 10.0, "Y": 64.0, "Z": 10.0, "Yaw": 0.0 } }, }"#;
    std::fs::write(&config_path, broken_config).unwrap();

    let server = boot(&dir).await;
    let alice = PlayerId::new("uid-alice");
    server
        .connect_player(&alice, "Alice", EntityPos::at(5.0, 6.0, 7.0))
        .await
        .unwrap();
    server.run_command(Caller::Player(alice.clone()), "/sethome");
    server.shutdown().await.unwrap();

    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), broken_config);
    let players = std::fs::read_to_string(world_dir.join("PlayerData.json")).unwrap();
    assert!(players.contains("uid-bob"));
    assert!(players.contains("uid-alice"));
}

#[tokio::test]
async fn test_unreadable_player_data_keeps_other_players() {
    let dir = TempDir::new().unwrap();
    let world_dir = dir.path().join("Waystone/overworld");
    std::fs::create_dir_all(&world_dir).unwrap();
    let players_path = world_dir.join("PlayerData.json");
    let broken_players = r#"{ "uid-bob": { "PlayerName": "Bob", "DeathCount": "many",
             "PlayerHomes": { "base": { "X": 1.0, "Y": 2.0, "Z": 3.0, "Yaw": 0.0 } } } }"#;
    std::fs::write(&players_path, broken_players).unwrap();

    let server = boot(&dir).await;
    let alice = PlayerId::new("uid-alice");
    server
        .connect_player(&alice, "Alice", EntityPos::at(5.0, 6.0, 7.0))
        .await
        .unwrap();
    server.grant_operator(&alice);
    server.run_command(Caller::Player(alice.clone()), "/setwarp town");
    server.run_command(Caller::Player(alice), "/sethome");
    server.shutdown().await.unwrap();

    assert_eq!(std::fs::read_to_string(&players_path).unwrap(), broken_players);
    let config = std::fs::read_to_string(dir.path().join("Waystone/Waystone.json")).unwrap();
    assert!(config.contains("\"town\""));
}
