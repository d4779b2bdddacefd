//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use realm_client::client::GameClient;
use realm_server::server::{bind_ephemeral, GameServer};
use realm_shared::config::RealmConfig;
use realm_shared::net::{decode_from_bytes, encode_to_bytes, NetMsg, SessionId, PROTOCOL_VERSION};
use realm_shared::player::{SPAWN_X, SPAWN_Y};

/// Unit-style test: protocol messages roundtrip correctly.
#[test]
fn protocol_messages_roundtrip() -> anyhow::Result<()> {
    let hello = NetMsg::Hello {
        protocol: PROTOCOL_VERSION,
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&hello)?)?, hello);

    let welcome = NetMsg::Welcome {
        session_id: SessionId(1),
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&welcome)?)?, welcome);

    let mine = NetMsg::MineRequest {
        x: 10,
        y: 10,
        level: "town".to_string(),
    };
    assert_eq!(decode_from_bytes(&encode_to_bytes(&mine)?)?, mine);

    Ok(())
}

fn test_config(data_dir: &std::path::Path) -> RealmConfig {
    RealmConfig {
        tick_hz: 50,
        tile_respawn_secs: 0.2,
        data_dir: data_dir.to_string_lossy().into_owned(),
        flush_secs: 0.1,
        ..Default::default()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Steps the server in the background and hands it back for assertions.
async fn run_server(mut server: GameServer, ticks: u32) -> anyhow::Result<GameServer> {
    let dt = 1.0 / server.cfg.tick_hz as f32;
    for _ in 0..ticks {
        server.step(dt).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    Ok(server)
}

async fn connect_and_login(cfg: &RealmConfig, name: &str) -> anyhow::Result<GameClient> {
    let mut client = GameClient::connect(cfg).await?;
    client.login(name).await?;
    anyhow::ensure!(
        client.wait_init(Duration::from_secs(2)).await?,
        "login timed out for {name}"
    );
    Ok(client)
}

/// Unknown name creates a default record; a later login reuses it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_creates_and_reuses_record() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (server, cfg) = bind_ephemeral(test_config(dir.path())).await?;
    let server_handle = tokio::spawn(run_server(server, 700));
    tokio::time::sleep(Duration::from_millis(20)).await;

    {
        let mut alice = connect_and_login(&cfg, "Alice").await?;
        let me = alice.roster.get(&alice.session_id).expect("own roster entry");
        assert_eq!(me.name, "Alice");
        assert_eq!((me.x, me.y), (SPAWN_X, SPAWN_Y));
        assert_eq!(me.level, "town");
        assert_eq!(me.glyph, '@');
        assert!(me.inventory.is_empty());
        assert_eq!(alice.world_seed, Some(cfg.world_seed));

        // Move somewhere memorable, then vanish.
        alice.send_move(50.0, 60.0, "town", '@').await?;
        alice.poll_for(Duration::from_millis(100)).await?;
    }

    // Give the server time to process the disconnect and flush.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let alice = connect_and_login(&cfg, "Alice").await?;
    let me = alice.roster.get(&alice.session_id).expect("own roster entry");
    assert_eq!((me.x, me.y), (50.0, 60.0), "record should survive reconnect");

    drop(alice);
    server_handle.await??;
    Ok(())
}

/// Alice mines a tile; both sessions see the hole, then the restore, and the
/// ledger forgets the key.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mined_tile_broadcasts_and_respawns() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    // Long enough (in ticks) that both clients observe the hole before the
    // restore fires; the stepped server runs ticks faster than wall time.
    let mut cfg = test_config(dir.path());
    cfg.tile_respawn_secs = 3.0;
    let (server, cfg) = bind_ephemeral(cfg).await?;
    let server_handle = tokio::spawn(run_server(server, 1000));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut alice = connect_and_login(&cfg, "Alice").await?;
    let mut bob = connect_and_login(&cfg, "Bob").await?;

    // Walk into range, then mine.
    alice.send_move(12.0, 10.0, "town", '@').await?;
    alice.send_mine(10, 10, "town").await?;

    let (ra, rb) = tokio::join!(
        alice.poll_for(Duration::from_millis(200)),
        bob.poll_for(Duration::from_millis(200))
    );
    ra?;
    rb?;

    let hole = alice
        .tile_overrides
        .get("town:10,10")
        .expect("alice sees the hole");
    assert_eq!(hole.glyph, ' ');
    assert!(bob.tile_overrides.contains_key("town:10,10"), "bob sees the hole");

    // Wait out the respawn delay.
    let (ra, rb) = tokio::join!(
        alice.poll_for(Duration::from_millis(1500)),
        bob.poll_for(Duration::from_millis(1500))
    );
    ra?;
    rb?;

    assert!(
        !alice.tile_overrides.contains_key("town:10,10"),
        "restore reached alice"
    );
    assert!(
        !bob.tile_overrides.contains_key("town:10,10"),
        "restore reached bob"
    );

    drop(alice);
    drop(bob);
    let server = server_handle.await??;
    assert_eq!(server.pending_changes(), 0, "ledger no longer holds the key");
    Ok(())
}

/// Mining outside the reach radius is rejected with a System notice.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_mine_is_rejected() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (server, cfg) = bind_ephemeral(test_config(dir.path())).await?;
    let server_handle = tokio::spawn(run_server(server, 400));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut alice = connect_and_login(&cfg, "Alice").await?;

    // Spawn is (200, 200); tile (10, 10) is far outside the radius.
    alice.send_mine(10, 10, "town").await?;
    alice.poll_for(Duration::from_millis(200)).await?;

    assert!(alice.tile_overrides.is_empty(), "no hole recorded");
    assert!(
        alice
            .chat_log
            .iter()
            .any(|m| m.user == "System" && m.text.contains("Too far")),
        "rejection notice arrived"
    );

    drop(alice);
    server_handle.await??;
    Ok(())
}

/// Room chat stays in the room; global chat reaches everyone.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_rooms_scope_messages() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (server, cfg) = bind_ephemeral(test_config(dir.path())).await?;
    let server_handle = tokio::spawn(run_server(server, 700));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut alice = connect_and_login(&cfg, "Alice").await?;
    let mut bob = connect_and_login(&cfg, "Bob").await?;

    alice.send_chat("/join tavern").await?;
    alice.poll_for(Duration::from_millis(100)).await?;
    assert!(
        alice
            .chat_log
            .iter()
            .any(|m| m.user == "System" && m.text.contains("tavern")),
        "join confirmation arrived"
    );

    alice.send_chat("secret plans").await?;
    bob.send_chat("hello everyone").await?;

    alice.poll_for(Duration::from_millis(200)).await?;
    bob.poll_for(Duration::from_millis(200)).await?;

    assert!(
        alice.chat_log.iter().any(|m| m.text == "secret plans"),
        "room echo reaches the sender"
    );
    assert!(
        !bob.chat_log.iter().any(|m| m.text == "secret plans"),
        "room chat stays in the room"
    );
    assert!(
        alice.chat_log.iter().any(|m| m.text == "hello everyone"),
        "global chat reaches room members"
    );
    assert!(
        bob.chat_log.iter().any(|m| m.text == "hello everyone"),
        "global chat echoes to the sender"
    );

    drop(alice);
    drop(bob);
    server_handle.await??;
    Ok(())
}

/// Summon flow: request relays, accept teleports the requester.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn summon_accept_teleports_requester() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (server, cfg) = bind_ephemeral(test_config(dir.path())).await?;
    let server_handle = tokio::spawn(run_server(server, 700));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut alice = connect_and_login(&cfg, "Alice").await?;
    let mut bob = connect_and_login(&cfg, "Bob").await?;

    alice.send_move(100.0, 100.0, "town", '@').await?;
    alice.poll_for(Duration::from_millis(100)).await?;

    bob.send_summon_request(alice.session_id).await?;
    alice.poll_for(Duration::from_millis(200)).await?;

    let &(from_id, ref from_name) = alice.summons.first().expect("summon offer arrived");
    assert_eq!(from_id, bob.session_id);
    assert_eq!(from_name, "Bob");

    alice.send_summon_accept(from_id).await?;
    bob.poll_for(Duration::from_millis(200)).await?;

    let (x, y, level) = bob.last_teleport.clone().expect("teleport arrived");
    assert_eq!((x, y), (100.0, 101.0));
    assert_eq!(level, "town");

    drop(alice);
    drop(bob);
    server_handle.await??;
    Ok(())
}

/// Mob state broadcasts arrive on the fixed mob tick.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mob_updates_broadcast_to_sessions() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (server, cfg) = bind_ephemeral(test_config(dir.path())).await?;
    let server_handle = tokio::spawn(run_server(server, 700));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut alice = connect_and_login(&cfg, "Alice").await?;
    alice.poll_for(Duration::from_millis(600)).await?;

    assert!(
        alice.mobs.values().any(|mobs| !mobs.is_empty()),
        "at least one level reported live mobs"
    );

    drop(alice);
    server_handle.await??;
    Ok(())
}
