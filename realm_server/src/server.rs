//! Server implementation.
//!
//! An authoritative fixed-timestep loop over a single state owner. It
//! supports:
//! - Login binding sessions to persistent player records
//! - Position/inventory mirroring and presence broadcasts
//! - A world-change ledger with timed tile restoration
//! - Mob AI ticking decoupled from the network tick
//! - Chat rooms with an append-only transcript
//! - Console commands (status, save, broadcast, quit)
//!
//! Concurrency notes:
//! - The `GameServer` task is the only mutator of game state.
//! - Per-connection tasks do IO only: a reader feeds decoded frames into one
//!   mpsc channel; a writer drains a per-session outbound channel.
//! - Keep simulation in the fixed timestep; never await client IO mid-tick.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use rand::thread_rng;
use realm_shared::{
    chat::{self, ChatCommand, ChatMessage, RateLimiter, GLOBAL_CHANNEL},
    config::RealmConfig,
    console::{Console, CvarFlags, CvarValue},
    event::{Outbox, Recipients},
    ledger::{ChangeLedger, WorldChange},
    math::Vec2,
    mob::{self, Mob, MobStep},
    net::{
        FrameWriter, NetMsg, OnlineEntry, ReliableConn, ReliableListener, SessionId,
        PROTOCOL_VERSION,
    },
    persist::{ChatTranscript, JsonUserStore, UserStore},
    player::{LiveSession, PlayerRecord, BASE_HP, SPAWN_LEVEL, SPAWN_X, SPAWN_Y},
    worldgen::{self, GeneratedWorld},
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Messages flowing from connection reader tasks into the tick loop.
enum Inbound {
    Msg(NetMsg),
    /// The connection died or closed; tear the session down.
    Closed,
}

/// Connected client state.
struct ClientConn {
    outbound: mpsc::UnboundedSender<NetMsg>,
    /// Present once the session has logged in.
    live: Option<LiveSession>,
    chat_limiter: RateLimiter,
}

/// Game server.
pub struct GameServer {
    pub cfg: RealmConfig,
    pub console: Console,

    world: GeneratedWorld,
    mobs: HashMap<String, Vec<Mob>>,
    clients: HashMap<SessionId, ClientConn>,
    ledger: ChangeLedger,
    store: JsonUserStore,
    transcript: ChatTranscript,
    outbox: Outbox,

    listener: ReliableListener,
    inbound_tx: mpsc::UnboundedSender<(SessionId, Inbound)>,
    inbound_rx: mpsc::UnboundedReceiver<(SessionId, Inbound)>,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,

    tick: u64,
}

impl GameServer {
    /// Creates a new server: binds the listener, generates the world from
    /// the configured seed, and opens the persistence files.
    pub async fn new(cfg: RealmConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;

        Self::with_listener(cfg, listener)
    }

    fn with_listener(cfg: RealmConfig, listener: ReliableListener) -> anyhow::Result<Self> {
        let mut world = worldgen::generate(cfg.world_seed);
        let mobs = std::mem::take(&mut world.mobs);
        info!(
            seed = cfg.world_seed,
            levels = world.levels.len(),
            mobs = mobs.values().map(Vec::len).sum::<usize>(),
            "World generated"
        );

        let data_dir = PathBuf::from(&cfg.data_dir);
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            warn!(dir = %data_dir.display(), error = %e, "Could not create data dir");
        }
        let store = JsonUserStore::open(data_dir.join("users.json"));
        let transcript = ChatTranscript::new(data_dir.join("chat_log.txt"));

        let mut console = Console::new();
        Self::register_cvars(&mut console, &cfg);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            cfg,
            console,
            world,
            mobs,
            clients: HashMap::new(),
            ledger: ChangeLedger::default(),
            store,
            transcript,
            outbox: Outbox::default(),
            listener,
            inbound_tx,
            inbound_rx,
            console_rx: None,
            tick: 0,
        })
    }

    fn register_cvars(console: &mut Console, cfg: &RealmConfig) {
        console.register_cvar(
            "sv_tickrate",
            CvarValue::Int(cfg.tick_hz as i64),
            "Server tick rate",
            CvarFlags::SERVER_ONLY,
        );
        console.register_cvar(
            "sv_mine_radius",
            CvarValue::Float(cfg.mine_radius as f64),
            "Maximum mining reach in tiles",
            CvarFlags::REPLICATED,
        );
        console.register_cvar(
            "sv_respawn_secs",
            CvarValue::Float(cfg.tile_respawn_secs as f64),
            "Seconds before a mined tile is restored",
            CvarFlags::NONE,
        );
        console.register_cvar(
            "sv_maxclients",
            CvarValue::Int(32),
            "Max connected clients",
            CvarFlags::NONE,
        );
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Current server tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Number of pending entries in the world-change ledger.
    pub fn pending_changes(&self) -> usize {
        self.ledger.len()
    }

    /// Number of connected sessions (logged in or not).
    pub fn session_count(&self) -> usize {
        self.clients.len()
    }

    fn mine_radius(&self) -> f32 {
        self.console
            .get_cvar("sv_mine_radius")
            .and_then(|v| v.as_float())
            .unwrap_or(self.cfg.mine_radius as f64) as f32
    }

    fn respawn_ticks(&self) -> u64 {
        let secs = self
            .console
            .get_cvar("sv_respawn_secs")
            .and_then(|v| v.as_float())
            .unwrap_or(self.cfg.tile_respawn_secs as f64);
        (secs * self.cfg.tick_hz as f64).ceil() as u64
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self, dt_sec: f32) -> anyhow::Result<()> {
        self.process_console_commands().await?;
        self.accept_pending().await;
        self.drain_inbound().await;

        if self.cfg.mob_tick_divisor > 0 && self.tick % self.cfg.mob_tick_divisor as u64 == 0 {
            self.mob_tick(dt_sec * self.cfg.mob_tick_divisor as f32);
        }

        self.sweep_ledger();

        if self.tick % self.cfg.flush_ticks() == 0 && self.store.is_dirty() {
            if let Err(e) = self.store.flush().await {
                warn!(error = %e, "User store flush failed");
            }
        }

        self.deliver_outbox();
        self.tick += 1;
        Ok(())
    }

    // ─── Connections ───

    /// Accepts any pending connections without blocking the tick.
    async fn accept_pending(&mut self) {
        loop {
            match tokio::time::timeout(Duration::from_millis(1), self.listener.accept()).await {
                Ok(Ok((conn, peer))) => {
                    if let Err(e) = self.handshake(conn, peer).await {
                        debug!(%peer, error = %e, "Handshake failed");
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Accept failed");
                    break;
                }
                Err(_) => break, // No pending connection.
            }
        }
    }

    async fn handshake(&mut self, mut conn: ReliableConn, peer: SocketAddr) -> anyhow::Result<()> {
        let hello = conn
            .recv_timeout(Duration::from_millis(500))
            .await?
            .context("handshake timeout")?;
        match hello {
            NetMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {
                let id = SessionId::new_unique();
                conn.send(&NetMsg::Welcome { session_id: id }).await?;

                let (mut reader, writer) = conn.into_split();
                let (out_tx, out_rx) = mpsc::unbounded_channel();

                // Reader task: frames in, channel out, Closed on error/EOF.
                let inbound = self.inbound_tx.clone();
                tokio::spawn(async move {
                    loop {
                        match reader.recv().await {
                            Ok(msg) => {
                                if inbound.send((id, Inbound::Msg(msg))).is_err() {
                                    break;
                                }
                            }
                            Err(_) => {
                                let _ = inbound.send((id, Inbound::Closed));
                                break;
                            }
                        }
                    }
                });

                // Writer task: drains the session's outbound queue.
                tokio::spawn(async move {
                    let mut writer: FrameWriter = writer;
                    let mut out_rx: mpsc::UnboundedReceiver<NetMsg> = out_rx;
                    while let Some(msg) = out_rx.recv().await {
                        if writer.send(&msg).await.is_err() {
                            break;
                        }
                    }
                });

                self.clients.insert(
                    id,
                    ClientConn {
                        outbound: out_tx,
                        live: None,
                        chat_limiter: RateLimiter::default(),
                    },
                );

                info!(session = %id, %peer, "Client connected");
                Ok(())
            }
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        }
    }

    async fn drain_inbound(&mut self) {
        while let Ok((id, inbound)) = self.inbound_rx.try_recv() {
            match inbound {
                Inbound::Msg(msg) => self.handle_message(id, msg).await,
                Inbound::Closed => self.handle_disconnect(id).await,
            }
        }
    }

    // ─── Message handling ───

    async fn handle_message(&mut self, id: SessionId, msg: NetMsg) {
        match msg {
            NetMsg::Login { name } => self.handle_login(id, name),
            NetMsg::Move {
                x,
                y,
                level,
                glyph,
                inventory,
            } => self.handle_move(id, x, y, level, glyph, inventory),
            NetMsg::MineRequest { x, y, level } => self.handle_mine(id, x, y, level),
            NetMsg::AttackRequest { mob_id, level } => self.handle_attack(id, mob_id, level),
            NetMsg::UpdateInventory { inventory } => {
                self.mutate_record(id, |r| r.inventory = inventory);
            }
            NetMsg::UpdateBank { bank_gold } => {
                self.mutate_record(id, |r| r.bank_gold = bank_gold);
            }
            NetMsg::AddFriend { name } => self.handle_add_friend(id, name),
            NetMsg::Chat { text } => self.handle_chat(id, text),
            NetMsg::SummonRequest { target } => self.handle_summon_request(id, target),
            NetMsg::SummonAccept { from } => self.handle_summon_accept(id, from),
            NetMsg::Disconnect { .. } => self.handle_disconnect(id).await,
            other => {
                debug!(session = %id, ?other, "Unexpected message ignored");
            }
        }
    }

    /// Binds the session to a load-or-created record and snapshots the world
    /// back to the caller.
    ///
    /// No authentication: two sessions may log in under one name; both
    /// mirror into the same record and the last write wins.
    fn handle_login(&mut self, id: SessionId, name: String) {
        let name = if name.trim().is_empty() {
            "Stranger".to_string()
        } else {
            name.trim().to_string()
        };

        let record = match self.store.get(&name) {
            Some(record) => record,
            None => {
                let record = PlayerRecord::fresh(&name);
                self.store.upsert(record.clone());
                record
            }
        };

        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        client.live = Some(LiveSession::bind(id, record));

        let players: Vec<_> = self
            .clients
            .values()
            .filter_map(|c| c.live.as_ref())
            .map(LiveSession::wire_state)
            .collect();

        self.outbox.push(
            Recipients::Only(id),
            NetMsg::Init {
                id,
                seed: self.world.seed,
                players,
                world_changes: self.ledger.snapshot(),
            },
        );
        self.broadcast_online_list();
        info!(session = %id, name = %name, "Login");
    }

    fn handle_move(
        &mut self,
        id: SessionId,
        x: f32,
        y: f32,
        level: String,
        glyph: char,
        inventory: Option<Vec<String>>,
    ) {
        let Some(live) = self.clients.get_mut(&id).and_then(|c| c.live.as_mut()) else {
            return;
        };
        live.record.x = x;
        live.record.y = y;
        live.record.level = level;
        live.record.glyph = glyph;
        if let Some(inventory) = inventory {
            live.record.inventory = inventory;
        }

        let record = live.record.clone();
        let state = live.wire_state();
        self.store.upsert(record);
        self.outbox
            .push(Recipients::AllExcept(id), NetMsg::PlayerUpdate(state));
    }

    /// Records a temporary terrain hole, guarded by the mining reach check.
    fn handle_mine(&mut self, id: SessionId, x: i32, y: i32, level: String) {
        let Some(live) = self.clients.get(&id).and_then(|c| c.live.as_ref()) else {
            return;
        };

        if self.world.level(&level).map_or(true, |l| !l.in_bounds(x, y)) {
            return;
        }

        let radius = self.mine_radius();
        let target = Vec2::new(x as f32, y as f32);
        if live.pos().dist_sq(target) > radius * radius {
            self.system_message(id, "Too far away to mine that.");
            return;
        }

        let change = WorldChange::hole(&level, x, y);
        self.outbox
            .push(Recipients::All, NetMsg::TileUpdate(change.clone()));
        let ttl = self.respawn_ticks();
        self.ledger.apply(change, self.tick, ttl);
    }

    /// Player swings at a mob; server resolves the damage.
    fn handle_attack(&mut self, id: SessionId, mob_id: u64, level: String) {
        let Some(live) = self.clients.get(&id).and_then(|c| c.live.as_ref()) else {
            return;
        };
        let player_name = live.record.name.clone();
        let player_pos = live.pos();
        let player_attack = live.attack();

        let radius = self.mine_radius();
        let Some(mob_pos) = self
            .mobs
            .get(&level)
            .and_then(|ms| ms.iter().find(|m| m.id == mob_id))
            .map(|m| m.pos())
        else {
            return;
        };
        if player_pos.dist_sq(mob_pos) > radius * radius {
            self.system_message(id, "Too far away to attack that.");
            return;
        }

        let mut slain = None;
        if let Some(mobs) = self.mobs.get_mut(&level) {
            if let Some(mob) = mobs.iter_mut().find(|m| m.id == mob_id) {
                let damage = mob::melee_damage(player_attack, mob.defense);
                mob.hp -= damage;
                debug!(session = %id, mob = %mob.name, damage, hp = mob.hp, "Attack resolved");
                if mob.is_dead() {
                    slain = Some(mob.name.clone());
                }
            }
            mobs.retain(|m| !m.is_dead());
        }

        if let Some(slain) = slain {
            self.outbox.push(
                Recipients::All,
                NetMsg::ChatEvent(ChatMessage::system(format!(
                    "{} slew the {}.",
                    player_name, slain
                ))),
            );
        }

        let states = self
            .mobs
            .get(&level)
            .map(|ms| ms.iter().map(Mob::wire_state).collect())
            .unwrap_or_default();
        self.outbox.push(
            Recipients::All,
            NetMsg::MobUpdate {
                level,
                mobs: states,
            },
        );
    }

    fn mutate_record(&mut self, id: SessionId, f: impl FnOnce(&mut PlayerRecord)) {
        let Some(live) = self.clients.get_mut(&id).and_then(|c| c.live.as_mut()) else {
            return;
        };
        f(&mut live.record);
        let record = live.record.clone();
        self.store.upsert(record);
    }

    fn handle_add_friend(&mut self, id: SessionId, name: String) {
        if self.store.get(&name).is_none() {
            self.system_message(id, format!("No adventurer named {} exists.", name));
            return;
        }
        let mut added = false;
        self.mutate_record(id, |r| {
            if !r.friends.contains(&name) {
                r.friends.push(name.clone());
                added = true;
            }
        });
        if added {
            self.system_message(id, format!("{} added to your friends.", name));
            self.broadcast_online_list();
        }
    }

    fn handle_chat(&mut self, id: SessionId, text: String) {
        if !chat::validate_text(&text) {
            self.system_message(id, "Message was empty or too long.");
            return;
        }

        let (user, limited) = {
            let Some(client) = self.clients.get_mut(&id) else {
                return;
            };
            let Some(live) = client.live.as_ref() else {
                return;
            };
            let user = live.record.name.clone();
            let limited = !client.chat_limiter.record_message();
            (user, limited)
        };
        if limited {
            self.system_message(id, "You are sending messages too quickly.");
            return;
        }

        match chat::parse_command(&text) {
            Some(ChatCommand::Join(room)) => {
                let Some(live) = self.clients.get_mut(&id).and_then(|c| c.live.as_mut()) else {
                    return;
                };
                live.chat_channel = room.clone();
                self.system_message(id, format!("Joined room: [{}]", room));
            }
            Some(ChatCommand::Global) => {
                let Some(live) = self.clients.get_mut(&id).and_then(|c| c.live.as_mut()) else {
                    return;
                };
                live.chat_channel = GLOBAL_CHANNEL.to_string();
                self.system_message(id, "Switched to World Chat.");
            }
            Some(ChatCommand::Emote(action)) => {
                let channel = self.current_channel(id);
                self.relay_chat(ChatMessage::new(&user, &format!("* {} *", action), &channel));
            }
            None => {
                let channel = self.current_channel(id);
                self.relay_chat(ChatMessage::new(&user, &text, &channel));
            }
        }
    }

    fn current_channel(&self, id: SessionId) -> String {
        self.clients
            .get(&id)
            .and_then(|c| c.live.as_ref())
            .map(|l| l.chat_channel.clone())
            .unwrap_or_else(|| GLOBAL_CHANNEL.to_string())
    }

    /// Routes an accepted message: global to everyone, rooms to members.
    fn relay_chat(&mut self, msg: ChatMessage) {
        self.transcript.append(&msg.user, &msg.text);

        if msg.channel == GLOBAL_CHANNEL {
            self.outbox.push(Recipients::All, NetMsg::ChatEvent(msg));
            return;
        }

        let members: Vec<SessionId> = self
            .clients
            .iter()
            .filter(|(_, c)| {
                c.live
                    .as_ref()
                    .map_or(false, |l| l.chat_channel == msg.channel)
            })
            .map(|(&sid, _)| sid)
            .collect();
        for sid in members {
            self.outbox
                .push(Recipients::Only(sid), NetMsg::ChatEvent(msg.clone()));
        }
    }

    fn handle_summon_request(&mut self, id: SessionId, target: SessionId) {
        let Some(from_name) = self
            .clients
            .get(&id)
            .and_then(|c| c.live.as_ref())
            .map(|l| l.record.name.clone())
        else {
            return;
        };
        if self
            .clients
            .get(&target)
            .map_or(false, |c| c.live.is_some())
        {
            self.outbox.push(
                Recipients::Only(target),
                NetMsg::SummonReceived {
                    from_id: id,
                    from_name,
                },
            );
        }
    }

    /// The accepter pulls the original requester to their side.
    fn handle_summon_accept(&mut self, id: SessionId, from: SessionId) {
        let Some(anchor) = self
            .clients
            .get(&id)
            .and_then(|c| c.live.as_ref())
            .map(|l| (l.record.x, l.record.y, l.record.level.clone()))
        else {
            return;
        };

        let Some(caller) = self.clients.get_mut(&from).and_then(|c| c.live.as_mut()) else {
            return;
        };
        caller.record.x = anchor.0;
        caller.record.y = anchor.1 + 1.0;
        caller.record.level = anchor.2;

        let record = caller.record.clone();
        let state = caller.wire_state();
        let (x, y, level) = (record.x, record.y, record.level.clone());
        self.store.upsert(record);

        self.outbox.push(Recipients::All, NetMsg::PlayerUpdate(state));
        self.outbox
            .push(Recipients::Only(from), NetMsg::Teleported { x, y, level });
    }

    /// Final flush, removal, and presence broadcast for a dead or departing
    /// session.
    async fn handle_disconnect(&mut self, id: SessionId) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        if let Some(live) = client.live {
            self.store.upsert(live.record);
            if let Err(e) = self.store.flush().await {
                warn!(error = %e, "Flush on disconnect failed");
            }
            self.outbox
                .push(Recipients::All, NetMsg::PlayerDisconnect { id });
            self.broadcast_online_list();
        }
        info!(session = %id, "Client disconnected");
    }

    // ─── Tick phases ───

    /// Advances mob AI for every level and broadcasts the resulting state.
    ///
    /// A level with no mob list simply no-ops.
    fn mob_tick(&mut self, dt_sec: f32) {
        let mut mobs = std::mem::take(&mut self.mobs);
        let mut attacks: Vec<(SessionId, i32, String)> = Vec::new();
        let mut rng = thread_rng();

        for (level_id, level_mobs) in mobs.iter_mut() {
            if level_mobs.is_empty() {
                continue;
            }
            let Some(level_map) = self.world.level(level_id) else {
                continue;
            };

            // Connected players on this level, with the stats the AI needs.
            let players: Vec<(SessionId, Vec2, i32)> = self
                .clients
                .values()
                .filter_map(|c| c.live.as_ref())
                .filter(|l| l.record.level == *level_id)
                .map(|l| (l.id, l.pos(), l.defense()))
                .collect();

            for m in level_mobs.iter_mut() {
                let nearest = players
                    .iter()
                    .min_by(|a, b| {
                        m.pos()
                            .dist_sq(a.1)
                            .total_cmp(&m.pos().dist_sq(b.1))
                    })
                    .copied();

                // In aggro range the AI gets a real target; otherwise the
                // sentinel walks it back to idle.
                let target = match nearest {
                    Some((_, pos, _)) if m.pos().dist(pos) <= mob::AGGRO_RADIUS => pos,
                    _ => mob::FAR_AWAY,
                };

                let step = m.ai_step(target, dt_sec, |x, y| level_map.walkable(x, y));
                if step == MobStep::Attacked {
                    if let Some((sid, _, defense)) = nearest {
                        let damage = mob::melee_damage(m.attack, defense);
                        attacks.push((sid, damage, m.name.clone()));
                    }
                }

                m.wander(&mut rng, |x, y| level_map.walkable(x, y));
            }

            let states = level_mobs.iter().map(Mob::wire_state).collect();
            self.outbox.push(
                Recipients::All,
                NetMsg::MobUpdate {
                    level: level_id.clone(),
                    mobs: states,
                },
            );
        }
        self.mobs = mobs;

        for (sid, damage, mob_name) in attacks {
            self.apply_mob_damage(sid, damage, &mob_name);
        }
    }

    /// HP mutation and (player) death handling, same tick as the swing.
    fn apply_mob_damage(&mut self, id: SessionId, damage: i32, mob_name: &str) {
        let Some(live) = self.clients.get_mut(&id).and_then(|c| c.live.as_mut()) else {
            return;
        };
        live.hp -= damage;
        debug!(session = %id, damage, hp = live.hp, mob = mob_name, "Mob attack landed");

        if live.hp <= 0 {
            let name = live.record.name.clone();
            live.hp = BASE_HP;
            live.record.x = SPAWN_X;
            live.record.y = SPAWN_Y;
            live.record.level = SPAWN_LEVEL.to_string();

            let record = live.record.clone();
            let state = live.wire_state();
            self.store.upsert(record);

            self.outbox.push(Recipients::All, NetMsg::PlayerUpdate(state));
            self.outbox.push(
                Recipients::Only(id),
                NetMsg::Teleported {
                    x: SPAWN_X,
                    y: SPAWN_Y,
                    level: SPAWN_LEVEL.to_string(),
                },
            );
            self.outbox.push(
                Recipients::All,
                NetMsg::ChatEvent(ChatMessage::system(format!(
                    "{} was slain by a {}.",
                    name, mob_name
                ))),
            );
        }
    }

    /// Restores expired ledger entries; only keys still present fire.
    fn sweep_ledger(&mut self) {
        for change in self.ledger.sweep_expired(self.tick) {
            self.outbox.push(
                Recipients::All,
                NetMsg::TileRestore {
                    x: change.x,
                    y: change.y,
                    level: change.level,
                },
            );
        }
    }

    // ─── Broadcast plumbing ───

    fn broadcast_online_list(&mut self) {
        let list: Vec<OnlineEntry> = self
            .clients
            .values()
            .filter_map(|c| c.live.as_ref())
            .map(|l| OnlineEntry {
                id: l.id,
                name: l.record.name.clone(),
                level: l.record.level.clone(),
                friends: l.record.friends.clone(),
            })
            .collect();
        self.outbox.push(Recipients::All, NetMsg::OnlineList(list));
    }

    fn system_message(&mut self, id: SessionId, text: impl Into<String>) {
        self.outbox.push(
            Recipients::Only(id),
            NetMsg::ChatEvent(ChatMessage::system(text)),
        );
    }

    /// Fans queued messages out to session channels. A full or closed
    /// channel is skipped; the reader task reports the close separately.
    fn deliver_outbox(&mut self) {
        for (recipients, msg) in self.outbox.drain() {
            match recipients {
                Recipients::All => {
                    for client in self.clients.values() {
                        let _ = client.outbound.send(msg.clone());
                    }
                }
                Recipients::AllExcept(skip) => {
                    for (&sid, client) in &self.clients {
                        if sid != skip {
                            let _ = client.outbound.send(msg.clone());
                        }
                    }
                }
                Recipients::Only(sid) => {
                    if let Some(client) = self.clients.get(&sid) {
                        let _ = client.outbound.send(msg);
                    }
                }
            }
        }
    }

    // ─── Console ───

    async fn process_console_commands(&mut self) -> anyhow::Result<()> {
        // Collect lines first to avoid borrow conflict.
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            let out = self.exec_console(&line).await?;
            for entry in out {
                println!("{}", entry);
            }
        }
        Ok(())
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        match tokens[0] {
            "status" => {
                let mut out = Vec::new();
                out.push(format!("Tick: {}", self.tick));
                out.push(format!("Seed: {}", self.world.seed));
                out.push(format!("Pending world changes: {}", self.ledger.len()));
                out.push(format!("Sessions: {}", self.clients.len()));
                for (id, client) in &self.clients {
                    match &client.live {
                        Some(l) => out.push(format!(
                            "  {}: {} @ {}({:.0},{:.0}) hp={}",
                            id, l.record.name, l.record.level, l.record.x, l.record.y, l.hp
                        )),
                        None => out.push(format!("  {}: (not logged in)", id)),
                    }
                }
                for (level, mobs) in &self.mobs {
                    out.push(format!("  {}: {} mobs", level, mobs.len()));
                }
                Ok(out)
            }
            "save" => {
                self.store.flush().await?;
                Ok(vec!["User store flushed.".to_string()])
            }
            "broadcast" => {
                let text = tokens[1..].join(" ");
                if text.is_empty() {
                    return Ok(vec!["Usage: broadcast <text>".to_string()]);
                }
                self.outbox.push(
                    Recipients::All,
                    NetMsg::ChatEvent(ChatMessage::system(text)),
                );
                Ok(Vec::new())
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                self.store.flush().await?;
                std::process::exit(0);
            }
            _ => {
                // Delegate to the cvar console.
                self.console.exec(line)
            }
        }
    }
}

/// Helper for tests: bind to an ephemeral port with the given config.
pub async fn bind_ephemeral(mut cfg: RealmConfig) -> anyhow::Result<(GameServer, RealmConfig)> {
    cfg.server_addr = "127.0.0.1:0".to_string();
    let listener = ReliableListener::bind(cfg.server_addr.parse()?).await?;
    let addr = listener.local_addr()?;
    cfg.server_addr = addr.to_string();

    let server = GameServer::with_listener(cfg.clone(), listener)?;
    Ok((server, cfg))
}
