//! Server implementation.
//!
//! This is the authoritative tick loop. Each step:
//! - drains every connection (joins, inputs, save/load requests)
//! - runs one simulation tick, claiming new players and feeding one queued
//!   input per player in the pre-tick hook
//! - stores the tick's forward delta in the history ring
//! - streams each client the deltas it has not seen yet, or a full snapshot
//!   when it needs one
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Avoid wall-clock-dependent branching in gameplay code.
//! - Use stable ordering when iterating collections.

use std::{
    collections::{BTreeMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, warn};
use voxnet_shared::{
    config::EngineConfig,
    engine::{apply_input, Simulation, TickHooks},
    error::{Error, FaultClass},
    history::DeltaHistory,
    input::{PlayerInput, TaggedInput},
    math::Vec3,
    net::{Acceptor, ClientId, Connection, ReliableListener},
    packet::{Packet, PacketType},
    protocol::{ChangeHeader, SnapshotHeader},
    state::{EntityId, EntityKind, EntityState, WorldState},
};

use crate::worldgen;

/// Extension of saved world files.
pub const SAVE_EXTENSION: &str = "vxw";

/// Connected client state.
struct ClientState {
    conn: Connection,
    name: Option<String>,
    /// Set by `PlayerId`; cleared when the next pre-tick spawns the player.
    claim_pending: bool,
    player: Option<EntityId>,
    needs_snapshot: bool,
    /// Newest tick this client has been sent, by delta or snapshot.
    last_sent: u64,
    inputs: VecDeque<TaggedInput>,
    last_input: PlayerInput,
    /// Id of the newest input consumed by the simulation.
    last_input_id: u64,
    /// Input ack in force at the end of each unsent tick.
    acks: BTreeMap<u64, u64>,
}

impl ClientState {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            name: None,
            claim_pending: false,
            player: None,
            needs_snapshot: false,
            last_sent: 0,
            inputs: VecDeque::new(),
            last_input: PlayerInput::neutral(),
            last_input_id: 0,
            acks: BTreeMap::new(),
        }
    }

    fn ack_at(&self, tick: u64) -> u64 {
        self.acks
            .range(..=tick)
            .next_back()
            .map(|(_, ack)| *ack)
            .unwrap_or(0)
    }
}

/// Requests that need the whole server rather than one client.
enum Request {
    Save(String),
    Load(String),
}

/// Claims pending players and feeds one input per player per tick.
struct AuthorityHooks<'a> {
    clients: &'a mut BTreeMap<ClientId, ClientState>,
    spawn: Vec3,
}

impl TickHooks for AuthorityHooks<'_> {
    fn pre_tick(&mut self, world: &mut WorldState) {
        let tick = world.tick() + 1;
        for (id, client) in self.clients.iter_mut() {
            if client.claim_pending {
                let player = world.stage_spawn(EntityState::player(self.spawn));
                client.player = Some(player);
                client.claim_pending = false;
                client.needs_snapshot = true;
                info!(client_id = ?id, player, name = ?client.name, "Player claimed");
            }
            let Some(player) = client.player else {
                continue;
            };
            if let Some(entity) = world.entity_mut(player) {
                let input = match client.inputs.pop_front() {
                    Some(tagged) => {
                        client.last_input = tagged.input;
                        client.last_input_id = tagged.input_id;
                        tagged.input
                    }
                    None => client.last_input.idle(),
                };
                apply_input(entity, input);
            }
            client.acks.insert(tick, client.last_input_id);
        }
    }
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,
    sim: Simulation,
    world: WorldState,
    history: DeltaHistory,
    clients: BTreeMap<ClientId, ClientState>,
    acceptor: Box<dyn Acceptor>,
    spawn: Vec3,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
    quit: bool,
}

impl GameServer {
    /// Creates a server over `acceptor` with a freshly generated world.
    pub fn new(cfg: EngineConfig, acceptor: Box<dyn Acceptor>) -> Self {
        let world = worldgen::generate(cfg.world_seed, cfg.world_size);
        info!(
            seed = cfg.world_seed,
            size = cfg.world_size,
            chunks = world.chunk_count(),
            "World generated"
        );
        Self::with_world(cfg, acceptor, world)
    }

    /// Creates a server over `acceptor` that simulates `world`.
    pub fn with_world(cfg: EngineConfig, acceptor: Box<dyn Acceptor>, world: WorldState) -> Self {
        Self {
            sim: Simulation::new(cfg.tick_hz),
            history: DeltaHistory::new(cfg.history_capacity),
            spawn: worldgen::spawn_point(cfg.world_size),
            world,
            clients: BTreeMap::new(),
            acceptor,
            console_rx: None,
            quit: false,
            cfg,
        }
    }

    /// Binds a TCP listener on `cfg.server_addr`.
    pub async fn bind(cfg: EngineConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr, cfg.max_payload_bytes).await?;
        Ok(Self::new(cfg, Box::new(listener)))
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Where the acceptor listens.
    pub fn local_label(&self) -> String {
        self.acceptor.local_label()
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Player entity of every claimed client, in client order.
    pub fn players(&self) -> Vec<EntityId> {
        self.clients.values().filter_map(|c| c.player).collect()
    }

    pub fn spawn_point(&self) -> Vec3 {
        self.spawn
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Registers a new connection. It joins once it sends `PlayerId`.
    pub fn add_client(&mut self, conn: Connection) -> ClientId {
        let id = conn.id();
        info!(client_id = ?id, peer = %conn.peer(), "Client connected");
        self.clients.insert(id, ClientState::new(conn));
        id
    }

    /// Tears a client down and stages its player's despawn.
    fn drop_client(&mut self, id: ClientId, reason: &Error) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        // A player staged this tick registers at the next tick's start and
        // leaves at its end.
        if let Some(player) = client.player {
            self.world.stage_despawn(player);
        }
        info!(client_id = ?id, player = ?client.player, %reason, "Client dropped");
    }

    /// Runs the server for a number of ticks, accepting connections between
    /// them.
    pub async fn run_for_ticks(&mut self, ticks: u64) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f64(1.0 / self.cfg.tick_hz as f64);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step().await?;
            self.accept_until(next).await;
        }
        Ok(())
    }

    /// Runs until the console asks to quit.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f64(1.0 / self.cfg.tick_hz as f64);
        let mut next = Instant::now();

        while !self.quit {
            next += dt;
            self.step().await?;
            self.accept_until(next).await;
        }
        info!(tick = self.world.tick(), "Server shutting down");
        Ok(())
    }

    async fn accept_until(&mut self, deadline: Instant) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                accepted = self.acceptor.accept() => match accepted {
                    Ok(conn) => {
                        self.add_client(conn);
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep_until(deadline).await;
                        return;
                    }
                },
            }
        }
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        self.process_console_commands().await;
        self.drain_connections().await;

        let mut out = Packet::new(PacketType::WorldChange);
        let mut hooks = AuthorityHooks {
            clients: &mut self.clients,
            spawn: self.spawn,
        };
        let changes = self.sim.tick(&mut self.world, &mut hooks, &mut out, false);
        self.history.store(changes.tick, &out);
        debug!(
            tick = changes.tick,
            bytes = out.size(),
            entities = self.world.entity_count(),
            "Tick"
        );

        self.stream()
    }

    async fn drain_connections(&mut self) {
        let mut faults = Vec::new();
        let mut requests = Vec::new();

        for (id, client) in self.clients.iter_mut() {
            loop {
                match client.conn.try_recv() {
                    Ok(Some(packet)) => match handle_packet(*id, client, packet) {
                        Ok(Some(request)) => requests.push(request),
                        Ok(None) => {}
                        Err(e) => {
                            faults.push((*id, e));
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        faults.push((*id, e));
                        break;
                    }
                }
            }
        }

        // Anything a client sends that cannot be read is that client's fault,
        // whatever class the decoder gave it.
        for (id, e) in faults {
            if e.class() != FaultClass::Io {
                warn!(client_id = ?id, error = %e, class = ?e.class(), "Bad packet from client");
            }
            self.drop_client(id, &e);
        }

        for request in requests {
            let result = match &request {
                Request::Save(stem) => self.save_world(stem).await.map(|path| {
                    info!(path = %path.display(), tick = self.world.tick(), "World saved");
                }),
                Request::Load(stem) => self.load_world(stem).await,
            };
            if let Err(e) = result {
                warn!(error = %e, "World file request failed");
            }
        }
    }

    /// Sends every client what it is missing. Only an invariant violation is
    /// returned; connection faults drop the client.
    fn stream(&mut self) -> anyhow::Result<()> {
        let tick = self.world.tick();
        let max_catchup = self.cfg.max_catchup_ticks.max(1) as u64;
        let mut snapshot: Option<Packet> = None;
        let mut dropped = Vec::new();

        for (id, client) in self.clients.iter_mut() {
            if client.player.is_none() {
                continue;
            }
            let result = if client.needs_snapshot {
                send_snapshot(client, &self.world, &mut snapshot, tick)
            } else {
                let last = tick.min(client.last_sent + max_catchup);
                send_deltas(client, &self.history, last).or_else(|e| match e.class() {
                    FaultClass::Desync => {
                        debug!(client_id = ?id, error = %e, "Catch-up fell out of history");
                        send_snapshot(client, &self.world, &mut snapshot, tick)
                    }
                    _ => Err(e),
                })
            };
            match result {
                Ok(()) => {
                    client.acks = client.acks.split_off(&client.last_sent);
                }
                Err(e) if e.class() == FaultClass::Invariant => {
                    error!(client_id = ?id, error = %e, "Invariant violated while streaming");
                    return Err(e).context("stream world changes");
                }
                Err(e) => dropped.push((*id, e)),
            }
        }

        for (id, e) in dropped {
            self.drop_client(id, &e);
        }
        Ok(())
    }

    /// Writes the current world to `save_dir/<stem>.vxw`. An empty stem
    /// picks a timestamped name.
    pub async fn save_world(&self, stem: &str) -> anyhow::Result<PathBuf> {
        let stem = if stem.is_empty() {
            chrono::Local::now().format("world-%Y%m%d-%H%M%S").to_string()
        } else {
            stem.to_string()
        };
        let path = self.save_path(&stem)?;
        tokio::fs::create_dir_all(&self.cfg.save_dir)
            .await
            .with_context(|| format!("create {}", self.cfg.save_dir))?;

        let mut packet = Packet::new(PacketType::WorldState);
        self.world.write_snapshot(&mut packet);
        tokio::fs::write(&path, packet.encode_frame())
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Replaces the world with `save_dir/<stem>.vxw`, re-spawns every
    /// claimed player and resnapshots everyone.
    pub async fn load_world(&mut self, stem: &str) -> anyhow::Result<()> {
        let path = self.save_path(stem)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let mut packet = Packet::decode_frame(&bytes)
            .with_context(|| format!("decode {}", path.display()))?;
        if packet.kind() != PacketType::WorldState {
            anyhow::bail!("{} holds a {} packet", path.display(), packet.kind().name());
        }
        let mut world = WorldState::read_snapshot(&mut packet)
            .with_context(|| format!("read snapshot {}", path.display()))?;

        // Players saved with the world belong to whoever was connected then.
        for id in world.entity_ids() {
            if world.kind_of(id) == EntityKind::Player {
                world.stage_despawn(id);
            }
        }
        for client in self.clients.values_mut() {
            if client.player.is_some() {
                client.player = Some(world.stage_spawn(EntityState::player(self.spawn)));
                client.needs_snapshot = true;
                client.acks.clear();
            }
        }

        self.world = world;
        self.history.clear();
        info!(
            path = %path.display(),
            tick = self.world.tick(),
            entities = self.world.entity_count(),
            "World loaded"
        );
        Ok(())
    }

    fn save_path(&self, stem: &str) -> anyhow::Result<PathBuf> {
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.starts_with('.') {
            anyhow::bail!("invalid save name {stem:?}");
        }
        Ok(PathBuf::from(&self.cfg.save_dir).join(format!("{stem}.{SAVE_EXTENSION}")))
    }

    async fn process_console_commands(&mut self) {
        // Collect lines first to avoid borrow conflict
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
            for out in self.exec_console(&line).await {
                println!("{}", out);
            }
        }
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return Vec::new();
        };

        match command {
            "status" => self.status(),
            "save" => match self.save_world(tokens.get(1).copied().unwrap_or("")).await {
                Ok(path) => vec![format!("Saved to {}", path.display())],
                Err(e) => vec![format!("Save failed: {e:#}")],
            },
            "load" => {
                let Some(stem) = tokens.get(1) else {
                    return vec!["Usage: load <name>".to_string()];
                };
                match self.load_world(stem).await {
                    Ok(()) => vec![format!("Loaded '{stem}'")],
                    Err(e) => vec![format!("Load failed: {e:#}")],
                }
            }
            "quit" | "exit" => {
                self.quit = true;
                vec!["Shutting down".to_string()]
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    /// Human-readable server state.
    pub fn status(&self) -> Vec<String> {
        let mut out = vec![
            format!("Listening: {}", self.acceptor.local_label()),
            format!("Tick: {}", self.world.tick()),
            format!(
                "World: seed={} chunks={} entities={}",
                self.world.seed(),
                self.world.chunk_count(),
                self.world.entity_count()
            ),
        ];
        if let Some((oldest, newest)) = self.history.tick_range() {
            out.push(format!("History: ticks {oldest}..={newest}"));
        }
        out.push(format!("Clients: {}", self.clients.len()));
        for (id, client) in &self.clients {
            out.push(format!(
                "  {:?}: peer={} name={} player={:?} sent={} queued={} ack={}",
                id,
                client.conn.peer(),
                client.name.as_deref().unwrap_or("-"),
                client.player,
                client.last_sent,
                client.inputs.len(),
                client.last_input_id,
            ));
        }
        out
    }
}

fn handle_packet(
    id: ClientId,
    client: &mut ClientState,
    mut packet: Packet,
) -> voxnet_shared::Result<Option<Request>> {
    match packet.kind() {
        PacketType::PlayerId => {
            let name: String = packet.read()?;
            if client.player.is_some() {
                debug!(client_id = ?id, "Resnapshot requested");
                client.needs_snapshot = true;
            } else if !client.claim_pending {
                info!(client_id = ?id, name = %name, "Join requested");
                client.claim_pending = true;
            }
            client.name = Some(name);
            Ok(None)
        }
        PacketType::ClientInput => {
            let tagged: TaggedInput = packet.read()?;
            let newest = client
                .inputs
                .back()
                .map_or(client.last_input_id, |t| t.input_id);
            if tagged.input_id > newest {
                client.inputs.push_back(tagged);
            }
            Ok(None)
        }
        PacketType::SaveWorld => Ok(Some(Request::Save(packet.read()?))),
        PacketType::LoadWorld => Ok(Some(Request::Load(packet.read()?))),
        other => Err(Error::UnexpectedPacket(other.name())),
    }
}

/// Sends the snapshot, building it on first use within a step.
fn send_snapshot(
    client: &mut ClientState,
    world: &WorldState,
    cached: &mut Option<Packet>,
    tick: u64,
) -> voxnet_shared::Result<()> {
    let body = cached.get_or_insert_with(|| {
        let mut p = Packet::new(PacketType::WorldState);
        world.write_snapshot(&mut p);
        p
    });
    let mut packet = Packet::new(PacketType::WorldState);
    packet.write(SnapshotHeader {
        player: client.player.unwrap_or_default(),
        input_ack: client.last_input_id,
    });
    packet.write_all(body.payload());
    client.conn.send(&packet)?;

    client.needs_snapshot = false;
    client.last_sent = tick;
    Ok(())
}

/// Sends deltas `last_sent + 1 ..= last`.
fn send_deltas(
    client: &mut ClientState,
    history: &DeltaHistory,
    last: u64,
) -> voxnet_shared::Result<()> {
    for tick in client.last_sent + 1..=last {
        let delta = history.get(tick, PacketType::WorldChange)?;
        let mut packet = Packet::new(PacketType::WorldChange);
        packet.write(ChangeHeader {
            tick,
            input_ack: client.ack_at(tick),
        });
        packet.write_all(delta.payload());
        client.conn.send(&packet)?;
        client.last_sent = tick;
    }
    Ok(())
}

/// Helper for tests: bind to an ephemeral port with a small world.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, EngineConfig)> {
    let mut cfg = EngineConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        tick_hz,
        world_size: 2,
        ..Default::default()
    };

    let listener = ReliableListener::bind(cfg.server_addr.parse()?, cfg.max_payload_bytes).await?;
    cfg.server_addr = listener.local_addr()?.to_string();

    Ok((GameServer::new(cfg.clone(), Box::new(listener)), cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxnet_shared::{net::LocalAcceptor, protocol};

    fn local_server(cfg: EngineConfig) -> (GameServer, voxnet_shared::net::LocalConnector) {
        let (acceptor, connector) = LocalAcceptor::new(cfg.max_payload_bytes);
        (GameServer::new(cfg, Box::new(acceptor)), connector)
    }

    fn small_cfg() -> EngineConfig {
        EngineConfig {
            world_size: 1,
            ..Default::default()
        }
    }

    /// Lets the connection tasks move queued frames.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn next_packet(conn: &mut Connection) -> Packet {
        tokio::time::timeout(Duration::from_secs(2), conn.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn server_loop_runs_on_a_spawned_task() {
        let (mut server, _connector) = local_server(small_cfg());
        let handle = tokio::spawn(async move {
            server.run_for_ticks(2).await?;
            Ok::<_, anyhow::Error>(server)
        });
        let server = handle.await.unwrap().unwrap();
        assert_eq!(server.tick(), 2);
    }

    #[tokio::test]
    async fn join_claims_player_and_snapshots() {
        let (mut server, connector) = local_server(small_cfg());
        let mut conn = connector.connect().unwrap();
        let server_conn = server.acceptor.accept().await.unwrap();
        server.add_client(server_conn);

        conn.send(&protocol::player_id("alice")).unwrap();
        settle().await;
        server.step().await.unwrap();

        let mut snapshot = next_packet(&mut conn).await;
        assert_eq!(snapshot.kind(), PacketType::WorldState);
        let header: SnapshotHeader = snapshot.read().unwrap();
        let world = WorldState::read_snapshot(&mut snapshot).unwrap();
        assert_eq!(world.tick(), 1);
        // Registered by the next tick, which arrives as a delta.
        assert!(world.entity(header.player).is_none());

        server.step().await.unwrap();
        let mut change = next_packet(&mut conn).await;
        assert_eq!(change.kind(), PacketType::WorldChange);
        let header2: ChangeHeader = change.read().unwrap();
        assert_eq!(header2.tick, 2);
        assert!(server.world().entity(header.player).is_some());
        assert_eq!(server.players(), vec![header.player]);
    }

    #[tokio::test]
    async fn inputs_are_consumed_once_per_tick_and_acked() {
        let (mut server, connector) = local_server(small_cfg());
        let mut conn = connector.connect().unwrap();
        let server_conn = server.acceptor.accept().await.unwrap();
        server.add_client(server_conn);
        conn.send(&protocol::player_id("bob")).unwrap();
        settle().await;
        server.step().await.unwrap();
        next_packet(&mut conn).await;

        for input_id in 1..=3 {
            conn.send(&protocol::client_input(TaggedInput {
                input_id,
                input: PlayerInput::neutral(),
            }))
            .unwrap();
        }
        // A duplicate is ignored.
        conn.send(&protocol::client_input(TaggedInput {
            input_id: 2,
            input: PlayerInput::neutral(),
        }))
        .unwrap();
        settle().await;

        let mut acks = Vec::new();
        for _ in 0..4 {
            server.step().await.unwrap();
            let mut change = next_packet(&mut conn).await;
            acks.push(change.read::<ChangeHeader>().unwrap().input_ack);
        }
        assert_eq!(acks, vec![1, 2, 3, 3]);
    }

    #[tokio::test]
    async fn garbage_drops_client_and_despawns_player() {
        let (mut server, connector) = local_server(small_cfg());
        let conn = connector.connect().unwrap();
        let server_conn = server.acceptor.accept().await.unwrap();
        server.add_client(server_conn);
        conn.send(&protocol::player_id("carol")).unwrap();
        settle().await;
        server.step().await.unwrap();
        server.step().await.unwrap();
        let player = server.players()[0];
        assert!(server.world().entity(player).is_some());

        // A server-to-client packet type is a protocol fault from a client.
        let mut bogus = Packet::new(PacketType::WorldChange);
        bogus.write(0u64);
        conn.send(&bogus).unwrap();
        settle().await;
        server.step().await.unwrap();
        assert_eq!(server.client_count(), 0);
        // Despawn was staged during the drain and applied by that tick.
        assert!(server.world().entity(player).is_none());
    }

    #[tokio::test]
    async fn catch_up_is_capped_and_evicted_history_resnapshots() {
        let cfg = EngineConfig {
            history_capacity: 8,
            max_catchup_ticks: 2,
            ..small_cfg()
        };
        let (mut server, connector) = local_server(cfg);
        let mut conn = connector.connect().unwrap();
        let server_conn = server.acceptor.accept().await.unwrap();
        let id = server.add_client(server_conn);
        conn.send(&protocol::player_id("dave")).unwrap();
        settle().await;
        server.step().await.unwrap();
        next_packet(&mut conn).await;

        // Pretend the client fell behind.
        if let Some(client) = server.clients.get_mut(&id) {
            client.last_sent = 0;
        }
        server.step().await.unwrap();
        let mut ticks = Vec::new();
        for _ in 0..2 {
            let mut p = next_packet(&mut conn).await;
            ticks.push(p.read::<ChangeHeader>().unwrap().tick);
        }
        assert_eq!(ticks, vec![1, 2]);

        // Fall further behind than the ring reaches.
        for _ in 0..10 {
            server.step().await.unwrap();
        }
        if let Some(client) = server.clients.get_mut(&id) {
            client.last_sent = 1;
        }
        server.step().await.unwrap();
        loop {
            let p = next_packet(&mut conn).await;
            if p.kind() == PacketType::WorldState {
                break;
            }
        }
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("voxnet-save-{}", std::process::id()));
        let cfg = EngineConfig {
            save_dir: dir.to_string_lossy().into_owned(),
            ..small_cfg()
        };
        let (mut server, _connector) = local_server(cfg);
        for _ in 0..3 {
            server.step().await.unwrap();
        }
        let saved = server.world().clone();
        let path = server.save_world("unit").await.unwrap();
        assert!(path.ends_with("unit.vxw"));

        for _ in 0..5 {
            server.step().await.unwrap();
        }
        assert_ne!(server.world(), &saved);
        server.load_world("unit").await.unwrap();
        assert_eq!(server.world(), &saved);

        assert!(server.load_world("../escape").await.is_err());
        assert!(server.load_world("missing").await.is_err());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn console_status_and_quit() {
        let (mut server, _connector) = local_server(small_cfg());
        server.step().await.unwrap();
        let lines = server.exec_console("status").await;
        assert!(lines.iter().any(|l| l == "Tick: 1"));
        assert!(!server.should_quit());
        server.exec_console("quit").await;
        assert!(server.should_quit());
    }
}
