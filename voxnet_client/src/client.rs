//! Client implementation.
//!
//! The client maintains:
//! - One reliable ordered connection to the server
//! - A predicted world running ahead of the authority
//! - Input aggregation between ticks
//! - Interpolation of entity positions between the last two ticks
//! - A render sink fed with every applied change

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use tracing::{debug, info, warn};
use voxnet_shared::{
    config::EngineConfig,
    engine::Simulation,
    error::{Error, Result},
    net::Connection,
    packet::{Packet, PacketType},
    protocol,
    render::{NullRenderer, RenderSink},
    state::{EntityId, TickChanges, WorldState},
};

use crate::{
    input::{InputAccumulator, InputState},
    interp::InterpBuffer,
    prediction::{Phase, Predictor},
};

/// High-level game client.
pub struct GameClient<R: RenderSink = NullRenderer> {
    conn: Connection,
    name: String,
    tick_hz: u32,
    predictor: Predictor,
    accumulator: InputAccumulator,
    interp: InterpBuffer,
    renderer: R,
    snapshots_loaded: u64,
}

impl GameClient<NullRenderer> {
    /// Connects to `cfg.server_addr` and asks to join.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %addr, "Connecting to server");
        let conn = Connection::connect(addr, cfg.max_payload_bytes).await?;
        Self::from_connection(conn, cfg, NullRenderer).context("send PlayerId")
    }
}

impl<R: RenderSink> GameClient<R> {
    /// Wraps an open connection and sends the join request.
    pub fn from_connection(conn: Connection, cfg: &EngineConfig, renderer: R) -> Result<Self> {
        let client = Self {
            conn,
            name: cfg.player_name.clone(),
            tick_hz: cfg.tick_hz,
            predictor: Predictor::new(Simulation::new(cfg.tick_hz), cfg.history_capacity),
            accumulator: InputAccumulator::default(),
            interp: InterpBuffer::default(),
            renderer,
            snapshots_loaded: 0,
        };
        client.request_snapshot()?;
        Ok(client)
    }

    fn request_snapshot(&self) -> Result<()> {
        debug!(name = %self.name, "requesting snapshot");
        self.conn.send(&protocol::player_id(&self.name))
    }

    pub fn world(&self) -> &WorldState {
        self.predictor.world()
    }

    pub fn player(&self) -> Option<EntityId> {
        self.predictor.player()
    }

    pub fn phase(&self) -> Phase {
        self.predictor.phase()
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn interp(&self) -> &InterpBuffer {
        &self.interp
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn snapshots_loaded(&self) -> u64 {
        self.snapshots_loaded
    }

    /// Records one sampled input frame.
    pub fn frame(&mut self, input: InputState) {
        self.accumulator.push(input);
    }

    /// Handles every packet already received. Returns how many were handled.
    ///
    /// Desyncs are recovered here by asking for a new snapshot; only protocol
    /// and connection faults are returned.
    pub fn poll_network(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Some(packet) = self.conn.try_recv()? {
            self.handle_packet(packet)?;
            handled += 1;
        }
        Ok(handled)
    }

    fn handle_packet(&mut self, mut packet: Packet) -> Result<()> {
        match packet.kind() {
            PacketType::WorldState => match self.predictor.load_snapshot(&mut packet) {
                Ok(changes) => {
                    self.snapshots_loaded += 1;
                    self.interp.reset(self.predictor.world());
                    self.present(&changes);
                    info!(
                        tick = changes.tick,
                        player = ?self.predictor.player(),
                        entities = self.predictor.world().entity_count(),
                        "World snapshot loaded"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "unreadable snapshot");
                    self.predictor.desync();
                    self.request_snapshot()?;
                }
            },
            PacketType::WorldChange => match self.predictor.reconcile(&mut packet) {
                Ok(changes) => {
                    if !changes.is_empty() {
                        self.interp.correct(self.predictor.world());
                        self.present(&changes);
                    }
                }
                Err(_) => self.request_snapshot()?,
            },
            other => return Err(Error::UnexpectedPacket(other.name())),
        }
        Ok(())
    }

    fn present(&mut self, changes: &TickChanges) {
        self.renderer
            .apply_tick_changes(self.predictor.world(), changes);
    }

    /// Advances one local tick: drain the network, then predict with the
    /// input gathered since the last tick and send it. Returns the predicted
    /// tick's changes, or `None` while no prediction ran.
    pub fn tick(&mut self) -> Result<Option<TickChanges>> {
        self.poll_network()?;

        let input = self.accumulator.take();
        let Some((tagged, changes)) = self.predictor.predict(input) else {
            return Ok(None);
        };
        self.conn.send(&protocol::client_input(tagged))?;
        self.interp.capture(self.predictor.world());
        self.present(&changes);
        Ok(Some(changes))
    }

    /// Waits until a snapshot has been loaded.
    pub async fn wait_for_snapshot(&mut self, timeout: Duration) -> anyhow::Result<()> {
        tokio::time::timeout(timeout, async {
            while self.predictor.phase() == Phase::AwaitingSnapshot {
                let packet = self.conn.recv().await?;
                self.handle_packet(packet)?;
            }
            Ok::<_, Error>(())
        })
        .await
        .context("timed out waiting for snapshot")??;
        Ok(())
    }

    /// Runs `n` ticks at the configured rate, feeding `input` every tick.
    pub async fn run_for_ticks(&mut self, n: u64, input: InputState) -> Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs_f64(1.0 / self.tick_hz as f64));
        for _ in 0..n {
            interval.tick().await;
            self.frame(input);
            self.tick()?;
        }
        Ok(())
    }

    /// Asks the server to save its world under `stem` (empty for a
    /// timestamped name).
    pub fn save_world(&self, stem: &str) -> Result<()> {
        self.conn.send(&protocol::save_world(stem))
    }

    /// Asks the server to replace its world with the save named `stem`.
    pub fn load_world(&self, stem: &str) -> Result<()> {
        self.conn.send(&protocol::load_world(stem))
    }

    /// Status lines for the console.
    pub fn status(&self) -> Vec<String> {
        let world = self.predictor.world();
        let mut out = vec![
            format!("Phase: {:?}", self.predictor.phase()),
            format!("Server: {}", self.conn.peer()),
            format!(
                "Tick: {} (confirmed {})",
                world.tick(),
                self.predictor.confirmed_tick()
            ),
            format!("Unacked inputs: {}", self.predictor.unacked_len()),
            format!("Entities: {}", world.entity_count()),
            format!("Snapshots loaded: {}", self.snapshots_loaded),
        ];
        if let Some(pos) = self
            .predictor
            .player()
            .and_then(|id| world.entity(id))
            .map(|e| e.body.position())
        {
            out.push(format!("Position: ({:.2}, {:.2}, {:.2})", pos.x, pos.y, pos.z));
        }
        out
    }
}
