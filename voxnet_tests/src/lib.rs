//! Shared fixtures for the integration tests.
//!
//! [`LocalRig`] wires one server and one client over in-memory pipes and
//! drives them in lockstep, so every test sees the same interleaving.

use std::time::Duration;

use tracing::debug;
use voxnet_client::{input::InputState, GameClient};
use voxnet_server::GameServer;
use voxnet_shared::{
    config::EngineConfig,
    net::{Acceptor, LocalAcceptor, LocalConnector},
    render::RecordingRenderer,
};

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Small, fast world for tests.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        world_size: 2,
        ..Default::default()
    }
}

/// Gives the connection tasks time to move queued frames.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(15)).await;
}

/// A server and one joined client over a [`LocalAcceptor`].
pub struct LocalRig {
    pub server: GameServer,
    pub client: GameClient<RecordingRenderer>,
    pub connector: LocalConnector,
    pub cfg: EngineConfig,
}

impl LocalRig {
    /// Builds the pair, lets the client join and waits for its snapshot.
    pub async fn join(cfg: EngineConfig) -> anyhow::Result<Self> {
        init_tracing();
        let (mut acceptor, connector) = LocalAcceptor::new(cfg.max_payload_bytes);
        let conn = connector.connect()?;
        let server_conn = acceptor.accept().await?;

        let mut server = GameServer::new(cfg.clone(), Box::new(acceptor));
        server.add_client(server_conn);
        let mut client = GameClient::from_connection(conn, &cfg, RecordingRenderer::default())?;

        settle().await;
        server.step().await?;
        client.wait_for_snapshot(Duration::from_secs(5)).await?;
        debug!(tick = client.world().tick(), "rig joined");

        Ok(Self {
            server,
            client,
            connector,
            cfg,
        })
    }

    /// One client tick followed by one server tick.
    pub async fn lockstep(&mut self, input: InputState) -> anyhow::Result<()> {
        self.client.frame(input);
        self.client.tick()?;
        settle().await;
        self.server.step().await?;
        settle().await;
        Ok(())
    }

    /// Lets the client consume everything the server has sent.
    pub async fn drain(&mut self) -> anyhow::Result<()> {
        settle().await;
        self.client.poll_network()?;
        Ok(())
    }
}
