//! Networking primitives.
//!
//! A [`Connection`] wraps any byte stream in two tokio tasks: a reader that
//! decodes frames into an inbound queue and a writer that drains an outbound
//! queue onto the stream. The simulation side only touches the two queues,
//! never the stream.
//!
//! Connections come from an [`Acceptor`]: [`ReliableListener`] over TCP, or
//! [`LocalAcceptor`] over in-memory duplex pipes for tests.

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    packet::{Packet, PacketHeader, HEADER_LEN},
};

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Framed duplex channel with queued inbound and outbound packets.
#[derive(Debug)]
pub struct Connection {
    id: ClientId,
    peer: String,
    inbound: mpsc::UnboundedReceiver<Result<Packet>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Starts the reader and writer tasks over `stream`. Must be called inside
    /// a tokio runtime.
    pub fn spawn<S>(stream: S, peer: impl Into<String>, max_payload: u32) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = ClientId::new_unique();
        let peer = peer.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, out_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(read_half, in_tx, max_payload, peer.clone()));
        tokio::spawn(write_loop(write_half, out_rx, peer.clone()));

        Self {
            id,
            peer,
            inbound,
            outbound,
            reader,
        }
    }

    /// Opens a TCP connection to `addr`.
    pub async fn connect(addr: SocketAddr, max_payload: u32) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::spawn(stream, addr.to_string(), max_payload))
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queues `packet` for sending. Fails once the writer has stopped.
    pub fn send(&self, packet: &Packet) -> Result<()> {
        self.outbound
            .send(packet.encode_frame())
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Next completed inbound packet, if any. A read fault is reported once,
    /// after every packet received before it.
    pub fn try_recv(&mut self) -> Result<Option<Packet>> {
        match self.inbound.try_recv() {
            Ok(Ok(packet)) => Ok(Some(packet)),
            Ok(Err(e)) => Err(e),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }

    /// Waits for the next inbound packet.
    pub async fn recv(&mut self) -> Result<Packet> {
        match self.inbound.recv().await {
            Some(result) => result,
            None => Err(Error::ConnectionClosed),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The writer exits by itself once the outbound sender is gone, after
        // flushing what was queued.
        self.reader.abort();
    }
}

async fn read_loop<R>(
    mut stream: R,
    tx: mpsc::UnboundedSender<Result<Packet>>,
    max_payload: u32,
    peer: String,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut stream, max_payload).await {
            Ok(packet) => {
                trace!(%peer, kind = packet.kind().name(), size = packet.size(), "recv");
                if tx.send(Ok(packet)).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(%peer, error = %e, "reader stopped");
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

async fn read_frame<R>(stream: &mut R, max_payload: u32) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    stream.read_exact(&mut raw).await.map_err(closed_on_eof)?;
    let header = PacketHeader::decode(&raw)?;
    if header.size > max_payload {
        return Err(Error::PayloadTooLarge {
            size: header.size as usize,
            max: max_payload as usize,
        });
    }
    let mut payload = vec![0u8; header.size as usize];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(closed_on_eof)?;
    Ok(Packet::with_payload(header.kind, &payload))
}

fn closed_on_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

async fn write_loop<W>(mut stream: W, mut rx: mpsc::UnboundedReceiver<Bytes>, peer: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = stream.write_all(&frame).await {
            debug!(%peer, error = %e, "writer stopped");
            return;
        }
        if let Err(e) = stream.flush().await {
            debug!(%peer, error = %e, "writer stopped");
            return;
        }
    }
    let _ = stream.shutdown().await;
}

/// Source of incoming connections.
#[async_trait]
pub trait Acceptor: Send + Sync {
    /// Waits for the next connection. Cancel-safe.
    async fn accept(&mut self) -> Result<Connection>;

    /// Human-readable listen address.
    fn local_label(&self) -> String;
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
    max_payload: u32,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr, max_payload: u32) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self {
            listener,
            max_payload,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl Acceptor for ReliableListener {
    async fn accept(&mut self) -> Result<Connection> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(Connection::spawn(stream, addr.to_string(), self.max_payload))
    }

    fn local_label(&self) -> String {
        self.listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "tcp".to_string())
    }
}

const LOCAL_PIPE_BYTES: usize = 256 * 1024;

/// In-memory acceptor; pair it with the [`LocalConnector`] from
/// [`LocalAcceptor::new`].
pub struct LocalAcceptor {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
    max_payload: u32,
}

/// Client side of a [`LocalAcceptor`].
#[derive(Debug, Clone)]
pub struct LocalConnector {
    outgoing: mpsc::UnboundedSender<DuplexStream>,
    max_payload: u32,
}

impl LocalAcceptor {
    pub fn new(max_payload: u32) -> (Self, LocalConnector) {
        let (outgoing, incoming) = mpsc::unbounded_channel();
        (
            Self {
                incoming,
                max_payload,
            },
            LocalConnector {
                outgoing,
                max_payload,
            },
        )
    }
}

#[async_trait]
impl Acceptor for LocalAcceptor {
    async fn accept(&mut self) -> Result<Connection> {
        let stream = self.incoming.recv().await.ok_or(Error::ConnectionClosed)?;
        Ok(Connection::spawn(stream, "local", self.max_payload))
    }

    fn local_label(&self) -> String {
        "local".to_string()
    }
}

impl LocalConnector {
    /// Opens a pipe to the acceptor.
    pub fn connect(&self) -> Result<Connection> {
        let (client, server) = tokio::io::duplex(LOCAL_PIPE_BYTES);
        self.outgoing
            .send(server)
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(Connection::spawn(client, "local", self.max_payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::FaultClass, packet::PacketType};

    #[tokio::test]
    async fn frames_cross_a_duplex_pipe() {
        let (a, b) = tokio::io::duplex(1024);
        let left = Connection::spawn(a, "left", 1024);
        let mut right = Connection::spawn(b, "right", 1024);

        let mut p = Packet::new(PacketType::PlayerId);
        p.write("steve");
        left.send(&p).unwrap();
        left.send(&Packet::new(PacketType::SaveWorld)).unwrap();

        let mut got = right.recv().await.unwrap();
        assert_eq!(got.kind(), PacketType::PlayerId);
        assert_eq!(got.read::<String>().unwrap(), "steve");
        assert_eq!(right.recv().await.unwrap().kind(), PacketType::SaveWorld);
    }

    #[tokio::test]
    async fn oversized_frame_is_a_protocol_fault() {
        let (a, b) = tokio::io::duplex(1024);
        let left = Connection::spawn(a, "left", 1024);
        let mut right = Connection::spawn(b, "right", 8);

        let mut p = Packet::new(PacketType::WorldChange);
        p.write_all(&[0u8; 64]);
        left.send(&p).unwrap();

        let err = right.recv().await.unwrap_err();
        assert_eq!(err.class(), FaultClass::Protocol);
    }

    #[tokio::test]
    async fn unknown_packet_type_is_a_protocol_fault() {
        let (mut raw, b) = tokio::io::duplex(1024);
        let mut conn = Connection::spawn(b, "peer", 1024);
        raw.write_all(&[99, 0, 0, 0, 0, 0, 0, 0]).await.unwrap();
        let err = conn.recv().await.unwrap_err();
        assert!(matches!(err, Error::UnknownPacketType(99)));
    }

    #[tokio::test]
    async fn peer_hangup_reports_closed() {
        let (a, b) = tokio::io::duplex(1024);
        let left = Connection::spawn(a, "left", 1024);
        let mut right = Connection::spawn(b, "right", 1024);
        drop(left);
        let err = right.recv().await.unwrap_err();
        assert_eq!(err.class(), FaultClass::Io);
    }

    #[tokio::test]
    async fn local_acceptor_pairs_connections() {
        let (mut acceptor, connector) = LocalAcceptor::new(1024);
        let client = connector.connect().unwrap();
        let mut server_side = acceptor.accept().await.unwrap();
        client.send(&Packet::new(PacketType::LoadWorld)).unwrap();
        assert_eq!(server_side.recv().await.unwrap().kind(), PacketType::LoadWorld);
        assert_ne!(client.id(), server_side.id());
    }

    #[tokio::test]
    async fn tcp_listener_accepts() {
        let mut listener = ReliableListener::bind("127.0.0.1:0".parse().unwrap(), 1024)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Connection::connect(addr, 1024).await.unwrap();
        let mut server_side = listener.accept().await.unwrap();
        client.send(&Packet::new(PacketType::ClientInput)).unwrap();
        assert_eq!(server_side.recv().await.unwrap().kind(), PacketType::ClientInput);
    }
}
