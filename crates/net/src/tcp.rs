//! TCP transport
//!
//! Bridges the synchronous session loop with async sockets. Socket tasks run on
//! a private tokio runtime owned by the transport; the session only ever
//! touches non-blocking channel ends. Dropping the transport shuts the runtime
//! down, which closes every socket without draining.
//!
//! # Framing
//!
//! ```text
//! [len: u16 be][sender: u8][packet bytes...]      len = 1 + packet length
//! ```
//!
//! Right after accepting a socket the server writes a two byte hello
//! `[TRANSPORT_VERSION, assigned connection id]`. The server ignores the sender
//! byte of incoming frames and stamps the id it assigned to that socket.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, RwLock};

use crate::transport::{Target, Transport, TransportEvent};
use net_tetris_types::{ConnectionId, SERVER_ID};

/// Version byte of the transport hello
pub const TRANSPORT_VERSION: u8 = 1;

const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Outbound message handed to the socket tasks
#[derive(Debug)]
enum Outbound {
    Frame { target: Target, frame: Vec<u8> },
    Disconnect(ConnectionId),
}

#[derive(Debug)]
enum ClientOutbound {
    Frame(Vec<u8>),
    Close,
}

type ClientMap = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ClientOutbound>>>>;

/// Build a frame, or `None` if the packet does not fit the length prefix
pub fn encode_frame(from: ConnectionId, packet: &[u8]) -> Option<Vec<u8>> {
    let len = packet.len() + 1;
    if len > MAX_FRAME_LEN {
        return None;
    }
    let mut frame = Vec::with_capacity(len + 2);
    frame.extend_from_slice(&(len as u16).to_be_bytes());
    frame.push(from);
    frame.extend_from_slice(packet);
    Some(frame)
}

/// Read one frame; `Ok(None)` on a clean end of stream
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<(ConnectionId, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u16().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame without sender"));
    }
    let sender = reader.read_u8().await?;
    let mut packet = vec![0u8; len - 1];
    reader.read_exact(&mut packet).await?;
    Ok(Some((sender, packet)))
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Running TCP endpoint, either the listening server or one client
pub struct TcpTransport {
    _rt: Runtime,
    id: ConnectionId,
    local_addr: SocketAddr,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    out_tx: mpsc::UnboundedSender<Outbound>,
}

impl TcpTransport {
    /// Bind `addr` and start accepting clients
    pub fn listen(addr: SocketAddr) -> anyhow::Result<Self> {
        let rt = Runtime::new()?;
        let listener = rt.block_on(TcpListener::bind(addr))?;
        let local_addr = listener.local_addr()?;
        info!("listening on {}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        rt.spawn(async move {
            if let Err(e) = run_server(listener, event_tx, out_rx).await {
                error!("server stopped: {}", e);
            }
        });

        Ok(Self {
            _rt: rt,
            id: SERVER_ID,
            local_addr,
            event_rx,
            out_tx,
        })
    }

    /// Connect to a server and wait for its hello
    pub fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let rt = Runtime::new()?;
        let (mut reader, mut writer, id, local_addr) = rt.block_on(async {
            let mut socket = TcpStream::connect(addr).await?;
            socket.set_nodelay(true)?;
            let mut hello = [0u8; 2];
            socket.read_exact(&mut hello).await?;
            if hello[0] != TRANSPORT_VERSION {
                anyhow::bail!(
                    "server speaks transport version {}, expected {}",
                    hello[0],
                    TRANSPORT_VERSION
                );
            }
            let local_addr = socket.local_addr()?;
            let (reader, writer) = socket.into_split();
            Ok::<_, anyhow::Error>((reader, writer, hello[1], local_addr))
        })?;
        info!("connected to {} as connection {}", addr, id);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();

        rt.spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some((from, bytes))) => {
                        if event_tx.send(TransportEvent::Received { from, bytes }).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("read from server failed: {}", e);
                        break;
                    }
                }
            }
            info!("server closed the connection");
            let _ = event_tx.send(TransportEvent::Closed);
        });

        rt.spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Outbound::Frame { frame, .. } = msg {
                    if write_frame(&mut writer, &frame).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _rt: rt,
            id,
            local_addr,
            event_rx,
            out_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for TcpTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.event_rx.try_recv().ok()
    }

    fn send_from(&mut self, target: Target, from: ConnectionId, bytes: &[u8]) {
        match encode_frame(from, bytes) {
            Some(frame) => {
                let _ = self.out_tx.send(Outbound::Frame { target, frame });
            }
            None => warn!("dropping oversized packet of {} bytes", bytes.len()),
        }
    }

    fn disconnect(&mut self, id: ConnectionId) {
        let _ = self.out_tx.send(Outbound::Disconnect(id));
    }
}

async fn run_server(
    listener: TcpListener,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
) -> anyhow::Result<()> {
    let clients: ClientMap = Arc::new(RwLock::new(HashMap::new()));

    // Outbound dispatcher.
    {
        let clients = Arc::clone(&clients);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                match msg {
                    Outbound::Frame { target, frame } => {
                        let clients = clients.read().await;
                        for (&id, tx) in clients.iter() {
                            if target.includes(id) {
                                let _ = tx.send(ClientOutbound::Frame(frame.clone()));
                            }
                        }
                    }
                    Outbound::Disconnect(id) => {
                        if let Some(tx) = clients.write().await.remove(&id) {
                            let _ = tx.send(ClientOutbound::Close);
                        }
                    }
                }
            }
        });
    }

    let mut last_id = SERVER_ID;
    loop {
        let (socket, addr) = listener.accept().await?;
        let Some(id) = last_id.checked_add(1) else {
            warn!("no connection ids left, refusing {}", addr);
            continue;
        };
        last_id = id;
        info!("connection {} from {}", id, addr);

        let clients = Arc::clone(&clients);
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, id, &clients, &event_tx).await {
                warn!("connection {} error: {}", id, e);
            }
            clients.write().await.remove(&id);
            let _ = event_tx.send(TransportEvent::PeerDisconnected { id });
            info!("connection {} closed", id);
        });
    }
}

async fn handle_client(
    socket: TcpStream,
    id: ConnectionId,
    clients: &ClientMap,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> anyhow::Result<()> {
    socket.set_nodelay(true)?;
    let (mut reader, mut writer) = socket.into_split();
    writer.write_all(&[TRANSPORT_VERSION, id]).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<ClientOutbound>();
    clients.write().await.insert(id, tx);
    let _ = event_tx.send(TransportEvent::PeerConnected { id });

    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                ClientOutbound::Frame(frame) => {
                    if write_frame(&mut writer, &frame).await.is_err() {
                        break;
                    }
                }
                ClientOutbound::Close => {
                    let _ = writer.shutdown().await;
                    break;
                }
            }
        }
    });

    while let Some((claimed, bytes)) = read_frame(&mut reader).await? {
        if claimed != id {
            debug!("connection {} framed packet as {}", id, claimed);
        }
        if event_tx.send(TransportEvent::Received { from: id, bytes }).is_err() {
            break;
        }
    }

    write_task.abort();
    Ok(())
}
