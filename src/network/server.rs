//! Backend server
//!
//! The server accepts GUI connections, decodes their requests and hands them
//! to the consumer as events. Outbound frames are queued per connection so
//! each GUI sees its frames in the order they were sent.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

use super::connection::{Connection, ConnectionError, ConnectionHandle, Outbound};
use super::NetworkConfig;
use crate::protocol::{Frame, Message};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Unknown client: {0}")]
    UnknownClient(SocketAddr),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Events emitted by the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new GUI has connected
    ClientConnected {
        addr: SocketAddr,
        handle: ConnectionHandle,
    },
    /// A GUI has disconnected
    ClientDisconnected { addr: SocketAddr, reason: String },
    /// Received a frame from a GUI
    MessageReceived { addr: SocketAddr, frame: Frame },
    /// Server started
    Started { bind_addr: SocketAddr },
    /// Server stopped
    Stopped,
    /// Error occurred
    Error { message: String },
}

/// Information about a connected GUI
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Client address
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: std::time::Instant,
    /// Handle for sending frames to this client
    pub handle: ConnectionHandle,
}

type ClientMap = Arc<RwLock<HashMap<SocketAddr, ClientInfo>>>;

/// Decoded frames a connection holds while the event channel is full
const INBOUND_BACKLOG: usize = 64;

/// Backend server
pub struct Server {
    /// Server configuration
    config: NetworkConfig,
    /// Connected clients
    clients: ClientMap,
    /// Event sender
    event_tx: mpsc::Sender<ServerEvent>,
    /// Event receiver (for consumers)
    event_rx: Option<mpsc::Receiver<ServerEvent>>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Whether the server is running
    running: Arc<RwLock<bool>>,
    /// Address actually bound, once started
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Create a new server
    pub fn new(config: NetworkConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));

        Self {
            config,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx: None,
            running: Arc::new(RwLock::new(false)),
            local_addr: None,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Start the server
    pub async fn start(&mut self) -> ServerResult<()> {
        {
            let running = self.running.read().await;
            if *running {
                return Err(ServerError::AlreadyRunning);
            }
        }

        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!("Server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        {
            let mut running = self.running.write().await;
            *running = true;
        }

        let _ = self
            .event_tx
            .send(ServerEvent::Started {
                bind_addr: local_addr,
            })
            .await;

        let clients = self.clients.clone();
        let event_tx = self.event_tx.clone();
        let running = self.running.clone();
        let send_capacity = self.config.send_channel_capacity.max(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                tracing::info!("New connection from {}", addr);

                                let clients = clients.clone();
                                let event_tx = event_tx.clone();

                                tokio::spawn(async move {
                                    handle_client(stream, addr, clients, event_tx, send_capacity).await;
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                let _ = event_tx.send(ServerEvent::Error {
                                    message: format!("Accept error: {}", e),
                                }).await;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Server shutdown requested");
                        break;
                    }
                }
            }

            let mut running = running.write().await;
            *running = false;

            let _ = event_tx.send(ServerEvent::Stopped).await;
        });

        Ok(())
    }

    /// Stop accepting connections and close every open one
    pub async fn stop(&mut self) -> ServerResult<()> {
        {
            let running = self.running.read().await;
            if !*running {
                return Err(ServerError::NotRunning);
            }
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        let clients = self.clients.read().await;
        for client in clients.values() {
            let _ = client.handle.close().await;
        }

        Ok(())
    }

    /// Get a list of connected clients
    pub async fn clients(&self) -> Vec<ClientInfo> {
        let clients = self.clients.read().await;
        clients.values().cloned().collect()
    }

    /// Send a frame to a specific client
    pub async fn send_to(&self, addr: &SocketAddr, frame: Frame) -> ServerResult<()> {
        let handle = {
            let clients = self.clients.read().await;
            clients
                .get(addr)
                .map(|client| client.handle.clone())
                .ok_or(ServerError::UnknownClient(*addr))?
        };
        handle.send(frame).await?;
        Ok(())
    }

    /// Send an unsolicited message to all connected clients
    pub async fn broadcast(&self, message: Message) {
        let handles: Vec<ConnectionHandle> = {
            let clients = self.clients.read().await;
            clients.values().map(|client| client.handle.clone()).collect()
        };
        for handle in handles {
            let _ = handle.notify(message.clone()).await;
        }
    }

    /// Check if the server is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// Serve one GUI connection until it closes or sends something undecodable
async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    clients: ClientMap,
    event_tx: mpsc::Sender<ServerEvent>,
    send_capacity: usize,
) {
    let _ = stream.set_nodelay(true);
    let mut conn = Connection::new(stream, addr);

    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(send_capacity);
    let handle = ConnectionHandle::new(out_tx);

    {
        let mut clients = clients.write().await;
        clients.insert(
            addr,
            ClientInfo {
                addr,
                connected_at: std::time::Instant::now(),
                handle: handle.clone(),
            },
        );
    }

    let _ = event_tx
        .send(ServerEvent::ClientConnected {
            addr,
            handle: handle.clone(),
        })
        .await;

    // Decoded frames wait here until the event channel has room, so outbound
    // frames keep flowing while the consumer is busy replying.
    let mut inbound: VecDeque<Frame> = VecDeque::new();

    let disconnect_reason = loop {
        tokio::select! {
            result = conn.recv(), if inbound.len() < INBOUND_BACKLOG => {
                match result {
                    Ok(Some(frame)) => {
                        tracing::debug!("{} -> {} (xid {})", addr, frame.message, frame.xid);
                        inbound.push_back(frame);
                    }
                    Ok(None) => {
                        break "Connection closed".to_string();
                    }
                    Err(ConnectionError::Protocol(e)) => {
                        tracing::warn!("Dropping {} after undecodable frame: {}", addr, e);
                        break format!("Protocol error: {}", e);
                    }
                    Err(e) => {
                        break format!("Error: {}", e);
                    }
                }
            }

            permit = event_tx.reserve(), if !inbound.is_empty() => {
                let Ok(permit) = permit else {
                    break "Server event channel closed".to_string();
                };
                if let Some(frame) = inbound.pop_front() {
                    permit.send(ServerEvent::MessageReceived { addr, frame });
                }
            }

            Some(outbound) = out_rx.recv() => {
                match outbound {
                    Outbound::Frame(frame) => {
                        if let Err(e) = conn.send(&frame).await {
                            break format!("Send error: {}", e);
                        }
                    }
                    Outbound::Close => {
                        break "Server shutting down".to_string();
                    }
                }
            }
        }
    };

    handle.mark_disconnected();
    drop(out_rx);

    {
        let mut clients = clients.write().await;
        clients.remove(&addr);
    }

    for frame in inbound {
        let _ = event_tx.send(ServerEvent::MessageReceived { addr, frame }).await;
    }

    tracing::info!("Client {} disconnected: {}", addr, disconnect_reason);
    let _ = event_tx
        .send(ServerEvent::ClientDisconnected {
            addr,
            reason: disconnect_reason,
        })
        .await;

    let _ = conn.close().await;
}
