//! Network module - Serves GUI connections over TCP
//!
//! Provides:
//! - Server for accepting GUI connections
//! - Connection framing on top of the protocol codec
//! - Per-connection handles for pushing frames to a GUI

mod connection;
mod server;

pub use connection::*;
pub use server::*;

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to
    pub bind_address: String,
    /// Capacity of the server event channel
    pub event_channel_capacity: usize,
    /// Capacity of each connection's outbound frame queue
    pub send_channel_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: crate::protocol::DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            event_channel_capacity: 256,
            send_channel_capacity: 256,
        }
    }
}

impl NetworkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_send_channel_capacity(mut self, capacity: usize) -> Self {
        self.send_channel_capacity = capacity;
        self
    }

    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
