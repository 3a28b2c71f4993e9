//! OpenPipes - control protocol between the GUI and the backend
//!
//! The backend reports topology (nodes, links, modules) to a GUI and accepts
//! module placement and state configuration requests over a binary,
//! big-endian, length-framed TCP protocol.
//!
//! - [`protocol`] holds the wire codec and the message registry
//! - [`network`] serves GUI connections on top of the codec
//! - [`demo`] answers requests from an in-memory catalogue
//! - [`config`] loads the backend's TOML configuration

pub mod config;
pub mod demo;
pub mod network;
pub mod protocol;
