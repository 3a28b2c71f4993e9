//! OpenPipes backend
//!
//! Serves the OpenPipes control protocol to GUIs and provides tooling to
//! inspect captured traffic.

use std::path::{Path, PathBuf};

use bytes::BytesMut;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use openpipes::config::{self, Config};
use openpipes::demo::DemoBackend;
use openpipes::network::{Server, ServerEvent};
use openpipes::protocol::{self, CodecError, Decoder, Frame, Header, Registry, MAX_FRAME_SIZE};

/// OpenPipes - GUI control protocol backend
#[derive(Parser)]
#[command(name = "openpipes")]
#[command(author = "OpenPipes Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Serve and inspect the OpenPipes control protocol", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backend and accept GUI connections
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not answer requests from the demo catalogue
        #[arg(long)]
        no_demo: bool,
    },

    /// Decode a file of raw frames sent by a GUI
    Decode {
        /// Capture file holding back-to-back frames
        file: PathBuf,

        /// Print frames as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { port, no_demo } => {
            run_server(config, port, no_demo).await?;
        }
        Commands::Decode { file, json } => {
            decode_capture(&file, json)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

/// Run the backend server
async fn run_server(config: Config, port: Option<u16>, no_demo: bool) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);
    let mut demo = (config.demo.enabled && !no_demo).then(DemoBackend::new);
    let announce = config.demo.announce_topology;

    tracing::info!("Starting OpenPipes backend on {}:{}", config.server.bind_address, port);

    let mut server = Server::new(config.server.network_config(port));
    let mut event_rx = server
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("server event receiver already taken"))?;

    server.start().await?;

    println!("\n========================================");
    println!("  OpenPipes Backend Running");
    println!("========================================");
    if let Some(addr) = server.local_addr() {
        println!("  Listening: {}", addr);
    }
    println!("  Demo: {}", if demo.is_some() { "enabled" } else { "disabled" });
    println!("========================================");
    println!("\nWaiting for GUIs to connect...");
    println!("Press Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    ServerEvent::ClientConnected { addr, handle } => {
                        tracing::info!("GUI connected: {}", addr);
                        println!("+ GUI connected: {}", addr);

                        let announcements = match &demo {
                            Some(demo) if announce => demo.announcements(),
                            _ => Vec::new(),
                        };
                        for message in announcements {
                            if let Err(e) = handle.notify(message).await {
                                tracing::warn!("Failed to announce topology to {}: {}", addr, e);
                                break;
                            }
                        }
                    }
                    ServerEvent::ClientDisconnected { addr, reason } => {
                        tracing::info!("GUI disconnected: {} - {}", addr, reason);
                        println!("- GUI disconnected: {} ({})", addr, reason);
                    }
                    ServerEvent::MessageReceived { addr, frame } => {
                        let replies = match demo.as_mut() {
                            Some(demo) => demo.handle(&frame.message),
                            None => {
                                tracing::info!("{} from {} left unanswered", frame.message.message_type(), addr);
                                Vec::new()
                            }
                        };

                        for reply in replies {
                            if let Err(e) = server.send_to(&addr, Frame::new(frame.xid, reply)).await {
                                tracing::warn!("Failed to reply to {}: {}", addr, e);
                                break;
                            }
                        }
                    }
                    ServerEvent::Error { message } => {
                        tracing::error!("Server error: {}", message);
                    }
                    ServerEvent::Started { bind_addr } => {
                        tracing::debug!("Accept loop running on {}", bind_addr);
                    }
                    ServerEvent::Stopped => {
                        tracing::info!("Accept loop stopped");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    server.stop().await?;
    tracing::info!("Server stopped");

    Ok(())
}

/// Decode every frame in a capture file and print it
fn decode_capture(path: &Path, json: bool) -> anyhow::Result<()> {
    let mut buf = BytesMut::from(&std::fs::read(path)?[..]);
    let mut decoder = Decoder::new();
    let mut decoded = 0usize;

    loop {
        match decoder.decode(&mut buf) {
            Ok(Some(frame)) => {
                decoded += 1;
                if json {
                    println!("{}", serde_json::to_string(&frame.message)?);
                } else {
                    println!("[xid {}] {}", frame.xid, frame.message);
                }
            }
            Ok(None) => break,
            Err(e @ (CodecError::UnknownMessageType(_) | CodecError::UnsupportedOperation(_))) => {
                println!("skipped frame: {}", e);
            }
            Err(e) => {
                anyhow::bail!("decode failed after {} frame(s): {}", decoded, e);
            }
        }
    }

    if !buf.is_empty() {
        println!("{} trailing byte(s) do not form a complete frame", buf.len());
    }
    println!("{} frame(s) decoded", decoded);

    Ok(())
}

/// Print protocol constants and the message registry
fn print_protocol_info() {
    println!("OpenPipes Protocol Information");
    println!("==============================\n");

    println!("Default Port: {}", protocol::DEFAULT_PORT);
    println!("Header Size: {} bytes", Header::SIZE);
    println!("Max Frame Size: {} bytes", MAX_FRAME_SIZE);

    println!("\nMessage Types:");
    for entry in Registry::global().entries() {
        println!(
            "  {:#04X}  {:<22} {}",
            entry.message_type.code(),
            entry.message_type.name(),
            if entry.is_outbound_only() {
                "backend -> GUI"
            } else {
                "GUI <-> backend"
            }
        );
    }
}
