//! Command line demo for the RSocket engine.
//!
//! `rsocket-demo serve` answers every interaction shape with a
//! [`DemoResponder`] until interrupted.  `rsocket-demo client`
//! connects to a server and runs a request‑response, a large
//! request‑response, a request‑stream and a request‑channel against
//! it, logging what comes back.  Both read an optional TOML config;
//! flags override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn, Level};

use rsocket_engine::config::Config;
use rsocket_engine::error::{Result, RSocketError};
use rsocket_engine::interaction;
use rsocket_engine::{DefaultHandler, DemoResponder, Payload, RSocket, Role, StreamFromGenerator};

/// Command line options for the `rsocket-demo` binary.
#[derive(Parser, Debug)]
#[command(name = "rsocket-demo", about = "Run an RSocket demo server or client")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind or connect to.
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// trace, debug, info, warn or error.
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept connections and answer them with the demo responder.
    Serve,
    /// Connect and run every interaction once.
    Client {
        /// Items the client sends on the channel.
        #[arg(long, default_value_t = 3)]
        channel_items: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load {}: {}", path.display(), err);
                std::process::exit(2);
            }
        },
        None => Config::default(),
    };
    if let Some(host) = cli.host.clone() {
        config.connection.host = host;
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }

    // Flags bypass the load-time check, so validate again.
    if let Err(err) = config.validate() {
        eprintln!("{}", err);
        std::process::exit(2);
    }
    let level = config.logging.max_level().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let outcome = match cli.command {
        Command::Serve => serve(&config).await,
        Command::Client { channel_items } => client(&config, channel_items).await,
    };
    if let Err(err) = outcome {
        error!(%err, "demo failed");
        std::process::exit(1);
    }
}

async fn serve(config: &Config) -> Result<()> {
    let listener = TcpListener::bind(config.connection.address()).await?;
    info!(addr = %listener.local_addr()?, "listening");
    let responder = Arc::new(DemoResponder::default());
    let mut connections: Vec<RSocket> = Vec::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };
                info!(%peer, "accepted connection");
                connections.retain(|rsocket| !rsocket.is_closed());
                connections.push(RSocket::new(
                    socket,
                    Role::Server,
                    responder.clone(),
                    &config.connection,
                ));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                break;
            }
        }
    }
    for rsocket in connections {
        rsocket.close().await;
    }
    Ok(())
}

async fn client(config: &Config, channel_items: usize) -> Result<()> {
    let addr = config.connection.address();
    info!(%addr, "connecting");
    let socket = TcpStream::connect(&addr).await?;
    let rsocket = RSocket::new(socket, Role::Client, Arc::new(DefaultHandler), &config.connection);

    let reply = interaction::request_response(&rsocket, Payload::from("The quick brown fox")).await?;
    info!(reply = %reply.data_utf8(), "request-response");

    let large = Payload::from_data(vec![b'x'; 64 * 1024]);
    let reply = interaction::request_response(&rsocket, large.clone()).await?;
    if reply != large {
        return Err(RSocketError::source_failed("large response did not match request"));
    }
    info!(len = reply.data().len(), "large request-response");

    let items = interaction::request_stream(
        &rsocket,
        Payload::from("The quick brown fox"),
        config.streams.initial_request_n,
        config.streams.replenish_n,
    )
    .await?;
    info!(count = items.len(), "request-stream");

    let outbound = StreamFromGenerator::from_payloads(
        (0..channel_items)
            .map(|i| Payload::from(format!("Item to server from client on channel: {}", i)))
            .collect(),
    );
    let received = interaction::request_channel(
        &rsocket,
        Payload::from("The quick brown fox"),
        outbound,
        config.streams.initial_request_n,
    )
    .await?;
    for item in &received {
        info!(item = %item.data_utf8(), "from server on channel");
    }

    rsocket.close().await;
    Ok(())
}
