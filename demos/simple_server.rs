//! Simple hub server example
//!
//! Run with: cargo run --example simple_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example simple_server                    # binds to 0.0.0.0:9400
//!   cargo run --example simple_server localhost          # binds to 127.0.0.1:9400
//!   cargo run --example simple_server 127.0.0.1:9401     # binds to 127.0.0.1:9401
//!
//! ## Talking to the server
//!
//! Every frame is one JSON object per line. With netcat:
//!
//!   nc localhost 9400
//!   {"type":"join","room":"ops"}
//!   {"type":"publish","room":"ops","payload":{"text":"hi"}}
//!   {"type":"history","room":"ops","limit":10}
//!   {"type":"status"}
//!
//! ## Features
//!
//! - Rooms: messages published to a room reach only its members
//! - Self-healing: a connection whose delivery fails is dropped from the hub
//! - Replay: joining a room replays the last few messages sent to it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nexus_hub::server::config::DEFAULT_PORT;
use nexus_hub::{Hub, HubConfig, HubServer, ServerConfig};

/// How often the hub status is logged
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:9400
/// - "localhost:9401" -> 127.0.0.1:9401
/// - "127.0.0.1" -> 127.0.0.1:9400
/// - "0.0.0.0:9400" -> 0.0.0.0:9400
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: simple_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => ServerConfig::with_addr(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    }
    .history_replay(10);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
                .add_directive("nexus_hub=debug".parse()?),
        )
        .init();

    // The composition root owns the hub and hands out shared handles
    let hub = Arc::new(Hub::with_config(
        HubConfig::default().delivery_timeout(Duration::from_secs(2)),
    ));
    hub.start().await;

    let reporter = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATUS_INTERVAL);
            loop {
                ticker.tick().await;
                let status = hub.status().await;
                let stats = hub.stats().await;
                tracing::info!(
                    active = status.active,
                    connections = status.connection_count,
                    rooms = status.room_count,
                    messages = status.messages_recorded,
                    pruned = stats.pruned_total,
                    "Hub status"
                );
            }
        })
    };

    println!("Starting hub server on {}", config.bind_addr);
    println!("Connect with: nc {} {}", config.bind_addr.ip(), config.bind_addr.port());
    println!();

    let server = HubServer::new(config, Arc::clone(&hub));

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    reporter.abort();
    hub.stop().await;

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
