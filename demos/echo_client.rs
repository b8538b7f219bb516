//! Reconnecting echo client.
//!
//! Demonstrates:
//! - Building a socket with exponential backoff and a ring buffer
//! - Event shortcuts for open, message, close and retry
//! - Messages sent while disconnected being flushed on reconnect
//!
//! Usage:
//!   cargo run --example echo_client -- ws://127.0.0.1:9001
//!   cargo run --example echo_client -- ws://127.0.0.1:9001 --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use resocket::{ExponentialBackoff, ReconnectingSocket, Result, RingBuffer};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://127.0.0.1:9001";
const BUFFER_CAPACITY: usize = 64;
const SEND_INTERVAL: Duration = Duration::from_secs(2);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    init_logging(args.iter().any(|a| a == "--debug"));

    let url = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_URL.to_string());

    if let Err(e) = run(url).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug { "resocket=debug" } else { "resocket=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(url: String) -> Result<()> {
    println!("=== Echo Client: {url} ===\n");

    let socket = ReconnectingSocket::builder(url)
        .backoff(ExponentialBackoff::new(Duration::from_millis(250)).with_max_exponent(5))
        .buffer(RingBuffer::new(BUFFER_CAPACITY))
        .on_open(|_| println!("[open]"))
        .on_message(|_, message| println!("[echo] {message}"))
        .on_close(|_, close| println!("[close] code={} clean={}", close.code, close.was_clean))
        .on_retry(|_, retry| println!("[retry] #{} after {:?}", retry.retry_count, retry.delay))
        .build()?;

    println!("Press Ctrl+C to exit...\n");

    let mut ticker = tokio::time::interval(SEND_INTERVAL);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sequence += 1;
                socket.send(format!("tick {sequence}"));
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    socket.close();
    println!("\nClosed after {sequence} messages");
    Ok(())
}
