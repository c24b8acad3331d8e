//! Line-oriented echo client.
//!
//! Demonstrates:
//! - Opening a session and waiting for the handshake
//! - Sending each stdin line as a `POST /echo` request
//! - Printing responses correlated by request identifier
//!
//! Usage:
//!   cargo run --example echo_client
//!   cargo run --example echo_client -- ws://localhost:8080/swaggersocket
//!   RUST_LOG=swaggersocket=debug cargo run --example echo_client

// ============================================================================
// Imports
// ============================================================================

use std::io::Write;
use std::time::Duration;

use swaggersocket::{
    Callbacks, Request, Response, Session, SessionOptions, SessionState, WebSocketTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep, timeout};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://localhost:8080/swaggersocket";

/// Time allowed for the handshake before giving up.
const OPEN_TIMEOUT: Duration = Duration::from_millis(3000);

/// Time allowed for the close message to be flushed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(1000);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swaggersocket=warn")),
        )
        .with_target(false)
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());

    let (transport, mut events) = WebSocketTransport::new();
    let mut session = Session::new(transport, SessionOptions::default())?;

    let listener = Callbacks::new()
        .with_open(|r| {
            banner(&format!("STATUS: {}", r.reason_phrase()), "SwaggerSocket connected");
        })
        .with_response(print_response)
        .with_close(|r| {
            banner(&format!("STATUS: {}", r.reason_phrase()), "SwaggerSocket closed");
        })
        .with_error(|r| {
            banner(&format!("ERROR: {} {}", r.status_code(), r.reason_phrase()), "");
        })
        .shared();

    println!("Connecting ...");
    session.open(
        Request::post(url)
            .with_data_format("text/plain")
            .with_listener(listener.clone()),
    );

    // ========================================================================
    // Handshake
    // ========================================================================

    let deadline = sleep(OPEN_TIMEOUT);
    tokio::pin!(deadline);

    while !session.is_open() {
        tokio::select! {
            () = &mut deadline => {
                println!("Unable to open a connection. Terminated.");
                return Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else { return Ok(()) };
                session.handle_event(event);
                if matches!(session.state(), SessionState::Idle | SessionState::Closed) {
                    println!("Unable to open a connection. Terminated.");
                    return Ok(());
                }
            }
        }
    }

    // ========================================================================
    // Echo Loop
    // ========================================================================

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt("message: ");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let message = line.trim();

                let request = Request::post("/echo")
                    .with_data_format("text/plain")
                    .with_data(message)
                    .with_listener(listener.clone());
                println!("Sending a request using uuid {}", request.id());
                session.send(request);

                prompt("> ");
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                session.handle_event(event);
                if session.state() == SessionState::Closed {
                    break;
                }
            }
        }
    }

    println!("close");
    session.close();

    // The channel ends once the subscription task has written the close
    // frame and exited.
    drop(session);
    let drained = timeout(SHUTDOWN_TIMEOUT, async {
        while events.recv().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Subscription did not shut down in time");
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_response(response: &Response) {
    let id = response.id().map(ToString::to_string).unwrap_or_default();
    let last = if response.is_last() { " (last)" } else { "" };
    println!("Response for Request: {id}{last} is '{}'", response.body_text());
    prompt("message: ");
}

fn banner(status: &str, message: &str) {
    println!("----------------------------");
    println!("{status}");
    if !message.is_empty() {
        println!("{message}");
    }
    println!("----------------------------");
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}
