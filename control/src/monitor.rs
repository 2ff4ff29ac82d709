//! The control-connection monitor task: reads lines off the control socket
//! and demultiplexes `650` asynchronous event lines from ordinary
//! synchronous command replies.
//!
//! Grounded on the tari Tor control-client's reader task, which splits a
//! single `Framed<_, LinesCodec>` the same way between a broadcast sender
//! for events and a channel carrying reply lines back to whichever command
//! is waiting on them.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::event::RawEvent;

pub(crate) fn spawn(
    reader: BufReader<OwnedReadHalf>,
    response_tx: mpsc::UnboundedSender<Vec<String>>,
    event_tx: broadcast::Sender<RawEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move { run(reader, response_tx, event_tx).await })
}

async fn run(
    mut reader: BufReader<OwnedReadHalf>,
    response_tx: mpsc::UnboundedSender<Vec<String>>,
    event_tx: broadcast::Sender<RawEvent>,
) {
    let mut pending_reply = Vec::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                log::warn!("Tor control connection closed by the control port");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("error reading from the Tor control port: {e}");
                break;
            }
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < 4 {
            continue;
        }
        let code = &line[0..3];
        let sep = line.as_bytes()[3] as char;
        let body = &line[4..];

        if code == "650" {
            if let Some(event) = RawEvent::parse(body) {
                // No receivers is fine: nobody is waiting on this event.
                let _ = event_tx.send(event);
            }
            continue;
        }

        pending_reply.push(line.to_string());
        if sep == ' ' {
            let reply = std::mem::take(&mut pending_reply);
            if response_tx.send(reply).is_err() {
                break;
            }
        }
    }
}
