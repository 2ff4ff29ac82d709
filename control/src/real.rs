//! A real Tor control-port client, speaking the control protocol's line
//! format directly over a plain TCP socket.
//!
//! Grounded on the tari Tor control client (`other_examples/tor-client.rs`,
//! `tor-control_client-client.rs`): a dedicated reader task owns the socket's
//! read half and demultiplexes event lines from reply lines, while command
//! issuers share the write half and a reply channel behind a single mutex so
//! that at most one command is ever in flight.

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use ting_error::TingError;
use ting_types::{CircuitId, Fingerprint, StreamId};

use crate::event::{CircStatus, RawEvent};
use crate::{Controller, StreamEventReceiver};

struct CommandChannel {
    write: BufWriter<OwnedWriteHalf>,
    replies: mpsc::UnboundedReceiver<Vec<String>>,
}

/// A live connection to a Tor control port.
pub struct TorController {
    command: Mutex<CommandChannel>,
    events: broadcast::Sender<RawEvent>,
    monitor: JoinHandle<()>,
}

impl TorController {
    /// Connect to the control port on `127.0.0.1:<port>`. Does not
    /// authenticate; callers must call [`Controller::authenticate`]
    /// before issuing other commands.
    pub async fn connect(port: u16) -> Result<Self, TingError> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|e| TingError::ControllerUnavailable(e.to_string()))?;
        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (event_tx, _unused) = broadcast::channel(256);
        let monitor = crate::monitor::spawn(reader, response_tx, event_tx.clone());

        Ok(Self {
            command: Mutex::new(CommandChannel {
                write: BufWriter::new(write_half),
                replies: response_rx,
            }),
            events: event_tx,
            monitor,
        })
    }

    async fn request(&self, line: &str) -> Result<Vec<String>, TingError> {
        let mut chan = self.command.lock().await;
        chan.write
            .write_all(line.as_bytes())
            .await
            .map_err(TingError::Io)?;
        chan.write.write_all(b"\r\n").await.map_err(TingError::Io)?;
        chan.write.flush().await.map_err(TingError::Io)?;
        chan.replies.recv().await.ok_or_else(|| {
            TingError::ControllerUnavailable("control connection closed mid-command".into())
        })
    }

    fn subscribe_raw(&self) -> broadcast::Receiver<RawEvent> {
        self.events.subscribe()
    }
}

impl Drop for TorController {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

fn is_ok(reply: &[String]) -> bool {
    reply.last().map(|l| l.starts_with("250")).unwrap_or(false)
}

fn reply_text(reply: &[String]) -> String {
    reply.join(" / ")
}

#[async_trait]
impl Controller for TorController {
    async fn authenticate(&self) -> Result<(), TingError> {
        let reply = self.request("AUTHENTICATE").await?;
        if !is_ok(&reply) {
            return Err(TingError::AuthFailed(reply_text(&reply)));
        }
        // Subscribe to the event classes ting needs for stream attachment
        // and await_build, now that we're authenticated.
        let reply = self.request("SETEVENTS STREAM CIRC").await?;
        if is_ok(&reply) {
            Ok(())
        } else {
            Err(TingError::AuthFailed(format!(
                "SETEVENTS failed: {}",
                reply_text(&reply)
            )))
        }
    }

    async fn set_conf(&self, key: &str, value: &str) -> Result<(), TingError> {
        let reply = self.request(&format!("SETCONF {key}={value}")).await?;
        if is_ok(&reply) {
            Ok(())
        } else {
            Err(TingError::Config(format!(
                "SETCONF {key} failed: {}",
                reply_text(&reply)
            )))
        }
    }

    async fn new_circuit(
        &self,
        relays: &[Fingerprint],
        await_build: bool,
    ) -> Result<CircuitId, TingError> {
        let path = relays
            .iter()
            .map(Fingerprint::as_str)
            .collect::<Vec<_>>()
            .join(",");

        // Subscribe before issuing the command: CIRC BUILT can arrive before
        // the command reply does, and a receiver created afterward would
        // miss it.
        let build_events = await_build.then(|| self.subscribe_raw());

        let reply = self
            .request(&format!("EXTENDCIRCUIT 0 {path} purpose=general"))
            .await?;
        if !is_ok(&reply) {
            return Err(TingError::CircuitBuildFailed {
                attempts: 1,
                cause: reply_text(&reply),
            });
        }
        let id = reply
            .last()
            .and_then(|l| l.rsplit(' ').next())
            .and_then(|tok| tok.parse::<u64>().ok())
            .ok_or_else(|| TingError::CircuitBuildFailed {
                attempts: 1,
                cause: format!("couldn't parse circuit id from {:?}", reply),
            })?;
        let circ_id = CircuitId(id);

        if let Some(rx) = build_events {
            self.wait_for_build(circ_id, rx).await?;
        }
        Ok(circ_id)
    }

    async fn close_circuit(&self, id: CircuitId) -> Result<(), TingError> {
        let reply = self.request(&format!("CLOSECIRCUIT {id}")).await?;
        if !is_ok(&reply) {
            log::warn!("CLOSECIRCUIT {id} did not return OK: {}", reply_text(&reply));
        }
        Ok(())
    }

    async fn attach_stream(&self, stream_id: StreamId, circuit_id: CircuitId) -> Result<(), TingError> {
        let reply = self
            .request(&format!("ATTACHSTREAM {stream_id} {circuit_id}"))
            .await?;
        if is_ok(&reply) {
            Ok(())
        } else {
            Err(TingError::AttachFailed(reply_text(&reply)))
        }
    }

    async fn close_stream(&self, stream_id: StreamId) -> Result<(), TingError> {
        let reply = self.request(&format!("CLOSESTREAM {stream_id} 1")).await?;
        if !is_ok(&reply) {
            log::warn!("CLOSESTREAM {stream_id} did not return OK: {}", reply_text(&reply));
        }
        Ok(())
    }

    fn subscribe_stream_events(&self) -> StreamEventReceiver {
        StreamEventReceiver::new(self.subscribe_raw())
    }
}

impl TorController {
    async fn wait_for_build(
        &self,
        circ_id: CircuitId,
        mut rx: broadcast::Receiver<RawEvent>,
    ) -> Result<(), TingError> {
        loop {
            match rx.recv().await {
                Ok(RawEvent::Circ(e)) if e.circ_id == circ_id => match e.status {
                    CircStatus::Built => return Ok(()),
                    CircStatus::Failed | CircStatus::Closed => {
                        return Err(TingError::CircuitBuildFailed {
                            attempts: 1,
                            cause: format!("circuit {circ_id} reported {:?}", e.status),
                        })
                    }
                    _ => continue,
                },
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TingError::ControllerUnavailable(
                        "event channel closed while awaiting circuit build".into(),
                    ))
                }
            }
        }
    }
}
