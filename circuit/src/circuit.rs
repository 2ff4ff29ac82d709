//! The `Circuit` object: a scoped resource encapsulating one measurement
//! leg (spec section 4.5). Lazily constructed, explicitly built, sampled
//! zero or more times, then explicitly closed.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use ting_control::Controller;
use ting_error::TingError;
use ting_types::{CircuitId, Endpoint, Fingerprint, Sample, TingLeg};
use ting_wire::{read_frame, write_frame, Frame, PacketType};

use crate::listener::{self, ListenerHandle};
use crate::tunnel;

const BUILD_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Per-circuit knobs that don't vary with the relay path or leg.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub max_build_attempts: u32,
    pub socks_port: u16,
    pub socks_timeout: Duration,
}

/// One measurement leg: an ordered relay path, the leg it represents, and
/// (once built) the Tor circuit, stream-attach listener, and SOCKS tunnel
/// backing it.
pub struct Circuit {
    controller: Arc<dyn Controller>,
    relays: Vec<Fingerprint>,
    leg: TingLeg,
    dest: Endpoint,
    config: CircuitConfig,
    cid: Option<CircuitId>,
    listener: Option<ListenerHandle>,
    tunnel: Option<Socks5Stream<TcpStream>>,
    build_time_s: Option<f64>,
}

impl Circuit {
    pub fn new(
        controller: Arc<dyn Controller>,
        relays: Vec<Fingerprint>,
        leg: TingLeg,
        dest: Endpoint,
        config: CircuitConfig,
    ) -> Self {
        assert_eq!(
            relays.len(),
            leg.hop_count(),
            "leg {leg} requires exactly {} relays",
            leg.hop_count()
        );
        Self {
            controller,
            relays,
            leg,
            dest,
            config,
            cid: None,
            listener: None,
            tunnel: None,
            build_time_s: None,
        }
    }

    pub fn leg(&self) -> TingLeg {
        self.leg
    }

    pub fn build_time_s(&self) -> Option<f64> {
        self.build_time_s
    }

    pub fn circuit_id(&self) -> Option<CircuitId> {
        self.cid
    }

    /// Build the circuit, install its stream-attach listener, and connect
    /// a SOCKS tunnel through it. Retries up to `max_build_attempts` times
    /// with a 1s backoff, tearing down any partial state between attempts.
    pub async fn build(&mut self) -> Result<(), TingError> {
        let mut last_err: Option<TingError> = None;
        for attempt in 1..=self.config.max_build_attempts {
            match self.try_build_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!(
                        "circuit build attempt {attempt}/{} for leg {} failed: {e}",
                        self.config.max_build_attempts,
                        self.leg
                    );
                    self.teardown_partial().await;
                    last_err = Some(e);
                    if attempt < self.config.max_build_attempts {
                        tokio::time::sleep(BUILD_RETRY_BACKOFF).await;
                    }
                }
            }
        }
        Err(TingError::CircuitBuildFailed {
            attempts: self.config.max_build_attempts,
            cause: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn try_build_once(&mut self) -> Result<(), TingError> {
        // `__DisablePredictedCircuits` and `__LeaveStreamsUnattached` are set
        // once for the whole session (see `ting_driver::run`), not per build.
        let start = Instant::now();
        let cid = self.controller.new_circuit(&self.relays, true).await?;
        self.build_time_s = Some(start.elapsed().as_secs_f64());
        self.cid = Some(cid);

        self.listener = Some(listener::install(
            self.controller.clone(),
            cid,
            self.dest.port,
        ));

        self.tunnel = Some(
            tunnel::open(self.config.socks_port, &self.dest, self.config.socks_timeout).await?,
        );
        Ok(())
    }

    /// Tear down whatever state a failed build attempt left behind, in
    /// preparation for a retry. Errors here are logged, not propagated:
    /// the caller is already handling a build failure.
    async fn teardown_partial(&mut self) {
        self.tunnel = None;
        if let Some(listener) = self.listener.take() {
            listener.stop().await;
        }
        if let Some(cid) = self.cid.take() {
            if let Err(e) = self.controller.close_circuit(cid).await {
                log::warn!("close_circuit({cid}) during build retry failed: {e}");
            }
        }
    }

    /// Take one (outbound, inbound) timing measurement (spec section 4.5.2).
    /// Both the send and the reply recv are bounded by the configured
    /// `socks_timeout`; either one timing out fails with `ProbeFailed`
    /// rather than blocking indefinitely on a silent or hung responder.
    pub async fn sample(&mut self) -> Result<Sample, TingError> {
        let timeout = self.config.socks_timeout;
        let tunnel = self
            .tunnel
            .as_mut()
            .ok_or_else(|| TingError::ProbeFailed("circuit has no open tunnel".into()))?;

        let t0 = now_s();
        tokio::time::timeout(timeout, write_frame(tunnel, &Frame::ting(t0)))
            .await
            .map_err(|_| TingError::ProbeFailed(format!("send timed out after {timeout:?}")))?
            .map_err(|e| TingError::ProbeFailed(format!("send failed: {e}")))?;

        let reply = tokio::time::timeout(timeout, read_frame(tunnel))
            .await
            .map_err(|_| TingError::ProbeFailed(format!("recv timed out after {timeout:?}")))?
            .map_err(|e| TingError::ProbeFailed(format!("decode failed: {e}")))?
            .ok_or_else(|| TingError::ProbeFailed("responder closed the tunnel".into()))?;
        let t1 = now_s();

        if reply.ptype != PacketType::Ting {
            return Err(TingError::ProbeFailed("expected a TING reply".into()));
        }
        let sent_time = reply
            .time_sec
            .ok_or_else(|| TingError::ProbeFailed("TING reply carried no timestamp".into()))?;

        Ok(Sample::new(sent_time - t0, t1 - sent_time))
    }

    /// Release (spec section 4.5.3): send a best-effort CLOSE frame, close
    /// the circuit, remove the listener, then drop the tunnel. Never
    /// propagates an error — a failure here is logged and nothing more.
    pub async fn close(mut self) {
        if let Some(tunnel) = self.tunnel.as_mut() {
            if let Err(e) = write_frame(tunnel, &Frame::close()).await {
                log::debug!("best-effort CLOSE frame on leg {} failed: {e}", self.leg);
            }
        }
        if let Some(cid) = self.cid.take() {
            if let Err(e) = self.controller.close_circuit(cid).await {
                log::warn!("close_circuit({cid}) failed: {e}");
            }
        }
        if let Some(listener) = self.listener.take() {
            listener.stop().await;
        }
        self.tunnel = None;
    }
}

impl Drop for Circuit {
    /// `close()` is the real teardown path; this is only a backstop for a
    /// caller that forgets to call it (or panics first). Rust has no async
    /// `Drop`, so this can only abort the listener task and log — it cannot
    /// await `close_circuit` on the controller.
    fn drop(&mut self) {
        if let Some(listener) = &self.listener {
            listener.abort();
        }
        if let Some(cid) = self.cid {
            log::warn!("circuit {cid} (leg {}) dropped without close(); it was not released on the Tor side", self.leg);
        }
    }
}

fn now_s() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
