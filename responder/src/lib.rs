//! The local echo responder ting's circuits connect out to.
//!
//! Ports `ting/echo_server.py`: bind a listening socket, serve one client
//! at a time, stamp a wall-clock time on every `Ting` frame, and close on
//! `Close` or EOF. The Python version polls `accept()` with a 0.5s
//! timeout so its serve thread can observe a shutdown `Event`; the async
//! equivalent used here is a `tokio::select!` between `accept()` and a
//! `Notify`, which reacts to shutdown immediately rather than within half
//! a second.

use std::ops::Range;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use ting_error::TingError;
use ting_types::Endpoint;
use ting_wire::{read_frame, write_frame, Frame, PacketType};

/// Ports tried by [`EchoResponder::bind_auto`] when no explicit port is given.
pub const AUTO_PORT_RANGE: Range<u16> = 16000..17000;

/// Default fixed endpoint, matching the original implementation's default.
pub fn default_endpoint() -> Endpoint {
    Endpoint::new("127.0.0.1", 16667)
}

/// A scoped echo responder: binds on construction, serves in a background
/// task, and must be torn down with [`EchoResponder::shutdown`].
pub struct EchoResponder {
    endpoint: Endpoint,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl EchoResponder {
    /// Bind at the given endpoint and start serving in the background.
    /// A port already in use (e.g. another responder already running on
    /// this endpoint) fails with `ConnectionAlreadyExists`, which is fatal
    /// to the session; any other bind failure is reported as `Io`.
    pub async fn bind(endpoint: Endpoint) -> Result<Self, TingError> {
        let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AddrInUse {
                    TingError::ConnectionAlreadyExists
                } else {
                    TingError::Io(e)
                }
            })?;
        let bound_port = listener.local_addr()?.port();
        let endpoint = Endpoint::new(endpoint.host, bound_port);

        let shutdown = Arc::new(Notify::new());
        let task_shutdown = Arc::clone(&shutdown);
        log::info!("echo responder listening on {endpoint}");
        let handle = tokio::spawn(serve_loop(listener, task_shutdown));

        Ok(Self {
            endpoint,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Bind to a free port in [`AUTO_PORT_RANGE`] on `host`, retrying on a
    /// port collision. Other bind errors are fatal.
    pub async fn bind_auto(host: &str) -> Result<Self, TingError> {
        loop {
            let port = rand::thread_rng().gen_range(AUTO_PORT_RANGE);
            match Self::bind(Endpoint::new(host, port)).await {
                Ok(responder) => return Ok(responder),
                Err(TingError::ConnectionAlreadyExists) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// The endpoint circuits should connect their tunnels to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Signal the serve loop to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("echo responder task panicked during shutdown: {e}");
            }
        }
    }
}

impl Drop for EchoResponder {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::warn!("EchoResponder dropped without an explicit shutdown(); aborting task");
            handle.abort();
        }
    }
}

async fn serve_loop(listener: TcpListener, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                log::info!("echo responder shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        log::debug!("connection accepted from {addr}");
                        serve_one(socket).await;
                        log::debug!("connection closed");
                    }
                    Err(e) => log::warn!("accept error: {e}"),
                }
            }
        }
    }
}

async fn serve_one(mut socket: TcpStream) {
    loop {
        let frame = match read_frame(&mut socket).await {
            Ok(Some(f)) => f,
            Ok(None) => {
                log::debug!("client closed connection (EOF)");
                return;
            }
            Err(e) => {
                log::debug!("socket error while reading frame: {e}");
                return;
            }
        };

        match frame.ptype {
            PacketType::Close => {
                log::debug!("client sent Close frame");
                return;
            }
            PacketType::Ting => {
                let reply = Frame::ting(now_secs());
                if let Err(e) = write_frame(&mut socket, &reply).await {
                    log::debug!("socket error while replying: {e}");
                    return;
                }
            }
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the UNIX epoch")
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn replies_to_ting_with_monotonic_ish_timestamps() {
        let responder = EchoResponder::bind(Endpoint::new("127.0.0.1", 0))
            .await
            .unwrap();
        let endpoint = responder.endpoint().clone();

        let mut client = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .unwrap();

        let mut prev = 0.0;
        for _ in 0..3 {
            write_frame(&mut client, &Frame::ting(0.0)).await.unwrap();
            let reply = read_frame(&mut client).await.unwrap().unwrap();
            assert_eq!(reply.ptype, PacketType::Ting);
            let t = reply.time_sec.unwrap();
            assert!(t >= prev);
            prev = t;
        }

        write_frame(&mut client, &Frame::close()).await.unwrap();
        let mut buf = [0u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "server should close after a Close frame");

        responder.shutdown().await;
    }

    #[tokio::test]
    async fn eof_without_any_frame_is_handled_cleanly() {
        let responder = EchoResponder::bind(Endpoint::new("127.0.0.1", 0))
            .await
            .unwrap();
        let endpoint = responder.endpoint().clone();

        {
            let mut client = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                .await
                .unwrap();
            client.shutdown().await.unwrap();
        }

        // A second connection still works, proving the first didn't wedge the
        // single-client-at-a-time serve loop.
        let mut client2 = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .unwrap();
        write_frame(&mut client2, &Frame::ting(0.0)).await.unwrap();
        let reply = read_frame(&mut client2).await.unwrap().unwrap();
        assert_eq!(reply.ptype, PacketType::Ting);

        responder.shutdown().await;
    }

    #[tokio::test]
    async fn bind_auto_picks_a_port_in_range() {
        let responder = EchoResponder::bind_auto("127.0.0.1").await.unwrap();
        let port = responder.endpoint().port;
        assert!(AUTO_PORT_RANGE.contains(&port));
        responder.shutdown().await;
    }

    #[tokio::test]
    async fn binding_an_endpoint_already_in_use_is_connection_already_exists() {
        let first = EchoResponder::bind(Endpoint::new("127.0.0.1", 0)).await.unwrap();
        let port = first.endpoint().port;

        let second = EchoResponder::bind(Endpoint::new("127.0.0.1", port)).await;
        assert!(matches!(second, Err(TingError::ConnectionAlreadyExists)));

        first.shutdown().await;
    }
}
