//! The SOCKS5 tunnel factory: a fresh TCP stream proxied through Tor's
//! SOCKS port, with a unique username/password per tunnel so Tor opens an
//! isolated stream for each one.

use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_socks::tcp::Socks5Stream;

use ting_error::TingError;
use ting_types::Endpoint;

fn random_credential() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Dial `dest` through the local Tor SOCKS port, with a freshly generated
/// isolation credential. Bounded by `socks_timeout`.
pub async fn open(
    socks_port: u16,
    dest: &Endpoint,
    socks_timeout: Duration,
) -> Result<Socks5Stream<TcpStream>, TingError> {
    let proxy = format!("127.0.0.1:{socks_port}");
    let username = random_credential();
    let password = random_credential();

    let connect = Socks5Stream::connect_with_password(
        proxy.as_str(),
        (dest.host.as_str(), dest.port),
        &username,
        &password,
    );

    match timeout(socks_timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TingError::ProbeFailed(format!("SOCKS connect failed: {e}"))),
        Err(_) => Err(TingError::ProbeFailed(format!(
            "SOCKS connect to {dest} timed out after {:?}",
            socks_timeout
        ))),
    }
}
