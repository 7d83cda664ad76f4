/// TCP reachability probe with an independent timeout.
///
/// The dial runs on a short-lived worker thread; the caller waits on a
/// channel with its own deadline. When the deadline fires first the caller
/// gets [`ProbeError::Timeout`] immediately and the worker is abandoned. Its
/// connect attempt is bounded by the same timeout, so it winds down on its
/// own shortly after without holding any OS process.
///
/// This only proves the port accepts connections; credentials are not
/// checked.
use crate::error::ProbeError;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Something that can attempt a connection to `host:port` within a bound.
pub type Dialer = Arc<dyn Fn(&str, u16, Duration) -> Result<(), ProbeError> + Send + Sync>;

/// `TcpStream::connect_timeout` rejects a zero duration.
const MIN_DIAL_TIMEOUT: Duration = Duration::from_millis(1);

pub struct ConnectivityProber {
    dialer: Dialer,
}

impl Default for ConnectivityProber {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityProber {
    /// Prober that dials real TCP sockets.
    pub fn new() -> Self {
        Self::with_dialer(Arc::new(tcp_dial))
    }

    pub fn with_dialer(dialer: Dialer) -> Self {
        Self { dialer }
    }

    /// Check that `host:port` accepts a TCP connection within `timeout`.
    pub fn test_connection(&self, host: &str, port: u16, timeout: Duration) -> Result<(), ProbeError> {
        let (tx, rx) = bounded(1);
        let dialer = Arc::clone(&self.dialer);
        let target = host.to_string();

        let spawned = thread::Builder::new()
            .name("mountify-probe".into())
            .spawn(move || {
                let result = dialer(&target, port, timeout.max(MIN_DIAL_TIMEOUT));
                // The caller may already have timed out and dropped the receiver.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn probe thread: {}", e);
            return Err(ProbeError::Unreachable);
        }

        let result = match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ProbeError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ProbeError::Unreachable),
        };
        debug!("Probe {}:{} -> {:?}", host, port, result);
        result
    }
}

/// Resolve `host` and try each address until one accepts.
fn tcp_dial(host: &str, port: u16, timeout: Duration) -> Result<(), ProbeError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|_| ProbeError::Resolve(host.to_string()))?;

    let mut last = ProbeError::Resolve(host.to_string());
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => last = ProbeError::Timeout,
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last = ProbeError::Unreachable;
            }
        }
    }
    Err(last)
}
