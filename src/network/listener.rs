//! TCP listener for the producer connection

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::NetworkError;

/// How often a pending accept re-checks the shutdown flag
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Create a non-blocking listener with `SO_REUSEADDR` so a restarted
/// receiver can rebind while the old socket sits in TIME_WAIT.
pub fn create_listener(config: &NetworkConfig) -> Result<TcpListener, NetworkError> {
    bind_listener(config.socket_addr(), config.backlog)
}

/// Bind and listen on `addr`
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
    socket
        .listen(backlog.max(1))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket.into())
}

/// Try to accept one connection without blocking.
///
/// Returns `Ok(None)` when nobody is waiting. The accepted stream is switched
/// back to blocking mode since some platforms inherit the listener's flag.
pub fn try_accept(
    listener: &TcpListener,
    nodelay: bool,
) -> Result<Option<(TcpStream, SocketAddr)>, NetworkError> {
    match listener.accept() {
        Ok((stream, peer)) => {
            stream
                .set_nonblocking(false)
                .map_err(|e| NetworkError::AcceptFailed(e.to_string()))?;
            if nodelay {
                // Best-effort; not fatal
                let _ = stream.set_nodelay(true);
            }
            Ok(Some((stream, peer)))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(NetworkError::AcceptFailed(e.to_string())),
    }
}
