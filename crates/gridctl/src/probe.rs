//! Port availability probe run before the service is spawned.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::LifecycleError;

/// Verifies that `port` can be bound on all interfaces.
///
/// The socket sets `SO_REUSEADDR` so lingering `TIME_WAIT` connections from a
/// previous run do not count as "in use". It is released before returning.
///
/// # Errors
///
/// Returns [`LifecycleError::PortUnavailable`] when the bind fails, which
/// usually means the service is already running.
pub fn probe_port(port: u16) -> Result<(), LifecycleError> {
    try_bind(port).map_err(|source| LifecycleError::PortUnavailable { port, source })
}

fn try_bind(port: u16) -> io::Result<()> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&address.into())
}
