//! Bounded post-launch reachability polling.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::LifecycleError;
use crate::process::ProcessTable;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Fixed-budget poll confirming a freshly spawned service is reachable.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionPoller {
    max_attempts: u32,
    interval: Duration,
}

impl ConnectionPoller {
    /// Builds a poller making at most `max_attempts` attempts, `interval` apart.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Waits until `port` accepts a local connection and a process executing
    /// `binary` exists.
    ///
    /// Returns the 1-based attempt that succeeded. No sleep follows the final
    /// attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StartupTimeout`] when every attempt fails or
    /// the process table cannot be read on the last attempt.
    pub fn poll(
        &self,
        port: u16,
        binary: &Path,
        processes: &dyn ProcessTable,
    ) -> Result<u32, LifecycleError> {
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        for attempt in 1..=self.max_attempts {
            let connected = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT).is_ok();
            let reachable = connected
                && processes
                    .pids_for(binary)
                    .is_ok_and(|pids| !pids.is_empty());
            if reachable {
                return Ok(attempt);
            }
            debug!(
                target: crate::LIFECYCLE_TARGET,
                attempt,
                port,
                connected,
                "service not reachable yet"
            );
            if attempt < self.max_attempts {
                thread::sleep(self.interval);
            }
        }
        Err(LifecycleError::StartupTimeout {
            binary: binary.to_path_buf(),
            port,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use rstest::rstest;

    use super::*;
    use crate::process::MockProcessTable;

    fn running(pids: Vec<u32>) -> MockProcessTable {
        let mut table = MockProcessTable::new();
        table
            .expect_pids_for()
            .returning(move |_| Ok(pids.clone()));
        table
    }

    fn closed_port() -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        listener.local_addr().expect("local addr").port()
    }

    #[test]
    fn succeeds_on_first_attempt_when_listening_and_running() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        let poller = ConnectionPoller::new(3, Duration::from_millis(10));

        let attempt = poller
            .poll(port, Path::new("/usr/sbin/gridd"), &running(vec![42]))
            .expect("reachable");
        assert_eq!(attempt, 1);
    }

    #[rstest]
    #[case::nothing_listening(false, vec![42])]
    #[case::no_process(true, Vec::new())]
    fn times_out_unless_both_checks_hold(#[case] listening: bool, #[case] pids: Vec<u32>) {
        let listener = listening.then(|| TcpListener::bind(("127.0.0.1", 0)).expect("bind"));
        let port = listener
            .as_ref()
            .map_or_else(closed_port, |listener| {
                listener.local_addr().expect("local addr").port()
            });
        let poller = ConnectionPoller::new(2, Duration::from_millis(5));

        let error = poller
            .poll(port, Path::new("/usr/sbin/gridd"), &running(pids))
            .expect_err("never reachable");
        assert!(matches!(
            error,
            LifecycleError::StartupTimeout { attempts: 2, .. }
        ));
    }

    #[test]
    fn process_table_is_not_consulted_while_the_port_is_closed() {
        let mut table = MockProcessTable::new();
        table.expect_pids_for().never();
        let poller = ConnectionPoller::new(2, Duration::from_millis(5));

        let result = poller.poll(closed_port(), Path::new("/usr/sbin/gridd"), &table);
        assert!(result.is_err());
    }
}
