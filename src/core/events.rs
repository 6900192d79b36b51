use std::path::PathBuf;

use super::deps::BootstrapStatus;
use super::diagnostics::Severity;
use super::launch::LaunchMethod;

/// Structured event emitted during a bring-up run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A textual progress update with a severity level.
    Message {
        /// Severity of the message.
        severity: Severity,
        /// Human-readable text.
        text: String,
    },
    /// A port from the kill list or a service port was force-freed.
    PortReclaimed {
        /// The TCP port that was reclaimed.
        port: u16,
        /// Number of owning processes that were terminated (0 = already free).
        terminated: usize,
    },
    /// A port survived both terminate-and-verify cycles.
    PortStillOccupied {
        /// The TCP port that could not be freed.
        port: u16,
    },
    /// One compose directory was processed during dependency bootstrap.
    DependencyBootstrap {
        /// Directory holding the compose manifest.
        dir: PathBuf,
        /// Outcome of the bring-up invocation.
        status: BootstrapStatus,
    },
    /// A service start command was handed to its execution context.
    ServiceLaunched {
        /// Name of the service.
        service: String,
        /// How the command was spawned.
        method: LaunchMethod,
    },
    /// A service port started accepting connections.
    ServiceReady {
        /// Name of the service.
        service: String,
        /// Port that became ready.
        port: u16,
        /// Poll attempts used before the port accepted.
        attempts: u32,
    },
    /// A service never opened its port within the polling budget.
    ServiceReadinessTimedOut {
        /// Name of the service.
        service: String,
        /// Port that never accepted.
        port: u16,
        /// Attempts exhausted before giving up.
        attempts: u32,
    },
    /// A live tunnel process from a prior run was terminated before restart.
    TunnelReplaced {
        /// Name of the service.
        service: String,
        /// Pid of the terminated prior tunnel.
        old_pid: i32,
    },
    /// A new tunnel process was spawned and its handle persisted.
    TunnelStarted {
        /// Name of the service.
        service: String,
        /// Pid of the tunnel process.
        pid: u32,
        /// Requested public hostname.
        hostname: String,
    },
    /// A recorded tunnel process was stopped (`stackup down`).
    TunnelStopped {
        /// Name of the service.
        service: String,
        /// Pid of the stopped tunnel.
        pid: i32,
    },
}
