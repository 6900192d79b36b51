use std::path::PathBuf;

use super::deps::BootstrapOutcome;
use super::diagnostics::Diagnostic;
use super::events::Event;
use super::launch::LaunchStatus;
use super::ports::{ReapedProcess, ReclaimStatus};
use super::readiness::ProbeStatus;
use super::tunnel::{TunnelShutdownOutcome, TunnelStatus};

/// Result wrapper returned by high-level operations.
pub type OperationResult<T> = crate::error::Result<OperationOutput<T>>;

/// Envelope for successful operation outcomes.
#[derive(Debug)]
pub struct OperationOutput<T> {
    /// Primary value produced by the operation.
    pub value: T,
    /// Diagnostics collected while performing the operation.
    pub diagnostics: Vec<Diagnostic>,
    /// Structured events captured during the run.
    pub events: Vec<Event>,
}

impl<T> OperationOutput<T> {
    /// Create a new operation output.
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Attach diagnostics to the output.
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Attach events to the output.
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}

/// Outcome of `init`.
#[derive(Debug)]
pub struct InitOutcome {
    pub config_path: PathBuf,
    pub project_name: String,
    pub state_root: PathBuf,
    pub did_overwrite: bool,
}

/// Outcome of `up`.
#[derive(Debug)]
pub struct UpOutcome {
    pub state_root: PathBuf,
    pub log_root: PathBuf,
    /// Results of the pre-service kill list sweep.
    pub reclaimed_ports: Vec<PortReclaimRow>,
    pub bootstrap: Option<BootstrapOutcome>,
    /// Whether the configured database answered its readiness probe.
    pub database_ready: Option<bool>,
    pub services: Vec<ServiceRunOutcome>,
    pub report: RunReport,
}

/// One kill-list port's reclaim result.
#[derive(Debug)]
pub struct PortReclaimRow {
    pub port: u16,
    pub status: ReclaimStatus,
    pub killed: Vec<ReapedProcess>,
}

/// Per-service result of one bring-up pass.
#[derive(Debug)]
pub struct ServiceRunOutcome {
    pub name: String,
    pub port: u16,
    pub reclaim: ReclaimStatus,
    pub launch: LaunchStatus,
    pub probe: ProbeStatus,
    /// Absent when the service declares no public hostname.
    pub tunnel: Option<TunnelStatus>,
}

/// Endpoint summary printed at the end of `up`.
#[derive(Debug)]
pub struct RunReport {
    pub rows: Vec<ReportRow>,
}

#[derive(Debug)]
pub struct ReportRow {
    pub service: String,
    pub local: String,
    pub lan: String,
    pub public: Option<String>,
}

/// Outcome of `down`.
#[derive(Debug)]
pub struct DownOutcome {
    pub stopped: Vec<TunnelShutdownOutcome>,
}

/// Outcome of `status`.
#[derive(Debug)]
pub struct StatusOutcome {
    pub rows: Vec<ServiceStatusRow>,
}

#[derive(Debug)]
pub struct ServiceStatusRow {
    pub name: String,
    pub port: u16,
    /// Whether the service port currently accepts a TCP connection.
    pub listening: bool,
    pub tunnel: TunnelState,
}

/// Observed state of a service's recorded tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// A recorded pid exists and answers signal 0.
    Running { pid: i32 },
    /// No record, or the recorded process is gone.
    Offline,
}
