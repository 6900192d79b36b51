//! Core stackup library API surface.

pub mod diagnostics;
pub mod events;
pub mod options;
pub mod outcome;
pub mod reporter;

pub mod context;
pub mod deps;
pub mod launch;
pub mod operations;
pub mod ports;
pub mod process;
pub mod project;
pub mod readiness;
pub mod tunnel;

pub use diagnostics::{Diagnostic, Severity};
pub use events::Event;
pub use operations::{down, init, status, up};
pub use options::{
    ConfigLoadOptions, ConfigSource, DownOptions, InitOptions, StatusOptions, UpOptions,
};
pub use outcome::{
    DownOutcome, InitOutcome, OperationOutput, OperationResult, PortReclaimRow, ReportRow,
    RunReport, ServiceRunOutcome, ServiceStatusRow, StatusOutcome, TunnelState, UpOutcome,
};
pub use reporter::Reporter;
