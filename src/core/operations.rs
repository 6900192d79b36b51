use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use libc::pid_t;

use crate::config::{self, ProjectConfig};
use crate::error::{Error, Result};

use super::context;
use super::deps;
use super::diagnostics::{Diagnostic, Severity};
use super::events::Event;
use super::launch::{self, LaunchStatus};
use super::options::{ConfigLoadOptions, DownOptions, InitOptions, StatusOptions, UpOptions};
use super::outcome::{
    DownOutcome, InitOutcome, OperationOutput, OperationResult, PortReclaimRow, ReportRow,
    RunReport, ServiceRunOutcome, ServiceStatusRow, StatusOutcome, TunnelState, UpOutcome,
};
use super::ports::{self, ReclaimStatus};
use super::process::{self, Liveness};
use super::project::{
    ProjectLoad, default_config_contents, default_project_name, load_project,
    preferred_init_target, port_conflicts,
};
use super::readiness::{self, ProbeSettings, ProbeStatus};
use super::reporter::Reporter;
use super::tunnel::{self, TunnelStatus, TunnelStore};

const STATUS_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

pub fn init(
    mut options: InitOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<InitOutcome> {
    let target_path = preferred_init_target(&options);
    let project_name = options
        .project_name
        .take()
        .unwrap_or_else(|| default_project_name(&target_path));
    let state_root = config::default_state_root(&target_path);

    let target_exists = target_path.exists();
    if target_exists && !options.force {
        return Err(Error::AlreadyInitialized { path: target_path });
    }

    let mut events = Vec::new();

    {
        let mut reporter = ReporterProxy::new(reporter, &mut events);

        if let Some(parent) = target_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        std::fs::create_dir_all(&state_root).map_err(|source| Error::CreateDir {
            path: state_root.clone(),
            source,
        })?;

        let config_contents = default_config_contents(&project_name);
        std::fs::write(&target_path, config_contents).map_err(|source| Error::WriteConfig {
            path: target_path.clone(),
            source,
        })?;

        reporter.emit(Event::Message {
            severity: Severity::Info,
            text: format!("Created stackup configuration for `{project_name}`."),
        });
    }

    Ok(OperationOutput::new(InitOutcome {
        config_path: target_path,
        project_name,
        state_root,
        did_overwrite: target_exists && options.force,
    })
    .with_events(events))
}

pub fn up(options: UpOptions, reporter: Option<&mut dyn Reporter>) -> OperationResult<UpOutcome> {
    let mut diagnostics = Vec::new();
    let mut events = Vec::new();

    let project = load_project_for_operation(&options.config, &mut diagnostics)?;
    diagnostics.extend(port_conflicts(&project.port_conflicts()));

    let context = context::prepare_run_context(&project)?;
    let probe_settings = ProbeSettings::from_run(&project.run);

    let mut reclaimed_ports = Vec::new();
    let mut bootstrap = None;
    let mut database_ready = None;
    let mut services = Vec::new();

    {
        let mut reporter = ReporterProxy::new(reporter, &mut events);

        for &port in &project.run.port_kill_list {
            let row = reclaim_port(port, &mut reporter, &mut diagnostics);
            reclaimed_ports.push(row);
        }

        if let Some(database) = &project.database {
            if !database.compose_dirs.is_empty() {
                let outcome = deps::bootstrap(&context, &database.compose_dirs);
                for run in &outcome.runs {
                    reporter.emit(Event::DependencyBootstrap {
                        dir: run.dir.clone(),
                        status: run.status.clone(),
                    });
                }
                for warning in &outcome.warnings {
                    diagnostics.push(Diagnostic::new(Severity::Warning, warning));
                }
                bootstrap = Some(outcome);
            }

            let status = readiness::await_postgres(
                &database.host,
                database.port,
                context.pg_isready.as_deref(),
                probe_settings,
            );
            match status {
                ProbeStatus::Ready { attempts } => {
                    database_ready = Some(true);
                    reporter.emit(Event::Message {
                        severity: Severity::Info,
                        text: format!(
                            "Database at {}:{} is accepting connections (attempt {attempts}).",
                            database.host, database.port
                        ),
                    });
                }
                ProbeStatus::TimedOut { attempts } => {
                    database_ready = Some(false);
                    diagnostics.push(Diagnostic::new(
                        Severity::Warning,
                        format!(
                            "Database at {}:{} did not answer after {attempts} attempts; \
                             continuing, services may fail to connect.",
                            database.host, database.port
                        ),
                    ));
                }
            }
        }

        // Declaration order is startup order. Each service gets its full
        // reclaim-launch-probe-tunnel cycle before the next one starts.
        for spec in &project.services {
            let row = reclaim_port(spec.port, &mut reporter, &mut diagnostics);
            let reclaim_status = row.status;
            if reclaim_status == ReclaimStatus::StillOccupied {
                diagnostics.push(Diagnostic::new(
                    Severity::Warning,
                    format!(
                        "Port {} for service `{}` is still occupied after reclaim; \
                         the launch below will likely fail to bind.",
                        spec.port, spec.name
                    ),
                ));
            }

            let launched = launch::launch(&context, spec, project.run.launcher);
            match &launched.status {
                LaunchStatus::Launched { method } => {
                    reporter.emit(Event::ServiceLaunched {
                        service: spec.name.clone(),
                        method: *method,
                    });
                }
                LaunchStatus::Failed { reason } => {
                    diagnostics.push(Diagnostic::new(
                        Severity::Warning,
                        format!("Failed to launch service `{}`: {reason}", spec.name),
                    ));
                }
            }

            // Probe even after a failed launch; an instance from a prior run
            // may already be serving the port.
            let probe = readiness::await_tcp(spec.port, probe_settings);
            match probe {
                ProbeStatus::Ready { attempts } => {
                    reporter.emit(Event::ServiceReady {
                        service: spec.name.clone(),
                        port: spec.port,
                        attempts,
                    });
                }
                ProbeStatus::TimedOut { attempts } => {
                    reporter.emit(Event::ServiceReadinessTimedOut {
                        service: spec.name.clone(),
                        port: spec.port,
                        attempts,
                    });
                    let mut diagnostic = Diagnostic::new(
                        Severity::Warning,
                        format!(
                            "Service `{}` never opened port {} within {attempts} attempts.",
                            spec.name, spec.port
                        ),
                    );
                    if let Some(log_path) = &launched.log_path {
                        diagnostic = diagnostic
                            .with_path(log_path.clone())
                            .with_help(format!("Check {} for startup errors.", log_path.display()));
                    }
                    diagnostics.push(diagnostic);
                }
            }

            // The tunnel starts regardless of the probe result. A slow
            // service is still worth exposing once it finishes starting.
            let tunnel_status = match &spec.public_hostname {
                Some(hostname) => {
                    let outcome = tunnel::start_tunnel(&context, spec, hostname);
                    for warning in &outcome.warnings {
                        diagnostics.push(Diagnostic::new(Severity::Warning, warning));
                    }
                    if let Some(old_pid) = outcome.replaced {
                        reporter.emit(Event::TunnelReplaced {
                            service: spec.name.clone(),
                            old_pid,
                        });
                    }
                    match &outcome.status {
                        TunnelStatus::Started { pid } => {
                            reporter.emit(Event::TunnelStarted {
                                service: spec.name.clone(),
                                pid: *pid,
                                hostname: hostname.clone(),
                            });
                        }
                        TunnelStatus::Failed { reason } => {
                            diagnostics.push(
                                Diagnostic::new(
                                    Severity::Warning,
                                    format!(
                                        "Tunnel for service `{}` was not started: {reason}",
                                        spec.name
                                    ),
                                )
                                .with_help(format!(
                                    "Install `{}` or adjust [tunnel].binary.",
                                    project.tunnel.binary
                                )),
                            );
                        }
                    }
                    Some(outcome.status)
                }
                None => None,
            };

            services.push(ServiceRunOutcome {
                name: spec.name.clone(),
                port: spec.port,
                reclaim: reclaim_status,
                launch: launched.status,
                probe,
                tunnel: tunnel_status,
            });
        }
    }

    let report = build_report(&project, &mut diagnostics);

    Ok(OperationOutput::new(UpOutcome {
        state_root: context.state_root,
        log_root: context.log_root,
        reclaimed_ports,
        bootstrap,
        database_ready,
        services,
        report,
    })
    .with_diagnostics(diagnostics)
    .with_events(events))
}

pub fn down(
    options: DownOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<DownOutcome> {
    let mut diagnostics = Vec::new();
    let mut events = Vec::new();

    let project = load_project_for_operation(&options.config, &mut diagnostics)?;
    let store = TunnelStore::new(project.state_root.join("logs"));

    let mut stopped = Vec::new();
    {
        let mut reporter = ReporterProxy::new(reporter, &mut events);

        // Recorded pid files are authoritative, not the service list: a
        // service removed from the configuration still gets its tunnel
        // stopped.
        for service in store.recorded_services() {
            if let Some(outcome) = tunnel::stop_tunnel(&store, &service) {
                for warning in &outcome.warnings {
                    diagnostics.push(Diagnostic::new(Severity::Warning, warning));
                }
                reporter.emit(Event::TunnelStopped {
                    service: outcome.service.clone(),
                    pid: outcome.pid,
                });
                stopped.push(outcome);
            }
        }

        if stopped.is_empty() {
            reporter.emit(Event::Message {
                severity: Severity::Info,
                text: "No recorded tunnels to stop.".to_string(),
            });
        }
    }

    Ok(OperationOutput::new(DownOutcome { stopped })
        .with_diagnostics(diagnostics)
        .with_events(events))
}

pub fn status(
    options: StatusOptions,
    _reporter: Option<&mut dyn Reporter>,
) -> OperationResult<StatusOutcome> {
    let mut diagnostics = Vec::new();

    let project = load_project_for_operation(&options.config, &mut diagnostics)?;
    let store = TunnelStore::new(project.state_root.join("logs"));

    let mut rows = Vec::new();
    for spec in &project.services {
        let mut warnings = Vec::new();
        let tunnel_state = match store.load(&spec.name, &mut warnings) {
            Some(handle) => match process::liveness(handle.pid as pid_t) {
                Liveness::Gone => TunnelState::Offline,
                _ => TunnelState::Running { pid: handle.pid },
            },
            None => TunnelState::Offline,
        };
        for warning in warnings {
            diagnostics.push(Diagnostic::new(Severity::Warning, warning));
        }

        rows.push(ServiceStatusRow {
            name: spec.name.clone(),
            port: spec.port,
            listening: port_accepts(spec.port),
            tunnel: tunnel_state,
        });
    }

    Ok(OperationOutput::new(StatusOutcome { rows }).with_diagnostics(diagnostics))
}

fn reclaim_port(
    port: u16,
    reporter: &mut ReporterProxy<'_, '_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> PortReclaimRow {
    let outcome = ports::reclaim(port);
    for warning in &outcome.warnings {
        diagnostics.push(Diagnostic::new(Severity::Warning, warning));
    }

    match outcome.status {
        ReclaimStatus::Freed => {
            reporter.emit(Event::PortReclaimed {
                port,
                terminated: outcome.killed.len(),
            });
        }
        ReclaimStatus::StillOccupied => {
            reporter.emit(Event::PortStillOccupied { port });
        }
    }

    PortReclaimRow {
        port,
        status: outcome.status,
        killed: outcome.killed,
    }
}

fn build_report(project: &ProjectConfig, diagnostics: &mut Vec<Diagnostic>) -> RunReport {
    let lan_ip = context::detect_lan_ip();
    if lan_ip.is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "Could not determine a LAN address; the report falls back to loopback.",
        ));
    }

    let rows = project
        .services
        .iter()
        .map(|spec| {
            let lan = match lan_ip {
                Some(ip) => format!("http://{ip}:{}", spec.port),
                None => format!("http://127.0.0.1:{}", spec.port),
            };
            ReportRow {
                service: spec.name.clone(),
                local: format!("http://127.0.0.1:{}", spec.port),
                lan,
                public: spec
                    .public_hostname
                    .as_ref()
                    .map(|hostname| format!("https://{hostname}")),
            }
        })
        .collect();

    RunReport { rows }
}

fn port_accepts(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, STATUS_CONNECT_TIMEOUT).is_ok()
}

pub(super) fn load_project_for_operation(
    options: &ConfigLoadOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ProjectConfig> {
    let ProjectLoad {
        config,
        diagnostics: diag,
    } = load_project(options)?;
    diagnostics.extend(diag);
    Ok(config)
}

pub(super) struct ReporterProxy<'a, 'b> {
    delegate: Option<&'a mut dyn Reporter>,
    events: &'b mut Vec<Event>,
}

impl<'a, 'b> ReporterProxy<'a, 'b> {
    fn new(delegate: Option<&'a mut dyn Reporter>, events: &'b mut Vec<Event>) -> Self {
        Self { delegate, events }
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event.clone());
        if let Some(reporter) = &mut self.delegate {
            reporter.report(event);
        }
    }
}
