use std::net::TcpListener;
use std::process::Command;
use std::thread;
use std::time::Duration;

use libc::pid_t;
use sysinfo::{Pid, System};

use super::process;

/// How long the reaper waits after signaling before re-listing owners.
const SETTLE_DELAY: Duration = Duration::from_millis(300);
/// Terminate-and-verify cycles before giving up on a port.
const RECLAIM_CYCLES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimStatus {
    /// The port accepts a fresh bind; no prior owner survives on it.
    Freed,
    /// Owners survived both terminate-and-verify cycles. Reported, not fatal:
    /// the readiness probe will surface the real problem later.
    StillOccupied,
}

/// A process that was terminated while reclaiming a port.
#[derive(Debug, Clone)]
pub struct ReapedProcess {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug)]
pub struct ReclaimOutcome {
    pub port: u16,
    pub status: ReclaimStatus,
    pub killed: Vec<ReapedProcess>,
    pub warnings: Vec<String>,
}

/// Force-free a TCP port by terminating whatever owns it. Destructive and
/// idempotent: calling it on an already-free port reports `Freed` immediately.
pub fn reclaim(port: u16) -> ReclaimOutcome {
    let mut outcome = ReclaimOutcome {
        port,
        status: ReclaimStatus::Freed,
        killed: Vec::new(),
        warnings: Vec::new(),
    };

    if port_is_free(port) {
        return outcome;
    }

    let mut system: Option<System> = None;
    for cycle in 0..RECLAIM_CYCLES {
        let owners = owning_pids(port);
        if owners.is_empty() && port_is_free(port) {
            return outcome;
        }

        if owners.is_empty() {
            outcome.warnings.push(format!(
                "Port {port} is occupied but no owning process could be identified \
                 (is `lsof` or `ss` installed?)."
            ));
        }

        for pid in owners {
            // Never kill ourselves; the orchestrator may briefly bind ports
            // while probing them.
            if pid == std::process::id() {
                continue;
            }

            let name = process_name(&mut system, pid);
            match process::send_signal(pid as pid_t, libc::SIGKILL) {
                Ok(true) => outcome.killed.push(ReapedProcess { pid, name }),
                Ok(false) => {}
                Err(err) => outcome
                    .warnings
                    .push(format!("Failed to signal pid {pid} ({name}) on port {port}: {err}")),
            }
        }

        thread::sleep(SETTLE_DELAY);

        if port_is_free(port) {
            return outcome;
        }

        if cycle + 1 < RECLAIM_CYCLES {
            thread::sleep(SETTLE_DELAY);
        }
    }

    outcome.status = ReclaimStatus::StillOccupied;
    outcome
}

/// A port only counts as free when both the loopback and the wildcard address
/// accept a bind; on some hosts loopback binds succeed while 0.0.0.0 is taken.
pub fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok() && TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Pids listening on `port`, discovered via `lsof` with an `ss` fallback.
pub fn owning_pids(port: u16) -> Vec<u32> {
    let mut pids = lsof_pids(port);
    if pids.is_empty() {
        pids = ss_pids(port);
    }
    pids.sort_unstable();
    pids.dedup();
    pids
}

fn lsof_pids(port: u16) -> Vec<u32> {
    let output = match Command::new("lsof")
        .args(["-t", "-i", &format!("tcp:{port}"), "-s", "TCP:LISTEN"])
        .output()
    {
        Ok(output) => output,
        Err(_) => return Vec::new(),
    };

    // lsof exits non-zero when nothing matches; stdout is authoritative.
    parse_pid_lines(&String::from_utf8_lossy(&output.stdout))
}

fn ss_pids(port: u16) -> Vec<u32> {
    let output = match Command::new("ss")
        .args(["-tlnp", &format!("sport = :{port}")])
        .output()
    {
        Ok(output) => output,
        Err(_) => return Vec::new(),
    };

    if !output.status.success() {
        return Vec::new();
    }

    parse_ss_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_pid_lines(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

fn parse_ss_output(stdout: &str) -> Vec<u32> {
    let mut pids = Vec::new();
    for line in stdout.lines().skip(1) {
        // ss prints `users:(("name",pid=1234,fd=5),...)` in the last column
        // and can report several pids per line.
        for part in line.split(',') {
            if let Some(rest) = part.trim().strip_prefix("pid=") {
                if let Ok(pid) = rest.parse::<u32>() {
                    pids.push(pid);
                }
            }
        }
    }
    pids
}

fn process_name(system: &mut Option<System>, pid: u32) -> String {
    let system = system.get_or_insert_with(System::new_all);
    system
        .process(Pid::from_u32(pid))
        .map(|process| process.name().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaim_on_free_port_is_a_noop() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let outcome = reclaim(port);
        assert_eq!(outcome.status, ReclaimStatus::Freed);
        assert!(outcome.killed.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn port_is_free_detects_bound_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        assert!(!port_is_free(port));
        drop(listener);
        assert!(port_is_free(port));
    }

    #[test]
    fn parse_pid_lines_handles_lsof_terse_output() {
        assert_eq!(parse_pid_lines("123\n456\n"), vec![123, 456]);
        assert_eq!(parse_pid_lines(""), Vec::<u32>::new());
        assert_eq!(parse_pid_lines("garbage\n789\n"), vec![789]);
    }

    #[test]
    fn parse_ss_output_extracts_pids() {
        let sample = "State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process\n\
                      LISTEN 0      128    0.0.0.0:3009      0.0.0.0:*         users:((\"node\",pid=4242,fd=23),(\"node\",pid=4243,fd=24))\n";
        assert_eq!(parse_ss_output(sample), vec![4242, 4243]);
    }
}
