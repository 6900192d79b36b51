use std::io;
use std::thread;
use std::time::{Duration, Instant};

use libc::pid_t;

/// Liveness of a pid as far as signaling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The process exists (or exists under another uid — EPERM counts as alive).
    Alive,
    /// No such process.
    Gone,
    /// Signal 0 failed for a reason other than ESRCH/EPERM.
    Unknown { errno: i32 },
}

/// Probe a pid with signal 0.
pub fn liveness(pid: pid_t) -> Liveness {
    let res = unsafe { libc::kill(pid, 0) };
    if res == 0 {
        return Liveness::Alive;
    }

    let errno = io::Error::last_os_error().raw_os_error().unwrap_or_default();
    match errno {
        libc::EPERM => Liveness::Alive,
        libc::ESRCH => Liveness::Gone,
        other => Liveness::Unknown { errno: other },
    }
}

/// Send `signal` to `pid`. `Ok(false)` means the process was already gone.
pub fn send_signal(pid: pid_t, signal: i32) -> io::Result<bool> {
    let res = unsafe { libc::kill(pid, signal) };
    if res == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Poll until `pid` exits or `timeout` elapses. Returns `true` once the
/// process is gone.
pub fn wait_for_exit(pid: pid_t, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if liveness(pid) == Liveness::Gone {
            return true;
        }

        if start.elapsed() >= timeout {
            return false;
        }

        thread::sleep(Duration::from_millis(100));
    }
}
