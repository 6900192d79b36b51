use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

/// Per-attempt connect timeout; short so a dead port does not eat the interval.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Polling budget for a readiness probe.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Extra sleep after the first successful check, giving the service time
    /// to finish internal initialization past merely opening its socket.
    pub grace: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_READINESS_ATTEMPTS,
            interval: Duration::from_secs(crate::config::DEFAULT_READINESS_INTERVAL_SECS),
            grace: Duration::from_secs(crate::config::DEFAULT_READY_GRACE_SECS),
        }
    }
}

impl ProbeSettings {
    pub fn from_run(run: &crate::config::RunSettings) -> Self {
        Self {
            max_attempts: run.max_readiness_attempts,
            interval: Duration::from_secs(run.readiness_interval_secs),
            grace: Duration::from_secs(run.ready_grace_secs),
        }
    }
}

/// Binary readiness outcome. There is no partial or degraded state: a TCP
/// accept means ready, anything else means not ready yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl ProbeStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeStatus::Ready { .. })
    }
}

/// Poll until `port` on loopback accepts a connection or the budget runs out.
pub fn await_tcp(port: u16, settings: ProbeSettings) -> ProbeStatus {
    await_addr(("127.0.0.1", port), settings)
}

/// Poll an arbitrary host/port pair.
pub fn await_addr(target: impl ToSocketAddrs, settings: ProbeSettings) -> ProbeStatus {
    let addrs: Vec<SocketAddr> = match target.to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(_) => Vec::new(),
    };

    poll(settings, || {
        addrs
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, CONNECT_TIMEOUT).is_ok())
    })
}

/// Poll an HTTP endpoint; any HTTP response (including error statuses) counts
/// as ready, since the process behind it is demonstrably serving.
pub fn await_http(url: &str, settings: ProbeSettings) -> ProbeStatus {
    poll(settings, || {
        match ureq::get(url).timeout(CONNECT_TIMEOUT).call() {
            Ok(_) => true,
            Err(ureq::Error::Status(_, _)) => true,
            Err(ureq::Error::Transport(_)) => false,
        }
    })
}

/// Database readiness: prefer `pg_isready` when the host has it, fall back to
/// the plain TCP check otherwise.
pub fn await_postgres(
    host: &str,
    port: u16,
    pg_isready: Option<&Path>,
    settings: ProbeSettings,
) -> ProbeStatus {
    match pg_isready {
        Some(binary) => {
            let binary = binary.to_path_buf();
            let host = host.to_string();
            poll(settings, move || {
                Command::new(&binary)
                    .arg("-h")
                    .arg(&host)
                    .arg("-p")
                    .arg(port.to_string())
                    .output()
                    .map(|output| output.status.success())
                    .unwrap_or(false)
            })
        }
        None => await_addr((host, port), settings),
    }
}

fn poll(settings: ProbeSettings, mut check: impl FnMut() -> bool) -> ProbeStatus {
    let max_attempts = settings.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if check() {
            thread::sleep(settings.grace);
            return ProbeStatus::Ready { attempts: attempt };
        }

        if attempt < max_attempts {
            thread::sleep(settings.interval);
        }
    }

    ProbeStatus::TimedOut {
        attempts: max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn fast_settings(max_attempts: u32) -> ProbeSettings {
        ProbeSettings {
            max_attempts,
            interval: Duration::from_millis(50),
            grace: Duration::ZERO,
        }
    }

    #[test]
    fn listening_port_is_ready_on_first_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let status = await_tcp(port, fast_settings(3));
        assert_eq!(status, ProbeStatus::Ready { attempts: 1 });
    }

    #[test]
    fn closed_port_times_out_within_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let settings = fast_settings(2);
        let start = Instant::now();
        let status = await_tcp(port, settings);
        assert_eq!(status, ProbeStatus::TimedOut { attempts: 2 });
        // Budget: attempts * (connect timeout + interval), with headroom for
        // slow CI schedulers.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn port_becoming_ready_mid_probe_is_detected() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            TcpListener::bind(("127.0.0.1", port)).ok()
        });

        let status = await_tcp(port, fast_settings(30));
        assert!(status.is_ready(), "expected ready, got {status:?}");
        let _ = handle.join();
    }

    #[test]
    fn grace_period_delays_the_ready_return() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let settings = ProbeSettings {
            max_attempts: 1,
            interval: Duration::ZERO,
            grace: Duration::from_millis(200),
        };
        let start = Instant::now();
        let status = await_tcp(port, settings);
        assert!(status.is_ready());
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn http_probe_accepts_any_response_status() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = thread::spawn(move || {
            use std::io::{Read, Write};
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n",
                );
            }
        });

        let status = await_http(&format!("http://127.0.0.1:{port}/health"), fast_settings(3));
        assert!(status.is_ready(), "a 503 still proves the server is up");
        let _ = server.join();
    }

    #[test]
    fn await_postgres_falls_back_to_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let status = await_postgres("127.0.0.1", port, None, fast_settings(3));
        assert!(status.is_ready());
    }
}
