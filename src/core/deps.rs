use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::context::{ComposeTool, RunContext};

/// Manifest names probed inside each compose directory, in preference order.
const MANIFEST_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Outcome of one compose directory's bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    /// The compose tool accepted the manifest; containers are converging.
    Started,
    /// No compose tool installed; the directory was left untouched.
    SkippedNoTool,
    /// No recognizable manifest in the directory.
    SkippedNoManifest,
    /// The tool exited non-zero. Tolerated: the containers may already be
    /// running from a prior invocation.
    FailedTolerated { exit_code: Option<i32> },
}

impl BootstrapStatus {
    pub fn describe(&self) -> String {
        match self {
            BootstrapStatus::Started => "started".to_string(),
            BootstrapStatus::SkippedNoTool => "skipped (no compose tool)".to_string(),
            BootstrapStatus::SkippedNoManifest => "skipped (no manifest)".to_string(),
            BootstrapStatus::FailedTolerated { exit_code: Some(code) } => {
                format!("failed (exit {code}, tolerated)")
            }
            BootstrapStatus::FailedTolerated { exit_code: None } => {
                "failed (signaled, tolerated)".to_string()
            }
        }
    }
}

#[derive(Debug)]
pub struct ComposeRun {
    pub dir: PathBuf,
    pub status: BootstrapStatus,
    /// Raw tool output capture, when the tool actually ran.
    pub log_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct BootstrapOutcome {
    pub runs: Vec<ComposeRun>,
    pub warnings: Vec<String>,
}

impl BootstrapOutcome {
    pub fn any_started(&self) -> bool {
        self.runs
            .iter()
            .any(|run| run.status == BootstrapStatus::Started)
    }
}

/// Bring up the compose stack in each directory. Failures never abort the
/// run: each directory gets a status and the sequence continues.
pub fn bootstrap(ctx: &RunContext, dirs: &[PathBuf]) -> BootstrapOutcome {
    let mut outcome = BootstrapOutcome {
        runs: Vec::new(),
        warnings: Vec::new(),
    };

    let tool = match &ctx.compose {
        Some(tool) => tool,
        None => {
            outcome.warnings.push(
                "No compose tool found (tried docker compose, docker-compose, podman-compose); \
                 dependency bootstrap skipped."
                    .to_string(),
            );
            for dir in dirs {
                let status = BootstrapStatus::SkippedNoTool;
                log_event(ctx, dir, &status);
                outcome.runs.push(ComposeRun {
                    dir: dir.clone(),
                    status,
                    log_path: None,
                });
            }
            return outcome;
        }
    };

    for dir in dirs {
        let run = bootstrap_dir(ctx, tool, dir, &mut outcome.warnings);
        log_event(ctx, dir, &run.status);
        outcome.runs.push(run);
    }

    outcome
}

fn bootstrap_dir(
    ctx: &RunContext,
    tool: &ComposeTool,
    dir: &Path,
    warnings: &mut Vec<String>,
) -> ComposeRun {
    let manifest = match find_manifest(dir) {
        Some(manifest) => manifest,
        None => {
            warnings.push(format!(
                "No compose manifest found in {} (looked for {}).",
                dir.display(),
                MANIFEST_NAMES.join(", ")
            ));
            return ComposeRun {
                dir: dir.to_path_buf(),
                status: BootstrapStatus::SkippedNoManifest,
                log_path: None,
            };
        }
    };

    let log_path = ctx.log_root.join(format!("deps-{}.log", dir_label(dir)));

    let output = match tool.up_command(&manifest).current_dir(dir).output() {
        Ok(output) => output,
        Err(err) => {
            warnings.push(format!(
                "Failed to invoke {} in {}: {err}",
                tool.describe(),
                dir.display()
            ));
            return ComposeRun {
                dir: dir.to_path_buf(),
                status: BootstrapStatus::FailedTolerated { exit_code: None },
                log_path: None,
            };
        }
    };

    if let Err(err) = capture_output(&log_path, &output.stdout, &output.stderr) {
        warnings.push(format!(
            "Failed to write compose output to {}: {err}",
            log_path.display()
        ));
    }

    let status = if output.status.success() {
        BootstrapStatus::Started
    } else {
        warnings.push(format!(
            "{} exited with {} in {}; continuing (containers may already be up). See {}.",
            tool.describe(),
            output
                .status
                .code()
                .map(|code| format!("code {code}"))
                .unwrap_or_else(|| "a signal".to_string()),
            dir.display(),
            log_path.display()
        ));
        BootstrapStatus::FailedTolerated {
            exit_code: output.status.code(),
        }
    };

    ComposeRun {
        dir: dir.to_path_buf(),
        status,
        log_path: Some(log_path),
    }
}

fn find_manifest(dir: &Path) -> Option<PathBuf> {
    MANIFEST_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn dir_label(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

fn capture_output(log_path: &Path, stdout: &[u8], stderr: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(log_path)?;
    file.write_all(stdout)?;
    file.write_all(stderr)?;
    Ok(())
}

/// Append one JSON line per directory to the bootstrap journal. Best effort:
/// a journal write failure never disturbs the run.
fn log_event(ctx: &RunContext, dir: &Path, status: &BootstrapStatus) {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let line = json!({
        "ts": timestamp,
        "dir": dir.display().to_string(),
        "status": status.describe(),
    });

    let path = ctx.log_root.join("deps-bootstrap.log");
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "{line}");
    }
}
