//! Bounded execution of helper commands (`ip`, `arp`, `ping`, `iwconfig`)
//!
//! Every helper runs under a timeout and with `kill_on_drop`, so a hung
//! binary never stalls a sampler or a probe round.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, trace};
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::ProbeError;

/// Captured result of a helper command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args...` and captures its output
///
/// A missing binary maps to `ToolUnavailable` so callers can fall back to
/// another source. A non-zero exit is not an error: many helpers (ping with
/// total loss, for one) still print something worth parsing.
pub async fn run_command(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<CommandOutput, ProbeError> {
    trace!("Running helper: {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProbeError::tool_unavailable(program, "not found in PATH"),
            ErrorKind::PermissionDenied => ProbeError::tool_unavailable(program, "permission denied"),
            _ => ProbeError::Io(e),
        })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_elapsed) => {
            debug!("Helper '{}' timed out after {}ms", program, limit.as_millis());
            return Err(ProbeError::Other(anyhow::anyhow!(
                "{} did not finish within {}ms",
                program,
                limit.as_millis()
            )));
        }
    };

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
