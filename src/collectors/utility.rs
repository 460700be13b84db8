//! Synchronous invocation of the external utilities (lscpu, df, lsblk).
//!
//! No timeout is applied here; a hung utility stalls the calling cycle.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::CollectorError;

/// Runs `program` with `args` (and optional extra environment), stdin closed
/// and stderr discarded, and returns its stdout as text.
///
/// A spawn failure or a non-zero exit status is reported as
/// [`CollectorError::Unavailable`].
pub fn run_utility(
    program: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> Result<String, CollectorError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    for (key, value) in env {
        cmd.env(key, value);
    }

    debug!("Running {} {}", program.display(), args.join(" "));

    let output = cmd
        .output()
        .map_err(|e| CollectorError::unavailable(format!("{}: {}", program.display(), e)))?;

    if !output.status.success() {
        return Err(CollectorError::unavailable(format!(
            "{} exited with {}",
            program.display(),
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
