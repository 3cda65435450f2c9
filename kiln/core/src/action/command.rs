use std::{
    fs, io,
    process::{Command, Stdio},
};

use tracing::{debug, instrument};

use super::{Action, ActionError, ActionOutput, ExecOutput, Result};

const SHELL: &str = "sh";

/// Run `source` as a shell command line and capture both streams.
///
/// The child starts in the action's working directory once it was initialised.
#[instrument(skip_all, fields(command = %action.source), err)]
pub(super) fn exec(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;

    let mut command = Command::new(SHELL);
    command.arg("-c").arg(&action.source).stdin(Stdio::null());

    if let Some(dir) = action.working_dir() {
        let change_dir = |source: io::Error| ActionError::ChangeDir {
            path: dir.to_path_buf(),
            source,
        };
        let metadata = fs::metadata(dir).map_err(change_dir)?;
        if !metadata.is_dir() {
            return Err(change_dir(io::Error::other("not a directory")));
        }
        command.current_dir(dir);
    }

    let output = command
        .output()
        .map_err(|source| ActionError::Spawn {
            command: action.source.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        let status = output
            .status
            .code()
            .map(|code| format!("exit code {code}"))
            .unwrap_or_else(|| "a signal".to_string());

        return Err(ActionError::CommandFailed {
            command: action.source.clone(),
            status,
            stderr: stderr.trim_end().to_string(),
        });
    }

    debug!("Command finished, {} bytes of output", stdout.len());

    Ok(ActionOutput::Exec(ExecOutput { stdout, stderr }))
}
