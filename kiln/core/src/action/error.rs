use std::{num::ParseIntError, path::PathBuf};

use kiln_schemas::ActionType;
use miette::Diagnostic;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ActionError {
    #[error("{action}: '{field}' must not be empty")]
    #[diagnostic(code(kiln::action::missing_field))]
    MissingField {
        action: ActionType,
        field: &'static str,
    },

    #[error("action '{0}' was run before it was initialised")]
    #[diagnostic(code(kiln::action::not_initialised))]
    NotInitialised(String),

    #[error("source '{}' does not exist", .0.display())]
    #[diagnostic(code(kiln::action::source_missing))]
    SourceMissing(PathBuf),

    #[error("target '{}' already exists", .0.display())]
    #[diagnostic(
        code(kiln::action::target_exists),
        help("remove the file in an earlier step, e.g. with `delete-quiet`")
    )]
    TargetExists(PathBuf),

    #[error("error converting file perm '{value}': {source}")]
    #[diagnostic(
        code(kiln::action::invalid_permission),
        help("permissions are octal, e.g. \"755\" or \"0644\"")
    )]
    InvalidPermission {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid owner '{0}', expected UID:GID")]
    #[diagnostic(code(kiln::action::invalid_owner))]
    InvalidOwner(String),

    #[error("failed to start '{command}': {source}")]
    #[diagnostic(code(kiln::action::spawn))]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    #[diagnostic(code(kiln::action::command_failed))]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{operation} '{}' failed: {source}", path.display())]
    #[diagnostic(code(kiln::action::io))]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to change directory to '{}': {source}", path.display())]
    #[diagnostic(code(kiln::action::change_dir))]
    ChangeDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to restore directory '{}': {source}", path.display())]
    #[diagnostic(code(kiln::action::restore_dir))]
    RestoreDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{error}; {restore}")]
    #[diagnostic(code(kiln::action::combined))]
    Combined {
        error: Box<ActionError>,
        restore: Box<ActionError>,
    },
}

impl ActionError {
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        ActionError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
