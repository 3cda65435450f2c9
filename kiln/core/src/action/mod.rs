//! Single executable steps.
//!
//! An [`Action`] is built fresh for every step, bound to its operation by
//! [`Action::init`] and run exactly once with [`Action::run`]. Operations are plain
//! blocking functions; the `-quiet` action types reuse the same functions through
//! the [`quiet`] combinator.

use std::{
    env, fmt,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use kiln_schemas::ActionType;
use tracing::{debug, instrument};

mod checks;
mod command;
mod error;
mod fs;

pub use error::ActionError;

pub type Result<T> = core::result::Result<T, ActionError>;

/// Plain operation implementing one action type
pub type RawOperation = fn(&Action) -> Result<ActionOutput>;

/// Operation bound to an action by [`Action::init`]
pub type Operation = Box<dyn Fn(&Action) -> Result<ActionOutput> + Send + Sync>;

/// Captured streams of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Typed result of an operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionOutput {
    #[default]
    None,
    Exec(ExecOutput),
    Text(String),
    Flag(bool),
}

impl ActionOutput {
    /// Value stored when the step saves its output.
    ///
    /// Command output prefers stderr when `prefer_stderr` is set; trailing whitespace is trimmed.
    pub fn saved_value(&self, prefer_stderr: bool) -> Option<String> {
        match self {
            ActionOutput::None => None,
            ActionOutput::Exec(exec) if prefer_stderr => Some(exec.stderr.trim_end().to_string()),
            ActionOutput::Exec(exec) => Some(exec.stdout.trim_end().to_string()),
            ActionOutput::Text(text) => Some(text.clone()),
            ActionOutput::Flag(flag) => Some(flag.to_string()),
        }
    }
}

// filesystem steps with a location hold the write side while the process is inside it
static WORKING_DIR: RwLock<()> = RwLock::new(());

fn shared_working_dir() -> RwLockReadGuard<'static, ()> {
    WORKING_DIR.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn exclusive_working_dir() -> RwLockWriteGuard<'static, ()> {
    WORKING_DIR.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The process working directory, read while no step is inside its `location`
pub fn current_dir() -> std::io::Result<PathBuf> {
    let _guard = shared_working_dir();
    env::current_dir()
}

/// A single step with its resolved parameters
pub struct Action {
    pub name: String,
    pub action_type: ActionType,
    pub location: String,
    pub source: String,
    pub target: String,
    pub save: String,
    pub save_stderr: bool,
    working_dir: Option<PathBuf>,
    operation: Option<Operation>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("action_type", &self.action_type)
            .field("location", &self.location)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("save", &self.save)
            .field("initialised", &self.operation.is_some())
            .finish()
    }
}

impl Action {
    pub fn new(name: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            name: name.into(),
            action_type,
            location: String::new(),
            source: String::new(),
            target: String::new(),
            save: String::new(),
            save_stderr: false,
            working_dir: None,
            operation: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Bind the operation for this action's type.
    ///
    /// Also records the absolute directory the action works in: its `location`
    /// resolved against the current directory, or the current directory itself.
    pub fn init(&mut self) -> Result<()> {
        self.operation = Some(dispatch(self.action_type));

        if self.working_dir.is_none() {
            let current =
                current_dir().map_err(|e| ActionError::io("read current directory", ".", e))?;
            self.working_dir = Some(current.join(&self.location));
        }

        Ok(())
    }

    /// Directory the action runs in, known after [`Action::init`]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Run the bound operation.
    ///
    /// Commands are spawned directly in [`Action::working_dir`] and never touch the
    /// process directory. For any other action with a non-empty `location` the
    /// process changes into it for the duration of the operation and always
    /// changes back afterwards, whatever the outcome.
    #[instrument(skip_all, fields(action = %self.action_type, name = %self.name))]
    pub fn run(&self) -> Result<ActionOutput> {
        let operation = self
            .operation
            .as_ref()
            .ok_or_else(|| ActionError::NotInitialised(self.name.clone()))?;

        // a long subprocess must not hold the working directory lock
        if self.action_type.is_exec() {
            return operation(self);
        }

        if self.location.is_empty() {
            let _guard = shared_working_dir();
            return operation(self);
        }

        let _guard = exclusive_working_dir();

        let previous = env::current_dir()
            .map_err(|e| ActionError::io("read current directory", ".", e))?;
        env::set_current_dir(&self.location).map_err(|source| ActionError::ChangeDir {
            path: PathBuf::from(&self.location),
            source,
        })?;
        debug!("Entered {}", self.location);

        let result = operation(self);
        let restored = env::set_current_dir(&previous).map_err(|source| ActionError::RestoreDir {
            path: previous.clone(),
            source,
        });

        match (result, restored) {
            (result, Ok(())) => result,
            (Ok(_), Err(restore)) => Err(restore),
            (Err(error), Err(restore)) => Err(ActionError::Combined {
                error: Box::new(error),
                restore: Box::new(restore),
            }),
        }
    }

    pub(crate) fn require(&self, field: &'static str, value: &str) -> Result<()> {
        if value.is_empty() {
            Err(ActionError::MissingField {
                action: self.action_type,
                field,
            })
        } else {
            Ok(())
        }
    }
}

fn strict(operation: RawOperation) -> Operation {
    Box::new(operation)
}

/// Wrap `operation` so its error is discarded.
///
/// A failed quiet operation reports [`ActionOutput::None`].
pub fn quiet(operation: RawOperation) -> Operation {
    Box::new(move |action: &Action| match operation(action) {
        Ok(output) => Ok(output),
        Err(error) => {
            debug!("Ignoring failure of {}: {error}", action.action_type);
            Ok(ActionOutput::None)
        }
    })
}

fn placeholder(_action: &Action) -> Result<ActionOutput> {
    Ok(ActionOutput::None)
}

/// Operation implementing `action_type`
pub fn dispatch(action_type: ActionType) -> Operation {
    match action_type {
        ActionType::Placeholder => strict(placeholder),
        ActionType::Command => strict(command::exec),
        ActionType::CommandQuiet => quiet(command::exec),
        ActionType::Copy => strict(fs::copy),
        ActionType::CopyQuiet => quiet(fs::copy),
        ActionType::CreateDir => strict(fs::create_dir),
        ActionType::CreatePath => strict(fs::create_path),
        ActionType::Delete => strict(fs::delete),
        ActionType::DeleteQuiet => quiet(fs::delete),
        ActionType::DeleteRecursive => strict(fs::delete_recursive),
        ActionType::DeleteRecursiveQuiet => quiet(fs::delete_recursive),
        ActionType::IsExists => strict(checks::is_exists),
        ActionType::IsEmpty => strict(checks::is_empty),
        ActionType::IsEqual => strict(checks::is_equal),
        ActionType::IsNotEmpty => strict(checks::is_not_empty),
        ActionType::IsNotEqual => strict(checks::is_not_equal),
        ActionType::Move => strict(fs::move_path),
        ActionType::MoveQuiet => quiet(fs::move_path),
        ActionType::Script => strict(fs::script),
        ActionType::ScriptQuiet => quiet(fs::script),
        ActionType::Chmod => strict(fs::chmod),
        ActionType::ChmodQuiet => quiet(fs::chmod),
        ActionType::Chown => strict(fs::chown),
        ActionType::ChownQuiet => quiet(fs::chown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn run(action_type: ActionType, source: &str, target: &str) -> Result<ActionOutput> {
        let mut action = Action::new("test", action_type)
            .with_source(source)
            .with_target(target);
        action.init()?;
        action.run()
    }

    #[test]
    fn run_before_init_fails() {
        let action = Action::new("early", ActionType::Placeholder);
        assert!(matches!(action.run(), Err(ActionError::NotInitialised(_))));
    }

    #[test]
    fn init_binds_working_dir() {
        let mut action = Action::new("here", ActionType::Placeholder);
        action.init().unwrap();
        assert_eq!(action.working_dir().unwrap(), current_dir().unwrap());

        let mut action = Action::new("there", ActionType::Placeholder).with_location("/tmp");
        action.init().unwrap();
        assert_eq!(action.working_dir().unwrap(), Path::new("/tmp"));
    }

    #[test]
    fn placeholder_never_fails() {
        assert_eq!(run(ActionType::Placeholder, "", "").unwrap(), ActionOutput::None);
    }

    #[test]
    fn chmod_rejects_invalid_permission() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("tool");
        std::fs::write(&file, "").unwrap();
        let file = file.to_str().unwrap();

        let err = run(ActionType::Chmod, file, "invalid").unwrap_err();
        assert!(err.to_string().contains("error converting file perm"));

        let output = run(ActionType::ChmodQuiet, file, "invalid").unwrap();
        assert_eq!(output, ActionOutput::None);
    }

    #[rstest]
    #[case(ActionType::CommandQuiet, "exit 3", "")]
    #[case(ActionType::CopyQuiet, "/nonexistent/kiln/source", "/nonexistent/kiln/target")]
    #[case(ActionType::DeleteQuiet, "/nonexistent/kiln/file", "")]
    #[case(ActionType::DeleteRecursiveQuiet, "", "")]
    #[case(ActionType::MoveQuiet, "/nonexistent/kiln/source", "/nonexistent/kiln/target")]
    #[case(ActionType::ScriptQuiet, "echo hi", "")]
    #[case(ActionType::ChmodQuiet, "/nonexistent/kiln/file", "755")]
    #[case(ActionType::ChownQuiet, "/nonexistent/kiln/file", "not-an-owner")]
    fn quiet_variants_never_fail(
        #[case] action_type: ActionType,
        #[case] source: &str,
        #[case] target: &str,
    ) {
        let strict = run(action_type.base(), source, target);
        assert!(strict.is_err(), "{} should fail", action_type.base());

        let quiet = run(action_type, source, target);
        assert!(quiet.is_ok(), "{action_type} returned {quiet:?}");
    }

    #[test]
    fn location_is_restored_after_failure() {
        let dir = TempDir::new().unwrap();
        let before = current_dir().unwrap();

        let mut action = Action::new("fails inside", ActionType::Delete)
            .with_location(dir.path().to_str().unwrap())
            .with_source("missing-file");
        action.init().unwrap();

        assert!(action.run().is_err());
        assert_eq!(current_dir().unwrap(), before);
    }

    #[test]
    fn location_scopes_relative_paths() {
        let dir = TempDir::new().unwrap();
        let before = current_dir().unwrap();

        let mut action = Action::new("mkdir inside", ActionType::CreateDir)
            .with_location(dir.path().to_str().unwrap())
            .with_source("created");
        action.init().unwrap();
        action.run().unwrap();

        assert!(dir.path().join("created").is_dir());
        assert_eq!(current_dir().unwrap(), before);
    }

    #[test]
    fn missing_location_fails_without_moving() {
        let before = current_dir().unwrap();

        let mut action = Action::new("nowhere", ActionType::Placeholder)
            .with_location("/nonexistent/kiln/location");
        action.init().unwrap();

        assert!(matches!(action.run(), Err(ActionError::ChangeDir { .. })));
        assert_eq!(current_dir().unwrap(), before);
    }

    #[test]
    fn relative_location_is_resolved_at_init() {
        let mut action = Action::new("nested", ActionType::Placeholder).with_location("target/dist");
        action.init().unwrap();
        assert_eq!(
            action.working_dir().unwrap(),
            current_dir().unwrap().join("target/dist")
        );
    }

    #[test]
    fn command_location_leaves_process_directory_alone() {
        let dir = TempDir::new().unwrap();
        let before = current_dir().unwrap();

        let mut action = Action::new("pwd inside", ActionType::Command)
            .with_location(dir.path().to_str().unwrap())
            .with_source("pwd -P");
        action.init().unwrap();

        let output = action.run().unwrap();

        assert_eq!(
            output.saved_value(false).unwrap(),
            dir.path().canonicalize().unwrap().to_str().unwrap()
        );
        assert_eq!(current_dir().unwrap(), before);
    }

    #[test]
    fn command_in_missing_location_fails() {
        let mut action = Action::new("nowhere", ActionType::Command)
            .with_location("/nonexistent/kiln/location")
            .with_source("true");
        action.init().unwrap();

        assert!(matches!(action.run(), Err(ActionError::ChangeDir { .. })));
    }

    #[rstest]
    #[case(ActionOutput::None, false, None)]
    #[case(ActionOutput::Flag(true), false, Some("true"))]
    #[case(ActionOutput::Text("v1".into()), true, Some("v1"))]
    #[case(
        ActionOutput::Exec(ExecOutput { stdout: "out\n".into(), stderr: "err\n".into() }),
        false,
        Some("out")
    )]
    #[case(
        ActionOutput::Exec(ExecOutput { stdout: "out\n".into(), stderr: "err\n".into() }),
        true,
        Some("err")
    )]
    fn saved_values(
        #[case] output: ActionOutput,
        #[case] prefer_stderr: bool,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(output.saved_value(prefer_stderr).as_deref(), expected);
    }
}
