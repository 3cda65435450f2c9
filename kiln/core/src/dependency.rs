//! Pre-flight checks for the external tools a job needs.

use std::{
    env,
    ffi::OsString,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use kiln_schemas::{ActionType, DependencyDefinition};
use miette::Diagnostic;
use tracing::debug;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum DependencyError {
    #[error("dependency has no name")]
    #[diagnostic(
        code(kiln::dependency::unnamed),
        help("Every entry in a job's `dependencies` needs a `name`")
    )]
    Unnamed,

    #[error("missing dependency '{name}'")]
    #[diagnostic(
        code(kiln::dependency::missing),
        help("Install '{name}' or add the directory containing it to PATH")
    )]
    Missing { name: String },
}

/// A named external requirement of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub kind: ActionType,
}

impl From<&DependencyDefinition> for Dependency {
    fn from(definition: &DependencyDefinition) -> Self {
        Self::new(definition.name.clone(), definition.kind)
    }
}

impl Dependency {
    pub fn new(name: impl Into<String>, kind: ActionType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Check the dependency is available.
    ///
    /// Executables are looked up on `PATH` and `name` is rewritten to the
    /// absolute path that was found. Other kinds need no check.
    pub fn init(&mut self) -> Result<(), DependencyError> {
        if self.name.is_empty() {
            return Err(DependencyError::Unnamed);
        }

        if !self.kind.is_exec() {
            return Ok(());
        }

        let resolved = resolve_executable(&self.name, env::var_os("PATH")).ok_or_else(|| {
            DependencyError::Missing {
                name: self.name.clone(),
            }
        })?;

        debug!("Resolved dependency {} to {}", self.name, resolved.display());
        self.name = resolved.display().to_string();

        Ok(())
    }
}

/// Absolute path of the executable `name`.
///
/// Names containing a `/` are checked as given, relative ones against the
/// current directory; plain names are searched in the directories of `path_var`.
pub fn resolve_executable(name: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    if name.contains('/') {
        let path = Path::new(name);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            crate::action::current_dir().ok()?.join(path)
        };
        return is_executable(&path).then_some(path);
    }

    let path_var = path_var?;
    env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
        .and_then(|found| {
            if found.is_absolute() {
                Some(found)
            } else {
                crate::action::current_dir().ok().map(|cwd| cwd.join(found))
            }
        })
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
