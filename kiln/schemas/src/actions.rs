//! Action type identifiers.
//!
//! The string form of every variant is part of the recipe file format and must stay stable.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Returned when a string does not name a known action type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action type '{0}'")]
pub struct UnknownActionType(pub String);

/// The closed set of operations a step can perform.
///
/// Every fallible operation has a `-quiet` counterpart that performs the same work
/// but discards its error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    #[default]
    Placeholder,
    Command,
    CommandQuiet,
    Copy,
    CopyQuiet,
    CreateDir,
    CreatePath,
    Delete,
    DeleteQuiet,
    DeleteRecursive,
    DeleteRecursiveQuiet,
    IsExists,
    IsEmpty,
    IsEqual,
    IsNotEmpty,
    IsNotEqual,
    Move,
    MoveQuiet,
    Script,
    ScriptQuiet,
    Chmod,
    ChmodQuiet,
    Chown,
    ChownQuiet,
}

impl ActionType {
    /// Every action type, in wire order
    pub const ALL: [ActionType; 24] = [
        ActionType::Placeholder,
        ActionType::Command,
        ActionType::CommandQuiet,
        ActionType::Copy,
        ActionType::CopyQuiet,
        ActionType::CreateDir,
        ActionType::CreatePath,
        ActionType::Delete,
        ActionType::DeleteQuiet,
        ActionType::DeleteRecursive,
        ActionType::DeleteRecursiveQuiet,
        ActionType::IsExists,
        ActionType::IsEmpty,
        ActionType::IsEqual,
        ActionType::IsNotEmpty,
        ActionType::IsNotEqual,
        ActionType::Move,
        ActionType::MoveQuiet,
        ActionType::Script,
        ActionType::ScriptQuiet,
        ActionType::Chmod,
        ActionType::ChmodQuiet,
        ActionType::Chown,
        ActionType::ChownQuiet,
    ];

    /// Wire name used in recipe files
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Placeholder => "placeholder",
            ActionType::Command => "command",
            ActionType::CommandQuiet => "command-quiet",
            ActionType::Copy => "copy",
            ActionType::CopyQuiet => "copy-quiet",
            ActionType::CreateDir => "create-dir",
            ActionType::CreatePath => "create-path",
            ActionType::Delete => "delete",
            ActionType::DeleteQuiet => "delete-quiet",
            ActionType::DeleteRecursive => "delete-recursive",
            ActionType::DeleteRecursiveQuiet => "delete-recursive-quiet",
            ActionType::IsExists => "is-exists",
            ActionType::IsEmpty => "is-empty",
            ActionType::IsEqual => "is-equal",
            ActionType::IsNotEmpty => "is-not-empty",
            ActionType::IsNotEqual => "is-not-equal",
            ActionType::Move => "move",
            ActionType::MoveQuiet => "move-quiet",
            ActionType::Script => "script",
            ActionType::ScriptQuiet => "script-quiet",
            ActionType::Chmod => "chmod",
            ActionType::ChmodQuiet => "chmod-quiet",
            ActionType::Chown => "chown",
            ActionType::ChownQuiet => "chown-quiet",
        }
    }

    /// Whether this is a best-effort variant whose errors are discarded
    pub fn is_quiet(&self) -> bool {
        self.base() != *self
    }

    /// The non-quiet operation this type performs
    pub fn base(&self) -> ActionType {
        match self {
            ActionType::CommandQuiet => ActionType::Command,
            ActionType::CopyQuiet => ActionType::Copy,
            ActionType::DeleteQuiet => ActionType::Delete,
            ActionType::DeleteRecursiveQuiet => ActionType::DeleteRecursive,
            ActionType::MoveQuiet => ActionType::Move,
            ActionType::ScriptQuiet => ActionType::Script,
            ActionType::ChmodQuiet => ActionType::Chmod,
            ActionType::ChownQuiet => ActionType::Chown,
            other => *other,
        }
    }

    /// Whether this type runs an external program
    pub fn is_exec(&self) -> bool {
        self.base() == ActionType::Command
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownActionType(s.to_string()))
    }
}
