use std::{fs, io, path::Path};

use super::{Action, ActionError, ActionOutput, Result};

/// Whether the path in `source` exists; stat errors other than not-found are reported
pub(super) fn is_exists(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;

    let path = Path::new(&action.source);
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(ActionOutput::Flag(true)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ActionOutput::Flag(false)),
        Err(e) => Err(ActionError::io("stat", path, e)),
    }
}

pub(super) fn is_empty(action: &Action) -> Result<ActionOutput> {
    Ok(ActionOutput::Flag(action.source.is_empty()))
}

pub(super) fn is_not_empty(action: &Action) -> Result<ActionOutput> {
    Ok(ActionOutput::Flag(!action.source.is_empty()))
}

pub(super) fn is_equal(action: &Action) -> Result<ActionOutput> {
    Ok(ActionOutput::Flag(action.source == action.target))
}

pub(super) fn is_not_equal(action: &Action) -> Result<ActionOutput> {
    Ok(ActionOutput::Flag(action.source != action.target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_schemas::ActionType;
    use rstest::rstest;

    #[rstest]
    #[case(ActionType::IsEmpty, "", "", true)]
    #[case(ActionType::IsEmpty, "x", "", false)]
    #[case(ActionType::IsNotEmpty, "x", "", true)]
    #[case(ActionType::IsEqual, "1.2.0", "1.2.0", true)]
    #[case(ActionType::IsEqual, "1.2.0", "1.3.0", false)]
    #[case(ActionType::IsNotEqual, "1.2.0", "1.3.0", true)]
    fn comparisons(
        #[case] action_type: ActionType,
        #[case] source: &str,
        #[case] target: &str,
        #[case] expected: bool,
    ) {
        let action = Action::new("check", action_type)
            .with_source(source)
            .with_target(target);

        let output = match action_type {
            ActionType::IsEmpty => is_empty(&action),
            ActionType::IsNotEmpty => is_not_empty(&action),
            ActionType::IsEqual => is_equal(&action),
            _ => is_not_equal(&action),
        };

        assert_eq!(output.unwrap(), ActionOutput::Flag(expected));
    }

    #[test]
    fn exists() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = Action::new("check", ActionType::IsExists)
            .with_source(dir.path().to_str().unwrap());
        assert_eq!(is_exists(&present).unwrap(), ActionOutput::Flag(true));

        let missing = Action::new("check", ActionType::IsExists)
            .with_source(dir.path().join("missing").to_str().unwrap());
        assert_eq!(is_exists(&missing).unwrap(), ActionOutput::Flag(false));
    }
}
