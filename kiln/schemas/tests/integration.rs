//! Integration tests for kiln schemas
//!
//! Tests the recipe file format and its defaults.

use kiln_schemas::{ActionType, ProgressEvent, Recipe};

#[test]
fn test_recipe_from_toml() {
    let raw = r#"
        [variables]
        out = "dist"

        [jobs.linux]
        variables = { arch = "amd64" }
        dependencies = [{ name = "tar" }, { name = "notes.md", type = "is-exists" }]

        [[jobs.linux.steps]]
        name = "prepare"
        type = "create-path"
        source = "${out}/${arch}"

        [[jobs.linux.steps]]
        name = "version"
        type = "command"
        source = "git describe --tags"
        save = "version"
        save_stderr = true
        to_stdout = "building ${version}"
    "#;

    let recipe: Recipe = toml::from_str(raw).unwrap();
    assert_eq!(recipe.version, "v1");
    assert_eq!(recipe.variables["out"], "dist");

    let linux = &recipe.jobs["linux"];
    assert_eq!(linux.dependencies.len(), 2);
    assert_eq!(linux.dependencies[0].kind, ActionType::Command);
    assert_eq!(linux.dependencies[1].kind, ActionType::IsExists);

    assert_eq!(linux.steps[0].action, ActionType::CreatePath);
    assert!(linux.steps[0].target.is_empty());
    assert!(!linux.steps[0].save_stderr);

    assert_eq!(linux.steps[1].save, "version");
    assert!(linux.steps[1].save_stderr);
    assert_eq!(linux.steps[1].to_stdout, "building ${version}");
}

#[test]
fn test_unknown_action_type_is_rejected() {
    let raw = r#"
        [[jobs.broken.steps]]
        type = "launch-rocket"
    "#;

    let err = toml::from_str::<Recipe>(raw).unwrap_err();
    assert!(err.to_string().contains("launch-rocket"));
}

#[test]
fn test_empty_recipe_defaults() {
    let recipe: Recipe = toml::from_str("").unwrap();
    assert_eq!(recipe.version, "v1");
    assert!(recipe.jobs.is_empty());
    assert!(recipe.variables.is_empty());
}

#[test]
fn test_progress_event_tagging() {
    let event = ProgressEvent::JobCompleted {
        owner: "linux".to_string(),
        remaining: 2,
    };

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "job_completed");
    assert_eq!(json["owner"], "linux");
    assert_eq!(json["remaining"], 2);
}
