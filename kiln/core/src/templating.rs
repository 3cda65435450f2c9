use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
#[cfg(any(feature = "toml", feature = "json"))]
use std::sync::Arc;

use kiln_schemas::{Recipe, Variables};
#[cfg(any(feature = "toml", feature = "json"))]
use miette::{NamedSource, SourceOffset, SourceSpan};
use miette::Diagnostic;
use regex::{Captures, Regex};
use tracing::debug;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum TemplateError {
    #[error("Recipe file not found: '{file_path}'")]
    #[diagnostic(
        code(kiln::template::file_not_found),
        help("Check that the file path is correct and the file exists")
    )]
    NotFound {
        #[source]
        source: std::io::Error,
        file_path: String,
    },

    #[error("Unsupported recipe format: '{0}'")]
    #[diagnostic(
        code(kiln::template::unknown_format),
        help(
            "The recipe format '{0}' is not supported in this build.\n\
             \n\
             Available formats in this build:\n\
             {}",
            Self::available_formats()
        )
    )]
    UnknownFormat(TemplateFormat),

    #[error("Missing template variables: {0:?}")]
    #[diagnostic(
        code(kiln::template::missing_params),
        help(
            "Define the variables in the recipe, save them in an earlier step or pass them with -p.\n\
              \n\
              Example:\n\
              kiln run -f kiln.toml -p version=1.2.0"
        )
    )]
    MissingParams(BTreeSet<String>),

    #[error("Job '{job}' step {step} uses undefined variables: {names:?}")]
    #[diagnostic(
        code(kiln::template::unresolved_variables),
        help("Variables must be defined in the recipe, passed with -p or saved by an earlier step")
    )]
    UnresolvedVariables {
        job: String,
        step: usize,
        names: BTreeSet<String>,
    },

    #[cfg(feature = "json")]
    #[error("JSON parsing error")]
    #[diagnostic(code(kiln::template::json_parse_error))]
    ParseJson {
        #[source_code]
        source_code: Arc<NamedSource<String>>,
        #[label("{}", error)]
        span: SourceSpan,
        #[source]
        error: serde_json::Error,
    },

    #[cfg(feature = "toml")]
    #[error("TOML parsing error")]
    #[diagnostic(code(kiln::template::toml_parse_error))]
    ParseToml {
        #[source_code]
        source_code: Arc<NamedSource<String>>,
        #[label("{}", error)]
        span: SourceSpan,
        #[source]
        error: toml::de::Error,
    },
}

impl TemplateError {
    fn available_formats() -> String {
        let mut formats = vec![];

        #[cfg(feature = "json")]
        formats.push("• JSON (.json)");

        #[cfg(feature = "toml")]
        formats.push("• TOML (.toml)");

        if formats.is_empty() {
            "No formats are currently enabled".to_string()
        } else {
            formats.join("\n")
        }
    }
}

/// Serialization format of a recipe file.
///
/// The format is typically inferred from the file extension, but can also be
/// specified explicitly when loading from strings.
#[derive(Debug, Clone)]
pub enum TemplateFormat {
    /// JSON format (.json files)
    Json,
    /// TOML format (.toml files)
    Toml,
    /// Unknown or unsupported format
    Unknown(String),
}

impl std::fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateFormat::Json => write!(f, "json"),
            TemplateFormat::Toml => write!(f, "toml"),
            TemplateFormat::Unknown(format) => write!(f, "{format}"),
        }
    }
}

fn variable_regex() -> &'static Regex {
    static VARIABLE_REGEX: OnceLock<Regex> = OnceLock::new();
    VARIABLE_REGEX
        .get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.\-]+)\}").expect("invalid regex"))
}

/// Names of all `${name}` placeholders in `raw`
pub fn placeholders(raw: &str) -> HashSet<String> {
    variable_regex()
        .captures_iter(raw)
        .filter_map(|capture| capture.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

/// Replace every `${name}` in `raw` with its value from `variables`.
///
/// Substituted values are not expanded again. Any placeholder without a value
/// fails the whole substitution.
pub fn substitute(raw: &str, variables: &Variables) -> Result<String, TemplateError> {
    if !raw.contains("${") {
        return Ok(raw.to_string());
    }

    let mut missing = BTreeSet::new();
    let resolved = variable_regex().replace_all(raw, |capture: &Captures| {
        let name = &capture[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.insert(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(TemplateError::MissingParams(missing));
    }

    Ok(resolved.into_owned())
}

/// A trait for loading kiln recipes from files or strings.
///
/// Loading only parses and validates; `${name}` placeholders stay in the step
/// fields and are resolved by the executive right before each step runs, so a
/// step can use values saved by the steps before it. `params` override the
/// recipe's variables.
pub trait TemplateLoader {
    /// Load a recipe from a file.
    ///
    /// # Errors
    ///
    /// - File not found or unreadable
    /// - Invalid file format or syntax
    /// - A step uses a variable that is never defined
    fn from_file<P: AsRef<Path>>(
        path: P,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Recipe, TemplateError>;

    /// Load a recipe from a string.
    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Recipe, TemplateError>;

    /// Check that every placeholder used by a step is defined before the step runs.
    ///
    /// A placeholder is defined when it is a recipe or job variable, one of
    /// `params`, or saved by an earlier step of the same job. The `to_stdout` and
    /// `to_stderr` templates may also use the value saved by their own step.
    fn validate_variables(recipe: &Recipe, params: &Variables) -> Result<(), TemplateError> {
        for (job, definition) in recipe.jobs.iter() {
            let mut known: HashSet<String> =
                recipe.job_variables(job, params).into_keys().collect();

            for (index, step) in definition.steps.iter().enumerate() {
                let mut names: BTreeSet<String> = [&step.location, &step.source, &step.target]
                    .into_iter()
                    .flat_map(|field| placeholders(field))
                    .filter(|name| !known.contains(name))
                    .collect();

                if !step.save.is_empty() {
                    known.insert(step.save.clone());
                }

                names.extend(
                    [&step.to_stdout, &step.to_stderr]
                        .into_iter()
                        .flat_map(|field| placeholders(field))
                        .filter(|name| !known.contains(name)),
                );

                if !names.is_empty() {
                    return Err(TemplateError::UnresolvedVariables {
                        job: job.clone(),
                        step: index + 1,
                        names,
                    });
                }
            }
        }

        Ok(())
    }
}

impl TemplateLoader for Recipe {
    fn from_file<T: AsRef<Path>>(
        path: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Recipe, TemplateError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| TemplateError::NotFound {
            source: e,
            file_path: path.display().to_string(),
        })?;
        <Self as TemplateLoader>::from_str(contents, format, params)
    }

    fn from_str<T: AsRef<str>>(
        value: T,
        format: TemplateFormat,
        params: HashMap<String, String>,
    ) -> Result<Recipe, TemplateError> {
        let contents = value.as_ref();

        debug!("Parsing recipe with format: {format:?}");

        let mut recipe = match format {
            TemplateFormat::Toml => {
                #[cfg(feature = "toml")]
                {
                    toml::from_str::<Recipe>(contents).map_err(|error| {
                        let offset = if let Some(span) = error.span() {
                            SourceOffset::from(span.start)
                        } else {
                            SourceOffset::from(0)
                        };
                        TemplateError::ParseToml {
                            source_code: Arc::new(NamedSource::new(
                                "kiln.toml",
                                contents.to_string(),
                            )),
                            span: SourceSpan::new(offset, 1),
                            error,
                        }
                    })?
                }
                #[cfg(not(feature = "toml"))]
                {
                    return Err(TemplateError::UnknownFormat(TemplateFormat::Toml));
                }
            }
            TemplateFormat::Json => {
                #[cfg(feature = "json")]
                {
                    serde_json::from_str::<Recipe>(contents).map_err(|error| {
                        let offset =
                            SourceOffset::from_location(contents, error.line(), error.column());
                        TemplateError::ParseJson {
                            source_code: Arc::new(NamedSource::new(
                                "kiln.json",
                                contents.to_string(),
                            )),
                            span: SourceSpan::new(offset, 1),
                            error,
                        }
                    })?
                }
                #[cfg(not(feature = "json"))]
                {
                    return Err(TemplateError::UnknownFormat(TemplateFormat::Json));
                }
            }
            fmt @ TemplateFormat::Unknown(_) => return Err(TemplateError::UnknownFormat(fmt)),
        };

        Self::validate_variables(&recipe, &params)?;

        recipe.variables.extend(params);

        Ok(recipe)
    }
}

pub fn format_from_path<P: AsRef<Path>>(path: P) -> TemplateFormat {
    let path = path.as_ref();
    let ext = path.extension().and_then(|s| s.to_str());

    match ext {
        Some("toml") => TemplateFormat::Toml,
        Some("json") => TemplateFormat::Json,
        ext => TemplateFormat::Unknown(ext.unwrap_or("unknown_ext").to_string()),
    }
}
