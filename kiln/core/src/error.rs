use crate::{
    action::ActionError, conductor::ConductorError, dependency::DependencyError,
    executive::ExecutiveError, job::JobError, templating::TemplateError,
};

use miette::Diagnostic;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Action(Box<ActionError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Executive(Box<ExecutiveError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dependency(Box<DependencyError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Job(Box<JobError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Conductor(Box<ConductorError>),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(Box<TemplateError>),
}

impl From<ActionError> for Error {
    fn from(error: ActionError) -> Self {
        Error::Action(Box::new(error))
    }
}

impl From<ExecutiveError> for Error {
    fn from(error: ExecutiveError) -> Self {
        Error::Executive(Box::new(error))
    }
}

impl From<DependencyError> for Error {
    fn from(error: DependencyError) -> Self {
        Error::Dependency(Box::new(error))
    }
}

impl From<JobError> for Error {
    fn from(error: JobError) -> Self {
        Error::Job(Box::new(error))
    }
}

impl From<ConductorError> for Error {
    fn from(error: ConductorError) -> Self {
        Error::Conductor(Box::new(error))
    }
}

impl From<TemplateError> for Error {
    fn from(error: TemplateError) -> Self {
        Error::Template(Box::new(error))
    }
}
