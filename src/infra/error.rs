use thiserror::Error;

/// Failures of the process plumbing: files, configuration, logging.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("course outline {path}: {reason}")]
    CourseFile { path: String, reason: String },
    #[error("could not start logging: {0}")]
    Telemetry(String),
    #[error("bad configuration: {0}")]
    Configuration(String),
}

impl InfraError {
    pub fn course_file(path: &str, reason: impl Into<String>) -> Self {
        Self::CourseFile {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
