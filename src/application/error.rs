use std::error::Error as StdError;
use std::fmt;
use std::iter;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{application::repos::RepoError, domain::error::DomainError, infra::error::InfraError};

const REPO_SOURCE: &str = "application::error::repo";
const DOMAIN_SOURCE: &str = "application::error::domain";

/// Diagnostics riding on a response extension. The logging middleware reads
/// them; the client never sees them.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    /// Capture `error` and every `source()` below it, outermost first.
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let messages = iter::successors(Some(error), |current| (*current).source())
            .map(ToString::to_string)
            .collect();
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// A request failure: a short public text plus the report kept for the logs.
#[derive(Debug)]
pub struct HttpError {
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.report.status
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.public_message, self.status())?;
        self.report
            .messages
            .iter()
            .try_for_each(|message| write!(f, ": {message}"))
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<RepoError> for HttpError {
    fn from(error: RepoError) -> Self {
        let (status, public) = match &error {
            RepoError::NotFound => (StatusCode::NOT_FOUND, "Not found"),
            RepoError::InvalidInput { .. } => {
                (StatusCode::BAD_REQUEST, "Request could not be processed")
            }
            RepoError::Unavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable")
            }
        };
        HttpError::from_error(REPO_SOURCE, status, public, &error)
    }
}

impl From<DomainError> for HttpError {
    fn from(error: DomainError) -> Self {
        HttpError::from_error(
            DOMAIN_SOURCE,
            StatusCode::BAD_REQUEST,
            "Request could not be processed",
            &error,
        )
    }
}

/// Failures that end the process rather than a single request.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_walks_the_source_chain() {
        let err = AppError::from(InfraError::Io(std::io::Error::other("disk gone")));
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &err);
        assert!(report.messages.iter().any(|m| m.contains("disk gone")));
    }

    #[test]
    fn repo_errors_pick_a_status() {
        assert_eq!(HttpError::from(RepoError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            HttpError::from(RepoError::unavailable("locked")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn domain_error_is_a_bad_request() {
        let response = HttpError::from(DomainError::validation("score out of range")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].contains("score out of range"));
    }

    #[test]
    fn display_keeps_the_detail() {
        let err = HttpError::new("src", StatusCode::NOT_FOUND, "Page not found", "no unit 9");
        let text = err.to_string();
        assert!(text.contains("Page not found"));
        assert!(text.contains("no unit 9"));
    }
}
