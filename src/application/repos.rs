//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::course::Course;
use crate::domain::students::Student;

/// Why a store could not answer.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("no such record")]
    NotFound,
    #[error("rejected by the store: {message}")]
    InvalidInput { message: String },
    /// The backing store itself failed; retrying later may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn unavailable(cause: impl std::fmt::Display) -> Self {
        Self::Unavailable(cause.to_string())
    }
}

#[async_trait]
pub trait CourseRepo: Send + Sync {
    /// The current course outline: units and lessons, sorted.
    async fn load_course(&self) -> Result<Course, RepoError>;
}

#[async_trait]
pub trait StudentRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Student>, RepoError>;

    /// The student with this email, only if currently enrolled.
    async fn find_enrolled(&self, email: &str) -> Result<Option<Student>, RepoError> {
        Ok(self
            .find_by_email(email)
            .await?
            .filter(|student| student.is_enrolled))
    }

    async fn save(&self, student: Student) -> Result<(), RepoError>;

    async fn count_enrolled(&self) -> Result<usize, RepoError>;
}
