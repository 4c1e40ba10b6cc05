//! In-process repositories.

use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::application::repos::{CourseRepo, RepoError, StudentRepo};
use crate::domain::course::Course;
use crate::domain::students::Student;

/// The current course outline, swapped out whole when the file is reloaded.
pub struct InMemoryCourseRepo {
    course: RwLock<Course>,
}

impl InMemoryCourseRepo {
    pub fn new(course: Course) -> Self {
        Self {
            course: RwLock::new(course),
        }
    }

    /// Install `course` and hand back the outline it replaces.
    pub fn replace(&self, course: Course) -> Result<Course, RepoError> {
        let mut current = self
            .course
            .write()
            .map_err(|_| RepoError::unavailable("course outline lock poisoned"))?;
        Ok(std::mem::replace(&mut *current, course))
    }
}

#[async_trait]
impl CourseRepo for InMemoryCourseRepo {
    async fn load_course(&self) -> Result<Course, RepoError> {
        self.course
            .read()
            .map(|course| course.clone())
            .map_err(|_| RepoError::unavailable("course outline lock poisoned"))
    }
}

/// Student records keyed by email.
#[derive(Default)]
pub struct InMemoryStudentRepo {
    students: DashMap<String, Student>,
}

impl InMemoryStudentRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StudentRepo for InMemoryStudentRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<Student>, RepoError> {
        Ok(self.students.get(email).map(|entry| entry.value().clone()))
    }

    async fn save(&self, student: Student) -> Result<(), RepoError> {
        if student.email.trim().is_empty() {
            return Err(RepoError::InvalidInput {
                message: "student email must not be empty".to_string(),
            });
        }
        self.students.insert(student.email.clone(), student);
        Ok(())
    }

    async fn count_enrolled(&self) -> Result<usize, RepoError> {
        Ok(self
            .students
            .iter()
            .filter(|entry| entry.value().is_enrolled)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    #[tokio::test]
    async fn save_overwrites_by_email() {
        let repo = InMemoryStudentRepo::new();
        repo.save(Student::enroll("a@x.com", "Ann", OffsetDateTime::UNIX_EPOCH))
            .await
            .expect("save");
        let mut student = repo
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("present");
        student.unenroll();
        repo.save(student).await.expect("save again");

        assert!(repo.find_by_email("a@x.com").await.expect("find").is_some());
        assert_eq!(repo.count_enrolled().await.expect("count"), 0);
        assert!(repo.find_enrolled("a@x.com").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn empty_email_is_rejected() {
        let repo = InMemoryStudentRepo::new();
        let result = repo
            .save(Student::enroll("", "Nobody", OffsetDateTime::UNIX_EPOCH))
            .await;
        assert!(matches!(result, Err(RepoError::InvalidInput { .. })));
        assert!(repo.find_by_email("").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn replace_swaps_the_outline() {
        let first = Course {
            title: "First".to_string(),
            units: Vec::new(),
            lessons: Vec::new(),
        };
        let repo = InMemoryCourseRepo::new(first.clone());
        let second = Course {
            title: "Second".to_string(),
            ..first.clone()
        };

        let previous = repo.replace(second).expect("replace");
        assert_eq!(previous, first);
        assert_eq!(repo.load_course().await.expect("load").title, "Second");
    }
}
