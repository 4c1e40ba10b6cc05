//! Registration, profile and assessment handling for individual students.
//!
//! These pages mention the student by name or score, so they are rendered per
//! request with the real viewer and never cached.

use std::num::NonZeroUsize;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::info;

use crate::application::error::HttpError;
use crate::application::pages::CourseRenderer;
use crate::application::repos::StudentRepo;
use crate::application::serving::{Outcome, enrolled_student, repo_failure};
use crate::cache::Viewer;
use crate::domain::students::Student;

const SOURCE: &str = "application::students::StudentService";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Enrolled,
    Full,
}

#[derive(Clone)]
pub struct StudentService {
    renderer: CourseRenderer,
    students: Arc<dyn StudentRepo>,
    max_class_size: Option<NonZeroUsize>,
}

impl StudentService {
    pub fn new(
        renderer: CourseRenderer,
        students: Arc<dyn StudentRepo>,
        max_class_size: Option<NonZeroUsize>,
    ) -> Self {
        Self {
            renderer,
            students,
            max_class_size,
        }
    }

    pub async fn register_form(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        if viewer.email().is_none() {
            return Ok(Outcome::Login);
        }
        if self.enrolled(viewer).await?.is_some() {
            return Ok(Outcome::redirect("/course"));
        }
        Ok(Outcome::Page(self.renderer.register_page(viewer).await?))
    }

    pub async fn register(&self, viewer: &Viewer, name: &str) -> Result<Outcome, HttpError> {
        let Some(email) = viewer.email() else {
            return Ok(Outcome::Login);
        };
        let registration = self.enroll(email, name).await?;
        let html = self
            .renderer
            .confirmation_page(viewer, registration == Registration::Full)
            .await?;
        Ok(Outcome::Page(html))
    }

    /// Enroll `email`, or re-enroll a returning student under `name`.
    ///
    /// The class-size cap only applies to someone not currently enrolled.
    pub async fn enroll(&self, email: &str, name: &str) -> Result<Registration, HttpError> {
        let existing = self.find(email).await?;
        let already_enrolled = existing.as_ref().is_some_and(|student| student.is_enrolled);

        if let Some(limit) = self.max_class_size.filter(|_| !already_enrolled) {
            let enrolled = self
                .students
                .count_enrolled()
                .await
                .map_err(|err| repo_failure("count_enrolled", err))?;
            if enrolled >= limit.get() {
                info!(target = SOURCE, limit = limit.get(), "registration refused, class is full");
                return Ok(Registration::Full);
            }
        }

        let student = match existing {
            Some(mut student) => {
                student.re_enroll(name);
                student
            }
            None => Student::enroll(email, name, OffsetDateTime::now_utc()),
        };
        self.save(student).await?;
        info!(target = SOURCE, "student enrolled");
        Ok(Registration::Enrolled)
    }

    pub async fn profile(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        if viewer.email().is_none() {
            return Ok(Outcome::Login);
        }
        let Some(student) = self.enrolled(viewer).await? else {
            return Ok(Outcome::redirect("/preview"));
        };
        let html = self
            .renderer
            .profile_page(viewer, Some(&student), None)
            .await?;
        Ok(Outcome::Page(html))
    }

    /// Profile of any student on the roster, looked up by email.
    pub async fn edit_form(&self, viewer: &Viewer, email: &str) -> Result<Outcome, HttpError> {
        if viewer.email().is_none() {
            return Ok(Outcome::Login);
        }
        let student = self.find(email).await?;
        let error_message = student.is_none().then(|| {
            format!("Error: Student with email {email} can not be found on the roster.")
        });
        let html = self
            .renderer
            .profile_page(viewer, student.as_ref(), error_message)
            .await?;
        Ok(Outcome::Page(html))
    }

    /// Rename a student. An empty name leaves the record unchanged.
    pub async fn edit(&self, viewer: &Viewer, email: &str, name: &str) -> Result<Outcome, HttpError> {
        if viewer.email().is_none() {
            return Ok(Outcome::Login);
        }
        if let Some(mut student) = self.find(email).await? {
            if !name.is_empty() {
                student.name = name.to_string();
            }
            self.save(student).await?;
        }
        let encoded: String = url::form_urlencoded::byte_serialize(email.as_bytes()).collect();
        Ok(Outcome::redirect(format!("/student/editstudent?email={encoded}")))
    }

    pub async fn unenroll_form(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        if viewer.email().is_none() {
            return Ok(Outcome::Login);
        }
        let enrolled = self.enrolled(viewer).await?.is_some();
        Ok(Outcome::Page(
            self.renderer.unenroll_check_page(viewer, enrolled).await?,
        ))
    }

    pub async fn unenroll(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        let Some(email) = viewer.email() else {
            return Ok(Outcome::Login);
        };
        if let Some(mut student) = self.find(email).await?
            && student.is_enrolled
        {
            student.unenroll();
            self.save(student).await?;
            info!(target = SOURCE, "student unenrolled");
        }
        Ok(Outcome::Page(self.renderer.unenroll_done_page(viewer).await?))
    }

    /// Record the viewer's score for `assessment` and confirm it.
    pub async fn submit_answers(
        &self,
        viewer: &Viewer,
        assessment: &str,
        score: u32,
    ) -> Result<Outcome, HttpError> {
        if viewer.email().is_none() {
            return Ok(Outcome::Login);
        }
        let Some(mut student) = self.enrolled(viewer).await? else {
            return Ok(Outcome::redirect("/register"));
        };
        student.record_score(assessment, score)?;
        self.save(student).await?;

        let html = self
            .renderer
            .answer_confirmation_page(viewer, assessment, score)
            .await?;
        Ok(Outcome::Page(html))
    }

    pub async fn announcements(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        if viewer.email().is_none() {
            return Ok(Outcome::Login);
        }
        if self.enrolled(viewer).await?.is_none() {
            return Ok(Outcome::redirect("/preview"));
        }
        Ok(Outcome::Page(self.renderer.announcements_page(viewer).await?))
    }

    async fn enrolled(&self, viewer: &Viewer) -> Result<Option<Student>, HttpError> {
        enrolled_student(self.students.as_ref(), viewer).await
    }

    async fn find(&self, email: &str) -> Result<Option<Student>, HttpError> {
        self.students
            .find_by_email(email)
            .await
            .map_err(|err| repo_failure("find_by_email", err))
    }

    async fn save(&self, student: Student) -> Result<(), HttpError> {
        self.students
            .save(student)
            .await
            .map_err(|err| repo_failure("save", err))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::domain::course::Course;
    use crate::infra::memory::{InMemoryCourseRepo, InMemoryStudentRepo};
    use crate::presentation::views::AuthLinks;

    fn service(max_class_size: Option<usize>) -> (StudentService, Arc<InMemoryStudentRepo>) {
        let course = Course {
            title: "Power Searching".to_string(),
            units: Vec::new(),
            lessons: Vec::new(),
        };
        let renderer = CourseRenderer::new(
            Arc::new(InMemoryCourseRepo::new(course)),
            AuthLinks {
                login_url: "/login".to_string(),
                logout_url: "/logout".to_string(),
            },
        );
        let students = Arc::new(InMemoryStudentRepo::new());
        let service = StudentService::new(
            renderer,
            students.clone(),
            max_class_size.and_then(NonZeroUsize::new),
        );
        (service, students)
    }

    fn viewer(email: &str) -> Viewer {
        Viewer::Email(email.to_string())
    }

    #[tokio::test]
    async fn register_creates_and_re_enrolls() {
        let (service, students) = service(None);
        service.register(&viewer("a@x.com"), "Ann").await.expect("register");
        assert!(students.find_enrolled("a@x.com").await.expect("find").is_some());

        service.unenroll(&viewer("a@x.com")).await.expect("unenroll");
        assert!(students.find_enrolled("a@x.com").await.expect("find").is_none());

        service.register(&viewer("a@x.com"), "Annie").await.expect("re-register");
        let student = students
            .find_enrolled("a@x.com")
            .await
            .expect("find")
            .expect("enrolled again");
        assert_eq!(student.name, "Annie");
    }

    #[tokio::test]
    async fn full_class_refuses_registration() {
        let (service, students) = service(Some(1));
        assert_eq!(service.enroll("a@x.com", "Ann").await.expect("a"), Registration::Enrolled);
        assert_eq!(service.enroll("b@x.com", "Bob").await.expect("b"), Registration::Full);
        assert!(students.find_by_email("b@x.com").await.expect("find").is_none());

        let Outcome::Page(html) = service.register(&viewer("c@x.com"), "Cy").await.expect("c") else {
            panic!("expected confirmation page");
        };
        assert!(html.contains("class size limit"));
    }

    #[tokio::test]
    async fn enrolled_student_can_register_again_at_capacity() {
        let (service, students) = service(Some(1));
        assert_eq!(service.enroll("a@x.com", "Ann").await.expect("a"), Registration::Enrolled);
        assert_eq!(
            service.enroll("a@x.com", "Annie").await.expect("a again"),
            Registration::Enrolled
        );
        let student = students
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("still enrolled");
        assert_eq!(student.name, "Ann");
        assert_eq!(students.count_enrolled().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn register_form_redirects_enrolled_students() {
        let (service, _) = service(None);
        service.enroll("a@x.com", "Ann").await.expect("enroll");
        assert_eq!(
            service.register_form(&viewer("a@x.com")).await.expect("form"),
            Outcome::redirect("/course")
        );
        assert_eq!(service.register_form(&Viewer::Anonymous).await.expect("anon"), Outcome::Login);
    }

    #[tokio::test]
    async fn profile_requires_enrollment() {
        let (service, _) = service(None);
        assert_eq!(
            service.profile(&viewer("a@x.com")).await.expect("profile"),
            Outcome::redirect("/preview")
        );
        service.enroll("a@x.com", "Ann").await.expect("enroll");
        let Outcome::Page(html) = service.profile(&viewer("a@x.com")).await.expect("profile") else {
            panic!("expected profile page");
        };
        assert!(html.contains("Ann"));
    }

    #[tokio::test]
    async fn edit_keeps_name_when_blank() {
        let (service, students) = service(None);
        service.enroll("a+b@x.com", "Ann").await.expect("enroll");

        let outcome = service
            .edit(&viewer("admin@x.com"), "a+b@x.com", "")
            .await
            .expect("edit");
        assert_eq!(outcome, Outcome::redirect("/student/editstudent?email=a%2Bb%40x.com"));
        let student = students.find_by_email("a+b@x.com").await.expect("find").expect("exists");
        assert_eq!(student.name, "Ann");

        service
            .edit(&viewer("admin@x.com"), "a+b@x.com", "Anna")
            .await
            .expect("edit");
        let student = students.find_by_email("a+b@x.com").await.expect("find").expect("exists");
        assert_eq!(student.name, "Anna");
    }

    #[tokio::test]
    async fn edit_form_reports_unknown_student() {
        let (service, _) = service(None);
        let Outcome::Page(html) = service
            .edit_form(&viewer("admin@x.com"), "ghost@x.com")
            .await
            .expect("form")
        else {
            panic!("expected profile page");
        };
        assert!(html.contains("can not be found on the roster"));
    }

    #[tokio::test]
    async fn submit_answers_records_score() {
        let (service, students) = service(None);
        service.enroll("a@x.com", "Ann").await.expect("enroll");
        service
            .submit_answers(&viewer("a@x.com"), "Pre", 80)
            .await
            .expect("submit");
        let student = students.find_by_email("a@x.com").await.expect("find").expect("exists");
        assert_eq!(student.scores.get("Pre"), Some(&80));

        let err = service
            .submit_answers(&viewer("a@x.com"), "Pre", 130)
            .await
            .expect_err("score out of range");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn announcements_require_enrollment() {
        let (service, _) = service(None);
        assert_eq!(
            service.announcements(&viewer("a@x.com")).await.expect("announcements"),
            Outcome::redirect("/preview")
        );
    }
}
