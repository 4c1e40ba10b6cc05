//! Shared course pages served through the personalized page cache.

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use tracing::debug;

use crate::application::error::HttpError;
use crate::application::pages::{CourseRenderer, RenderError};
use crate::application::repos::{RepoError, StudentRepo};
use crate::cache::{PageKey, PersonalizedPageCache, Viewer};
use crate::domain::students::Student;

const SOURCE: &str = "application::serving::ServingService";

pub const DEFAULT_ASSESSMENT: &str = "Pre";

/// What a handler should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Page(String),
    Redirect(String),
    /// The viewer must sign in first.
    Login,
}

impl Outcome {
    pub fn redirect(to: impl Into<String>) -> Self {
        Self::Redirect(to.into())
    }
}

#[derive(Clone)]
pub struct ServingService {
    pages: PersonalizedPageCache,
    renderer: CourseRenderer,
    students: Arc<dyn StudentRepo>,
}

impl ServingService {
    pub fn new(
        pages: PersonalizedPageCache,
        renderer: CourseRenderer,
        students: Arc<dyn StudentRepo>,
    ) -> Self {
        Self {
            pages,
            renderer,
            students,
        }
    }

    pub fn page_cache(&self) -> &PersonalizedPageCache {
        &self.pages
    }

    pub async fn course(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        if !self.is_enrolled(viewer).await? {
            return Ok(self.not_enrolled(viewer, "/preview"));
        }
        let renderer = &self.renderer;
        self.serve_page(PageKey::course(), viewer, |placeholder| async move {
            renderer.course_page(&placeholder).await
        })
        .await
    }

    /// Lesson page; both ids default to 1.
    pub async fn unit(
        &self,
        viewer: &Viewer,
        unit: Option<u32>,
        lesson: Option<u32>,
    ) -> Result<Outcome, HttpError> {
        let (unit, lesson) = (unit.unwrap_or(1), lesson.unwrap_or(1));
        if !self.is_enrolled(viewer).await? {
            return Ok(self.not_enrolled(viewer, "/register"));
        }
        let renderer = &self.renderer;
        self.serve_page(PageKey::lesson(unit, lesson), viewer, |placeholder| async move {
            renderer.lesson_page(&placeholder, unit, lesson).await
        })
        .await
    }

    pub async fn activity(
        &self,
        viewer: &Viewer,
        unit: Option<u32>,
        lesson: Option<u32>,
    ) -> Result<Outcome, HttpError> {
        let (unit, lesson) = (unit.unwrap_or(1), lesson.unwrap_or(1));
        if !self.is_enrolled(viewer).await? {
            return Ok(self.not_enrolled(viewer, "/register"));
        }
        let renderer = &self.renderer;
        self.serve_page(PageKey::activity(unit, lesson), viewer, |placeholder| async move {
            renderer.activity_page(&placeholder, unit, lesson).await
        })
        .await
    }

    /// Assessment page; an absent or empty name means the pre-course one.
    pub async fn assessment(&self, viewer: &Viewer, name: Option<&str>) -> Result<Outcome, HttpError> {
        let name = name
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_ASSESSMENT);
        if !self.is_enrolled(viewer).await? {
            return Ok(self.not_enrolled(viewer, "/register"));
        }
        let renderer = &self.renderer;
        self.serve_page(PageKey::assessment(name), viewer, |placeholder| async move {
            renderer.assessment_page(&placeholder, name).await
        })
        .await
    }

    pub async fn forum(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        if !self.is_enrolled(viewer).await? {
            return Ok(self.not_enrolled(viewer, "/register"));
        }
        let renderer = &self.renderer;
        self.serve_page(PageKey::forum(), viewer, |placeholder| async move {
            renderer.forum_page(&placeholder).await
        })
        .await
    }

    /// Course preview. Enrolled students go to the course; everyone else sees
    /// one of two cached previews, since signed-in and anonymous visitors get
    /// different navbars.
    pub async fn preview(&self, viewer: &Viewer) -> Result<Outcome, HttpError> {
        let key = match viewer.email() {
            None => PageKey::anonymous_preview(),
            Some(_) => {
                if self.is_enrolled(viewer).await? {
                    return Ok(Outcome::redirect("/course"));
                }
                PageKey::logged_in_preview()
            }
        };
        let renderer = &self.renderer;
        self.serve_page(key, viewer, |placeholder| async move {
            renderer.preview_page(&placeholder).await
        })
        .await
    }

    async fn serve_page<F, Fut>(
        &self,
        key: PageKey,
        viewer: &Viewer,
        render: F,
    ) -> Result<Outcome, HttpError>
    where
        F: FnOnce(Viewer) -> Fut,
        Fut: Future<Output = Result<String, RenderError>>,
    {
        let html = self.pages.serve(&key, viewer, render).await?;
        Ok(Outcome::Page(html))
    }

    async fn is_enrolled(&self, viewer: &Viewer) -> Result<bool, HttpError> {
        Ok(enrolled_student(self.students.as_ref(), viewer).await?.is_some())
    }

    fn not_enrolled(&self, viewer: &Viewer, fallback: &str) -> Outcome {
        if viewer.email().is_none() {
            return Outcome::Login;
        }
        debug!(target = SOURCE, redirect = fallback, "viewer is not enrolled");
        Outcome::redirect(fallback)
    }
}

/// The enrolled student behind `viewer`, if any.
pub(crate) async fn enrolled_student(
    students: &dyn StudentRepo,
    viewer: &Viewer,
) -> Result<Option<Student>, HttpError> {
    let Some(email) = viewer.email() else {
        return Ok(None);
    };
    students
        .find_enrolled(email)
        .await
        .map_err(|err| repo_failure("find_enrolled", err))
}

pub(crate) fn repo_failure(operation: &'static str, err: RepoError) -> HttpError {
    HttpError::new(
        SOURCE,
        StatusCode::SERVICE_UNAVAILABLE,
        "Failed to load student record",
        format!("{operation} failed: {err}"),
    )
}
