//! HTML renderers for every course page.
//!
//! Shared pages (course, lesson, activity, assessment, forum, preview) are
//! rendered through the page cache and so only ever see the placeholder or an
//! anonymous viewer. Per-student pages are rendered with the real viewer.

use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;

use crate::application::error::HttpError;
use crate::application::repos::{CourseRepo, RepoError};
use crate::cache::Viewer;
use crate::domain::course::{Course, UnitKind};
use crate::domain::students::Student;
use crate::presentation::views::{
    ActivityTemplate, ActivityView, AnnouncementsTemplate, AnnouncementsView,
    AnswerConfirmationTemplate, AnswerConfirmationView, AssessmentTemplate, AssessmentView,
    AuthLinks, ConfirmationTemplate, ConfirmationView, CourseTemplate, CourseView, ForumTemplate,
    ForumView, LayoutContext, LessonLink, LessonTemplate, LessonView, NavTab, NavbarView,
    PreviewTemplate, PreviewView, ProfileTemplate, ProfileView, RegisterTemplate, RegisterView,
    StudentView, TemplateRenderError, UnenrollCheckTemplate, UnenrollDoneTemplate, UnenrollView,
    UnitCard, render_html,
};

const SOURCE: &str = "application::pages::CourseRenderer";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Template(#[from] TemplateRenderError),
}

impl RenderError {
    fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

impl From<RenderError> for HttpError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::NotFound { what } => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Page not found",
                format!("{what} not found"),
            ),
            RenderError::Repo(err) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to load course content",
                &err,
            ),
            RenderError::Template(err) => err.into(),
        }
    }
}

#[derive(Clone)]
pub struct CourseRenderer {
    course: Arc<dyn CourseRepo>,
    links: AuthLinks,
}

impl CourseRenderer {
    pub fn new(course: Arc<dyn CourseRepo>, links: AuthLinks) -> Self {
        Self { course, links }
    }

    fn layout<T>(&self, course: &Course, viewer: &Viewer, tab: NavTab, content: T) -> LayoutContext<T> {
        LayoutContext::new(
            course.title.clone(),
            NavbarView::for_viewer(viewer, &self.links, tab),
            content,
        )
    }

    async fn load(&self) -> Result<Course, RenderError> {
        Ok(self.course.load_course().await?)
    }

    pub async fn course_page(&self, viewer: &Viewer) -> Result<String, RenderError> {
        let course = self.load().await?;
        let units = course.units.iter().map(UnitCard::from_unit).collect();
        let view = self.layout(&course, viewer, NavTab::Course, CourseView { units });
        Ok(render_html(&CourseTemplate { view })?)
    }

    /// Lesson `lesson_id` of unit `unit_id`, with its sibling lessons.
    pub async fn lesson_page(
        &self,
        viewer: &Viewer,
        unit_id: u32,
        lesson_id: u32,
    ) -> Result<String, RenderError> {
        let course = self.load().await?;
        let unit = course
            .unit(unit_id)
            .filter(|unit| unit.kind == UnitKind::Unit)
            .ok_or_else(|| RenderError::not_found(format!("unit {unit_id}")))?;
        let lessons = course.lessons_for(unit_id);
        let position = lessons
            .iter()
            .position(|lesson| lesson.id == lesson_id)
            .ok_or_else(|| RenderError::not_found(format!("lesson {unit_id}.{lesson_id}")))?;
        let lesson = lessons[position];

        let links = lessons
            .iter()
            .map(|entry| LessonLink {
                id: entry.id,
                title: entry.title.clone(),
                href: lesson_href(unit_id, entry.id),
                is_current: entry.id == lesson_id,
            })
            .collect();

        let back_href = position
            .checked_sub(1)
            .and_then(|index| lessons.get(index))
            .map(|prev| {
                if prev.has_activity() {
                    activity_href(unit_id, prev.id)
                } else {
                    lesson_href(unit_id, prev.id)
                }
            });
        let next_href = lessons
            .get(position + 1)
            .map(|next| lesson_href(unit_id, next.id));
        let activity = lesson
            .has_activity()
            .then(|| activity_href(unit_id, lesson_id));

        let content = LessonView {
            unit_id,
            unit_title: unit.title.clone(),
            lesson: lesson.clone(),
            lessons: links,
            activity_href: activity,
            next_href,
            back_href,
        };
        let view = self.layout(&course, viewer, NavTab::Course, content);
        Ok(render_html(&LessonTemplate { view })?)
    }

    pub async fn activity_page(
        &self,
        viewer: &Viewer,
        unit_id: u32,
        lesson_id: u32,
    ) -> Result<String, RenderError> {
        let course = self.load().await?;
        let lessons = course.lessons_for(unit_id);
        let position = lessons
            .iter()
            .position(|lesson| lesson.id == lesson_id && lesson.has_activity())
            .ok_or_else(|| RenderError::not_found(format!("activity {unit_id}.{lesson_id}")))?;
        let lesson = lessons[position];

        let content = ActivityView {
            unit_id,
            lesson_id,
            title: if lesson.activity_title.is_empty() {
                lesson.title.clone()
            } else {
                lesson.activity_title.clone()
            },
            script: format!("/assets/js/activity-{unit_id}.{lesson_id}.js"),
            lesson_href: lesson_href(unit_id, lesson_id),
            next_href: lessons
                .get(position + 1)
                .map(|next| lesson_href(unit_id, next.id)),
        };
        let view = self.layout(&course, viewer, NavTab::Course, content);
        Ok(render_html(&ActivityTemplate { view })?)
    }

    pub async fn assessment_page(&self, viewer: &Viewer, name: &str) -> Result<String, RenderError> {
        let course = self.load().await?;
        let unit = course
            .assessment(name)
            .ok_or_else(|| RenderError::not_found(format!("assessment {name}")))?;
        let content = AssessmentView {
            name: name.to_string(),
            title: unit.title.clone(),
        };
        let view = self.layout(&course, viewer, NavTab::Course, content);
        Ok(render_html(&AssessmentTemplate { view })?)
    }

    pub async fn forum_page(&self, viewer: &Viewer) -> Result<String, RenderError> {
        let course = self.load().await?;
        let view = self.layout(&course, viewer, NavTab::Forum, ForumView);
        Ok(render_html(&ForumTemplate { view })?)
    }

    pub async fn preview_page(&self, viewer: &Viewer) -> Result<String, RenderError> {
        let course = self.load().await?;
        let units = course.units.iter().map(UnitCard::from_unit).collect();
        let view = self.layout(&course, viewer, NavTab::Course, PreviewView { units });
        Ok(render_html(&PreviewTemplate { view })?)
    }

    pub async fn register_page(&self, viewer: &Viewer) -> Result<String, RenderError> {
        let course = self.load().await?;
        let view = self.layout(&course, viewer, NavTab::Registration, RegisterView);
        Ok(render_html(&RegisterTemplate { view })?)
    }

    pub async fn confirmation_page(
        &self,
        viewer: &Viewer,
        course_full: bool,
    ) -> Result<String, RenderError> {
        let course = self.load().await?;
        let content = ConfirmationView { course_full };
        let view = self.layout(&course, viewer, NavTab::Registration, content);
        Ok(render_html(&ConfirmationTemplate { view })?)
    }

    pub async fn profile_page(
        &self,
        viewer: &Viewer,
        student: Option<&Student>,
        error_message: Option<String>,
    ) -> Result<String, RenderError> {
        let course = self.load().await?;
        let content = ProfileView {
            student: student.map(StudentView::from_student),
            error_message,
        };
        let view = self.layout(&course, viewer, NavTab::None, content);
        Ok(render_html(&ProfileTemplate { view })?)
    }

    pub async fn unenroll_check_page(
        &self,
        viewer: &Viewer,
        enrolled: bool,
    ) -> Result<String, RenderError> {
        let course = self.load().await?;
        let view = self.layout(&course, viewer, NavTab::Registration, UnenrollView { enrolled });
        Ok(render_html(&UnenrollCheckTemplate { view })?)
    }

    pub async fn unenroll_done_page(&self, viewer: &Viewer) -> Result<String, RenderError> {
        let course = self.load().await?;
        let content = UnenrollView { enrolled: false };
        let view = self.layout(&course, viewer, NavTab::Registration, content);
        Ok(render_html(&UnenrollDoneTemplate { view })?)
    }

    pub async fn answer_confirmation_page(
        &self,
        viewer: &Viewer,
        assessment: &str,
        score: u32,
    ) -> Result<String, RenderError> {
        let course = self.load().await?;
        let content = AnswerConfirmationView {
            assessment: assessment.to_string(),
            score,
        };
        let view = self.layout(&course, viewer, NavTab::Course, content);
        Ok(render_html(&AnswerConfirmationTemplate { view })?)
    }

    pub async fn announcements_page(&self, viewer: &Viewer) -> Result<String, RenderError> {
        let course = self.load().await?;
        let view = self.layout(&course, viewer, NavTab::Announcements, AnnouncementsView);
        Ok(render_html(&AnnouncementsTemplate { view })?)
    }
}

fn lesson_href(unit_id: u32, lesson_id: u32) -> String {
    format!("unit?unit={unit_id}&lesson={lesson_id}")
}

fn activity_href(unit_id: u32, lesson_id: u32) -> String {
    format!("activity?unit={unit_id}&lesson={lesson_id}")
}
