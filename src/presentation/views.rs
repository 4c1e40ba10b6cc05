use askama::{Error as AskamaError, Template};
use axum::http::StatusCode;
use thiserror::Error;

use crate::application::error::HttpError;
use crate::cache::{Viewer, capture};
use crate::domain::course::{Lesson, Unit, UnitKind};
use crate::domain::students::Student;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

/// Render a template into a string through the in-memory output buffer.
pub fn render_html<T: Template>(template: &T) -> Result<String, TemplateRenderError> {
    capture(|out| template.render_into(out)).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_html",
            "Template rendering failed",
            err,
        )
    })
}

/// Which navbar tab is highlighted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NavTab {
    Course,
    Announcements,
    Forum,
    Registration,
    #[default]
    None,
}

#[derive(Clone)]
pub struct NavLink {
    pub label: &'static str,
    pub href: &'static str,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct NavbarView {
    pub signed_in: bool,
    pub email: String,
    pub login_url: String,
    pub logout_url: String,
    pub links: Vec<NavLink>,
    pub register_active: bool,
}

impl NavbarView {
    /// Navbar for `viewer`. A placeholder viewer yields the placeholder token
    /// as its email, which is what lets the page be cached.
    pub fn for_viewer(viewer: &Viewer, links: &AuthLinks, active: NavTab) -> Self {
        let tab = |label, href, tab: NavTab| NavLink {
            label,
            href,
            is_active: tab == active,
        };
        Self {
            signed_in: viewer.email().is_some(),
            email: viewer.email().unwrap_or_default().to_string(),
            login_url: links.login_url.clone(),
            logout_url: links.logout_url.clone(),
            links: vec![
                tab("Course", "/course", NavTab::Course),
                tab("Announcements", "/announcements", NavTab::Announcements),
                tab("Forum", "/forum", NavTab::Forum),
            ],
            register_active: active == NavTab::Registration,
        }
    }
}

/// Where the navbar sends visitors to sign in and out.
#[derive(Clone, Debug)]
pub struct AuthLinks {
    pub login_url: String,
    pub logout_url: String,
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub course_title: String,
    pub navbar: NavbarView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(course_title: impl Into<String>, navbar: NavbarView, content: T) -> Self {
        Self {
            course_title: course_title.into(),
            navbar,
            content,
        }
    }
}

#[derive(Clone)]
pub struct UnitCard {
    pub id: u32,
    pub title: String,
    pub href: String,
    pub release_date: String,
    pub available: bool,
    pub is_link: bool,
}

impl UnitCard {
    pub fn from_unit(unit: &Unit) -> Self {
        let href = match unit.kind {
            UnitKind::Unit => format!("unit?unit={}", unit.id),
            UnitKind::Assessment => format!("assessment?name={}", unit.unit_id),
            UnitKind::Link => unit.unit_id.clone(),
        };
        Self {
            id: unit.id,
            title: unit.title.clone(),
            href,
            release_date: unit.release_date.clone(),
            available: unit.now_available,
            is_link: unit.kind == UnitKind::Link,
        }
    }
}

pub struct CourseView {
    pub units: Vec<UnitCard>,
}

#[derive(Template)]
#[template(path = "course.html")]
pub struct CourseTemplate {
    pub view: LayoutContext<CourseView>,
}

#[derive(Clone)]
pub struct LessonLink {
    pub id: u32,
    pub title: String,
    pub href: String,
    pub is_current: bool,
}

pub struct LessonView {
    pub unit_id: u32,
    pub unit_title: String,
    pub lesson: Lesson,
    pub lessons: Vec<LessonLink>,
    pub activity_href: Option<String>,
    pub next_href: Option<String>,
    pub back_href: Option<String>,
}

#[derive(Template)]
#[template(path = "unit.html")]
pub struct LessonTemplate {
    pub view: LayoutContext<LessonView>,
}

pub struct ActivityView {
    pub unit_id: u32,
    pub lesson_id: u32,
    pub title: String,
    pub script: String,
    pub lesson_href: String,
    pub next_href: Option<String>,
}

#[derive(Template)]
#[template(path = "activity.html")]
pub struct ActivityTemplate {
    pub view: LayoutContext<ActivityView>,
}

pub struct AssessmentView {
    pub name: String,
    pub title: String,
}

#[derive(Template)]
#[template(path = "assessment.html")]
pub struct AssessmentTemplate {
    pub view: LayoutContext<AssessmentView>,
}

pub struct ForumView;

#[derive(Template)]
#[template(path = "forum.html")]
pub struct ForumTemplate {
    pub view: LayoutContext<ForumView>,
}

pub struct PreviewView {
    pub units: Vec<UnitCard>,
}

#[derive(Template)]
#[template(path = "preview.html")]
pub struct PreviewTemplate {
    pub view: LayoutContext<PreviewView>,
}

pub struct RegisterView;

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub view: LayoutContext<RegisterView>,
}

pub struct ConfirmationView {
    pub course_full: bool,
}

#[derive(Template)]
#[template(path = "confirmation.html")]
pub struct ConfirmationTemplate {
    pub view: LayoutContext<ConfirmationView>,
}

#[derive(Clone)]
pub struct ScoreRow {
    pub assessment: String,
    pub score: u32,
}

#[derive(Clone)]
pub struct StudentView {
    pub email: String,
    pub name: String,
    pub enrolled_on: String,
    pub scores: Vec<ScoreRow>,
}

impl StudentView {
    pub fn from_student(student: &Student) -> Self {
        let enrolled_on = student
            .enrolled_at
            .format(time::macros::format_description!("[year]-[month]-[day]"))
            .unwrap_or_default();
        Self {
            email: student.email.clone(),
            name: student.name.clone(),
            enrolled_on,
            scores: student
                .score_list()
                .into_iter()
                .map(|(assessment, score)| ScoreRow { assessment, score })
                .collect(),
        }
    }
}

pub struct ProfileView {
    pub student: Option<StudentView>,
    pub error_message: Option<String>,
}

#[derive(Template)]
#[template(path = "student_profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

pub struct UnenrollView {
    pub enrolled: bool,
}

#[derive(Template)]
#[template(path = "unenroll_confirmation_check.html")]
pub struct UnenrollCheckTemplate {
    pub view: LayoutContext<UnenrollView>,
}

#[derive(Template)]
#[template(path = "unenroll_confirmation.html")]
pub struct UnenrollDoneTemplate {
    pub view: LayoutContext<UnenrollView>,
}

pub struct AnswerConfirmationView {
    pub assessment: String,
    pub score: u32,
}

#[derive(Template)]
#[template(path = "test_confirmation.html")]
pub struct AnswerConfirmationTemplate {
    pub view: LayoutContext<AnswerConfirmationView>,
}

pub struct AnnouncementsView;

#[derive(Template)]
#[template(path = "announcements.html")]
pub struct AnnouncementsTemplate {
    pub view: LayoutContext<AnnouncementsView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EMAIL_PLACEHOLDER;

    fn links() -> AuthLinks {
        AuthLinks {
            login_url: "/_auth/login".to_string(),
            logout_url: "/_auth/logout".to_string(),
        }
    }

    #[test]
    fn navbar_for_placeholder_viewer_carries_token() {
        let navbar = NavbarView::for_viewer(&Viewer::placeholder(), &links(), NavTab::Course);
        assert!(navbar.signed_in);
        assert_eq!(navbar.email, EMAIL_PLACEHOLDER);
        let active: Vec<_> = navbar.links.iter().filter(|link| link.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].href, "/course");
    }

    #[test]
    fn navbar_for_anonymous_viewer_offers_login() {
        let navbar = NavbarView::for_viewer(&Viewer::Anonymous, &links(), NavTab::None);
        assert!(!navbar.signed_in);
        assert!(navbar.email.is_empty());
    }

    #[test]
    fn forum_template_renders_placeholder_email_verbatim() {
        let navbar = NavbarView::for_viewer(&Viewer::placeholder(), &links(), NavTab::Forum);
        let html = render_html(&ForumTemplate {
            view: LayoutContext::new("Search Basics", navbar, ForumView),
        })
        .expect("forum renders");
        assert!(html.contains(EMAIL_PLACEHOLDER));
        assert!(html.contains("Search Basics"));
    }

    #[test]
    fn unit_card_links_by_kind() {
        let unit = |kind, unit_id: &str| Unit {
            id: 4,
            kind,
            unit_id: unit_id.to_string(),
            title: "T".to_string(),
            release_date: String::new(),
            now_available: true,
        };
        assert_eq!(UnitCard::from_unit(&unit(UnitKind::Unit, "u4")).href, "unit?unit=4");
        assert_eq!(
            UnitCard::from_unit(&unit(UnitKind::Assessment, "Mid")).href,
            "assessment?name=Mid"
        );
        let link = UnitCard::from_unit(&unit(UnitKind::Link, "https://forum.example"));
        assert!(link.is_link);
        assert_eq!(link.href, "https://forum.example");
    }
}
