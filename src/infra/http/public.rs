use std::sync::Arc;

use axum::{
    Extension, Form, Router,
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::application::{
    error::HttpError,
    serving::{Outcome, ServingService},
    students::StudentService,
};
use crate::cache::Viewer;

use super::middleware::{IdentityHeader, bind_viewer, log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub serving: Arc<ServingService>,
    pub students: Arc<StudentService>,
    pub identity_header: IdentityHeader,
    pub login_url: Arc<str>,
}

pub fn build_router(state: HttpState) -> Router {
    let identity = state.identity_header.clone();

    let pages = Router::new()
        .route("/", get(course))
        .route("/course", get(course))
        .route("/unit", get(unit))
        .route("/activity", get(activity))
        .route("/assessment", get(assessment))
        .route("/forum", get(forum))
        .route("/preview", get(preview))
        .route("/announcements", get(announcements))
        .route("/register", get(register_form).post(register))
        .route("/student/home", get(student_home))
        .route("/student/editstudent", get(edit_student_form).post(edit_student))
        .route("/student/unenroll", get(unenroll_form).post(unenroll))
        .route("/answer", post(submit_answers))
        .layer(middleware::from_fn_with_state(identity, bind_viewer));

    pages
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LessonQuery {
    unit: Option<String>,
    lesson: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssessmentQuery {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmailQuery {
    email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegisterForm {
    form01: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EditForm {
    email: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnswerForm {
    assessment_type: String,
    score: String,
}

/// Turn a service outcome into a response. Redirects for sign-in carry the
/// requested URI so the auth proxy can send the viewer back.
fn respond(state: &HttpState, uri: &OriginalUri, outcome: Result<Outcome, HttpError>) -> Response {
    match outcome {
        Ok(Outcome::Page(html)) => (StatusCode::OK, Html(html)).into_response(),
        Ok(Outcome::Redirect(to)) => Redirect::to(&to).into_response(),
        Ok(Outcome::Login) => {
            let target: String =
                url::form_urlencoded::byte_serialize(uri.0.to_string().as_bytes()).collect();
            Redirect::to(&format!("{}?continue={target}", state.login_url)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// A numeric query parameter; absent or empty means "use the default".
fn parse_id(field: &'static str, value: Option<&str>) -> Result<Option<u32>, HttpError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            HttpError::new(
                "infra::http::public::parse_id",
                StatusCode::BAD_REQUEST,
                "Invalid request parameter",
                format!("`{field}` must be a non-negative integer, got `{raw}`"),
            )
        }),
    }
}

async fn course(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.serving.course(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn unit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
    Query(query): Query<LessonQuery>,
) -> Response {
    let outcome: Result<Outcome, HttpError> = async {
        let unit = parse_id("unit", query.unit.as_deref())?;
        let lesson = parse_id("lesson", query.lesson.as_deref())?;
        state.serving.unit(&viewer, unit, lesson).await
    }
    .await;
    respond(&state, &uri, outcome)
}

async fn activity(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
    Query(query): Query<LessonQuery>,
) -> Response {
    let outcome: Result<Outcome, HttpError> = async {
        let unit = parse_id("unit", query.unit.as_deref())?;
        let lesson = parse_id("lesson", query.lesson.as_deref())?;
        state.serving.activity(&viewer, unit, lesson).await
    }
    .await;
    respond(&state, &uri, outcome)
}

async fn assessment(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
    Query(query): Query<AssessmentQuery>,
) -> Response {
    let outcome = state
        .serving
        .assessment(&viewer, query.name.as_deref())
        .await;
    respond(&state, &uri, outcome)
}

async fn forum(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.serving.forum(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn preview(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.serving.preview(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn announcements(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.students.announcements(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn register_form(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.students.register_form(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn register(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
    Form(form): Form<RegisterForm>,
) -> Response {
    let outcome = state.students.register(&viewer, form.form01.trim()).await;
    respond(&state, &uri, outcome)
}

async fn student_home(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.students.profile(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn edit_student_form(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
    Query(query): Query<EmailQuery>,
) -> Response {
    let outcome = state.students.edit_form(&viewer, &query.email).await;
    respond(&state, &uri, outcome)
}

async fn edit_student(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
    Form(form): Form<EditForm>,
) -> Response {
    let outcome = state.students.edit(&viewer, &form.email, &form.name).await;
    respond(&state, &uri, outcome)
}

async fn unenroll_form(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.students.unenroll_form(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn unenroll(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
) -> Response {
    let outcome = state.students.unenroll(&viewer).await;
    respond(&state, &uri, outcome)
}

async fn submit_answers(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    uri: OriginalUri,
    Form(form): Form<AnswerForm>,
) -> Response {
    let outcome: Result<Outcome, HttpError> = async {
        let score = parse_id("score", Some(form.score.as_str()))?.unwrap_or(0);
        state
            .students
            .submit_answers(&viewer, &form.assessment_type, score)
            .await
    }
    .await;
    respond(&state, &uri, outcome)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
