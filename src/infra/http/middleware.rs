use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::cache::{Viewer, identity};

const TARGET: &str = "coursepages::http::response";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identifier shared by every log line of one request.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
}

/// Tag the request with a fresh id and echo it back in `x-request-id`.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4(),
    };
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Name of the header the fronting auth proxy sets to the signed-in email.
#[derive(Clone)]
pub struct IdentityHeader(pub Arc<HeaderName>);

/// Resolve the viewer from the identity header and bind it for the rest of
/// the request, both as an extension and as the task's current viewer.
pub async fn bind_viewer(
    State(header): State<IdentityHeader>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let email = request
        .headers()
        .get(header.0.as_ref())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let viewer = Viewer::from_email(email);
    request.extensions_mut().insert(viewer.clone());

    identity::with_viewer(viewer, next.run(request)).await
}

struct Failure {
    status: StatusCode,
    method: Method,
    uri: Uri,
    elapsed_ms: u128,
    request_id: Option<Uuid>,
    report: Option<ErrorReport>,
}

/// Log every 4xx and 5xx with the `ErrorReport` its handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id);

    let mut response = next.run(request).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        log_failure(Failure {
            status,
            method,
            uri,
            elapsed_ms: started.elapsed().as_millis(),
            request_id,
            report: response.extensions_mut().remove::<ErrorReport>(),
        });
    }
    response
}

fn log_failure(failure: Failure) {
    let (source, chain) = failure
        .report
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = chain.first().map(String::as_str).unwrap_or("no diagnostic available");
    let request_id = failure.request_id.map(|id| id.to_string()).unwrap_or_default();

    if failure.status.is_server_error() {
        error!(
            target = TARGET,
            status = failure.status.as_u16(),
            method = %failure.method,
            path = failure.uri.path(),
            query = failure.uri.query().unwrap_or(""),
            elapsed_ms = failure.elapsed_ms,
            source,
            detail,
            chain = ?chain,
            request_id,
            "request failed",
        );
    } else {
        warn!(
            target = TARGET,
            status = failure.status.as_u16(),
            method = %failure.method,
            path = failure.uri.path(),
            elapsed_ms = failure.elapsed_ms,
            source,
            detail,
            request_id,
            "request rejected",
        );
    }
}

#[cfg(test)]
mod tests {
    use axum::{Extension, Router, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;

    async fn whoami(Extension(viewer): Extension<Viewer>) -> String {
        let ambient = identity::current_viewer();
        assert_eq!(ambient, viewer);
        viewer.email().unwrap_or("anonymous").to_string()
    }

    fn router() -> Router {
        let header = IdentityHeader(Arc::new(HeaderName::from_static("x-viewer-email")));
        Router::new()
            .route("/", get(whoami))
            .layer(middleware::from_fn_with_state(header, bind_viewer))
            .layer(middleware::from_fn(set_request_context))
    }

    async fn body(response: Response) -> String {
        use http_body_util::BodyExt;
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf-8")
    }

    #[tokio::test]
    async fn header_email_becomes_the_viewer() {
        let request = Request::builder()
            .uri("/")
            .header("x-viewer-email", " ada@example.org ")
            .body(Body::empty())
            .expect("request");
        let response = router().oneshot(request).await.expect("response");
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body(response).await, "ada@example.org");
    }

    #[tokio::test]
    async fn blank_header_is_anonymous() {
        let request = Request::builder()
            .uri("/")
            .header("x-viewer-email", "  ")
            .body(Body::empty())
            .expect("request");
        let response = router().oneshot(request).await.expect("response");
        assert_eq!(body(response).await, "anonymous");
    }
}
