//! Request-scoped viewer identity.
//!
//! Each request runs inside [`with_viewer`], which binds the viewer to the
//! current task via `tokio::task_local!`. Renders that must not see the real
//! viewer run inside [`with_placeholder_identity`], a nested scope that only
//! covers that one future. Nothing here is process-wide: concurrent requests
//! each see their own binding, and leaving a scope (normally, by error, or by
//! panic) restores the outer binding.

use std::future::Future;

use super::personalize::EMAIL_PLACEHOLDER;

tokio::task_local! {
    static VIEWER: Viewer;
}

/// The identity of whoever the current request is rendered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
    Anonymous,
    Email(String),
}

impl Viewer {
    /// Viewer whose email is the placeholder token.
    pub fn placeholder() -> Self {
        Self::Email(EMAIL_PLACEHOLDER.to_string())
    }

    pub fn from_email(email: Option<impl Into<String>>) -> Self {
        match email {
            Some(email) => Self::Email(email.into()),
            None => Self::Anonymous,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Email(email) => Some(email),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.email() == Some(EMAIL_PLACEHOLDER)
    }
}

/// The viewer bound to the current task, or `Anonymous` outside any scope.
pub fn current_viewer() -> Viewer {
    VIEWER
        .try_with(Clone::clone)
        .unwrap_or(Viewer::Anonymous)
}

/// Run `f` with `viewer` as the current viewer.
pub async fn with_viewer<F>(viewer: Viewer, f: F) -> F::Output
where
    F: Future,
{
    VIEWER.scope(viewer, f).await
}

/// Run `f` with the placeholder viewer as the current viewer.
///
/// A signed-in outer viewer is replaced by the placeholder. An anonymous outer
/// viewer stays anonymous, so pages built for anonymous visitors never gain a
/// placeholder they would show verbatim.
pub async fn with_placeholder_identity<F>(f: F) -> F::Output
where
    F: Future,
{
    let scoped = match current_viewer() {
        Viewer::Anonymous => Viewer::Anonymous,
        Viewer::Email(_) => Viewer::placeholder(),
    };
    VIEWER.scope(scoped, f).await
}
