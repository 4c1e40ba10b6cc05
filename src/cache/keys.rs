//! Page keys.
//!
//! A `PageKey` names one viewer-independent rendering of a page. Requests that
//! should share a rendering must build identical keys; requests that render
//! differently (another unit, lesson, or assessment) must build distinct ones.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageKeyError {
    #[error("page key must not be empty")]
    Empty,
}

/// Opaque, non-empty cache key for a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey(String);

impl PageKey {
    pub fn new(value: impl Into<String>) -> Result<Self, PageKeyError> {
        let value = value.into();
        if value.is_empty() {
            return Err(PageKeyError::Empty);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn course() -> Self {
        Self("course_page".to_string())
    }

    // The separator keeps (1, 11) and (11, 1) apart.
    pub fn lesson(unit: u32, lesson: u32) -> Self {
        Self(format!("lesson{unit}_{lesson}_page"))
    }

    pub fn activity(unit: u32, lesson: u32) -> Self {
        Self(format!("activity{unit}_{lesson}_page"))
    }

    pub fn assessment(name: &str) -> Self {
        Self(format!("assessment{name}_page"))
    }

    pub fn forum() -> Self {
        Self("forum_page".to_string())
    }

    pub fn logged_in_preview() -> Self {
        Self("loggedin_preview_page".to_string())
    }

    pub fn anonymous_preview() -> Self {
        Self("anonymous_preview_page".to_string())
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
