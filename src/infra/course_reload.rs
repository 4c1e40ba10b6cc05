use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::course::Course;

use super::{
    cache_warmer::{CacheWarmer, WarmReport},
    course_file,
    error::InfraError,
    memory::InMemoryCourseRepo,
};

const TARGET: &str = "coursepages::course_reload";

/// What one reload changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    pub invalidated: usize,
    pub warmed: Option<WarmReport>,
}

/// Re-reads the course outline and drops every cached page built from the
/// old one.
pub struct CourseReloader {
    path: PathBuf,
    repo: Arc<InMemoryCourseRepo>,
    warmer: Arc<CacheWarmer>,
    rewarm: bool,
}

impl CourseReloader {
    pub fn new(
        path: PathBuf,
        repo: Arc<InMemoryCourseRepo>,
        warmer: Arc<CacheWarmer>,
        rewarm: bool,
    ) -> Self {
        Self {
            path,
            repo,
            warmer,
            rewarm,
        }
    }

    /// Load the outline file again and apply it. A file that fails to parse
    /// or validate leaves the current outline and cache untouched.
    pub async fn reload(&self) -> Result<ReloadReport, InfraError> {
        let course = course_file::load_course_file(&self.path).await?;
        self.apply(course).await
    }

    pub async fn apply(&self, course: Course) -> Result<ReloadReport, InfraError> {
        let previous = self
            .repo
            .replace(course.clone())
            .map_err(|err| InfraError::course_file(&self.path.display().to_string(), err.to_string()))?;

        // Keys only the new outline has may hold pages from an older one.
        let invalidated = self.warmer.invalidate(&[&previous, &course]).await;

        let warmed = if self.rewarm {
            match self.warmer.warm_initial().await {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(target = TARGET, error = %err, "re-warm after reload failed");
                    None
                }
            }
        } else {
            None
        };

        info!(
            target = TARGET,
            title = %course.title,
            invalidated,
            rewarmed = warmed.is_some(),
            "course outline reloaded"
        );
        Ok(ReloadReport {
            invalidated,
            warmed,
        })
    }
}
