use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    application::{
        pages::{CourseRenderer, RenderError},
        repos::{CourseRepo, RepoError},
    },
    cache::{PageKey, PersonalizedPageCache, Viewer},
    domain::course::{Course, UnitKind},
};

pub(crate) const METRIC_PAGE_WARM_MS: &str = "coursepages_page_warm_ms";

const TARGET: &str = "coursepages::cache_warmer";

#[derive(Debug, Error)]
pub enum CacheWarmError {
    #[error("failed to load course outline: {0}")]
    Course(#[from] RepoError),
}

/// How many pages a warm pass stored, and how many failed to render.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmReport {
    pub warmed: usize,
    pub failed: usize,
}

/// Renders every shared course page into the page cache ahead of traffic.
pub struct CacheWarmer {
    pages: PersonalizedPageCache,
    renderer: CourseRenderer,
    course: Arc<dyn CourseRepo>,
}

impl CacheWarmer {
    pub fn new(
        pages: PersonalizedPageCache,
        renderer: CourseRenderer,
        course: Arc<dyn CourseRepo>,
    ) -> Self {
        Self {
            pages,
            renderer,
            course,
        }
    }

    pub async fn warm_initial(&self) -> Result<WarmReport, CacheWarmError> {
        info!(target = TARGET, "warming page cache");
        let started = Instant::now();
        let course = self.course.load_course().await?;
        let signed_in = Viewer::placeholder();
        let renderer = &self.renderer;
        let mut report = WarmReport::default();

        let outcome = self
            .pages
            .serve(&PageKey::course(), &signed_in, |viewer| async move {
                renderer.course_page(&viewer).await
            })
            .await;
        record(&mut report, PageKey::course(), outcome);

        let outcome = self
            .pages
            .serve(&PageKey::forum(), &signed_in, |viewer| async move {
                renderer.forum_page(&viewer).await
            })
            .await;
        record(&mut report, PageKey::forum(), outcome);

        let anonymous = Viewer::Anonymous;
        for (key, visitor) in [
            (PageKey::logged_in_preview(), &signed_in),
            (PageKey::anonymous_preview(), &anonymous),
        ] {
            let outcome = self
                .pages
                .serve(&key, visitor, |viewer| async move {
                    renderer.preview_page(&viewer).await
                })
                .await;
            record(&mut report, key, outcome);
        }

        for lesson in &course.lessons {
            let (unit, id) = (lesson.unit_id, lesson.id);
            let outcome = self
                .pages
                .serve(&PageKey::lesson(unit, id), &signed_in, |viewer| async move {
                    renderer.lesson_page(&viewer, unit, id).await
                })
                .await;
            record(&mut report, PageKey::lesson(unit, id), outcome);

            if lesson.has_activity() {
                let outcome = self
                    .pages
                    .serve(&PageKey::activity(unit, id), &signed_in, |viewer| async move {
                        renderer.activity_page(&viewer, unit, id).await
                    })
                    .await;
                record(&mut report, PageKey::activity(unit, id), outcome);
            }
        }

        for unit in course.units.iter().filter(|unit| unit.kind == UnitKind::Assessment) {
            let name = unit.unit_id.as_str();
            let outcome = self
                .pages
                .serve(&PageKey::assessment(name), &signed_in, |viewer| async move {
                    renderer.assessment_page(&viewer, name).await
                })
                .await;
            record(&mut report, PageKey::assessment(name), outcome);
        }

        histogram!(METRIC_PAGE_WARM_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            target = TARGET,
            warmed = report.warmed,
            failed = report.failed,
            "page cache warmed"
        );
        Ok(report)
    }

    /// Drop the cached shared pages of every outline in `courses`.
    pub async fn invalidate(&self, courses: &[&Course]) -> usize {
        let keys: BTreeSet<PageKey> = courses
            .iter()
            .flat_map(|course| shared_page_keys(course))
            .collect();
        for key in &keys {
            self.pages.invalidate(key).await;
        }
        info!(target = TARGET, pages = keys.len(), "shared pages invalidated");
        keys.len()
    }
}

/// Every cache key a shared page of `course` is stored under.
pub fn shared_page_keys(course: &Course) -> BTreeSet<PageKey> {
    let mut keys = BTreeSet::from([
        PageKey::course(),
        PageKey::forum(),
        PageKey::logged_in_preview(),
        PageKey::anonymous_preview(),
    ]);
    for lesson in &course.lessons {
        keys.insert(PageKey::lesson(lesson.unit_id, lesson.id));
        if lesson.has_activity() {
            keys.insert(PageKey::activity(lesson.unit_id, lesson.id));
        }
    }
    keys.extend(
        course
            .units
            .iter()
            .filter(|unit| unit.kind == UnitKind::Assessment)
            .map(|unit| PageKey::assessment(&unit.unit_id)),
    );
    keys
}

fn record(report: &mut WarmReport, key: PageKey, outcome: Result<String, RenderError>) {
    match outcome {
        Ok(_) => report.warmed += 1,
        Err(err) => {
            report.failed += 1;
            warn!(target = TARGET, key = %key, error = %err, "skipping page during warm-up");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, EMAIL_PLACEHOLDER};
    use crate::domain::course::{Course, Lesson, Unit};
    use crate::infra::memory::InMemoryCourseRepo;
    use crate::presentation::views::AuthLinks;

    fn sample_course() -> Course {
        Course {
            title: "Search".to_string(),
            units: vec![
                Unit {
                    id: 1,
                    kind: UnitKind::Unit,
                    unit_id: "1".to_string(),
                    title: "Intro".to_string(),
                    release_date: String::new(),
                    now_available: true,
                },
                Unit {
                    id: 2,
                    kind: UnitKind::Assessment,
                    unit_id: "Mid".to_string(),
                    title: "Midterm".to_string(),
                    release_date: String::new(),
                    now_available: true,
                },
            ],
            lessons: vec![Lesson {
                unit_id: 1,
                id: 1,
                title: "Welcome".to_string(),
                objectives: String::new(),
                video: String::new(),
                notes: String::new(),
                slides: String::new(),
                duration: String::new(),
                activity: Some("yes".to_string()),
                activity_title: "Try it".to_string(),
            }],
        }
    }

    fn warmer_for(course: Course) -> (CacheWarmer, PersonalizedPageCache) {
        let repo: Arc<dyn CourseRepo> = Arc::new(InMemoryCourseRepo::new(course));
        let renderer = CourseRenderer::new(
            repo.clone(),
            AuthLinks {
                login_url: "/login".to_string(),
                logout_url: "/logout".to_string(),
            },
        );
        let pages = PersonalizedPageCache::from_config(&CacheConfig::default());
        (CacheWarmer::new(pages.clone(), renderer, repo), pages)
    }

    #[tokio::test]
    async fn warms_every_shared_page() {
        let (warmer, pages) = warmer_for(sample_course());

        let report = warmer.warm_initial().await.expect("warm");
        assert_eq!(report, WarmReport { warmed: 7, failed: 0 });

        let cached = pages
            .get_or_render(&PageKey::activity(1, 1), || async {
                Err::<String, _>("not cached")
            })
            .await
            .expect("activity cached");
        assert!(cached.as_str().contains(EMAIL_PLACEHOLDER));

        let anonymous = pages
            .get_or_render(&PageKey::anonymous_preview(), || async {
                Err::<String, _>("not cached")
            })
            .await
            .expect("anonymous preview cached");
        assert!(!anonymous.as_str().contains(EMAIL_PLACEHOLDER));
    }

    #[tokio::test]
    async fn invalidate_drops_warmed_pages() {
        let course = sample_course();
        let (warmer, pages) = warmer_for(course.clone());
        warmer.warm_initial().await.expect("warm");

        assert_eq!(warmer.invalidate(&[&course, &course]).await, 7);

        let rendered = pages
            .get_or_render(&PageKey::lesson(1, 1), || async { Ok::<_, String>("fresh".to_string()) })
            .await
            .expect("render");
        assert_eq!(rendered.as_str(), "fresh");
    }

    #[test]
    fn keys_cover_lessons_activities_and_assessments() {
        let keys = shared_page_keys(&sample_course());
        assert!(keys.contains(&PageKey::lesson(1, 1)));
        assert!(keys.contains(&PageKey::activity(1, 1)));
        assert!(keys.contains(&PageKey::assessment("Mid")));
        assert_eq!(keys.len(), 7);
    }
}
