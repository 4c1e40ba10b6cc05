use std::sync::Arc;

use crate::{
    application::{
        pages::CourseRenderer,
        repos::{CourseRepo, StudentRepo},
        serving::ServingService,
        students::StudentService,
    },
    cache::{CacheConfig, PersonalizedPageCache},
    config::Settings,
    domain::course::Course,
    presentation::views::AuthLinks,
};

use super::{
    cache_warmer::CacheWarmer,
    course_reload::CourseReloader,
    http::{HttpState, IdentityHeader},
    memory::InMemoryCourseRepo,
};

/// Everything the server needs, wired from settings and repositories.
pub struct ApplicationContext {
    pub http_state: HttpState,
    pub warmer: Arc<CacheWarmer>,
    pub reloader: CourseReloader,
}

impl ApplicationContext {
    pub fn build(settings: &Settings, course: Course, students: Arc<dyn StudentRepo>) -> Self {
        let outline = Arc::new(InMemoryCourseRepo::new(course));
        let course_repo: Arc<dyn CourseRepo> = outline.clone();
        let links = AuthLinks {
            login_url: settings.identity.login_url.clone(),
            logout_url: settings.identity.logout_url.clone(),
        };
        let renderer = CourseRenderer::new(course_repo.clone(), links);
        let page_cache = PersonalizedPageCache::from_config(&CacheConfig::from(&settings.cache));

        let serving = Arc::new(ServingService::new(
            page_cache.clone(),
            renderer.clone(),
            students.clone(),
        ));
        let student_service = Arc::new(StudentService::new(
            renderer.clone(),
            students,
            settings.registration.max_class_size,
        ));

        let http_state = HttpState {
            serving,
            students: student_service,
            identity_header: IdentityHeader(Arc::new(settings.identity.header.clone())),
            login_url: Arc::from(settings.identity.login_url.as_str()),
        };
        let warmer = Arc::new(CacheWarmer::new(page_cache, renderer, course_repo));
        let reloader = CourseReloader::new(
            settings.course.path.clone(),
            outline,
            warmer.clone(),
            settings.cache.enabled && settings.cache.warm_on_start,
        );

        Self {
            http_state,
            warmer,
            reloader,
        }
    }
}
