//! Personalized page cache.
//!
//! Course pages are expensive to build and identical for every student apart
//! from the student's email. They are rendered once under a placeholder
//! viewer, cached under a [`PageKey`], and personalized per request by
//! replacing [`EMAIL_PLACEHOLDER`] with the viewer's email.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! capacity = 512
//! single_flight = true
//! ```

mod backend;
mod config;
pub mod identity;
mod keys;
mod lock;
pub mod output;
mod page_cache;
mod personalize;
mod single_flight;
mod store;

pub use backend::{CacheBackend, CacheError, DisabledBackend};
pub use config::CacheConfig;
pub use identity::Viewer;
pub use keys::{PageKey, PageKeyError};
pub use output::{OutputBuffer, capture};
pub use page_cache::{PersonalizedPageCache, RenderedPage};
pub use personalize::{EMAIL_PLACEHOLDER, personalize, placeholder_count};
pub use single_flight::{FlightGuard, SingleFlight};
pub use store::MemoryBackend;

pub(crate) mod metric_names {
    pub(crate) use super::page_cache::{
        METRIC_PAGE_CACHE_BACKEND_ERROR_TOTAL, METRIC_PAGE_CACHE_HIT_TOTAL,
        METRIC_PAGE_CACHE_MISS_TOTAL, METRIC_PAGE_RENDER_FAILURE_TOTAL, METRIC_PAGE_RENDER_MS,
    };
    pub(crate) use super::store::METRIC_PAGE_CACHE_EVICT_TOTAL;
}
