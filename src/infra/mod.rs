//! Infrastructure adapters and runtime bootstrap.

pub mod bootstrap;
pub mod cache_warmer;
pub mod course_file;
pub mod course_reload;
pub mod error;
pub mod http;
pub mod memory;
pub mod telemetry;
