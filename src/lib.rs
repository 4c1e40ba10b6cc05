//! Online course server whose shared pages are rendered once and
//! personalized per student on the way out.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
