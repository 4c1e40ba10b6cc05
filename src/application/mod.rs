//! Application services: page rendering, cached serving and student flows.

pub mod error;
pub mod pages;
pub mod repos;
pub mod serving;
pub mod students;
