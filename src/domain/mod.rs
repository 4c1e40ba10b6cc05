//! Domain layer types and invariants.

pub mod course;
pub mod error;
pub mod students;
