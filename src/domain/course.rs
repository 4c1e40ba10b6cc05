//! Course structure: units (lessons, assessments, external links) and lessons.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// A unit of lessons; `unit_id` is its number.
    Unit,
    /// An assessment; `unit_id` is the assessment name.
    Assessment,
    /// An external link; `unit_id` is the URL.
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: u32,
    pub kind: UnitKind,
    pub unit_id: String,
    pub title: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub now_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub unit_id: u32,
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub objectives: String,
    #[serde(default)]
    pub video: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub slides: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub activity_title: String,
}

impl Lesson {
    pub fn has_activity(&self) -> bool {
        self.activity.as_deref().is_some_and(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Course {
    /// Sort units and lessons and check that every lesson belongs to a unit.
    pub fn validated(mut self) -> Result<Self, DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("course title must not be empty"));
        }

        let mut unit_ids = HashSet::new();
        for unit in &self.units {
            if !unit_ids.insert(unit.id) {
                return Err(DomainError::validation(format!(
                    "duplicate unit id {}",
                    unit.id
                )));
            }
        }

        let mut lesson_ids = HashSet::new();
        for lesson in &self.lessons {
            let owner = self
                .units
                .iter()
                .find(|unit| unit.id == lesson.unit_id && unit.kind == UnitKind::Unit);
            if owner.is_none() {
                return Err(DomainError::validation(format!(
                    "lesson {} refers to unknown unit {}",
                    lesson.id, lesson.unit_id
                )));
            }
            if !lesson_ids.insert((lesson.unit_id, lesson.id)) {
                return Err(DomainError::validation(format!(
                    "duplicate lesson {} in unit {}",
                    lesson.id, lesson.unit_id
                )));
            }
        }

        self.units.sort_by_key(|unit| unit.id);
        self.lessons.sort_by_key(|lesson| (lesson.unit_id, lesson.id));
        Ok(self)
    }

    pub fn unit(&self, id: u32) -> Option<&Unit> {
        self.units.iter().find(|unit| unit.id == id)
    }

    pub fn lessons_for(&self, unit_id: u32) -> Vec<&Lesson> {
        self.lessons
            .iter()
            .filter(|lesson| lesson.unit_id == unit_id)
            .collect()
    }

    pub fn lesson(&self, unit_id: u32, lesson_id: u32) -> Option<&Lesson> {
        self.lessons
            .iter()
            .find(|lesson| lesson.unit_id == unit_id && lesson.id == lesson_id)
    }

    pub fn assessment(&self, name: &str) -> Option<&Unit> {
        self.units
            .iter()
            .find(|unit| unit.kind == UnitKind::Assessment && unit.unit_id == name)
    }
}
