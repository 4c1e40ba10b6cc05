use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

/// A student profile, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub email: String,
    pub name: String,
    pub is_enrolled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
    #[serde(default)]
    pub scores: BTreeMap<String, u32>,
}

impl Student {
    pub fn enroll(email: impl Into<String>, name: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            is_enrolled: true,
            enrolled_at: now,
            scores: BTreeMap::new(),
        }
    }

    /// Enroll a returning student again under a possibly new name.
    pub fn re_enroll(&mut self, name: impl Into<String>) {
        if !self.is_enrolled {
            self.is_enrolled = true;
            self.name = name.into();
        }
    }

    pub fn unenroll(&mut self) {
        self.is_enrolled = false;
    }

    /// Record the latest score for an assessment.
    pub fn record_score(&mut self, assessment: &str, score: u32) -> Result<(), DomainError> {
        if assessment.trim().is_empty() {
            return Err(DomainError::validation("assessment name must not be empty"));
        }
        if score > 100 {
            return Err(DomainError::validation(format!(
                "score {score} is outside 0..=100"
            )));
        }
        self.scores.insert(assessment.to_string(), score);
        Ok(())
    }

    /// Scores in assessment-name order.
    pub fn score_list(&self) -> Vec<(String, u32)> {
        self.scores
            .iter()
            .map(|(name, score)| (name.clone(), *score))
            .collect()
    }
}
