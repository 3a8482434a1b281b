//! QA scorecards and evaluations

use crate::errors::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scoreable sub-item of a criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCriterion {
    pub name: String,
    pub points: f64,
}

/// A weighted evaluation criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub name: String,
    /// Contribution to the weighted total; criterion weights sum to 100
    pub weight: f64,
    pub max_score: f64,
    pub required: bool,
    /// Failing this criterion fails the whole evaluation
    pub auto_fail: bool,
    pub sub_criteria: Vec<SubCriterion>,
}

/// A weighted set of criteria used to evaluate an interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scorecard {
    pub id: String,
    pub name: String,
    pub version: String,
    pub criteria: Vec<Criterion>,
    /// Weighted score (0-100) required to pass
    pub passing_score: f64,
    pub auto_fail_criteria: Vec<String>,
}

impl Scorecard {
    /// Structural checks: weights sum to 100, each max score equals the
    /// sum of its sub-criterion points, auto-fail ids refer to criteria.
    pub fn validate(&self) -> CoreResult<()> {
        let weight_sum: f64 = self.criteria.iter().map(|c| c.weight).sum();
        if (weight_sum - 100.0).abs() > 1e-6 {
            return Err(CoreError::validation(format!(
                "scorecard {}: criterion weights sum to {}, expected 100",
                self.id, weight_sum
            )));
        }
        for criterion in &self.criteria {
            let points: f64 = criterion.sub_criteria.iter().map(|s| s.points).sum();
            if (points - criterion.max_score).abs() > 1e-6 {
                return Err(CoreError::validation(format!(
                    "criterion {}: sub-criterion points sum to {}, expected max score {}",
                    criterion.id, points, criterion.max_score
                )));
            }
        }
        for id in &self.auto_fail_criteria {
            if !self.criteria.iter().any(|c| &c.id == id) {
                return Err(CoreError::validation(format!(
                    "scorecard {}: unknown auto-fail criterion {}",
                    self.id, id
                )));
            }
        }
        Ok(())
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }
}

/// Evaluation lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    InProgress,
    Completed,
    AutoFailed,
}

/// Score assigned to one sub-criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCriterionScore {
    pub name: String,
    pub points: f64,
    pub score: f64,
}

/// Evaluation copy of a criterion carrying its current score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub max_score: f64,
    pub auto_fail: bool,
    pub sub_scores: Vec<SubCriterionScore>,
    pub score: f64,
    pub passed: bool,
    /// True once score_criterion has run for this criterion
    pub scored: bool,
    pub notes: Option<String>,
}

impl CriterionEvaluation {
    pub fn from_criterion(criterion: &Criterion) -> Self {
        Self {
            id: criterion.id.clone(),
            name: criterion.name.clone(),
            weight: criterion.weight,
            max_score: criterion.max_score,
            auto_fail: criterion.auto_fail,
            sub_scores: criterion
                .sub_criteria
                .iter()
                .map(|s| SubCriterionScore {
                    name: s.name.clone(),
                    points: s.points,
                    score: 0.0,
                })
                .collect(),
            score: 0.0,
            passed: false,
            scored: false,
            notes: None,
        }
    }
}

/// The completed-interaction record an evaluation is created over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction_id: String,
    pub agent_id: String,
    pub customer_id: String,
    pub channel: String,
}

/// A QA evaluation of one interaction against one scorecard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub interaction_id: String,
    pub agent_id: String,
    pub customer_id: String,
    pub channel: String,
    pub scorecard_id: String,
    pub qa_agent_id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: EvaluationStatus,
    pub criteria: Vec<CriterionEvaluation>,
    /// Raw sum of criterion scores
    pub total_score: f64,
    /// Weighted score in [0, 100]
    pub weighted_score: f64,
    pub passed: bool,
    pub auto_failed: bool,
    pub auto_fail_reason: Option<String>,
    pub calibration_required: bool,
    pub final_notes: Option<String>,
    pub recommendations: Vec<String>,
}

impl Evaluation {
    /// Recompute totals from current criterion scores.
    ///
    /// weighted = sum((score_i / max_i) * w_i) / sum(w_i) * 100
    pub fn recompute(&mut self, passing_score: f64) {
        self.total_score = self.criteria.iter().map(|c| c.score).sum();
        let weight_sum: f64 = self.criteria.iter().map(|c| c.weight).sum();
        let weighted: f64 = self
            .criteria
            .iter()
            .filter(|c| c.max_score > 0.0)
            .map(|c| (c.score / c.max_score) * c.weight)
            .sum();
        self.weighted_score = if weight_sum > 0.0 {
            weighted / weight_sum * 100.0
        } else {
            0.0
        };
        self.passed = self.weighted_score >= passing_score && !self.auto_failed;
    }
}
