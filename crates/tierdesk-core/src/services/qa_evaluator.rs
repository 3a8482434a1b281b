//! QA evaluator: scorecard scoring, weighted totals, auto-fail and
//! calibration
//!
//! Evaluations are owned exclusively by this service. Scorecards are
//! validated and frozen at construction. Scoring is bounds-checked per
//! sub-criterion, totals are recomputed after every scoring call, and a
//! failed auto-fail criterion latches the whole evaluation. Completing an
//! evaluation folds its weighted score into the QA agent's running
//! average and raises `calibration_required` when the new score deviates
//! from that average by more than 15 points.

use crate::entities::scorecard::{
    Criterion, CriterionEvaluation, Evaluation, EvaluationStatus, InteractionRecord, Scorecard,
    SubCriterion,
};
use crate::errors::{CoreError, CoreResult};
use crate::events::{EngineEvent, EventBus};
use crate::ids::IdGenerator;
use crate::storage::{family, Storage};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Calibration flag threshold in weighted-score points
const CALIBRATION_DEVIATION: f64 = 15.0;

#[derive(Debug, Clone, Default)]
struct QaAgentStats {
    completed: u64,
    average_score: f64,
}

pub struct QaEvaluator {
    scorecards: HashMap<String, Scorecard>,
    evaluations: RwLock<HashMap<String, Evaluation>>,
    qa_stats: RwLock<HashMap<String, QaAgentStats>>,
    storage: Arc<dyn Storage>,
    ids: Arc<IdGenerator>,
    bus: Arc<EventBus>,
}

impl QaEvaluator {
    /// Build the evaluator over a validated scorecard set.
    pub fn new(
        scorecards: Vec<Scorecard>,
        storage: Arc<dyn Storage>,
        ids: Arc<IdGenerator>,
        bus: Arc<EventBus>,
    ) -> CoreResult<Self> {
        let mut table = HashMap::new();
        for scorecard in scorecards {
            scorecard.validate()?;
            table.insert(scorecard.id.clone(), scorecard);
        }
        Ok(Self {
            scorecards: table,
            evaluations: RwLock::new(HashMap::new()),
            qa_stats: RwLock::new(HashMap::new()),
            storage,
            ids,
            bus,
        })
    }

    pub fn scorecard(&self, id: &str) -> CoreResult<&Scorecard> {
        self.scorecards
            .get(id)
            .ok_or_else(|| CoreError::not_found("scorecard", id))
    }

    async fn persist(&self, evaluation: &Evaluation) -> CoreResult<()> {
        self.storage
            .put(
                family::EVALUATION,
                &evaluation.id,
                serde_json::to_value(evaluation)?,
            )
            .await
    }

    /// Instantiate an evaluation over a completed interaction.
    pub async fn create_evaluation(
        &self,
        interaction: InteractionRecord,
        scorecard_id: &str,
        qa_agent_id: &str,
    ) -> CoreResult<Evaluation> {
        let scorecard = self.scorecard(scorecard_id)?;

        let evaluation = Evaluation {
            id: self.ids.evaluation_id(),
            interaction_id: interaction.interaction_id,
            agent_id: interaction.agent_id,
            customer_id: interaction.customer_id,
            channel: interaction.channel,
            scorecard_id: scorecard.id.clone(),
            qa_agent_id: qa_agent_id.to_string(),
            created_at: Utc::now(),
            completed_at: None,
            status: EvaluationStatus::InProgress,
            criteria: scorecard
                .criteria
                .iter()
                .map(CriterionEvaluation::from_criterion)
                .collect(),
            total_score: 0.0,
            weighted_score: 0.0,
            passed: false,
            auto_failed: false,
            auto_fail_reason: None,
            calibration_required: false,
            final_notes: None,
            recommendations: Vec::new(),
        };

        self.persist(&evaluation).await?;
        self.evaluations
            .write()
            .await
            .insert(evaluation.id.clone(), evaluation.clone());

        info!(evaluation_id = %evaluation.id, scorecard_id, "evaluation created");
        self.bus.publish(EngineEvent::EvaluationCreated {
            evaluation_id: evaluation.id.clone(),
            interaction_id: evaluation.interaction_id.clone(),
            scorecard_id: scorecard_id.to_string(),
            ts: evaluation.created_at,
        });
        Ok(evaluation)
    }

    /// Score one criterion with per-sub-criterion scores. Only the
    /// assigned QA agent may score.
    pub async fn score_criterion(
        &self,
        evaluation_id: &str,
        qa_agent_id: &str,
        criterion_id: &str,
        sub_scores: &[f64],
        notes: Option<String>,
    ) -> CoreResult<Evaluation> {
        let passing_score = {
            let evaluations = self.evaluations.read().await;
            let evaluation = evaluations
                .get(evaluation_id)
                .ok_or_else(|| CoreError::not_found("evaluation", evaluation_id))?;
            self.scorecard(&evaluation.scorecard_id)?.passing_score
        };

        let (snapshot, criterion_score) = {
            let mut evaluations = self.evaluations.write().await;
            let evaluation = evaluations
                .get_mut(evaluation_id)
                .ok_or_else(|| CoreError::not_found("evaluation", evaluation_id))?;

            if evaluation.qa_agent_id != qa_agent_id {
                return Err(CoreError::not_authorized(format!(
                    "evaluation {} belongs to QA agent {}",
                    evaluation_id, evaluation.qa_agent_id
                )));
            }
            if evaluation.status == EvaluationStatus::Completed {
                return Err(CoreError::conflict(format!(
                    "evaluation {} is completed",
                    evaluation_id
                )));
            }

            let criterion = evaluation
                .criteria
                .iter_mut()
                .find(|c| c.id == criterion_id)
                .ok_or_else(|| CoreError::not_found("criterion", criterion_id))?;

            if sub_scores.len() != criterion.sub_scores.len() {
                return Err(CoreError::validation(format!(
                    "criterion {} expects {} sub-scores, got {}",
                    criterion_id,
                    criterion.sub_scores.len(),
                    sub_scores.len()
                )));
            }
            for (sub, score) in criterion.sub_scores.iter_mut().zip(sub_scores) {
                if *score < 0.0 || *score > sub.points {
                    return Err(CoreError::validation(format!(
                        "sub-criterion {} score {} outside 0..={}",
                        sub.name, score, sub.points
                    )));
                }
                sub.score = *score;
            }

            criterion.score = criterion.sub_scores.iter().map(|s| s.score).sum();
            criterion.passed = criterion.score >= 0.8 * criterion.max_score;
            criterion.scored = true;
            criterion.notes = notes;

            let auto_fail = criterion.auto_fail && !criterion.passed;
            let criterion_name = criterion.name.clone();
            let criterion_score = criterion.score;
            if auto_fail && !evaluation.auto_failed {
                warn!(
                    evaluation_id,
                    criterion_id, "auto-fail criterion below threshold"
                );
                evaluation.auto_failed = true;
                evaluation.auto_fail_reason = Some(criterion_name);
                evaluation.status = EvaluationStatus::AutoFailed;
            }

            evaluation.recompute(passing_score);
            (evaluation.clone(), criterion_score)
        };

        self.persist(&snapshot).await?;
        self.bus.publish(EngineEvent::CriterionScored {
            evaluation_id: evaluation_id.to_string(),
            criterion_id: criterion_id.to_string(),
            score: criterion_score,
            ts: Utc::now(),
        });
        Ok(snapshot)
    }

    /// Finish an evaluation, update the QA agent's running average and
    /// flag calibration when this score deviates from it by more than 15
    /// points.
    pub async fn complete_evaluation(
        &self,
        evaluation_id: &str,
        qa_agent_id: &str,
        final_notes: Option<String>,
        recommendations: Vec<String>,
    ) -> CoreResult<Evaluation> {
        let snapshot = {
            let mut evaluations = self.evaluations.write().await;
            let evaluation = evaluations
                .get_mut(evaluation_id)
                .ok_or_else(|| CoreError::not_found("evaluation", evaluation_id))?;

            if evaluation.qa_agent_id != qa_agent_id {
                return Err(CoreError::not_authorized(format!(
                    "evaluation {} belongs to QA agent {}",
                    evaluation_id, evaluation.qa_agent_id
                )));
            }
            if evaluation.completed_at.is_some() {
                return Err(CoreError::conflict(format!(
                    "evaluation {} is already completed",
                    evaluation_id
                )));
            }

            evaluation.completed_at = Some(Utc::now());
            if evaluation.status != EvaluationStatus::AutoFailed {
                evaluation.status = EvaluationStatus::Completed;
            }
            evaluation.final_notes = final_notes;
            evaluation.recommendations = recommendations;

            let average_after = {
                let mut stats = self.qa_stats.write().await;
                let entry = stats.entry(qa_agent_id.to_string()).or_default();
                entry.completed += 1;
                entry.average_score +=
                    (evaluation.weighted_score - entry.average_score) / entry.completed as f64;
                entry.average_score
            };
            evaluation.calibration_required =
                (evaluation.weighted_score - average_after).abs() > CALIBRATION_DEVIATION;

            evaluation.clone()
        };

        self.persist(&snapshot).await?;
        info!(
            evaluation_id,
            weighted = snapshot.weighted_score,
            passed = snapshot.passed,
            "evaluation completed"
        );
        self.bus.publish(EngineEvent::EvaluationCompleted {
            evaluation_id: evaluation_id.to_string(),
            weighted_score: snapshot.weighted_score,
            passed: snapshot.passed,
            ts: snapshot.completed_at.unwrap_or_else(Utc::now),
        });
        if snapshot.calibration_required {
            let deviation = {
                let stats = self.qa_stats.read().await;
                let average = stats
                    .get(qa_agent_id)
                    .map(|s| s.average_score)
                    .unwrap_or(0.0);
                (snapshot.weighted_score - average).abs()
            };
            self.bus.publish(EngineEvent::CalibrationRequired {
                evaluation_id: evaluation_id.to_string(),
                qa_agent_id: qa_agent_id.to_string(),
                deviation,
                ts: Utc::now(),
            });
        }
        Ok(snapshot)
    }

    pub async fn get_evaluation(&self, evaluation_id: &str) -> CoreResult<Evaluation> {
        if let Some(evaluation) = self.evaluations.read().await.get(evaluation_id) {
            return Ok(evaluation.clone());
        }
        if let Some(value) = self.storage.get(family::EVALUATION, evaluation_id).await? {
            let evaluation: Evaluation = serde_json::from_value(value)?;
            return Ok(evaluation);
        }
        Err(CoreError::not_found("evaluation", evaluation_id))
    }

    /// Evaluations of interactions handled by the given agent.
    pub async fn list_evaluations_by_agent(&self, agent_id: &str) -> Vec<Evaluation> {
        self.evaluations
            .read()
            .await
            .values()
            .filter(|e| e.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// The QA agent's current running average, if any evaluations have
    /// completed.
    pub async fn qa_average(&self, qa_agent_id: &str) -> Option<f64> {
        self.qa_stats
            .read()
            .await
            .get(qa_agent_id)
            .map(|s| s.average_score)
    }
}

fn criterion(
    id: &str,
    name: &str,
    weight: f64,
    auto_fail: bool,
    subs: &[(&str, f64)],
) -> Criterion {
    Criterion {
        id: id.to_string(),
        name: name.to_string(),
        weight,
        max_score: subs.iter().map(|(_, p)| p).sum(),
        required: true,
        auto_fail,
        sub_criteria: subs
            .iter()
            .map(|(n, p)| SubCriterion {
                name: n.to_string(),
                points: *p,
            })
            .collect(),
    }
}

/// Built-in scorecard for everyday support interactions
pub fn general_support_scorecard() -> Scorecard {
    Scorecard {
        id: "general_support".to_string(),
        name: "General support interaction".to_string(),
        version: "1.0".to_string(),
        criteria: vec![
            criterion(
                "greeting",
                "Greeting and identification",
                10.0,
                false,
                &[("professional_greeting", 5.0), ("identity_verification", 5.0)],
            ),
            criterion(
                "product_knowledge",
                "Product knowledge",
                20.0,
                true,
                &[("accurate_information", 10.0), ("correct_procedures", 10.0)],
            ),
            criterion(
                "problem_resolution",
                "Problem resolution",
                25.0,
                false,
                &[("issue_diagnosis", 10.0), ("effective_solution", 15.0)],
            ),
            criterion(
                "communication",
                "Communication",
                20.0,
                false,
                &[("clarity", 10.0), ("empathy", 10.0)],
            ),
            criterion(
                "compliance",
                "Compliance",
                15.0,
                false,
                &[("required_disclosures", 10.0), ("data_handling", 5.0)],
            ),
            criterion(
                "closing",
                "Closing",
                10.0,
                false,
                &[("summary", 5.0), ("next_steps", 5.0)],
            ),
        ],
        passing_score: 85.0,
        auto_fail_criteria: vec!["product_knowledge".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn evaluator() -> QaEvaluator {
        QaEvaluator::new(
            vec![general_support_scorecard()],
            Arc::new(MemoryStorage::new()),
            Arc::new(IdGenerator::new()),
            Arc::new(EventBus::new()),
        )
        .unwrap()
    }

    fn interaction() -> InteractionRecord {
        InteractionRecord {
            interaction_id: "sess_1".to_string(),
            agent_id: "agent_1".to_string(),
            customer_id: "cust_1".to_string(),
            channel: "chat".to_string(),
        }
    }

    async fn score_all_full(qa: &QaEvaluator, evaluation_id: &str) {
        let full: &[(&str, &[f64])] = &[
            ("greeting", &[5.0, 5.0]),
            ("product_knowledge", &[10.0, 10.0]),
            ("problem_resolution", &[10.0, 15.0]),
            ("communication", &[10.0, 10.0]),
            ("compliance", &[10.0, 5.0]),
            ("closing", &[5.0, 5.0]),
        ];
        for (criterion_id, scores) in full {
            qa.score_criterion(evaluation_id, "agent_qa", criterion_id, scores, None)
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_builtin_scorecard_is_valid() {
        let scorecard = general_support_scorecard();
        assert!(scorecard.validate().is_ok());
        let weights: Vec<f64> = scorecard.criteria.iter().map(|c| c.weight).collect();
        assert_eq!(weights, vec![10.0, 20.0, 25.0, 20.0, 15.0, 10.0]);
    }

    #[tokio::test]
    async fn test_full_scores_give_weighted_100() {
        let qa = evaluator();
        let evaluation = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();
        score_all_full(&qa, &evaluation.id).await;

        let evaluation = qa.get_evaluation(&evaluation.id).await.unwrap();
        assert!((evaluation.weighted_score - 100.0).abs() < 1e-9);
        assert!((evaluation.total_score - 100.0).abs() < 1e-9);
        assert!(evaluation.passed);
        assert!(!evaluation.auto_failed);
    }

    #[tokio::test]
    async fn test_auto_fail_overrides_other_scores() {
        let qa = evaluator();
        let evaluation = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();
        score_all_full(&qa, &evaluation.id).await;

        // 10/20 is below the 0.8 * 20 = 16 bar on an auto-fail criterion.
        let evaluation = qa
            .score_criterion(&evaluation.id, "agent_qa", "product_knowledge", &[5.0, 5.0], None)
            .await
            .unwrap();

        assert!(evaluation.auto_failed);
        assert_eq!(
            evaluation.auto_fail_reason.as_deref(),
            Some("Product knowledge")
        );
        assert!(!evaluation.passed);
        assert_eq!(evaluation.status, EvaluationStatus::AutoFailed);
    }

    #[tokio::test]
    async fn test_sub_score_bounds_enforced() {
        let qa = evaluator();
        let evaluation = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();

        let err = qa
            .score_criterion(&evaluation.id, "agent_qa", "greeting", &[6.0, 5.0], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = qa
            .score_criterion(&evaluation.id, "agent_qa", "greeting", &[5.0], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_non_assigned_qa_agent_rejected() {
        let qa = evaluator();
        let evaluation = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();

        let err = qa
            .score_criterion(&evaluation.id, "agent_other", "greeting", &[5.0, 5.0], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_partial_scores_weighted_correctly() {
        let qa = evaluator();
        let evaluation = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();

        // Half the greeting criterion only: (5/10)*10 / 100 * 100 = 5.
        let evaluation = qa
            .score_criterion(&evaluation.id, "agent_qa", "greeting", &[2.5, 2.5], None)
            .await
            .unwrap();
        assert!((evaluation.weighted_score - 5.0).abs() < 1e-9);
        assert!(!evaluation.passed);
    }

    #[tokio::test]
    async fn test_completion_updates_running_average_and_calibration() {
        let qa = evaluator();

        // First evaluation scores 100; the average becomes 100 and no
        // calibration is needed.
        let first = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();
        score_all_full(&qa, &first.id).await;
        let first = qa
            .complete_evaluation(&first.id, "agent_qa", None, vec![])
            .await
            .unwrap();
        assert!(!first.calibration_required);
        assert_eq!(qa.qa_average("agent_qa").await, Some(100.0));

        // A second evaluation scoring 36 drags the average to 68 and
        // deviates from it by more than 15 points.
        let second = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();
        qa.score_criterion(&second.id, "agent_qa", "greeting", &[5.0, 5.0], None)
            .await
            .unwrap();
        qa.score_criterion(&second.id, "agent_qa", "product_knowledge", &[8.0, 8.0], None)
            .await
            .unwrap();
        qa.score_criterion(&second.id, "agent_qa", "problem_resolution", &[5.0, 5.0], None)
            .await
            .unwrap();
        let second = qa
            .complete_evaluation(&second.id, "agent_qa", None, vec![])
            .await
            .unwrap();

        assert!(second.calibration_required);
    }

    #[tokio::test]
    async fn test_double_completion_conflicts() {
        let qa = evaluator();
        let evaluation = qa
            .create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();
        qa.complete_evaluation(&evaluation.id, "agent_qa", None, vec![])
            .await
            .unwrap();

        let err = qa
            .complete_evaluation(&evaluation.id, "agent_qa", None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_scorecard_rejected() {
        let qa = evaluator();
        let err = qa
            .create_evaluation(interaction(), "missing_card", "agent_qa")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_by_agent_filters_on_interaction_agent() {
        let qa = evaluator();
        qa.create_evaluation(interaction(), "general_support", "agent_qa")
            .await
            .unwrap();
        let mut other = interaction();
        other.agent_id = "agent_2".to_string();
        qa.create_evaluation(other, "general_support", "agent_qa")
            .await
            .unwrap();

        assert_eq!(qa.list_evaluations_by_agent("agent_1").await.len(), 1);
        assert_eq!(qa.list_evaluations_by_agent("agent_2").await.len(), 1);
    }
}
