//! Component wiring and the transport-agnostic operations facade
//!
//! [`SupportEngine`] owns every core component, constructed explicitly in
//! the builder with dependency passing. The engine also runs the two
//! background loops: the dispatch loop draining the priority queue and
//! the SLA sweeper surfacing escalation deadline breaches.

use crate::config::EngineConfig;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tierdesk_core::entities::agent::{Agent, AgentData, AgentStatus};
use tierdesk_core::entities::escalation::EscalationRule;
use tierdesk_core::entities::knowledge::TierKnowledgeView;
use tierdesk_core::entities::prompt::PromptConfig;
use tierdesk_core::entities::scorecard::{Evaluation, InteractionRecord, Scorecard};
use tierdesk_core::entities::session::{
    ConversationContext, CustomerData, MessageRole, ResponseType, Session,
};
use tierdesk_core::errors::{CoreError, CoreResult};
use tierdesk_core::events::{EngineEvent, EventBus};
use tierdesk_core::ids::IdGenerator;
use tierdesk_core::prompts::PromptRegistry;
use tierdesk_core::queue::SessionQueue;
use tierdesk_core::services::conversation_runtime::{ConversationRuntime, ProcessOutcome};
use tierdesk_core::services::escalation::{default_rules, EscalationEngine, EscalationOutcome};
use tierdesk_core::services::qa_evaluator::{general_support_scorecard, QaEvaluator};
use tierdesk_core::services::session_store::SessionStore;
use tierdesk_core::services::stealth_pacer::{BehaviorProfile, PacerOptions, StealthPacer};
use tierdesk_core::services::{AgentDirectory, Dispatcher, KnowledgeRegistry};
use tierdesk_core::storage::{MemoryStorage, RedisStorage, Storage};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Average per-position wait used for the queue ETA estimate
const ETA_PER_POSITION_MS: u64 = 300_000;

/// Result of posting a customer message
#[derive(Debug, Clone, Serialize)]
pub struct PostMessageResult {
    pub accepted: bool,
    pub outcome: ProcessOutcome,
    /// Present when the message drove an escalation through a matching
    /// rule
    pub escalated_rule_id: Option<String>,
}

/// Queue position and estimated wait for a waiting session
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub position: Option<usize>,
    pub eta_ms: Option<u64>,
    pub queue_length: usize,
}

/// Builder assembling a [`SupportEngine`] from its parts
pub struct SupportEngineBuilder {
    config: EngineConfig,
    storage: Option<Arc<dyn Storage>>,
    rules: Option<Vec<EscalationRule>>,
    extra_scorecards: Vec<Scorecard>,
    extra_prompts: Vec<PromptConfig>,
}

impl SupportEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            storage: None,
            rules: None,
            extra_scorecards: Vec::new(),
            extra_prompts: Vec::new(),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_rules(mut self, rules: Vec<EscalationRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_scorecard(mut self, scorecard: Scorecard) -> Self {
        self.extra_scorecards.push(scorecard);
        self
    }

    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.extra_prompts.push(prompt);
        self
    }

    pub async fn build(self) -> CoreResult<SupportEngine> {
        let config = self.config;

        let storage: Arc<dyn Storage> = match self.storage {
            Some(storage) => storage,
            None => match &config.redis_url {
                Some(url) => Arc::new(RedisStorage::new(url, None).await?),
                None => Arc::new(MemoryStorage::new()),
            },
        };

        let ids = Arc::new(IdGenerator::new());
        let bus = Arc::new(EventBus::new());

        let mut prompts = PromptRegistry::builtin();
        for prompt in self.extra_prompts {
            prompts = prompts.with_prompt(prompt);
        }
        let prompts = Arc::new(prompts);

        let store = Arc::new(SessionStore::new(
            storage.clone(),
            ids.clone(),
            bus.clone(),
            prompts.default_prompt_id().to_string(),
        ));
        let directory = Arc::new(AgentDirectory::new(ids.clone()));
        let knowledge = Arc::new(KnowledgeRegistry::with_default_catalog().await);
        let queue = Arc::new(SessionQueue::new());

        let escalation = Arc::new(EscalationEngine::new(
            self.rules.unwrap_or_else(default_rules),
            store.clone(),
            directory.clone(),
            queue.clone(),
            bus.clone(),
            config.escalation_auto_reenqueue,
        )?);

        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone(),
            directory.clone(),
            store.clone(),
            bus.clone(),
        ));

        let pacer = Arc::new(StealthPacer::new(
            bus.clone(),
            PacerOptions {
                enabled: config.stealth_enabled,
                max_response_delay_ms: config.stealth_max_response_delay_ms,
                progress_interval_ms: 100,
            },
        ));

        let mut scorecards = vec![general_support_scorecard()];
        scorecards.extend(self.extra_scorecards);
        if let Some(threshold) = config.qa_pass_threshold {
            for scorecard in &mut scorecards {
                scorecard.passing_score = threshold;
            }
        }
        let qa = Arc::new(QaEvaluator::new(
            scorecards,
            storage.clone(),
            ids.clone(),
            bus.clone(),
        )?);

        Ok(SupportEngine {
            config,
            bus,
            queue,
            store,
            directory,
            knowledge,
            prompts,
            runtime: ConversationRuntime::new(),
            escalation,
            dispatcher,
            pacer,
            qa,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

pub struct SupportEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    queue: Arc<SessionQueue>,
    store: Arc<SessionStore>,
    directory: Arc<AgentDirectory>,
    knowledge: Arc<KnowledgeRegistry>,
    prompts: Arc<PromptRegistry>,
    runtime: ConversationRuntime,
    escalation: Arc<EscalationEngine>,
    dispatcher: Arc<Dispatcher>,
    pacer: Arc<StealthPacer>,
    qa: Arc<QaEvaluator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SupportEngine {
    pub fn builder(config: EngineConfig) -> SupportEngineBuilder {
        SupportEngineBuilder::new(config)
    }

    /// Recover persisted state and spawn the background loops.
    pub async fn start(&self) -> CoreResult<()> {
        let recovered = self.store.recover().await?;
        for session in &recovered {
            self.queue
                .enqueue(&session.id, session.priority, session.created_at)
                .await;
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "re-enqueued recovered sessions");
        }

        let dispatcher = self.dispatcher.clone();
        let poll = self.config.dispatch_poll_interval;
        let dispatch_task = tokio::spawn(async move {
            dispatcher.run(poll).await;
        });

        let escalation = self.escalation.clone();
        let sweep_interval = self.config.sla_sweep_interval;
        let sweep_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                if let Err(e) = escalation.sweep_sla().await {
                    warn!(error = %e, "SLA sweep failed");
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(dispatch_task);
        tasks.push(sweep_task);
        info!("support engine started");
        Ok(())
    }

    /// Stop the background loops.
    pub async fn shutdown(&self) {
        self.dispatcher.stop();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("support engine stopped");
    }

    /// Subscribe to the engine's event stream.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        self.bus.subscribe()
    }

    // ------------------------------------------------------------------
    // Session API
    // ------------------------------------------------------------------

    /// Create a session, enqueue it and wake the dispatcher.
    pub async fn create_session(&self, data: CustomerData) -> CoreResult<Session> {
        let queue_len = self.queue.len().await;
        if queue_len >= self.config.queue_backpressure_soft_limit {
            warn!(
                queue_len,
                limit = self.config.queue_backpressure_soft_limit,
                "queue soft limit exceeded"
            );
        }

        let session = self.store.create(data).await?;
        self.queue
            .enqueue(&session.id, session.priority, session.created_at)
            .await;
        self.bus.publish(EngineEvent::SessionEnqueued {
            session_id: session.id.clone(),
            priority: session.priority,
            ts: Utc::now(),
        });
        self.dispatcher.signal();
        Ok(session)
    }

    /// Record a customer message, run it through the conversation runtime
    /// and drive escalation when a rule matches.
    pub async fn post_customer_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> CoreResult<PostMessageResult> {
        self.store
            .append_message(
                session_id,
                MessageRole::Customer,
                text.to_string(),
                None,
                None,
                HashMap::new(),
            )
            .await?;

        let session = self.store.get(session_id).await?;
        let prompt = self.prompts.get(&session.context.active_prompt_id)?;
        let mut context = session.context.clone();
        let outcome = self
            .runtime
            .process_user_message(prompt, &mut context, text)?;
        self.store.set_context(session_id, context.clone()).await?;

        let mut escalated_rule_id = None;
        if outcome.should_escalate {
            let reason = if context.escalation_triggers.is_empty() {
                format!(
                    "conversation handoff: {}",
                    outcome.escalation_reasons.join(", ")
                )
            } else {
                context.escalation_triggers.join(", ")
            };
            if self.escalation.find_rule(&reason).is_some() {
                match self.escalation.handle_escalation(session_id, &reason).await {
                    Ok(EscalationOutcome { rule_id, .. }) => {
                        escalated_rule_id = Some(rule_id);
                        self.dispatcher.signal();
                    }
                    Err(e) if matches!(e, CoreError::Conflict(_)) => {
                        warn!(session_id, error = %e, "escalation skipped");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(PostMessageResult {
            accepted: true,
            outcome,
            escalated_rule_id,
        })
    }

    /// Record an agent response and pace its delivery. Returns the
    /// enriched content that will reach the customer.
    pub async fn post_agent_response(
        &self,
        session_id: &str,
        agent_id: &str,
        content: &str,
        response_type: ResponseType,
    ) -> CoreResult<String> {
        let agent = self.directory.get(agent_id).await?;
        let session = self.store.get(session_id).await?;
        if session.assigned_agent_id.as_deref() != Some(agent_id) {
            return Err(CoreError::not_authorized(format!(
                "agent {} is not assigned to session {}",
                agent_id, session_id
            )));
        }

        let profile = BehaviorProfile::for_tier(agent.tier);
        let delivered = self
            .pacer
            .pace_response(session_id, agent_id, &profile, response_type, content)
            .await?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "tier".to_string(),
            serde_json::Value::from(agent.tier as u64),
        );
        self.store
            .append_message(
                session_id,
                MessageRole::Agent,
                delivered.clone(),
                Some(agent_id.to_string()),
                Some(response_type),
                metadata,
            )
            .await?;
        Ok(delivered)
    }

    /// Switch the session to a different prompt, resetting conversation
    /// state.
    pub async fn request_mode(&self, session_id: &str, prompt_id: &str) -> CoreResult<()> {
        if !self.prompts.contains(prompt_id) {
            return Err(CoreError::not_found("prompt", prompt_id));
        }
        self.store.get(session_id).await?;
        self.store
            .set_context(session_id, ConversationContext::new(prompt_id))
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> CoreResult<Session> {
        self.store.get(session_id).await
    }

    pub async fn list_waiting(&self) -> Vec<Session> {
        self.store.list_waiting().await
    }

    pub async fn list_active(&self) -> Vec<Session> {
        self.store.list_active().await
    }

    /// Scripted messages for the step the session's conversation is on.
    pub async fn next_messages(&self, session_id: &str) -> CoreResult<Vec<String>> {
        let session = self.store.get(session_id).await?;
        let prompt = self.prompts.get(&session.context.active_prompt_id)?;
        Ok(self.runtime.next_messages(prompt, &session.context))
    }

    /// Queue position and a rough ETA from available agent count.
    pub async fn queue_status(&self, session_id: &str) -> CoreResult<QueueStatus> {
        self.store.get(session_id).await?;
        let position = self.queue.position(session_id).await;
        let queue_length = self.queue.len().await;
        let available = self
            .directory
            .list()
            .await
            .iter()
            .filter(|a| a.status == AgentStatus::Available)
            .count()
            .max(1);
        let eta_ms = position.map(|p| (p as u64) * ETA_PER_POSITION_MS / available as u64);
        Ok(QueueStatus {
            position,
            eta_ms,
            queue_length,
        })
    }

    /// Complete a session and settle the agent's counters.
    pub async fn complete_session(&self, session_id: &str, resolved: bool) -> CoreResult<Session> {
        let before = self.store.get(session_id).await?;
        if before.is_completed() {
            return Ok(before);
        }
        self.pacer.deactivate(session_id).await;
        self.queue.remove(session_id).await;

        let session = self.store.complete(session_id).await?;
        if let Some(agent_id) = before.assigned_agent_id.as_deref() {
            let resolution_ms = session.resolution_time_ms.unwrap_or(0);
            let handle_ms = match (session.assigned_at, session.completed_at) {
                (Some(assigned), Some(done)) => (done - assigned).num_milliseconds(),
                _ => resolution_ms,
            };
            self.directory
                .record_session_result(
                    agent_id,
                    resolved,
                    !session.escalation_history.is_empty(),
                    resolution_ms,
                    handle_ms,
                )
                .await?;
            self.directory.finish_session(agent_id).await?;
            self.dispatcher.signal();
        }
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Agent API
    // ------------------------------------------------------------------

    pub async fn register_agent(&self, data: AgentData) -> CoreResult<Agent> {
        let agent = self.directory.register(data).await?;
        self.dispatcher.signal();
        Ok(agent)
    }

    pub async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> CoreResult<Agent> {
        let before = self.directory.get(agent_id).await?;
        let agent = self.directory.update_status(agent_id, status).await?;

        match status {
            AgentStatus::Available => self.dispatcher.signal(),
            AgentStatus::Offline | AgentStatus::Break | AgentStatus::Training => {
                // Going dark cancels any stealth schedule for the agent's
                // session.
                if let Some(session_id) = before.current_session_id.as_deref() {
                    self.pacer.deactivate(session_id).await;
                }
            }
            _ => {}
        }
        Ok(agent)
    }

    pub async fn get_agent(&self, agent_id: &str) -> CoreResult<Agent> {
        self.directory.get(agent_id).await
    }

    pub async fn list_agents(&self, status: Option<AgentStatus>) -> Vec<Agent> {
        let agents = self.directory.list().await;
        match status {
            Some(status) => agents.into_iter().filter(|a| a.status == status).collect(),
            None => agents,
        }
    }

    /// Knowledge entries visible to an agent, annotated with
    /// capabilities.
    pub async fn agent_knowledge(&self, agent_id: &str) -> CoreResult<Vec<TierKnowledgeView>> {
        self.directory
            .knowledge_access(agent_id, &self.knowledge)
            .await
    }

    pub async fn search_knowledge(&self, query: &str, tier: u8) -> Vec<TierKnowledgeView> {
        self.knowledge.search(query, tier).await
    }

    // ------------------------------------------------------------------
    // Escalation API
    // ------------------------------------------------------------------

    pub async fn escalate_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> CoreResult<EscalationOutcome> {
        let outcome = self.escalation.handle_escalation(session_id, reason).await?;
        self.dispatcher.signal();
        Ok(outcome)
    }

    pub fn escalation_rules(&self) -> &[EscalationRule] {
        self.escalation.rules()
    }

    // ------------------------------------------------------------------
    // QA API
    // ------------------------------------------------------------------

    pub async fn create_evaluation(
        &self,
        interaction: InteractionRecord,
        scorecard_id: &str,
        qa_agent_id: &str,
    ) -> CoreResult<Evaluation> {
        self.qa
            .create_evaluation(interaction, scorecard_id, qa_agent_id)
            .await
    }

    pub async fn score_criterion(
        &self,
        evaluation_id: &str,
        qa_agent_id: &str,
        criterion_id: &str,
        sub_scores: &[f64],
        notes: Option<String>,
    ) -> CoreResult<Evaluation> {
        self.qa
            .score_criterion(evaluation_id, qa_agent_id, criterion_id, sub_scores, notes)
            .await
    }

    /// Complete an evaluation and fold its score into the evaluated
    /// agent's quality record.
    pub async fn complete_evaluation(
        &self,
        evaluation_id: &str,
        qa_agent_id: &str,
        final_notes: Option<String>,
        recommendations: Vec<String>,
    ) -> CoreResult<Evaluation> {
        let evaluation = self
            .qa
            .complete_evaluation(evaluation_id, qa_agent_id, final_notes, recommendations)
            .await?;
        if let Err(e) = self
            .directory
            .record_qa_score(&evaluation.agent_id, evaluation.weighted_score)
            .await
        {
            // Evaluations may reference agents registered elsewhere.
            warn!(agent_id = %evaluation.agent_id, error = %e, "QA score not folded into agent record");
        }
        Ok(evaluation)
    }

    pub async fn get_evaluation(&self, evaluation_id: &str) -> CoreResult<Evaluation> {
        self.qa.get_evaluation(evaluation_id).await
    }

    pub async fn list_evaluations_by_agent(&self, agent_id: &str) -> Vec<Evaluation> {
        self.qa.list_evaluations_by_agent(agent_id).await
    }

    // ------------------------------------------------------------------
    // Prompt API
    // ------------------------------------------------------------------

    pub fn list_prompts(&self) -> Vec<&PromptConfig> {
        self.prompts.list()
    }

    pub fn get_prompt(&self, prompt_id: &str) -> CoreResult<&PromptConfig> {
        self.prompts.get(prompt_id)
    }

    /// Run one dispatch pass inline; useful for deterministic tests and
    /// drain-on-demand callers.
    pub async fn dispatch_tick(&self) -> CoreResult<usize> {
        self.dispatcher.tick().await
    }
}
