//! Agent directory: agents, tiers, status, capacity and derivations
//!
//! Status transitions are any-to-any with two gates: `busy` requires a
//! current session, and `available` clears it and stamps the
//! `last_available` dispatch tiebreak key. Assignment goes through
//! [`AgentDirectory::try_assign`] so the check-and-set happens under one
//! write lock.

use crate::entities::agent::{Agent, AgentAvailability, AgentData, AgentPerformance, AgentStatus};
use crate::entities::knowledge::TierKnowledgeView;
use crate::errors::{CoreError, CoreResult};
use crate::ids::IdGenerator;
use crate::services::knowledge_registry::KnowledgeRegistry;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use validator::Validate;

pub struct AgentDirectory {
    agents: RwLock<HashMap<String, Agent>>,
    ids: Arc<IdGenerator>,
}

impl AgentDirectory {
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            ids,
        }
    }

    /// Register a new agent. Tier must be in 0..=4.
    pub async fn register(&self, data: AgentData) -> CoreResult<Agent> {
        data.validate()?;

        let now = Utc::now();
        let agent = Agent {
            id: self.ids.agent_id(),
            name: data.name,
            email: data.email,
            tier: data.tier,
            status: AgentStatus::Available,
            skills: data.skills,
            certifications: data.certifications,
            training_history: Vec::new(),
            current_session_id: None,
            availability: AgentAvailability {
                max_concurrent_sessions: data.max_concurrent_sessions.unwrap_or(1),
            },
            supervisor_id: data.supervisor_id,
            performance: AgentPerformance::default(),
            last_available: now,
            created_at: now,
        };

        info!(agent_id = %agent.id, tier = agent.tier, "agent registered");
        self.agents.write().await.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    pub async fn get(&self, id: &str) -> CoreResult<Agent> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("agent", id))
    }

    pub async fn list(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn list_by_tier(&self, tier: u8) -> Vec<Agent> {
        self.agents
            .read()
            .await
            .values()
            .filter(|a| a.tier == tier)
            .cloned()
            .collect()
    }

    pub async fn list_available_by_tier(&self, tier: u8) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.tier == tier && a.status == AgentStatus::Available && !a.at_capacity())
            .cloned()
            .collect();
        agents.sort_by_key(|a| a.last_available);
        agents
    }

    /// Update an agent's status.
    ///
    /// `busy` cannot be set without a current session; going `available`
    /// clears the current session and stamps `last_available`.
    pub async fn update_status(&self, id: &str, status: AgentStatus) -> CoreResult<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("agent", id))?;

        if status == AgentStatus::Busy && agent.current_session_id.is_none() {
            return Err(CoreError::validation(
                "cannot set busy without a current session",
            ));
        }

        if status == AgentStatus::Available {
            agent.current_session_id = None;
            agent.last_available = Utc::now();
        }

        debug!(agent_id = id, from = ?agent.status, to = ?status, "agent status change");
        agent.status = status;
        Ok(agent.clone())
    }

    /// Reserve an available agent for a session: checks eligibility and
    /// marks it busy under one write lock. Fails with `Conflict` when the
    /// agent is no longer available or at capacity.
    pub async fn try_assign(&self, agent_id: &str, session_id: &str) -> CoreResult<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::not_found("agent", agent_id))?;

        if agent.status != AgentStatus::Available {
            return Err(CoreError::conflict(format!(
                "agent {} is not available",
                agent_id
            )));
        }
        if agent.at_capacity() {
            return Err(CoreError::conflict(format!(
                "agent {} is at capacity",
                agent_id
            )));
        }

        agent.current_session_id = Some(session_id.to_string());
        agent.status = AgentStatus::Busy;
        Ok(agent.clone())
    }

    /// Undo a reservation made by [`try_assign`] when the session half of
    /// the two-phase update fails.
    pub async fn release_assignment(&self, agent_id: &str) -> CoreResult<()> {
        let mut agents = self.agents.write().await;
        if let Some(agent) = agents.get_mut(agent_id) {
            agent.current_session_id = None;
            agent.status = AgentStatus::Available;
            agent.last_available = Utc::now();
        }
        Ok(())
    }

    /// Free an agent after its session completed; returns to available.
    pub async fn finish_session(&self, agent_id: &str) -> CoreResult<()> {
        self.release_assignment(agent_id).await
    }

    /// Best dispatch candidate at or above the given tier: highest tier
    /// first, then lowest current load, then longest-available.
    pub async fn select_for_dispatch(&self, min_tier: u8) -> Option<Agent> {
        let agents = self.agents.read().await;
        let mut candidates: Vec<&Agent> = agents
            .values()
            .filter(|a| {
                a.status == AgentStatus::Available && a.tier >= min_tier && !a.at_capacity()
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.tier
                .cmp(&a.tier)
                .then_with(|| a.current_load().cmp(&b.current_load()))
                .then_with(|| a.last_available.cmp(&b.last_available))
        });
        candidates.first().map(|a| (*a).clone())
    }

    /// Update performance counters after a session closes.
    pub async fn record_session_result(
        &self,
        agent_id: &str,
        resolved: bool,
        escalated: bool,
        resolution_ms: i64,
        handle_ms: i64,
    ) -> CoreResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::not_found("agent", agent_id))?;

        let perf = &mut agent.performance;
        perf.total_sessions += 1;
        if resolved {
            perf.resolved_sessions += 1;
        }
        if escalated {
            perf.escalated_sessions += 1;
        }
        let n = perf.total_sessions as f64;
        perf.average_resolution_time_ms += (resolution_ms as f64 - perf.average_resolution_time_ms) / n;
        perf.average_handle_time_ms += (handle_ms as f64 - perf.average_handle_time_ms) / n;
        let first_contact = if resolved && !escalated { 1.0 } else { 0.0 };
        perf.first_contact_resolution += (first_contact - perf.first_contact_resolution) / n;
        Ok(())
    }

    /// Fold a completed QA evaluation into the agent's running quality
    /// score.
    pub async fn record_qa_score(&self, agent_id: &str, weighted_score: f64) -> CoreResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::not_found("agent", agent_id))?;
        let perf = &mut agent.performance;
        if perf.quality_score == 0.0 {
            perf.quality_score = weighted_score;
        } else {
            perf.quality_score = (perf.quality_score + weighted_score) / 2.0;
        }
        Ok(())
    }

    pub async fn performance(&self, agent_id: &str) -> CoreResult<AgentPerformance> {
        Ok(self.get(agent_id).await?.performance)
    }

    /// Snapshot of the knowledge entries visible to this agent.
    pub async fn knowledge_access(
        &self,
        agent_id: &str,
        registry: &KnowledgeRegistry,
    ) -> CoreResult<Vec<TierKnowledgeView>> {
        let agent = self.get(agent_id).await?;
        Ok(registry.list_for_tier(agent.tier).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::agent::EscalationAuthority;

    fn directory() -> AgentDirectory {
        AgentDirectory::new(Arc::new(IdGenerator::new()))
    }

    fn agent_data(name: &str, tier: u8) -> AgentData {
        AgentData {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            tier,
            skills: vec![],
            certifications: vec![],
            max_concurrent_sessions: None,
            supervisor_id: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let dir = directory();
        let agent = dir.register(agent_data("Ana Lima", 2)).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Available);
        assert_eq!(dir.get(&agent.id).await.unwrap().tier, 2);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_tier() {
        let dir = directory();
        assert!(dir.register(agent_data("Bad Tier", 7)).await.is_err());
    }

    #[tokio::test]
    async fn test_busy_requires_session() {
        let dir = directory();
        let agent = dir.register(agent_data("Ana Lima", 1)).await.unwrap();
        assert!(dir.update_status(&agent.id, AgentStatus::Busy).await.is_err());

        dir.try_assign(&agent.id, "sess_1").await.unwrap();
        let agent = dir.get(&agent.id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);
        assert_eq!(agent.current_session_id.as_deref(), Some("sess_1"));
    }

    #[tokio::test]
    async fn test_available_clears_session() {
        let dir = directory();
        let agent = dir.register(agent_data("Ana Lima", 1)).await.unwrap();
        dir.try_assign(&agent.id, "sess_1").await.unwrap();

        let agent = dir
            .update_status(&agent.id, AgentStatus::Available)
            .await
            .unwrap();
        assert!(agent.current_session_id.is_none());
    }

    #[tokio::test]
    async fn test_try_assign_rejects_busy_agent() {
        let dir = directory();
        let agent = dir.register(agent_data("Ana Lima", 1)).await.unwrap();
        dir.try_assign(&agent.id, "sess_1").await.unwrap();

        let err = dir.try_assign(&agent.id, "sess_2").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_select_for_dispatch_prefers_higher_tier() {
        let dir = directory();
        let _t1 = dir.register(agent_data("Tier One", 1)).await.unwrap();
        let t3 = dir.register(agent_data("Tier Three", 3)).await.unwrap();

        let selected = dir.select_for_dispatch(1).await.unwrap();
        assert_eq!(selected.id, t3.id);
    }

    #[tokio::test]
    async fn test_select_for_dispatch_requires_min_tier() {
        let dir = directory();
        let _t1 = dir.register(agent_data("Tier One", 1)).await.unwrap();
        assert!(dir.select_for_dispatch(2).await.is_none());
    }

    #[tokio::test]
    async fn test_select_ties_broken_by_longest_available() {
        let dir = directory();
        let first = dir.register(agent_data("First Back", 2)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _second = dir.register(agent_data("Second Back", 2)).await.unwrap();

        let selected = dir.select_for_dispatch(1).await.unwrap();
        assert_eq!(selected.id, first.id);
    }

    #[tokio::test]
    async fn test_performance_running_averages() {
        let dir = directory();
        let agent = dir.register(agent_data("Ana Lima", 1)).await.unwrap();

        dir.record_session_result(&agent.id, true, false, 60_000, 30_000)
            .await
            .unwrap();
        dir.record_session_result(&agent.id, false, true, 120_000, 90_000)
            .await
            .unwrap();

        let perf = dir.performance(&agent.id).await.unwrap();
        assert_eq!(perf.total_sessions, 2);
        assert_eq!(perf.resolved_sessions, 1);
        assert_eq!(perf.escalated_sessions, 1);
        assert!((perf.average_resolution_time_ms - 90_000.0).abs() < 1e-6);
        assert!((perf.first_contact_resolution - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_authority_derivation_matches_tier() {
        let dir = directory();
        let agent = dir.register(agent_data("Ana Lima", 2)).await.unwrap();
        assert_eq!(
            agent.escalation_authority(),
            EscalationAuthority::for_tier(2)
        );
    }
}
