//! Escalation engine: trigger matching, tier promotion and SLA stamping
//!
//! The rule set is loaded at startup and immutable thereafter. Rules are
//! scanned in load order; the first rule with any trigger occurring as a
//! substring of the lowercased reason wins. A successful escalation
//! promotes the session tier, stamps the SLA and either reassigns
//! immediately at exactly the target tier or re-enqueues the session with
//! its priority bumped by one (clamped to 10).

use crate::entities::escalation::{EscalationRule, RulePriority};
use crate::entities::session::{EscalationRecord, Session};
use crate::errors::{CoreError, CoreResult};
use crate::events::{EngineEvent, EventBus};
use crate::queue::SessionQueue;
use crate::services::agent_directory::AgentDirectory;
use crate::services::session_store::{SessionPatch, SessionStore};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Result of a handled escalation
#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub session: Session,
    pub rule_id: String,
    /// True when an agent at exactly the target tier picked the session
    /// up immediately
    pub reassigned: bool,
}

pub struct EscalationEngine {
    rules: Vec<EscalationRule>,
    store: Arc<SessionStore>,
    directory: Arc<AgentDirectory>,
    queue: Arc<SessionQueue>,
    bus: Arc<EventBus>,
    auto_reenqueue: bool,
    /// Sessions whose current SLA breach has already been surfaced
    breached: RwLock<HashSet<String>>,
}

impl EscalationEngine {
    pub fn new(
        rules: Vec<EscalationRule>,
        store: Arc<SessionStore>,
        directory: Arc<AgentDirectory>,
        queue: Arc<SessionQueue>,
        bus: Arc<EventBus>,
        auto_reenqueue: bool,
    ) -> CoreResult<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self {
            rules,
            store,
            directory,
            queue,
            bus,
            auto_reenqueue,
            breached: RwLock::new(HashSet::new()),
        })
    }

    pub fn rules(&self) -> &[EscalationRule] {
        &self.rules
    }

    /// First rule whose trigger list matches the reason.
    pub fn find_rule(&self, reason: &str) -> Option<&EscalationRule> {
        self.rules.iter().find(|r| r.matches(reason))
    }

    /// Escalate a session for the given reason.
    ///
    /// When the session has an assigned agent, the rule's target tier
    /// must be within that agent's escalation authority. Unassigned
    /// sessions escalate on the system's behalf and skip the check.
    pub async fn handle_escalation(
        &self,
        session_id: &str,
        reason: &str,
    ) -> CoreResult<EscalationOutcome> {
        let rule = self
            .find_rule(reason)
            .ok_or_else(|| CoreError::NoMatchingRule(reason.to_string()))?
            .clone();

        let session = self.store.get(session_id).await?;
        if session.is_completed() {
            return Err(CoreError::conflict(format!(
                "session {} is completed",
                session_id
            )));
        }

        if let Some(agent_id) = &session.assigned_agent_id {
            let agent = self.directory.get(agent_id).await?;
            if !agent.escalation_authority().may_escalate_to(rule.to_tier) {
                return Err(CoreError::not_authorized(format!(
                    "agent {} (tier {}) cannot escalate to tier {}",
                    agent_id, agent.tier, rule.to_tier
                )));
            }
            // The escalating agent is freed regardless of where the
            // session lands next.
            self.directory.finish_session(agent_id).await?;
        }

        let now = Utc::now();
        let sla = now + Duration::seconds(rule.sla_seconds);
        let record = EscalationRecord {
            ts: now,
            reason: reason.to_string(),
            from_tier: session.tier,
            to_tier: rule.to_tier,
            rule_id: rule.id.clone(),
            priority: rule.priority,
            sla,
        };

        let from_tier = session.tier;
        let mut session = self.store.apply_escalation(session_id, record, reason).await?;
        // A fresh escalation window resets the breach latch.
        self.breached.write().await.remove(session_id);

        // Immediate reassignment at exactly the target tier.
        let mut reassigned = false;
        let candidates = self.directory.list_available_by_tier(rule.to_tier).await;
        if let Some(agent) = candidates.first() {
            match self.directory.try_assign(&agent.id, session_id).await {
                Ok(agent) => {
                    session = self.store.assign(session_id, &agent.id).await?;
                    reassigned = true;
                    self.bus.publish(EngineEvent::SessionAssigned {
                        session_id: session_id.to_string(),
                        agent_id: agent.id.clone(),
                        agent_tier: agent.tier,
                        ts: Utc::now(),
                    });
                    info!(session_id, agent_id = %agent.id, "escalated session reassigned");
                }
                Err(err) => {
                    warn!(session_id, error = %err, "reassignment raced; re-enqueueing");
                }
            }
        }

        if !reassigned && self.auto_reenqueue {
            let bumped = (session.priority + 1).min(10);
            session = self
                .store
                .update(
                    session_id,
                    SessionPatch {
                        priority: Some(bumped),
                        ..Default::default()
                    },
                )
                .await?;
            self.queue
                .enqueue(session_id, bumped, session.created_at)
                .await;
            self.bus.publish(EngineEvent::SessionEnqueued {
                session_id: session_id.to_string(),
                priority: bumped,
                ts: Utc::now(),
            });
        }

        self.bus.publish(EngineEvent::SessionEscalated {
            session_id: session_id.to_string(),
            rule_id: rule.id.clone(),
            reason: reason.to_string(),
            from_tier,
            to_tier: rule.to_tier,
            sla,
            ts: now,
        });

        Ok(EscalationOutcome {
            session,
            rule_id: rule.id,
            reassigned,
        })
    }

    /// Surface `sla_breach` for every escalated session past its
    /// deadline. Each breach is published once; the engine does not
    /// punish, it surfaces.
    pub async fn sweep_sla(&self) -> CoreResult<Vec<String>> {
        let now = Utc::now();
        let mut breaches = Vec::new();
        for session in self.store.list_escalated().await {
            let Some(sla) = session.escalation_sla else {
                continue;
            };
            if now <= sla {
                continue;
            }
            {
                let mut breached = self.breached.write().await;
                if !breached.insert(session.id.clone()) {
                    continue;
                }
            }
            warn!(session_id = %session.id, "escalation SLA breached");
            self.bus.publish(EngineEvent::SlaBreach {
                session_id: session.id.clone(),
                sla,
                overdue_ms: (now - sla).num_milliseconds(),
                ts: now,
            });
            breaches.push(session.id);
        }
        Ok(breaches)
    }
}

/// Default rule set as literal data
pub fn default_rules() -> Vec<EscalationRule> {
    fn rule(
        id: &str,
        name: &str,
        triggers: &[&str],
        from_tier: u8,
        to_tier: u8,
        priority: RulePriority,
        auto_escalate: bool,
        sla_seconds: i64,
    ) -> EscalationRule {
        EscalationRule {
            id: id.to_string(),
            name: name.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            from_tier,
            to_tier,
            priority,
            auto_escalate,
            notification_required: matches!(priority, RulePriority::High | RulePriority::Critical),
            sla_seconds,
        }
    }

    vec![
        rule(
            "legal_issue",
            "Legal issue",
            &["legal", "formal complaint", "lawyer", "lawsuit"],
            1,
            4,
            RulePriority::Critical,
            true,
            1800,
        ),
        rule(
            "crypto_theft",
            "Crypto theft investigation",
            &["crypto theft", "stolen crypto", "wallet drained", "hacked wallet"],
            2,
            3,
            RulePriority::High,
            true,
            3600,
        ),
        rule(
            "vip_customer",
            "VIP customer care",
            &["vip", "account manager"],
            1,
            2,
            RulePriority::Medium,
            true,
            7200,
        ),
        rule(
            "billing_dispute",
            "Billing dispute",
            &["chargeback", "dispute", "unauthorized charge"],
            1,
            3,
            RulePriority::High,
            false,
            3600,
        ),
        rule(
            "technical_complex",
            "Complex technical issue",
            &["data loss", "outage", "cannot access", "broken integration"],
            1,
            2,
            RulePriority::Medium,
            false,
            7200,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::agent::AgentData;
    use crate::entities::session::{CustomerData, CustomerTier, SessionStatus, Urgency};
    use crate::ids::IdGenerator;
    use crate::storage::MemoryStorage;

    struct Fixture {
        store: Arc<SessionStore>,
        directory: Arc<AgentDirectory>,
        queue: Arc<SessionQueue>,
        engine: EscalationEngine,
    }

    fn fixture() -> Fixture {
        let ids = Arc::new(IdGenerator::new());
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(SessionStore::new(
            Arc::new(MemoryStorage::new()),
            ids.clone(),
            bus.clone(),
            "general-support".to_string(),
        ));
        let directory = Arc::new(AgentDirectory::new(ids));
        let queue = Arc::new(SessionQueue::new());
        let engine = EscalationEngine::new(
            default_rules(),
            store.clone(),
            directory.clone(),
            queue.clone(),
            bus,
            true,
        )
        .unwrap();
        Fixture {
            store,
            directory,
            queue,
            engine,
        }
    }

    fn customer() -> CustomerData {
        CustomerData {
            name: "Test Customer".to_string(),
            email: None,
            phone: None,
            tier: CustomerTier::Standard,
            urgency: Urgency::Normal,
            category: None,
        }
    }

    fn agent(name: &str, tier: u8) -> AgentData {
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
    async fn test_find_rule_first_match_wins() {
        let f = fixture();
        let rule = f.engine.find_rule("customer made a LEGAL threat").unwrap();
        assert_eq!(rule.id, "legal_issue");
        assert!(f.engine.find_rule("nice weather today").is_none());
    }

    #[tokio::test]
    async fn test_unmatched_reason_fails() {
        let f = fixture();
        let session = f.store.create(customer()).await.unwrap();
        let err = f
            .engine
            .handle_escalation(&session.id, "nice weather")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoMatchingRule(_)));
    }

    #[tokio::test]
    async fn test_tier_one_agent_may_escalate_to_four() {
        let f = fixture();
        let session = f.store.create(customer()).await.unwrap();
        let handler = f.directory.register(agent("Tier One", 1)).await.unwrap();
        f.directory.try_assign(&handler.id, &session.id).await.unwrap();
        f.store.assign(&session.id, &handler.id).await.unwrap();

        let outcome = f
            .engine
            .handle_escalation(&session.id, "legal threat")
            .await
            .unwrap();
        assert_eq!(outcome.rule_id, "legal_issue");
        assert_eq!(outcome.session.tier, 4);
    }

    #[tokio::test]
    async fn test_tier_four_agent_cannot_escalate() {
        let f = fixture();
        let session = f.store.create(customer()).await.unwrap();
        let handler = f.directory.register(agent("Supervisor", 4)).await.unwrap();
        f.directory.try_assign(&handler.id, &session.id).await.unwrap();
        f.store.assign(&session.id, &handler.id).await.unwrap();

        let err = f
            .engine
            .handle_escalation(&session.id, "legal threat")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_immediate_reassignment_at_exact_tier() {
        let f = fixture();
        let session = f.store.create(customer()).await.unwrap();
        let supervisor = f.directory.register(agent("Supervisor", 4)).await.unwrap();

        let outcome = f
            .engine
            .handle_escalation(&session.id, "formal complaint filed")
            .await
            .unwrap();

        assert!(outcome.reassigned);
        assert_eq!(outcome.session.status, SessionStatus::Active);
        assert_eq!(
            outcome.session.assigned_agent_id.as_deref(),
            Some(supervisor.id.as_str())
        );
        assert_eq!(f.queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_no_agent_reenqueues_with_bumped_priority() {
        let f = fixture();
        let session = f.store.create(customer()).await.unwrap();
        assert_eq!(session.priority, 1);

        let outcome = f
            .engine
            .handle_escalation(&session.id, "legal threat")
            .await
            .unwrap();

        assert!(!outcome.reassigned);
        assert_eq!(outcome.session.status, SessionStatus::Escalated);
        assert_eq!(outcome.session.priority, 2);
        assert_eq!(f.queue.position(&session.id).await, Some(1));
    }

    #[tokio::test]
    async fn test_priority_bump_clamps_at_ten() {
        let f = fixture();
        let mut data = customer();
        data.tier = CustomerTier::Vip;
        data.urgency = Urgency::Critical;
        data.category = Some("crypto_theft".to_string());
        let session = f.store.create(data).await.unwrap();
        assert_eq!(session.priority, 10);

        let outcome = f
            .engine
            .handle_escalation(&session.id, "legal threat")
            .await
            .unwrap();
        assert_eq!(outcome.session.priority, 10);
    }

    #[tokio::test]
    async fn test_sla_breach_published_once() {
        let ids = Arc::new(IdGenerator::new());
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let store = Arc::new(SessionStore::new(
            Arc::new(MemoryStorage::new()),
            ids.clone(),
            bus.clone(),
            "general-support".to_string(),
        ));
        let directory = Arc::new(AgentDirectory::new(ids));
        let queue = Arc::new(SessionQueue::new());

        // A rule with an immediate SLA so the sweep sees a breach.
        let mut rules = default_rules();
        rules[0].sla_seconds = 1;
        let engine = EscalationEngine::new(
            rules,
            store.clone(),
            directory,
            queue,
            bus.clone(),
            true,
        )
        .unwrap();

        let session = store.create(customer()).await.unwrap();
        engine
            .handle_escalation(&session.id, "legal threat")
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let first = engine.sweep_sla().await.unwrap();
        assert_eq!(first, vec![session.id.clone()]);
        let second = engine.sweep_sla().await.unwrap();
        assert!(second.is_empty());

        let mut breach_events = 0;
        while let Ok(event) = rx.try_recv() {
            if event.kind() == "sla_breach" {
                breach_events += 1;
            }
        }
        assert_eq!(breach_events, 1);
    }
}
