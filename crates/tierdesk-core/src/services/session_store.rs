//! Session store: lifecycle, message log and customer profiles
//!
//! Sessions and customer profiles are durable; messages are append-only
//! per session. The store owns all session mutation; the dispatcher and
//! escalation engine drive transitions through the published operations
//! here. Completion is idempotent and message appends after completion
//! are rejected.

use crate::entities::session::{
    ConversationContext, Customer, CustomerData, CustomerProfile, CustomerTier, EscalationRecord,
    Message, MessageRole, ResponseType, Session, SessionStatus, StatusChange, TierChange, Urgency,
};
use crate::errors::{CoreError, CoreResult};
use crate::events::{EngineEvent, EventBus};
use crate::ids::IdGenerator;
use crate::storage::{family, Storage};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use validator::Validate;

/// Whitelisted fields for [`SessionStore::update`]
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub priority: Option<u8>,
    pub category: Option<String>,
}

/// Queue priority from customer attributes and category, clamped to
/// [1, 10].
pub fn compute_priority(data: &CustomerData) -> u8 {
    let mut priority: i32 = 1;
    match data.tier {
        CustomerTier::Vip => priority += 3,
        CustomerTier::Premium => priority += 2,
        _ => {}
    }
    match data.urgency {
        Urgency::High => priority += 2,
        Urgency::Critical => priority += 3,
        _ => {}
    }
    match data.category.as_deref() {
        Some("crypto_theft") => priority += 4,
        Some("onboarding") => priority += 1,
        _ => {}
    }
    priority.clamp(1, 10) as u8
}

pub struct SessionStore {
    storage: Arc<dyn Storage>,
    sessions: RwLock<HashMap<String, Session>>,
    profiles: RwLock<HashMap<String, CustomerProfile>>,
    ids: Arc<IdGenerator>,
    bus: Arc<EventBus>,
    default_prompt_id: String,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        ids: Arc<IdGenerator>,
        bus: Arc<EventBus>,
        default_prompt_id: String,
    ) -> Self {
        Self {
            storage,
            sessions: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            ids,
            bus,
            default_prompt_id,
        }
    }

    async fn persist(&self, session: &Session) -> CoreResult<()> {
        self.storage
            .put(family::SESSION, &session.id, serde_json::to_value(session)?)
            .await
    }

    async fn persist_profile(&self, profile: &CustomerProfile) -> CoreResult<()> {
        self.storage
            .put(family::PROFILE, &profile.id, serde_json::to_value(profile)?)
            .await
    }

    /// Create a session in `waiting` status with its priority computed
    /// from the customer data.
    pub async fn create(&self, data: CustomerData) -> CoreResult<Session> {
        data.validate()?;

        let now = Utc::now();
        let priority = compute_priority(&data);
        let customer_id = format!("cust_{}", data.name.to_lowercase().replace(' ', "_"));

        let customer = Customer {
            id: customer_id.clone(),
            name: data.name.clone(),
            email: data.email.clone(),
            phone: data.phone.clone(),
            tier: data.tier,
        };

        let session = Session {
            id: self.ids.session_id(),
            customer,
            status: SessionStatus::Waiting,
            tier: 1,
            priority,
            category: data.category.clone(),
            created_at: now,
            last_activity_at: now,
            assigned_at: None,
            completed_at: None,
            assigned_agent_id: None,
            messages: Vec::new(),
            context: ConversationContext::new(self.default_prompt_id.clone()),
            escalation_history: Vec::new(),
            escalation_reason: None,
            escalation_sla: None,
            resolution_time_ms: None,
        };

        self.upsert_profile(&data, &customer_id, now).await?;
        self.persist(&session).await?;
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        info!(session_id = %session.id, priority, "session created");
        self.bus.publish(EngineEvent::SessionCreated {
            session_id: session.id.clone(),
            customer_id,
            priority,
            ts: now,
        });
        Ok(session)
    }

    async fn upsert_profile(
        &self,
        data: &CustomerData,
        customer_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(customer_id.to_string())
            .or_insert_with(|| CustomerProfile {
                id: customer_id.to_string(),
                name: data.name.clone(),
                email: data.email.clone(),
                phone: data.phone.clone(),
                first_contact: now,
                last_contact: now,
                total_sessions: 0,
                resolved_issues: 0,
                escalated_issues: 0,
                average_resolution_time_ms: 0.0,
                tags: Vec::new(),
                notes: Vec::new(),
            });
        profile.total_sessions += 1;
        profile.last_contact = now;
        let snapshot = profile.clone();
        drop(profiles);
        self.persist_profile(&snapshot).await
    }

    pub async fn get(&self, id: &str) -> CoreResult<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(session.clone());
        }
        // Fall back to storage for sessions created before a restart.
        if let Some(value) = self.storage.get(family::SESSION, id).await? {
            let session: Session = serde_json::from_value(value)?;
            self.sessions
                .write()
                .await
                .insert(session.id.clone(), session.clone());
            return Ok(session);
        }
        Err(CoreError::not_found("session", id))
    }

    pub async fn customer_profile(&self, customer_id: &str) -> CoreResult<CustomerProfile> {
        self.profiles
            .read()
            .await
            .get(customer_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("customer_profile", customer_id))
    }

    /// Apply a whitelisted patch.
    pub async fn update(&self, id: &str, patch: SessionPatch) -> CoreResult<Session> {
        let updated = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| CoreError::not_found("session", id))?;
            if let Some(priority) = patch.priority {
                if !(1..=10).contains(&priority) {
                    return Err(CoreError::validation("priority must be in 1..=10"));
                }
                session.priority = priority;
            }
            if let Some(category) = patch.category {
                session.category = Some(category);
            }
            session.last_activity_at = Utc::now();
            session.clone()
        };
        self.persist(&updated).await?;
        self.bus.publish(EngineEvent::SessionUpdated {
            session_id: updated.id.clone(),
            ts: updated.last_activity_at,
        });
        Ok(updated)
    }

    /// Append a message to the session log. Appends after completion are
    /// rejected.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: String,
        agent_id: Option<String>,
        response_type: Option<ResponseType>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> CoreResult<Message> {
        let message = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| CoreError::not_found("session", session_id))?;

            if session.is_completed() {
                return Err(CoreError::conflict(format!(
                    "session {} is completed; messages are closed",
                    session_id
                )));
            }

            let message = Message {
                id: self.ids.message_id(),
                session_id: session_id.to_string(),
                ts: Utc::now(),
                role,
                content,
                agent_id,
                response_type,
                metadata,
            };
            session.messages.push(message.clone());
            session.last_activity_at = message.ts;
            message
        };

        self.storage
            .append(family::MESSAGES, session_id, serde_json::to_value(&message)?)
            .await?;
        // Record update is best-effort after the log append; the log is
        // the source of truth for messages.
        if let Ok(session) = self.get(session_id).await {
            self.persist(&session).await?;
        }
        Ok(message)
    }

    /// Replace the conversation context (the conversation runtime owns
    /// its mutation).
    pub async fn set_context(&self, session_id: &str, context: ConversationContext) -> CoreResult<()> {
        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| CoreError::not_found("session", session_id))?;
            session.context = context;
            session.clone()
        };
        self.persist(&snapshot).await
    }

    /// Transition a waiting or escalated session to active with an agent.
    pub async fn assign(&self, session_id: &str, agent_id: &str) -> CoreResult<Session> {
        let assigned = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| CoreError::not_found("session", session_id))?;

            match session.status {
                SessionStatus::Waiting | SessionStatus::Escalated => {}
                SessionStatus::Active => {
                    return Err(CoreError::conflict(format!(
                        "session {} is already assigned to {}",
                        session_id,
                        session.assigned_agent_id.as_deref().unwrap_or("unknown")
                    )))
                }
                SessionStatus::Completed => {
                    return Err(CoreError::conflict(format!(
                        "session {} is completed",
                        session_id
                    )))
                }
            }

            let now = Utc::now();
            record_status_change(session, SessionStatus::Active, now);
            session.assigned_agent_id = Some(agent_id.to_string());
            session.assigned_at = Some(now);
            session.last_activity_at = now;
            session.clone()
        };
        self.persist(&assigned).await?;
        Ok(assigned)
    }

    /// Apply an escalation decided by the escalation engine: promote the
    /// tier, append history, stamp the SLA.
    pub async fn apply_escalation(
        &self,
        session_id: &str,
        record: EscalationRecord,
        reason: &str,
    ) -> CoreResult<Session> {
        let escalated = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| CoreError::not_found("session", session_id))?;

            if session.is_completed() {
                return Err(CoreError::conflict(format!(
                    "session {} is completed",
                    session_id
                )));
            }
            if record.to_tier < session.tier {
                return Err(CoreError::validation(format!(
                    "session tier cannot decrease: {} -> {}",
                    session.tier, record.to_tier
                )));
            }

            let now = record.ts;
            session
                .context
                .tier_changes
                .push(TierChange {
                    ts: now,
                    from: session.tier,
                    to: record.to_tier,
                });
            record_status_change(session, SessionStatus::Escalated, now);
            session.tier = record.to_tier;
            session.escalation_reason = Some(reason.to_string());
            session.escalation_sla = Some(record.sla);
            session.assigned_agent_id = None;
            session.escalation_history.push(record);
            session.last_activity_at = now;
            session.clone()
        };
        self.persist(&escalated).await?;
        Ok(escalated)
    }

    /// Complete a session. Completing an already-completed session is a
    /// no-op returning the stored session.
    pub async fn complete(&self, session_id: &str) -> CoreResult<Session> {
        let (completed, customer_id) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| CoreError::not_found("session", session_id))?;

            if session.is_completed() {
                return Ok(session.clone());
            }

            let now = Utc::now();
            record_status_change(session, SessionStatus::Completed, now);
            session.completed_at = Some(now);
            session.resolution_time_ms = Some((now - session.created_at).num_milliseconds());
            session.last_activity_at = now;
            (session.clone(), session.customer.id.clone())
        };

        self.persist(&completed).await?;
        self.update_profile_on_completion(&customer_id, &completed)
            .await?;
        info!(
            session_id,
            resolution_ms = completed.resolution_time_ms.unwrap_or(0),
            "session completed"
        );
        self.bus.publish(EngineEvent::SessionCompleted {
            session_id: session_id.to_string(),
            resolution_time_ms: completed.resolution_time_ms.unwrap_or(0),
            ts: completed.completed_at.unwrap_or_else(Utc::now),
        });
        Ok(completed)
    }

    async fn update_profile_on_completion(
        &self,
        customer_id: &str,
        session: &Session,
    ) -> CoreResult<()> {
        let mut profiles = self.profiles.write().await;
        if let Some(profile) = profiles.get_mut(customer_id) {
            profile.resolved_issues += 1;
            if !session.escalation_history.is_empty() {
                profile.escalated_issues += 1;
            }
            let n = profile.resolved_issues as f64;
            let resolution = session.resolution_time_ms.unwrap_or(0) as f64;
            profile.average_resolution_time_ms +=
                (resolution - profile.average_resolution_time_ms) / n;
            profile.last_contact = session.completed_at.unwrap_or_else(Utc::now);
            let snapshot = profile.clone();
            drop(profiles);
            self.persist_profile(&snapshot).await?;
        } else {
            warn!(customer_id, "no profile for completed session");
        }
        Ok(())
    }

    pub async fn list_waiting(&self) -> Vec<Session> {
        self.list_by_status(SessionStatus::Waiting).await
    }

    pub async fn list_active(&self) -> Vec<Session> {
        self.list_by_status(SessionStatus::Active).await
    }

    pub async fn list_escalated(&self) -> Vec<Session> {
        self.list_by_status(SessionStatus::Escalated).await
    }

    async fn list_by_status(&self, status: SessionStatus) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect()
    }

    /// Load all persisted sessions into the cache after a restart.
    /// Returns the sessions that must be re-enqueued (waiting and
    /// unassigned escalated ones).
    pub async fn recover(&self) -> CoreResult<Vec<Session>> {
        let records = self.storage.list(family::SESSION).await?;
        let mut recovered = Vec::new();
        let mut cache = self.sessions.write().await;
        for value in records {
            let session: Session = serde_json::from_value(value)?;
            if matches!(
                session.status,
                SessionStatus::Waiting | SessionStatus::Escalated
            ) {
                recovered.push(session.clone());
            }
            cache.insert(session.id.clone(), session);
        }

        let profiles = self.storage.list(family::PROFILE).await?;
        let mut profile_cache = self.profiles.write().await;
        for value in profiles {
            let profile: CustomerProfile = serde_json::from_value(value)?;
            profile_cache.insert(profile.id.clone(), profile);
        }

        debug!(recovered = recovered.len(), "session store recovered");
        Ok(recovered)
    }
}

fn record_status_change(
    session: &mut Session,
    to: SessionStatus,
    ts: chrono::DateTime<Utc>,
) {
    session.context.status_changes.push(StatusChange {
        ts,
        from: session.status,
        to,
    });
    session.status = to;
}
