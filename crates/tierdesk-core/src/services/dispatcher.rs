//! Dispatcher: matches waiting sessions to eligible available agents
//!
//! A single cooperative loop drains the priority queue whenever a session
//! is enqueued or an agent becomes available, with a poll-interval
//! fallback. Within one tick assignments follow queue order; across ticks
//! no stronger ordering is promised. Fairness is strictly priority/FIFO,
//! with no starvation mitigation.

use crate::errors::CoreResult;
use crate::events::{EngineEvent, EventBus};
use crate::queue::SessionQueue;
use crate::services::agent_directory::AgentDirectory;
use crate::services::session_store::SessionStore;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

pub struct Dispatcher {
    queue: Arc<SessionQueue>,
    directory: Arc<AgentDirectory>,
    store: Arc<SessionStore>,
    bus: Arc<EventBus>,
    notify: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<SessionQueue>,
        directory: Arc<AgentDirectory>,
        store: Arc<SessionStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            queue,
            directory,
            store,
            bus,
            notify: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wake the loop: a session was enqueued or an agent became
    /// available.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the dispatch loop until [`stop`] is called. Tick errors are
    /// logged and the loop continues on the next event; the dispatcher
    /// never panics the process.
    pub async fn run(&self, poll_interval: Duration) {
        self.running.store(true, Ordering::SeqCst);
        debug!("dispatcher loop started");

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.tick().await {
                error!(error = %e, "dispatch tick failed");
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
        debug!("dispatcher loop stopped");
    }

    /// One drain pass over the queue. Returns the number of assignments
    /// made.
    pub async fn tick(&self) -> CoreResult<usize> {
        let mut assigned = 0usize;

        loop {
            let Some(head) = self.queue.peek().await else {
                break;
            };

            // Sessions completed or picked up elsewhere just leave the
            // queue.
            let session = match self.store.get(&head.session_id).await {
                Ok(s) => s,
                Err(_) => {
                    warn!(session_id = %head.session_id, "dropping unknown queued session");
                    self.queue.remove(&head.session_id).await;
                    continue;
                }
            };
            if session.is_completed() || session.assigned_agent_id.is_some() {
                self.queue.remove(&head.session_id).await;
                continue;
            }

            let Some(agent) = self.directory.select_for_dispatch(session.tier).await else {
                // Head stays put; strictly priority/FIFO means nobody
                // behind it may jump the line.
                break;
            };

            let head = match self.queue.pop().await {
                Some(entry) => entry,
                None => break,
            };

            // Two-phase assignment: reserve the agent, then flip the
            // session; roll the reservation back if the session half
            // fails.
            let agent = match self.directory.try_assign(&agent.id, &head.session_id).await {
                Ok(agent) => agent,
                Err(e) => {
                    warn!(agent_id = %agent.id, error = %e, "agent reservation raced");
                    self.queue.push_back(head).await;
                    continue;
                }
            };

            match self.store.assign(&head.session_id, &agent.id).await {
                Ok(_) => {
                    assigned += 1;
                    debug!(session_id = %head.session_id, agent_id = %agent.id, "session assigned");
                    self.bus.publish(EngineEvent::SessionAssigned {
                        session_id: head.session_id.clone(),
                        agent_id: agent.id.clone(),
                        agent_tier: agent.tier,
                        ts: Utc::now(),
                    });
                }
                Err(e) => {
                    error!(session_id = %head.session_id, error = %e, "session assignment failed; rolling back");
                    self.directory.release_assignment(&agent.id).await?;
                    if !session.is_completed() {
                        self.queue.push_back(head).await;
                    }
                }
            }
        }

        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::agent::AgentData;
    use crate::entities::session::{CustomerData, CustomerTier, SessionStatus, Urgency};
    use crate::ids::IdGenerator;
    use crate::storage::MemoryStorage;

    struct Fixture {
        queue: Arc<SessionQueue>,
        directory: Arc<AgentDirectory>,
        store: Arc<SessionStore>,
        dispatcher: Dispatcher,
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
        let dispatcher = Dispatcher::new(
            queue.clone(),
            directory.clone(),
            store.clone(),
            bus,
        );
        Fixture {
            queue,
            directory,
            store,
            dispatcher,
        }
    }

    fn customer(name: &str, urgency: Urgency) -> CustomerData {
        CustomerData {
            name: name.to_string(),
            email: None,
            phone: None,
            tier: CustomerTier::Standard,
            urgency,
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

    async fn enqueue(f: &Fixture, data: CustomerData) -> String {
        let session = f.store.create(data).await.unwrap();
        f.queue
            .enqueue(&session.id, session.priority, session.created_at)
            .await;
        session.id
    }

    #[tokio::test]
    async fn test_tick_assigns_in_priority_order() {
        let f = fixture();
        let low = enqueue(&f, customer("Low Priority", Urgency::Normal)).await;
        let high = enqueue(&f, customer("High Priority", Urgency::Critical)).await;

        f.directory.register(agent("Solo Agent", 1)).await.unwrap();

        let assigned = f.dispatcher.tick().await.unwrap();
        assert_eq!(assigned, 1);

        let high_session = f.store.get(&high).await.unwrap();
        assert_eq!(high_session.status, SessionStatus::Active);
        let low_session = f.store.get(&low).await.unwrap();
        assert_eq!(low_session.status, SessionStatus::Waiting);
        assert_eq!(f.queue.position(&low).await, Some(1));
    }

    #[tokio::test]
    async fn test_tick_drains_while_agents_remain() {
        let f = fixture();
        for i in 0..3 {
            enqueue(&f, customer(&format!("Customer {}", i), Urgency::Normal)).await;
        }
        f.directory.register(agent("Agent One", 1)).await.unwrap();
        f.directory.register(agent("Agent Two", 2)).await.unwrap();

        let assigned = f.dispatcher.tick().await.unwrap();
        assert_eq!(assigned, 2);
        assert_eq!(f.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_head_blocks_when_tier_unservable() {
        let f = fixture();
        let session_id = enqueue(&f, customer("Needs Tier Three", Urgency::Critical)).await;

        // Promote the session's required tier above every agent.
        {
            use crate::entities::escalation::RulePriority;
            use crate::entities::session::EscalationRecord;
            let record = EscalationRecord {
                ts: Utc::now(),
                reason: "test".to_string(),
                from_tier: 1,
                to_tier: 3,
                rule_id: "r".to_string(),
                priority: RulePriority::High,
                sla: Utc::now() + chrono::Duration::hours(1),
            };
            f.store
                .apply_escalation(&session_id, record, "test")
                .await
                .unwrap();
        }
        f.directory.register(agent("Tier One", 1)).await.unwrap();

        let assigned = f.dispatcher.tick().await.unwrap();
        assert_eq!(assigned, 0);
        assert_eq!(f.queue.position(&session_id).await, Some(1));
    }

    #[tokio::test]
    async fn test_assignment_exclusivity() {
        let f = fixture();
        for i in 0..4 {
            enqueue(&f, customer(&format!("Customer {}", i), Urgency::Normal)).await;
        }
        f.directory.register(agent("Agent One", 1)).await.unwrap();
        f.directory.register(agent("Agent Two", 1)).await.unwrap();

        f.dispatcher.tick().await.unwrap();

        // Each busy agent holds exactly one session; each active session
        // names exactly one agent.
        let active = f.store.list_active().await;
        assert_eq!(active.len(), 2);
        let mut agent_ids: Vec<String> = active
            .iter()
            .map(|s| s.assigned_agent_id.clone().unwrap())
            .collect();
        agent_ids.sort();
        agent_ids.dedup();
        assert_eq!(agent_ids.len(), 2);

        for agent in f.directory.list().await {
            if agent.current_session_id.is_some() {
                let sid = agent.current_session_id.clone().unwrap();
                let session = f.store.get(&sid).await.unwrap();
                assert_eq!(session.assigned_agent_id.as_deref(), Some(agent.id.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_completed_sessions_are_dropped_from_queue() {
        let f = fixture();
        let session_id = enqueue(&f, customer("Ghost", Urgency::Normal)).await;
        f.store.complete(&session_id).await.unwrap();
        f.directory.register(agent("Agent One", 1)).await.unwrap();

        let assigned = f.dispatcher.tick().await.unwrap();
        assert_eq!(assigned, 0);
        assert_eq!(f.queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_run_loop_responds_to_signal() {
        let f = fixture();
        let dispatcher = Arc::new(f.dispatcher);
        let runner = dispatcher.clone();
        let handle = tokio::spawn(async move {
            runner.run(Duration::from_secs(60)).await;
        });

        // Give the loop a moment to park on the notify.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let session = f.store.create(customer("Waker", Urgency::Normal)).await.unwrap();
        f.queue
            .enqueue(&session.id, session.priority, session.created_at)
            .await;
        f.directory.register(agent("Agent One", 1)).await.unwrap();
        dispatcher.signal();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            f.store.get(&session.id).await.unwrap().status,
            SessionStatus::Active
        );

        dispatcher.stop();
        handle.await.unwrap();
    }
}
