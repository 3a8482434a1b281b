//! Stealth pacer: human-paced response scheduling
//!
//! For each agent response the pacer computes a realistic delay and
//! typing duration from the agent's behavior profile, then emits an
//! ordered, cancellable event schedule on the bus:
//! `typing_start`, `typing_progress`*, `typing_end`, `response_ready`.
//! Deactivating a session drops everything still pending for it; no
//! `response_ready` follows a cancellation. Events for different sessions
//! are not ordered relative to each other.

use crate::entities::session::ResponseType;
use crate::errors::CoreResult;
use crate::events::{EngineEvent, EventBus};
use crate::services::response_enrichment::{enrich, Personality};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Pacing figures for one response type
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResponsePattern {
    pub delay_ms: u64,
    pub typing_duration_ms: u64,
}

/// How an agent "types": speed, delay bounds, jitter and personality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub name: String,
    /// Characters per second proxy; 200 is the reference speed
    pub typing_speed: f64,
    pub min_response_delay_ms: u64,
    pub max_response_delay_ms: u64,
    /// Jitter width: the random factor is uniform in
    /// [1 - v/2, 1 + v/2]
    pub typing_variability: f64,
    pub response_patterns: HashMap<ResponseType, ResponsePattern>,
    pub personality: Personality,
}

impl BehaviorProfile {
    /// Built-in profile for an agent tier. Higher tiers answer with less
    /// ceremony and more formality.
    pub fn for_tier(tier: u8) -> Self {
        fn patterns(
            greeting: (u64, u64),
            simple: (u64, u64),
            complex: (u64, u64),
            escalation: (u64, u64),
        ) -> HashMap<ResponseType, ResponsePattern> {
            [
                (ResponseType::Greeting, greeting),
                (ResponseType::SimpleAnswer, simple),
                (ResponseType::ComplexAnswer, complex),
                (ResponseType::Escalation, escalation),
            ]
            .into_iter()
            .map(|(k, (delay_ms, typing_duration_ms))| {
                (
                    k,
                    ResponsePattern {
                        delay_ms,
                        typing_duration_ms,
                    },
                )
            })
            .collect()
        }

        match tier {
            0 => Self {
                name: "tier0".to_string(),
                typing_speed: 240.0,
                min_response_delay_ms: 500,
                max_response_delay_ms: 3000,
                typing_variability: 0.2,
                response_patterns: patterns((500, 800), (800, 1200), (1200, 2500), (600, 900)),
                personality: Personality {
                    emoji_usage: 0.0,
                    formality: 0.9,
                    prefix_probability: 0.0,
                    filler_probability: 0.0,
                },
            },
            1 => Self {
                name: "tier1".to_string(),
                typing_speed: 200.0,
                min_response_delay_ms: 1500,
                max_response_delay_ms: 6000,
                typing_variability: 0.3,
                response_patterns: patterns(
                    (1000, 1200),
                    (1500, 2000),
                    (2500, 4000),
                    (1500, 1800),
                ),
                personality: Personality {
                    emoji_usage: 0.3,
                    formality: 0.4,
                    prefix_probability: 0.3,
                    filler_probability: 0.15,
                },
            },
            2 => Self {
                name: "tier2".to_string(),
                typing_speed: 210.0,
                min_response_delay_ms: 1200,
                max_response_delay_ms: 8000,
                typing_variability: 0.3,
                response_patterns: patterns(
                    (1000, 1200),
                    (1800, 2400),
                    (3000, 5000),
                    (1500, 2000),
                ),
                personality: Personality {
                    emoji_usage: 0.15,
                    formality: 0.6,
                    prefix_probability: 0.25,
                    filler_probability: 0.1,
                },
            },
            3 => Self {
                name: "tier3".to_string(),
                typing_speed: 220.0,
                min_response_delay_ms: 2000,
                max_response_delay_ms: 10000,
                typing_variability: 0.25,
                response_patterns: patterns(
                    (1500, 1500),
                    (2500, 3000),
                    (4000, 6000),
                    (2000, 2500),
                ),
                personality: Personality {
                    emoji_usage: 0.05,
                    formality: 0.8,
                    prefix_probability: 0.2,
                    filler_probability: 0.05,
                },
            },
            _ => Self {
                name: "tier4".to_string(),
                typing_speed: 230.0,
                min_response_delay_ms: 2500,
                max_response_delay_ms: 12000,
                typing_variability: 0.2,
                response_patterns: patterns(
                    (2000, 1500),
                    (3000, 3000),
                    (5000, 7000),
                    (2500, 2500),
                ),
                personality: Personality {
                    emoji_usage: 0.0,
                    formality: 0.95,
                    prefix_probability: 0.15,
                    filler_probability: 0.0,
                },
            },
        }
    }

    fn pattern(&self, response_type: ResponseType) -> ResponsePattern {
        self.response_patterns
            .get(&response_type)
            .copied()
            .unwrap_or(ResponsePattern {
                delay_ms: self.min_response_delay_ms,
                typing_duration_ms: self.min_response_delay_ms,
            })
    }
}

/// A computed pacing schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingSchedule {
    pub delay_ms: u64,
    pub typing_ms: u64,
}

/// Delay and typing duration for one response.
///
/// delay = clamp(base * random * experience, min, max) where experience
/// shrinks by 5% per prior response down to 0.7; typing scales the base
/// duration by content length (clamped to [0.5, 2.0] around 100 chars),
/// a +/-20% jitter and the profile's typing speed against the 200
/// chars/sec reference.
pub fn compute_schedule<R: Rng>(
    profile: &BehaviorProfile,
    response_type: ResponseType,
    content_len: usize,
    response_count: u32,
    rng: &mut R,
) -> PacingSchedule {
    let pattern = profile.pattern(response_type);

    let experience = (1.0 - 0.05 * response_count as f64).max(0.7);
    let variability = profile.typing_variability.clamp(0.0, 1.0);
    let random_factor = rng.gen_range((1.0 - variability / 2.0)..=(1.0 + variability / 2.0));
    let delay = (pattern.delay_ms as f64 * random_factor * experience)
        .clamp(
            profile.min_response_delay_ms as f64,
            profile.max_response_delay_ms as f64,
        );

    let length_factor = (content_len as f64 / 100.0).clamp(0.5, 2.0);
    let typing_jitter = rng.gen_range(0.8..=1.2);
    let speed_factor = 200.0 / profile.typing_speed;
    let typing =
        pattern.typing_duration_ms as f64 * length_factor * typing_jitter * speed_factor;

    PacingSchedule {
        delay_ms: delay as u64,
        typing_ms: typing.max(0.0) as u64,
    }
}

/// Runtime options for the pacer
#[derive(Debug, Clone)]
pub struct PacerOptions {
    pub enabled: bool,
    /// Hard ceiling over every profile's max delay
    pub max_response_delay_ms: Option<u64>,
    /// Interval between typing_progress events
    pub progress_interval_ms: u64,
}

impl Default for PacerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_response_delay_ms: None,
            progress_interval_ms: 100,
        }
    }
}

pub struct StealthPacer {
    bus: Arc<EventBus>,
    options: PacerOptions,
    /// Cancellation flag per session
    active: RwLock<HashMap<String, Arc<AtomicBool>>>,
    /// Responses already paced per session, for the experience factor
    response_counts: RwLock<HashMap<String, u32>>,
    rng: Mutex<StdRng>,
}

impl StealthPacer {
    pub fn new(bus: Arc<EventBus>, options: PacerOptions) -> Self {
        Self {
            bus,
            options,
            active: RwLock::new(HashMap::new()),
            response_counts: RwLock::new(HashMap::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Pacer with a fixed seed so schedules are reproducible in tests.
    pub fn with_seed(bus: Arc<EventBus>, options: PacerOptions, seed: u64) -> Self {
        Self {
            bus,
            options,
            active: RwLock::new(HashMap::new()),
            response_counts: RwLock::new(HashMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn effective_profile(&self, profile: &BehaviorProfile) -> BehaviorProfile {
        let mut profile = profile.clone();
        if let Some(ceiling) = self.options.max_response_delay_ms {
            profile.max_response_delay_ms = profile.max_response_delay_ms.min(ceiling);
            profile.min_response_delay_ms = profile.min_response_delay_ms.min(ceiling);
        }
        profile
    }

    /// Schedule a paced response for a session and return the enriched
    /// content that will be delivered. Returns immediately; the events
    /// are emitted by a background task unless pacing is disabled, in
    /// which case `response_ready` fires inline.
    pub async fn pace_response(
        &self,
        session_id: &str,
        agent_id: &str,
        profile: &BehaviorProfile,
        response_type: ResponseType,
        content: &str,
    ) -> CoreResult<String> {
        let response_count = {
            let mut counts = self.response_counts.write().await;
            let count = counts.entry(session_id.to_string()).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };

        let profile = self.effective_profile(profile);
        let (schedule, content) = {
            let mut rng = self.rng.lock().unwrap();
            let schedule = compute_schedule(
                &profile,
                response_type,
                content.len(),
                response_count,
                &mut *rng,
            );
            let content = enrich(content, &profile.personality, &mut *rng);
            (schedule, content)
        };

        if !self.options.enabled {
            self.bus.publish(EngineEvent::ResponseReady {
                session_id: session_id.to_string(),
                agent_id: agent_id.to_string(),
                content: content.clone(),
                response_type,
                ts: Utc::now(),
            });
            return Ok(content);
        }

        let flag = Arc::new(AtomicBool::new(true));
        self.active
            .write()
            .await
            .insert(session_id.to_string(), flag.clone());

        debug!(
            session_id,
            delay_ms = schedule.delay_ms,
            typing_ms = schedule.typing_ms,
            "pacing response"
        );

        let bus = self.bus.clone();
        let session_id = session_id.to_string();
        let agent_id = agent_id.to_string();
        let progress_interval = self.options.progress_interval_ms.max(1);
        let delivered = content.clone();

        tokio::spawn(async move {
            let cancelled = || !flag.load(Ordering::SeqCst);

            bus.publish(EngineEvent::TypingStart {
                session_id: session_id.clone(),
                agent_id: agent_id.clone(),
                ts: Utc::now(),
            });

            let total_ms = schedule.delay_ms + schedule.typing_ms;
            let mut elapsed: u64 = 0;
            while elapsed < total_ms {
                let tick = progress_interval.min(total_ms - elapsed);
                tokio::time::sleep(Duration::from_millis(tick)).await;
                if cancelled() {
                    info!(session_id, "stealth schedule cancelled; dropping events");
                    return;
                }
                elapsed += tick;
                bus.publish(EngineEvent::TypingProgress {
                    session_id: session_id.clone(),
                    elapsed_ms: elapsed,
                    ts: Utc::now(),
                });
            }

            if cancelled() {
                info!(session_id, "stealth schedule cancelled; dropping events");
                return;
            }
            bus.publish(EngineEvent::TypingEnd {
                session_id: session_id.clone(),
                ts: Utc::now(),
            });
            bus.publish(EngineEvent::ResponseReady {
                session_id,
                agent_id,
                content,
                response_type,
                ts: Utc::now(),
            });
        });

        Ok(delivered)
    }

    /// Suppress all pending events for a session. No `response_ready`
    /// follows.
    pub async fn deactivate(&self, session_id: &str) {
        if let Some(flag) = self.active.write().await.remove(session_id) {
            flag.store(false, Ordering::SeqCst);
            debug!(session_id, "stealth pacing deactivated");
        }
        self.response_counts.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier1_simple_answer_delay_within_bounds() {
        let profile = BehaviorProfile::for_tier(1);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let schedule =
                compute_schedule(&profile, ResponseType::SimpleAnswer, 80, 0, &mut rng);
            assert!(schedule.delay_ms >= 1500, "delay {}", schedule.delay_ms);
            assert!(schedule.delay_ms <= 6000, "delay {}", schedule.delay_ms);
            // 2000 * 0.8 (length) * [0.8, 1.2] * 1.0 (speed 200)
            assert!(schedule.typing_ms >= 800, "typing {}", schedule.typing_ms);
            assert!(schedule.typing_ms <= 4800, "typing {}", schedule.typing_ms);
        }
    }

    #[test]
    fn test_experience_shrinks_delay() {
        let mut profile = BehaviorProfile::for_tier(1);
        profile.typing_variability = 0.0;
        profile.min_response_delay_ms = 0;
        let mut rng = StdRng::seed_from_u64(1);

        let fresh = compute_schedule(&profile, ResponseType::SimpleAnswer, 100, 0, &mut rng);
        let seasoned = compute_schedule(&profile, ResponseType::SimpleAnswer, 100, 4, &mut rng);
        let floor = compute_schedule(&profile, ResponseType::SimpleAnswer, 100, 50, &mut rng);

        assert_eq!(fresh.delay_ms, 1500);
        assert_eq!(seasoned.delay_ms, 1200);
        // Experience bottoms out at 0.7.
        assert_eq!(floor.delay_ms, 1050);
    }

    #[test]
    fn test_length_factor_clamps() {
        let mut profile = BehaviorProfile::for_tier(1);
        profile.typing_variability = 0.0;
        let mut rng = StdRng::seed_from_u64(1);

        let short = compute_schedule(&profile, ResponseType::SimpleAnswer, 1, 0, &mut rng);
        let long = compute_schedule(&profile, ResponseType::SimpleAnswer, 5000, 0, &mut rng);
        // 2000 * 0.5 * [0.8, 1.2] and 2000 * 2.0 * [0.8, 1.2]
        assert!((800..=1200).contains(&short.typing_ms));
        assert!((3200..=4800).contains(&long.typing_ms));
    }

    fn fast_options() -> PacerOptions {
        PacerOptions {
            enabled: true,
            max_response_delay_ms: Some(30),
            progress_interval_ms: 5,
        }
    }

    fn fast_profile() -> BehaviorProfile {
        let mut profile = BehaviorProfile::for_tier(1);
        profile.min_response_delay_ms = 10;
        profile.max_response_delay_ms = 30;
        for pattern in profile.response_patterns.values_mut() {
            pattern.delay_ms = 10;
            pattern.typing_duration_ms = 20;
        }
        profile.personality.prefix_probability = 0.0;
        profile.personality.emoji_usage = 0.0;
        profile.personality.filler_probability = 0.0;
        profile
    }

    #[tokio::test]
    async fn test_event_order_per_session() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let pacer = StealthPacer::with_seed(bus, fast_options(), 9);

        pacer
            .pace_response(
                "sess_1",
                "agent_1",
                &fast_profile(),
                ResponseType::SimpleAnswer,
                "your account is unlocked.",
            )
            .await
            .unwrap();

        let mut kinds = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for stealth events")
                .unwrap();
            let kind = event.kind().to_string();
            let done = kind == "response_ready";
            kinds.push(kind);
            if done {
                break;
            }
        }

        assert_eq!(kinds.first().map(String::as_str), Some("typing_start"));
        assert_eq!(kinds.last().map(String::as_str), Some("response_ready"));
        assert_eq!(kinds[kinds.len() - 2], "typing_end");
        assert!(kinds[1..kinds.len() - 2]
            .iter()
            .all(|k| k == "typing_progress"));
    }

    #[tokio::test]
    async fn test_deactivate_suppresses_response() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let mut options = fast_options();
        options.max_response_delay_ms = Some(5000);
        let pacer = StealthPacer::with_seed(bus, options, 9);

        let mut profile = fast_profile();
        profile.min_response_delay_ms = 500;
        profile.max_response_delay_ms = 5000;
        for pattern in profile.response_patterns.values_mut() {
            pattern.delay_ms = 500;
            pattern.typing_duration_ms = 500;
        }

        pacer
            .pace_response(
                "sess_1",
                "agent_1",
                &profile,
                ResponseType::SimpleAnswer,
                "too slow to matter",
            )
            .await
            .unwrap();

        // Cancel mid-schedule, then drain: no response_ready may appear.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pacer.deactivate("sess_1").await;
        tokio::time::sleep(Duration::from_millis(1200)).await;

        while let Ok(event) = rx.try_recv() {
            assert_ne!(event.kind(), "response_ready");
        }
    }

    #[tokio::test]
    async fn test_disabled_pacer_fires_inline() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let options = PacerOptions {
            enabled: false,
            ..Default::default()
        };
        let pacer = StealthPacer::with_seed(bus, options, 9);

        pacer
            .pace_response(
                "sess_1",
                "agent_1",
                &fast_profile(),
                ResponseType::Greeting,
                "hello.",
            )
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "response_ready");
    }

    #[tokio::test]
    async fn test_response_count_feeds_experience() {
        let bus = Arc::new(EventBus::new());
        let pacer = StealthPacer::with_seed(bus, fast_options(), 9);
        let profile = fast_profile();

        for _ in 0..3 {
            pacer
                .pace_response("sess_1", "agent_1", &profile, ResponseType::Greeting, "hi")
                .await
                .unwrap();
        }
        let counts = pacer.response_counts.read().await;
        assert_eq!(counts.get("sess_1"), Some(&3));
    }

    #[test]
    fn test_builtin_profiles_cover_all_tiers() {
        for tier in 0..=4u8 {
            let profile = BehaviorProfile::for_tier(tier);
            assert!(profile.min_response_delay_ms <= profile.max_response_delay_ms);
            for rt in [
                ResponseType::Greeting,
                ResponseType::SimpleAnswer,
                ResponseType::ComplexAnswer,
                ResponseType::Escalation,
            ] {
                assert!(profile.response_patterns.contains_key(&rt));
            }
        }
    }
}
