//! Engine configuration from environment variables

use std::env;
use std::time::Duration;
use tracing::warn;

/// Recognized options, loaded from the environment with defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Human-paced responses on agent replies
    pub stealth_enabled: bool,
    /// Ceiling over every stealth profile's max delay
    pub stealth_max_response_delay_ms: Option<u64>,
    /// Advisory queue size; exceeding it only logs
    pub queue_backpressure_soft_limit: usize,
    /// Override for scorecard passing thresholds; None keeps the
    /// per-scorecard value
    pub qa_pass_threshold: Option<f64>,
    /// Return escalated sessions to the queue when no agent is free
    pub escalation_auto_reenqueue: bool,
    /// Redis connection string; None selects the in-memory backend
    pub redis_url: Option<String>,
    pub sla_sweep_interval: Duration,
    pub dispatch_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stealth_enabled: true,
            stealth_max_response_delay_ms: None,
            queue_backpressure_soft_limit: 100,
            qa_pass_threshold: None,
            escalation_auto_reenqueue: true,
            redis_url: None,
            sla_sweep_interval: Duration::from_millis(1000),
            dispatch_poll_interval: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment. Unparseable values fall
    /// back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stealth_enabled: parse_var("TIERDESK_STEALTH_ENABLED", defaults.stealth_enabled),
            stealth_max_response_delay_ms: env::var("TIERDESK_STEALTH_MAX_RESPONSE_DELAY_MS")
                .ok()
                .and_then(|v| parse_or_warn("TIERDESK_STEALTH_MAX_RESPONSE_DELAY_MS", &v)),
            queue_backpressure_soft_limit: parse_var(
                "TIERDESK_QUEUE_SOFT_LIMIT",
                defaults.queue_backpressure_soft_limit,
            ),
            qa_pass_threshold: env::var("TIERDESK_QA_PASS_THRESHOLD")
                .ok()
                .and_then(|v| parse_or_warn("TIERDESK_QA_PASS_THRESHOLD", &v)),
            escalation_auto_reenqueue: parse_var(
                "TIERDESK_ESCALATION_AUTO_REENQUEUE",
                defaults.escalation_auto_reenqueue,
            ),
            redis_url: env::var("TIERDESK_REDIS_URL").ok().filter(|v| !v.is_empty()),
            sla_sweep_interval: Duration::from_millis(parse_var(
                "TIERDESK_SLA_SWEEP_INTERVAL_MS",
                defaults.sla_sweep_interval.as_millis() as u64,
            )),
            dispatch_poll_interval: Duration::from_millis(parse_var(
                "TIERDESK_DISPATCH_POLL_INTERVAL_MS",
                defaults.dispatch_poll_interval.as_millis() as u64,
            )),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(value) => parse_or_warn(name, &value).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(var = name, value, "unparseable configuration value; using default");
            None
        }
    }
}
