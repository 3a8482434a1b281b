//! Identifier allocation
//!
//! Ids are strings of the form `<prefix>_<millis>_<12 hex chars>`: a
//! monotonic wall-clock component plus a 48-bit random suffix. They are
//! unique within a process; no ordering is guaranteed across processes.

use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

/// Allocates unique ids for sessions, messages, agents and evaluations.
#[derive(Debug)]
pub struct IdGenerator {
    last_millis: Mutex<i64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last_millis: Mutex::new(0),
        }
    }

    /// Allocate an id with the given prefix.
    ///
    /// The clock component never decreases, even if the wall clock steps
    /// backwards between calls.
    pub fn next(&self, prefix: &str) -> String {
        let now = Utc::now().timestamp_millis();
        let millis = {
            let mut last = self.last_millis.lock().unwrap();
            if now > *last {
                *last = now;
            }
            *last
        };
        // 12 hex chars of a v4 UUID give the 48 bits of suffix entropy.
        let entropy = Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", prefix, millis, &entropy[..12])
    }

    pub fn session_id(&self) -> String {
        self.next("sess")
    }

    pub fn message_id(&self) -> String {
        self.next("msg")
    }

    pub fn agent_id(&self) -> String {
        self.next("agent")
    }

    pub fn evaluation_id(&self) -> String {
        self.next("eval")
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_format() {
        let ids = IdGenerator::new();
        let id = ids.session_id();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "sess");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 12);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_unique() {
        let ids = IdGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(ids.message_id()));
        }
    }

    #[test]
    fn test_prefixes() {
        let ids = IdGenerator::new();
        assert!(ids.session_id().starts_with("sess_"));
        assert!(ids.message_id().starts_with("msg_"));
        assert!(ids.agent_id().starts_with("agent_"));
        assert!(ids.evaluation_id().starts_with("eval_"));
    }

    #[test]
    fn test_clock_component_is_monotonic() {
        let ids = IdGenerator::new();
        let mut previous = 0i64;
        for _ in 0..100 {
            let id = ids.next("sess");
            let millis: i64 = id.split('_').nth(1).unwrap().parse().unwrap();
            assert!(millis >= previous);
            previous = millis;
        }
    }
}
