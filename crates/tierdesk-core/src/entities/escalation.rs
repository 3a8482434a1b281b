//! Escalation rules

use crate::errors::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Severity a rule stamps on the escalation it produces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RulePriority {
    Low,
    Medium,
    High,
    Critical,
}

/// A single escalation rule. Rule sets are loaded at startup and
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    pub id: String,
    pub name: String,
    /// Case-insensitive substrings matched against the escalation reason
    pub triggers: Vec<String>,
    pub from_tier: u8,
    pub to_tier: u8,
    pub priority: RulePriority,
    pub auto_escalate: bool,
    pub notification_required: bool,
    /// Pickup deadline granted to the escalated session
    pub sla_seconds: i64,
}

impl EscalationRule {
    /// True if any trigger occurs as a substring of the lowercased reason
    pub fn matches(&self, reason: &str) -> bool {
        let reason = reason.to_lowercase();
        self.triggers
            .iter()
            .any(|t| reason.contains(&t.to_lowercase()))
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.triggers.is_empty() {
            return Err(CoreError::validation(format!(
                "rule {} has no triggers",
                self.id
            )));
        }
        if self.to_tier <= self.from_tier {
            return Err(CoreError::validation(format!(
                "rule {}: to_tier {} must be greater than from_tier {}",
                self.id, self.to_tier, self.from_tier
            )));
        }
        if self.to_tier > super::agent::MAX_TIER {
            return Err(CoreError::validation(format!(
                "rule {}: to_tier {} exceeds the maximum tier",
                self.id, self.to_tier
            )));
        }
        if self.sla_seconds <= 0 {
            return Err(CoreError::validation(format!(
                "rule {}: sla must be positive",
                self.id
            )));
        }
        Ok(())
    }
}
