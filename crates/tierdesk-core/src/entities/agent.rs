//! Agent entities and tier-derived authority

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Highest agent tier; 0 is self-service, 4 is supervisor/manager
pub const MAX_TIER: u8 = 4;

/// Agent availability status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    Offline,
    Training,
    Break,
}

/// Per-agent performance counters
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentPerformance {
    pub total_sessions: u64,
    pub resolved_sessions: u64,
    pub escalated_sessions: u64,
    pub average_resolution_time_ms: f64,
    /// Customer satisfaction in [0, 5]
    pub customer_satisfaction: f64,
    /// First-contact resolution rate in [0, 1]
    pub first_contact_resolution: f64,
    pub average_handle_time_ms: f64,
    /// Running QA weighted score in [0, 100]
    pub quality_score: f64,
}

impl AgentPerformance {
    /// Composite quality score:
    /// 30% satisfaction, 25% first-contact resolution, 25% QA score,
    /// 20% non-escalation rate. Rounded to the nearest integer.
    pub fn composite_quality_score(&self) -> u32 {
        let satisfaction = (self.customer_satisfaction / 5.0) * 100.0;
        let fcr = self.first_contact_resolution * 100.0;
        let non_escalation = (1.0
            - self.escalated_sessions as f64 / (self.total_sessions.max(1)) as f64)
            * 100.0;
        let score =
            0.30 * satisfaction + 0.25 * fcr + 0.25 * self.quality_score + 0.20 * non_escalation;
        score.round() as u32
    }
}

/// Capacity configuration for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAvailability {
    pub max_concurrent_sessions: u32,
}

impl Default for AgentAvailability {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 1,
        }
    }
}

/// Tier-derived escalation powers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationAuthority {
    /// Tiers this agent may escalate to: strictly above its own, up to 4
    pub can_escalate_to: Vec<u8>,
    pub can_approve_escalations: bool,
    pub can_override_policies: bool,
    /// Maximum compensation this agent may offer, in account currency
    pub max_compensation: u32,
}

impl EscalationAuthority {
    /// Derive authority purely from tier.
    pub fn for_tier(tier: u8) -> Self {
        let can_escalate_to: Vec<u8> = ((tier + 1)..=MAX_TIER).collect();
        let max_compensation = match tier {
            0 | 1 => 0,
            2 => 50,
            3 => 200,
            _ => 1000,
        };
        Self {
            can_escalate_to,
            can_approve_escalations: tier >= 3,
            can_override_policies: tier >= 3,
            max_compensation,
        }
    }

    pub fn may_escalate_to(&self, target_tier: u8) -> bool {
        self.can_escalate_to.contains(&target_tier)
    }
}

/// A support agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub email: String,
    pub tier: u8,
    pub status: AgentStatus,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
    pub training_history: Vec<String>,
    pub current_session_id: Option<String>,
    pub availability: AgentAvailability,
    pub supervisor_id: Option<String>,
    pub performance: AgentPerformance,
    /// Stamped whenever the agent transitions to available; dispatch
    /// tiebreak key
    pub last_available: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Number of sessions currently assigned (0 or 1 under the
    /// single-assignment invariant)
    pub fn current_load(&self) -> u32 {
        if self.current_session_id.is_some() {
            1
        } else {
            0
        }
    }

    pub fn at_capacity(&self) -> bool {
        self.current_load() >= self.availability.max_concurrent_sessions
    }

    pub fn escalation_authority(&self) -> EscalationAuthority {
        EscalationAuthority::for_tier(self.tier)
    }
}

/// Inbound agent-registration payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AgentData {
    #[validate(length(min = 1, message = "agent name must not be empty"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(range(min = 0, max = 4, message = "tier must be in 0..=4"))]
    pub tier: u8,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub max_concurrent_sessions: Option<u32>,
    pub supervisor_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_tier_one() {
        let authority = EscalationAuthority::for_tier(1);
        assert_eq!(authority.can_escalate_to, vec![2, 3, 4]);
        assert!(!authority.can_approve_escalations);
        assert!(!authority.can_override_policies);
        assert_eq!(authority.max_compensation, 0);
    }

    #[test]
    fn test_authority_tier_three() {
        let authority = EscalationAuthority::for_tier(3);
        assert_eq!(authority.can_escalate_to, vec![4]);
        assert!(authority.can_approve_escalations);
        assert!(authority.can_override_policies);
        assert_eq!(authority.max_compensation, 200);
    }

    #[test]
    fn test_authority_tier_four_escalates_nowhere() {
        let authority = EscalationAuthority::for_tier(4);
        assert!(authority.can_escalate_to.is_empty());
        assert_eq!(authority.max_compensation, 1000);
    }

    #[test]
    fn test_authority_is_strictly_upward() {
        for tier in 0..=MAX_TIER {
            let authority = EscalationAuthority::for_tier(tier);
            assert!(authority.can_escalate_to.iter().all(|&t| t > tier && t <= MAX_TIER));
        }
    }

    #[test]
    fn test_composite_quality_score() {
        let perf = AgentPerformance {
            total_sessions: 10,
            resolved_sessions: 9,
            escalated_sessions: 2,
            customer_satisfaction: 4.5,
            first_contact_resolution: 0.8,
            quality_score: 90.0,
            ..Default::default()
        };
        // 0.30*90 + 0.25*80 + 0.25*90 + 0.20*80 = 27 + 20 + 22.5 + 16 = 85.5
        assert_eq!(perf.composite_quality_score(), 86);
    }

    #[test]
    fn test_composite_quality_score_no_sessions() {
        let perf = AgentPerformance::default();
        // Division guard: max(total, 1) keeps the non-escalation term at 100
        assert_eq!(perf.composite_quality_score(), 20);
    }

    #[test]
    fn test_agent_data_tier_validation() {
        let data = AgentData {
            name: "Dana".to_string(),
            email: "dana@example.com".to_string(),
            tier: 5,
            skills: vec![],
            certifications: vec![],
            max_concurrent_sessions: None,
            supervisor_id: None,
        };
        assert!(data.validate().is_err());
    }
}
