//! Prompt configurations for the conversation runtime
//!
//! A prompt describes a stepwise information-gathering flow: scripted
//! messages, the fields each step collects, per-field extraction patterns
//! and an escalation threshold over overall completion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Persona the conversation runtime speaks as
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPersona {
    pub name: String,
    pub tone: String,
    pub style: String,
}

/// What the prompt is for and where its boundaries lie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptScope {
    pub primary_function: String,
    pub boundaries: Vec<String>,
    /// Customer-message quota before escalation is requested
    pub max_messages: u32,
    pub escalation_triggers: Vec<String>,
}

/// One step of a conversation flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptStep {
    /// 1-indexed position in the flow
    pub index: usize,
    pub purpose: String,
    /// Scripted messages presented when the step is active
    pub messages: Vec<String>,
    /// Field names this step collects
    pub collects: Vec<String>,
    /// Field name to regular expression (first capture group wins,
    /// whole match otherwise)
    pub extraction_patterns: HashMap<String, String>,
    /// Step that hands off to escalation when reached
    pub escalation: bool,
}

impl PromptStep {
    /// Fraction of this step's fields present in `extracted`
    pub fn coverage(&self, extracted: &HashMap<String, String>) -> f64 {
        if self.collects.is_empty() {
            return 1.0;
        }
        let have = self
            .collects
            .iter()
            .filter(|f| extracted.contains_key(*f))
            .count();
        have as f64 / self.collects.len() as f64
    }
}

/// Escalation behavior for a prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptEscalation {
    /// Overall completion ratio at which escalation is requested, in [0, 1]
    pub threshold: f64,
    pub message: String,
    pub next_steps: Vec<String>,
}

/// A complete prompt configuration. Read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub id: String,
    pub persona: AgentPersona,
    pub scope: PromptScope,
    pub conversation_flow: Vec<PromptStep>,
    pub escalation: PromptEscalation,
}

impl PromptConfig {
    /// Step at the given 1-indexed position
    pub fn step(&self, index: usize) -> Option<&PromptStep> {
        if index == 0 {
            return None;
        }
        self.conversation_flow.get(index - 1)
    }

    /// Total number of collectable fields across the flow. Steps with no
    /// collects do not contribute.
    pub fn total_collect_count(&self) -> usize {
        self.conversation_flow
            .iter()
            .map(|s| s.collects.len())
            .sum()
    }
}
