//! Prompt-driven conversation runtime
//!
//! Purely synchronous transformations over the active prompt and the
//! session's conversation context: regex field extraction, step
//! advancement at 0.8 coverage, quota and completion-threshold escalation,
//! and keyword intent detection. Given identical inputs the outcome is
//! identical; extraction is order-independent over fields because each
//! field carries exactly one pattern and the first stored value wins.

use crate::entities::prompt::PromptConfig;
use crate::entities::session::ConversationContext;
use crate::errors::{CoreError, CoreResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Keyword table for intent detection: (needle, intent, category)
const INTENT_KEYWORDS: &[(&str, &str, &str)] = &[
    ("stolen", "report_theft", "crypto_theft"),
    ("hacked", "report_theft", "crypto_theft"),
    ("scam", "report_theft", "crypto_theft"),
    ("theft", "report_theft", "crypto_theft"),
    ("refund", "billing_question", "billing"),
    ("invoice", "billing_question", "billing"),
    ("charge", "billing_question", "billing"),
    ("password", "account_access", "account"),
    ("login", "account_access", "account"),
    ("locked out", "account_access", "account"),
    ("error", "technical_support", "technical"),
    ("crash", "technical_support", "technical"),
    ("not working", "technical_support", "technical"),
    ("cancel", "cancellation", "retention"),
];

/// Phrases that force an escalation request regardless of quotas
const HARD_TRIGGERS: &[&str] = &["legal", "formal complaint", "lawsuit", "urgent", "emergency"];

/// Result of processing one customer message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// Fields this message matched (whether or not they were already
    /// stored)
    pub extracted: HashMap<String, String>,
    pub step_complete: bool,
    pub should_escalate: bool,
    pub escalation_reasons: Vec<String>,
    /// 1-indexed step the conversation is now on
    pub next_step: usize,
    /// True when the step pointer ran past the flow and the message got
    /// no step-specific handling
    pub advisory_fallback: bool,
    /// Snapshot of the context after this message
    pub context: ConversationContext,
}

pub struct ConversationRuntime {
    /// Compiled-pattern cache keyed by pattern source
    patterns: RwLock<HashMap<String, Regex>>,
}

impl ConversationRuntime {
    pub fn new() -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
        }
    }

    fn regex_for(&self, pattern: &str) -> CoreResult<Regex> {
        if let Some(re) = self.patterns.read().unwrap().get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| {
            CoreError::validation(format!("invalid extraction pattern {:?}: {}", pattern, e))
        })?;
        self.patterns
            .write()
            .unwrap()
            .insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    /// Process a customer message against the active prompt step.
    pub fn process_user_message(
        &self,
        prompt: &PromptConfig,
        context: &mut ConversationContext,
        message: &str,
    ) -> CoreResult<ProcessOutcome> {
        context.message_count += 1;
        self.detect_intent(context, message);

        let step = match prompt.step(context.current_step) {
            Some(step) => step,
            None => {
                let (should_escalate, reasons) = self.escalation_check(prompt, context);
                return Ok(ProcessOutcome {
                    extracted: HashMap::new(),
                    step_complete: false,
                    should_escalate,
                    escalation_reasons: reasons,
                    next_step: context.current_step,
                    advisory_fallback: true,
                    context: context.clone(),
                });
            }
        };

        let mut extracted = HashMap::new();
        for (field, pattern) in &step.extraction_patterns {
            let re = self.regex_for(pattern)?;
            if let Some(captures) = re.captures(message) {
                let value = captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                extracted.insert(field.clone(), value.clone());
                // First write wins; repeated answers never overwrite.
                context.extracted_fields.entry(field.clone()).or_insert(value);
            }
        }

        let step_complete = step.coverage(&context.extracted_fields) >= 0.8;
        let step_is_escalation = step.escalation;
        if step_complete {
            context.current_step += 1;
        }

        let (mut should_escalate, mut reasons) = self.escalation_check(prompt, context);
        if step_is_escalation {
            should_escalate = true;
            reasons.push("escalation_step".to_string());
        }

        debug!(
            step = context.current_step,
            extracted = extracted.len(),
            should_escalate,
            "processed customer message"
        );

        Ok(ProcessOutcome {
            extracted,
            step_complete,
            should_escalate,
            escalation_reasons: reasons,
            next_step: context.current_step,
            advisory_fallback: false,
            context: context.clone(),
        })
    }

    /// Scripted messages for the step the conversation is currently on.
    pub fn next_messages(&self, prompt: &PromptConfig, context: &ConversationContext) -> Vec<String> {
        prompt
            .step(context.current_step)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    fn escalation_check(
        &self,
        prompt: &PromptConfig,
        context: &ConversationContext,
    ) -> (bool, Vec<String>) {
        let mut reasons = Vec::new();

        if context.message_count >= prompt.scope.max_messages {
            reasons.push("message_limit".to_string());
        }

        let total = prompt.total_collect_count();
        if total > 0 {
            let ratio = context.extracted_fields.len() as f64 / total as f64;
            if ratio >= prompt.escalation.threshold {
                reasons.push("completion_threshold".to_string());
            }
        }

        if !context.escalation_triggers.is_empty() {
            reasons.push("trigger_phrase".to_string());
        }

        (!reasons.is_empty(), reasons)
    }

    /// Keyword intent detection; first detection wins. Trigger phrases
    /// append escalation tags.
    fn detect_intent(&self, context: &mut ConversationContext, message: &str) {
        let lowered = message.to_lowercase();

        if context.customer_intent.is_none() {
            for (needle, intent, category) in INTENT_KEYWORDS {
                if lowered.contains(needle) {
                    context.customer_intent = Some(intent.to_string());
                    context.issue_category = Some(category.to_string());
                    break;
                }
            }
        }

        for trigger in HARD_TRIGGERS {
            if lowered.contains(trigger)
                && !context.escalation_triggers.iter().any(|t| t == trigger)
            {
                context.escalation_triggers.push(trigger.to_string());
            }
        }
    }
}

impl Default for ConversationRuntime {
    fn default() -> Self {
        Self::new()
    }
}
