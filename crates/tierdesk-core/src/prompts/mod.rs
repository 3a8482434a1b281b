//! Prompt registry and built-in prompt configurations
//!
//! Two prompts ship as literal data so a freshly wired engine works with
//! no external configuration: `general-support` for everyday intake and
//! `ocint-victim-report` for structured crypto-theft victim reports.
//! Prompts are read-only at runtime; the registry is built once.

mod builtin;

pub use builtin::{general_support, ocint_victim_report};

use crate::entities::prompt::PromptConfig;
use crate::errors::{CoreError, CoreResult};
use std::collections::HashMap;

/// Lookup table of prompt configurations, frozen after construction
pub struct PromptRegistry {
    prompts: HashMap<String, PromptConfig>,
    order: Vec<String>,
}

impl PromptRegistry {
    /// Registry holding only the built-in prompts
    pub fn builtin() -> Self {
        let mut registry = Self {
            prompts: HashMap::new(),
            order: Vec::new(),
        };
        registry.insert(general_support());
        registry.insert(ocint_victim_report());
        registry
    }

    /// Add a prompt during construction; later ids replace earlier ones.
    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.insert(prompt);
        self
    }

    fn insert(&mut self, prompt: PromptConfig) {
        if !self.prompts.contains_key(&prompt.id) {
            self.order.push(prompt.id.clone());
        }
        self.prompts.insert(prompt.id.clone(), prompt);
    }

    pub fn get(&self, id: &str) -> CoreResult<&PromptConfig> {
        self.prompts
            .get(id)
            .ok_or_else(|| CoreError::not_found("prompt", id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.prompts.contains_key(id)
    }

    /// All prompts in registration order
    pub fn list(&self) -> Vec<&PromptConfig> {
        self.order
            .iter()
            .filter_map(|id| self.prompts.get(id))
            .collect()
    }

    /// Default prompt assigned to new sessions
    pub fn default_prompt_id(&self) -> &str {
        "general-support"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_prompts_present() {
        let registry = PromptRegistry::builtin();
        assert!(registry.contains("general-support"));
        assert!(registry.contains("ocint-victim-report"));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_unknown_prompt_is_not_found() {
        let registry = PromptRegistry::builtin();
        assert!(matches!(
            registry.get("billing-bot"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_builtin_patterns_compile() {
        let registry = PromptRegistry::builtin();
        for prompt in registry.list() {
            for step in &prompt.conversation_flow {
                for (field, pattern) in &step.extraction_patterns {
                    assert!(
                        regex::Regex::new(pattern).is_ok(),
                        "pattern for {} in {} step {} does not compile",
                        field,
                        prompt.id,
                        step.index
                    );
                }
            }
        }
    }

    #[test]
    fn test_builtin_steps_are_sequential() {
        let registry = PromptRegistry::builtin();
        for prompt in registry.list() {
            for (i, step) in prompt.conversation_flow.iter().enumerate() {
                assert_eq!(step.index, i + 1);
            }
            assert!(prompt.escalation.threshold > 0.0);
            assert!(prompt.escalation.threshold <= 1.0);
        }
    }
}
