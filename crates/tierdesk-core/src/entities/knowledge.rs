//! Knowledge base entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A knowledge-base article gated by agent tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    /// Structured body: section name to content
    pub content: HashMap<String, serde_json::Value>,
    /// Minimum agent tier with read access
    pub access_tier: u8,
    pub tags: Vec<String>,
    pub owner: String,
    pub review_cycle: String,
    pub version: u32,
    pub last_updated: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Case-insensitive substring match over title and tags
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

/// A knowledge entry annotated with the caller's capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierKnowledgeView {
    pub entry: KnowledgeEntry,
    pub can_read: bool,
    pub can_edit: bool,
    pub can_approve: bool,
}

impl TierKnowledgeView {
    /// Annotate an entry for a caller tier. Edit requires tier 3,
    /// approval tier 4.
    pub fn for_tier(entry: KnowledgeEntry, tier: u8) -> Self {
        Self {
            entry,
            can_read: true,
            can_edit: tier >= 3,
            can_approve: tier >= 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, tags: &[&str]) -> KnowledgeEntry {
        KnowledgeEntry {
            id: "kb_1".to_string(),
            title: title.to_string(),
            content: HashMap::new(),
            access_tier: 1,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            owner: "support-ops".to_string(),
            review_cycle: "quarterly".to_string(),
            version: 1,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_matches_title_case_insensitive() {
        let e = entry("Password Reset Procedure", &[]);
        assert!(e.matches("password"));
        assert!(e.matches("RESET"));
        assert!(!e.matches("refund"));
    }

    #[test]
    fn test_matches_tags() {
        let e = entry("Chargebacks", &["billing", "disputes"]);
        assert!(e.matches("dispute"));
    }

    #[test]
    fn test_view_annotations() {
        let view = TierKnowledgeView::for_tier(entry("KYC checklist", &[]), 3);
        assert!(view.can_read);
        assert!(view.can_edit);
        assert!(!view.can_approve);

        let view = TierKnowledgeView::for_tier(entry("KYC checklist", &[]), 4);
        assert!(view.can_approve);
    }
}
