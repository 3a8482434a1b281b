//! Tier-gated knowledge catalog
//!
//! Access decisions are pure functions of the stored access tier and the
//! caller tier: read requires `access_tier <= tier`, edit requires tier 3,
//! approval tier 4. Listings and searches never return entries above the
//! caller's tier.

use crate::entities::knowledge::{KnowledgeEntry, TierKnowledgeView};
use crate::errors::{CoreError, CoreResult};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

pub struct KnowledgeRegistry {
    entries: RwLock<HashMap<String, KnowledgeEntry>>,
}

impl KnowledgeRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-seeded with the default catalog
    pub async fn with_default_catalog() -> Self {
        let registry = Self::new();
        for entry in default_catalog() {
            // Seed entries are well-formed by construction.
            let _ = registry.register(entry).await;
        }
        registry
    }

    pub async fn register(&self, entry: KnowledgeEntry) -> CoreResult<()> {
        if entry.access_tier > crate::entities::agent::MAX_TIER {
            return Err(CoreError::validation(format!(
                "knowledge entry {}: access tier {} exceeds the maximum tier",
                entry.id, entry.access_tier
            )));
        }
        debug!(id = %entry.id, tier = entry.access_tier, "registering knowledge entry");
        self.entries.write().await.insert(entry.id.clone(), entry);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> CoreResult<KnowledgeEntry> {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("knowledge_entry", id))
    }

    /// Entries readable at the given tier, annotated with edit/approve
    /// capabilities, ordered by access tier then title.
    pub async fn list_for_tier(&self, tier: u8) -> Vec<TierKnowledgeView> {
        let entries = self.entries.read().await;
        let mut views: Vec<TierKnowledgeView> = entries
            .values()
            .filter(|e| e.access_tier <= tier)
            .cloned()
            .map(|e| TierKnowledgeView::for_tier(e, tier))
            .collect();
        views.sort_by(|a, b| {
            a.entry
                .access_tier
                .cmp(&b.entry.access_tier)
                .then_with(|| a.entry.title.cmp(&b.entry.title))
        });
        views
    }

    /// Case-insensitive substring search over title and tags, filtered by
    /// caller tier.
    pub async fn search(&self, query: &str, tier: u8) -> Vec<TierKnowledgeView> {
        self.list_for_tier(tier)
            .await
            .into_iter()
            .filter(|v| v.entry.matches(query))
            .collect()
    }
}

impl Default for KnowledgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn catalog_entry(
    id: &str,
    title: &str,
    access_tier: u8,
    tags: &[&str],
    summary: &str,
) -> KnowledgeEntry {
    let mut content = HashMap::new();
    content.insert("summary".to_string(), json!(summary));
    KnowledgeEntry {
        id: id.to_string(),
        title: title.to_string(),
        content,
        access_tier,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        owner: "support-ops".to_string(),
        review_cycle: "quarterly".to_string(),
        version: 1,
        last_updated: Utc::now(),
    }
}

/// Seed catalog spanning tiers 1 through 4
pub fn default_catalog() -> Vec<KnowledgeEntry> {
    vec![
        catalog_entry(
            "kb_password_reset",
            "Password reset procedure",
            1,
            &["account", "access"],
            "Walk the customer through the self-service reset flow before anything else.",
        ),
        catalog_entry(
            "kb_billing_basics",
            "Billing questions playbook",
            1,
            &["billing", "invoices"],
            "Plan names, billing cycles and where customers find their invoices.",
        ),
        catalog_entry(
            "kb_refund_policy",
            "Refund policy and exceptions",
            2,
            &["billing", "refunds"],
            "Standard refund windows; exceptions require tier 3 approval.",
        ),
        catalog_entry(
            "kb_crypto_theft_intake",
            "Crypto theft intake checklist",
            2,
            &["crypto", "fraud", "ocint"],
            "Required fields for a victim report: contact, incident, wallet, evidence.",
        ),
        catalog_entry(
            "kb_chain_tracing",
            "On-chain tracing runbook",
            3,
            &["crypto", "investigation"],
            "Tracing stolen funds across mixers and bridges; tooling and escalation points.",
        ),
        catalog_entry(
            "kb_legal_holds",
            "Legal hold and law-enforcement requests",
            4,
            &["legal", "compliance"],
            "Only supervisors coordinate with counsel and law enforcement.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_never_exceeds_caller_tier() {
        let registry = KnowledgeRegistry::with_default_catalog().await;
        for tier in 0..=4u8 {
            let views = registry.list_for_tier(tier).await;
            assert!(views.iter().all(|v| v.entry.access_tier <= tier));
        }
    }

    #[tokio::test]
    async fn test_annotations_follow_tier() {
        let registry = KnowledgeRegistry::with_default_catalog().await;

        let views = registry.list_for_tier(2).await;
        assert!(!views.is_empty());
        assert!(views.iter().all(|v| v.can_read && !v.can_edit && !v.can_approve));

        let views = registry.list_for_tier(4).await;
        assert!(views.iter().all(|v| v.can_edit && v.can_approve));
    }

    #[tokio::test]
    async fn test_search_respects_tier_filter() {
        let registry = KnowledgeRegistry::with_default_catalog().await;

        let hits = registry.search("crypto", 2).await;
        assert!(hits.iter().any(|v| v.entry.id == "kb_crypto_theft_intake"));
        assert!(hits.iter().all(|v| v.entry.id != "kb_chain_tracing"));

        let hits = registry.search("crypto", 3).await;
        assert!(hits.iter().any(|v| v.entry.id == "kb_chain_tracing"));
    }

    #[tokio::test]
    async fn test_search_matches_tags_case_insensitive() {
        let registry = KnowledgeRegistry::with_default_catalog().await;
        let hits = registry.search("OCINT", 2).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, "kb_crypto_theft_intake");
    }

    #[tokio::test]
    async fn test_register_rejects_bad_tier() {
        let registry = KnowledgeRegistry::new();
        let entry = catalog_entry("kb_x", "X", 9, &[], "");
        assert!(registry.register(entry).await.is_err());
    }

    #[tokio::test]
    async fn test_get_unknown_entry() {
        let registry = KnowledgeRegistry::new();
        assert!(matches!(
            registry.get("kb_missing").await,
            Err(CoreError::NotFound { .. })
        ));
    }
}
