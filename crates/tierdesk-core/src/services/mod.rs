//! Business logic and domain services
//!
//! Each service owns one component of the engine:
//!
//! - [`knowledge_registry`] - tier-gated knowledge catalog
//! - [`agent_directory`] - agents, tiers, status and capacity
//! - [`session_store`] - session lifecycle, messages and customer profiles
//! - [`escalation`] - rule matching, tier promotion and SLAs
//! - [`dispatcher`] - matching waiting sessions to available agents
//! - [`conversation_runtime`] - prompt-driven step machine and extraction
//! - [`stealth_pacer`] - human-paced response scheduling
//! - [`qa_evaluator`] - scorecard evaluations

pub mod agent_directory;
pub mod conversation_runtime;
pub mod dispatcher;
pub mod escalation;
pub mod knowledge_registry;
pub mod qa_evaluator;
pub mod response_enrichment;
pub mod session_store;
pub mod stealth_pacer;

pub use agent_directory::AgentDirectory;
pub use conversation_runtime::{ConversationRuntime, ProcessOutcome};
pub use dispatcher::Dispatcher;
pub use escalation::{EscalationEngine, EscalationOutcome};
pub use knowledge_registry::KnowledgeRegistry;
pub use qa_evaluator::QaEvaluator;
pub use session_store::SessionStore;
pub use stealth_pacer::{BehaviorProfile, StealthPacer};
