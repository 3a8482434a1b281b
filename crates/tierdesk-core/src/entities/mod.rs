//! Domain entities and value objects
//!
//! All entities are plain serde value types. Lifecycle rules live in the
//! services that own them: sessions in the session store, evaluations in
//! the QA evaluator, context mutation in the conversation runtime.

pub mod agent;
pub mod escalation;
pub mod knowledge;
pub mod prompt;
pub mod scorecard;
pub mod session;

pub use agent::{Agent, AgentData, AgentPerformance, AgentStatus, EscalationAuthority};
pub use escalation::{EscalationRule, RulePriority};
pub use knowledge::{KnowledgeEntry, TierKnowledgeView};
pub use prompt::{PromptConfig, PromptEscalation, PromptScope, PromptStep};
pub use scorecard::{
    Criterion, CriterionEvaluation, Evaluation, EvaluationStatus, InteractionRecord, Scorecard,
    SubCriterion, SubCriterionScore,
};
pub use session::{
    ConversationContext, Customer, CustomerData, CustomerProfile, CustomerTier, EscalationRecord,
    Message, MessageRole, ResponseType, Session, SessionStatus, Urgency,
};
