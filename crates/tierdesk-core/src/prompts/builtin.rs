//! Built-in prompt configurations as literal data

use crate::entities::prompt::{
    AgentPersona, PromptConfig, PromptEscalation, PromptScope, PromptStep,
};
use std::collections::HashMap;

fn patterns(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(field, pattern)| (field.to_string(), pattern.to_string()))
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Everyday support intake: identify the customer, understand the issue,
/// confirm resolution.
pub fn general_support() -> PromptConfig {
    PromptConfig {
        id: "general-support".to_string(),
        persona: AgentPersona {
            name: "Alex".to_string(),
            tone: "warm and professional".to_string(),
            style: "concise, plain language".to_string(),
        },
        scope: PromptScope {
            primary_function: "Resolve common account and product questions".to_string(),
            boundaries: strings(&[
                "No legal advice",
                "No compensation offers",
                "No account credential changes",
            ]),
            max_messages: 25,
            escalation_triggers: strings(&["legal", "formal complaint", "supervisor"]),
        },
        conversation_flow: vec![
            PromptStep {
                index: 1,
                purpose: "Greet the customer and capture who they are and what they need"
                    .to_string(),
                messages: strings(&[
                    "Hi, thanks for reaching out to support. Could I have your name?",
                    "And what can I help you with today?",
                ]),
                collects: strings(&["customer_name", "issue_description"]),
                extraction_patterns: patterns(&[
                    (
                        "customer_name",
                        r"(?:[Mm]y name is|[Ii] am|[Ii]'m|[Tt]his is)\s+([A-Z][a-z]+(?: [A-Z][a-z]+)+)",
                    ),
                    (
                        "issue_description",
                        r"(?:problem|issue|trouble|help)\s+(?:with|about|regarding)\s+([^.!?]+)",
                    ),
                ]),
                escalation: false,
            },
            PromptStep {
                index: 2,
                purpose: "Collect account and product details".to_string(),
                messages: strings(&[
                    "Thanks. Could you share your account id so I can look things up?",
                    "Which product or plan is this about?",
                ]),
                collects: strings(&["account_id", "product"]),
                extraction_patterns: patterns(&[
                    (
                        "account_id",
                        r"(?:[Aa]ccount|[Aa]cct)[ #:]*([A-Za-z0-9-]{4,20})",
                    ),
                    (
                        "product",
                        r"(?:using|on|about|with)\s+(?:the\s+)?([A-Z][A-Za-z0-9]+(?: [A-Z][A-Za-z0-9]+)?)\s+(?:app|plan|platform|subscription)",
                    ),
                ]),
                escalation: false,
            },
            PromptStep {
                index: 3,
                purpose: "Confirm the proposed resolution".to_string(),
                messages: strings(&[
                    "Here is what I suggest we do. Does that resolve the issue for you?",
                ]),
                collects: strings(&["confirmation"]),
                extraction_patterns: patterns(&[(
                    "confirmation",
                    r"(?i)\b(yes|no|that works|resolved|not resolved)\b",
                )]),
                escalation: false,
            },
        ],
        escalation: PromptEscalation {
            threshold: 0.8,
            message: "Let me bring in a specialist who can take this further.".to_string(),
            next_steps: strings(&[
                "Hand the collected details to the assigned specialist",
                "Keep the customer informed about queue position",
            ]),
        },
    }
}

/// Structured intake for crypto-theft victim reports: contact details,
/// incident, on-chain references, evidence, then hand-off to the
/// investigation team.
pub fn ocint_victim_report() -> PromptConfig {
    PromptConfig {
        id: "ocint-victim-report".to_string(),
        persona: AgentPersona {
            name: "Jordan".to_string(),
            tone: "calm and reassuring".to_string(),
            style: "step by step, no jargon".to_string(),
        },
        scope: PromptScope {
            primary_function: "Collect a complete crypto-theft victim report".to_string(),
            boundaries: strings(&[
                "No recovery promises",
                "No legal advice",
                "No requests for private keys or seed phrases",
            ]),
            max_messages: 30,
            escalation_triggers: strings(&["legal", "formal complaint", "urgent", "emergency"]),
        },
        conversation_flow: vec![
            PromptStep {
                index: 1,
                purpose: "Capture the victim's contact details".to_string(),
                messages: strings(&[
                    "I'm sorry this happened. Let's get your report started.",
                    "Could you give me your full name, email, and a phone number where we can reach you?",
                ]),
                collects: strings(&["victim_name", "victim_email", "victim_phone"]),
                extraction_patterns: patterns(&[
                    (
                        "victim_name",
                        r"(?:[Mm]y name is|[Ii] am|[Ii]'m|[Tt]his is)\s+([A-Z][a-z]+(?: [A-Z][a-z]+)+)",
                    ),
                    (
                        "victim_email",
                        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                    ),
                    (
                        "victim_phone",
                        r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}",
                    ),
                ]),
                escalation: false,
            },
            PromptStep {
                index: 2,
                purpose: "Understand what happened and what was lost".to_string(),
                messages: strings(&[
                    "When did the theft happen, and on which platform or service?",
                    "Roughly how much was taken?",
                ]),
                collects: strings(&["incident_date", "platform", "amount_lost"]),
                extraction_patterns: patterns(&[
                    (
                        "incident_date",
                        r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})\b",
                    ),
                    (
                        "platform",
                        r"\b(?:on|via|through|using)\s+([A-Z][A-Za-z0-9]+(?: [A-Z][A-Za-z0-9]+)?)",
                    ),
                    (
                        "amount_lost",
                        r"(\$[\d,]+(?:\.\d{2})?|[\d][\d,.]*\s?(?:BTC|ETH|USDT|USDC|SOL))",
                    ),
                ]),
                escalation: false,
            },
            PromptStep {
                index: 3,
                purpose: "Collect on-chain references".to_string(),
                messages: strings(&[
                    "If you have them, please paste the wallet address the funds went to and any transaction hash.",
                ]),
                collects: strings(&["wallet_address", "transaction_hash"]),
                extraction_patterns: patterns(&[
                    (
                        "wallet_address",
                        r"\b(0x[a-fA-F0-9]{40}|(?:bc1|[13])[a-zA-Z0-9]{25,59})\b",
                    ),
                    (
                        "transaction_hash",
                        r"\b(0x[a-fA-F0-9]{64})\b",
                    ),
                ]),
                escalation: false,
            },
            PromptStep {
                index: 4,
                purpose: "Gather evidence of the contact that led to the theft".to_string(),
                messages: strings(&[
                    "How did the scammer first contact you? Any handles or links help the investigation.",
                ]),
                collects: strings(&["scammer_handle", "evidence_link"]),
                extraction_patterns: patterns(&[
                    ("scammer_handle", r"@([A-Za-z0-9_]{3,30})"),
                    ("evidence_link", r"(https?://[^\s]+)"),
                ]),
                escalation: false,
            },
            PromptStep {
                index: 5,
                purpose: "Confirm the report and hand off to the investigation team".to_string(),
                messages: strings(&[
                    "Thank you. I have everything I need for the initial report.",
                    "I'm escalating this to our investigation team now; they will follow up by email.",
                ]),
                collects: strings(&[]),
                extraction_patterns: patterns(&[]),
                escalation: true,
            },
        ],
        escalation: PromptEscalation {
            threshold: 0.8,
            message: "Your report is complete and is being escalated to the investigation team."
                .to_string(),
            next_steps: strings(&[
                "Route the report to a tier 3 investigator",
                "Send the case reference to the victim's email",
                "Flag the receiving wallet for monitoring",
            ]),
        },
    }
}
