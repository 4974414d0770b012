//! Messages and prompts: the caller-owned conversation history.

use serde::{Deserialize, Serialize};

use super::content::{MessagePart, ProviderMetadata};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(parts: Vec<MessagePart>) -> Self {
        Self {
            role: Role::Assistant,
            content: parts,
            provider_metadata: None,
        }
    }

    pub fn tool(parts: Vec<MessagePart>) -> Self {
        Self {
            role: Role::Tool,
            content: parts,
            provider_metadata: None,
        }
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![MessagePart::Text { text: text.into() }],
            provider_metadata: None,
        }
    }

    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// An ordered conversation: the unit the agent loop sends to a `LanguageModel`.
pub type Prompt = Vec<Message>;
