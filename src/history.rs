//! In-memory conversation log
//!
//! An ordered list of role-tagged messages, appended to for the life of
//! the process and reset by an explicit clear. Nothing is persisted;
//! restarting the process starts an empty conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A user turn paired with the assistant's reply, the shape the chat
/// widget renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Append-only message log with an explicit clear.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::Assistant, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Pair messages into user/assistant exchanges in insertion order.
    ///
    /// An assistant message with no preceding user turn gets an empty
    /// user side rather than being dropped.
    pub fn exchanges(&self) -> Vec<Exchange> {
        let mut out: Vec<Exchange> = Vec::new();
        for msg in &self.messages {
            match msg.role {
                Role::User => out.push(Exchange {
                    user: msg.content.clone(),
                    assistant: String::new(),
                }),
                Role::Assistant => match out.last_mut() {
                    Some(ex) if ex.assistant.is_empty() => {
                        ex.assistant = msg.content.clone();
                    }
                    _ => out.push(Exchange {
                        user: String::new(),
                        assistant: msg.content.clone(),
                    }),
                },
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
