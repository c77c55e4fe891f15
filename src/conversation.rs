//! Session-scoped conversation log.
//!
//! The log only ever grows: one greeting turn when a session starts, then
//! one user turn per submission and one assistant turn per reply (including
//! failed replies). Insertion order is both the rendering order and the
//! order the context is sent back to the provider.

use crate::error::ChatError;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// One committed message. Neither field can change after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    fn new(role: Role, text: String) -> Self {
        Self { role, text }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Role strings a provider expects on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleVocabulary {
    pub user: String,
    pub assistant: String,
}

impl RoleVocabulary {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }

    pub fn label(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
        }
    }
}

impl Default for RoleVocabulary {
    fn default() -> Self {
        Self::new("user", "assistant")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: String,
    pub content: String,
}

/// Ordered, append-only list of turns for a single session.
///
/// Every mutation goes through one mutex, so concurrent submissions for the
/// same session cannot interleave their appends.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Mutex<Vec<Turn>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Turn>> {
        // Appends are single pushes, so a panic elsewhere cannot leave the
        // list half-written.
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the greeting turn. Does nothing once the log has any turn.
    pub fn initialize(&self, greeting: &str) -> bool {
        let mut turns = self.lock();
        if !turns.is_empty() {
            return false;
        }
        turns.push(Turn::new(Role::Assistant, greeting.to_string()));
        tracing::debug!("seeded conversation with greeting");
        true
    }

    pub fn append_user(&self, text: &str) -> Result<usize, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::InvalidInput);
        }
        Ok(self.push(Role::User, text.to_string()))
    }

    /// Append an assistant turn. Empty and error text are accepted so every
    /// user turn keeps exactly one reply.
    pub fn append_assistant(&self, text: impl Into<String>) -> usize {
        self.push(Role::Assistant, text.into())
    }

    fn push(&self, role: Role, text: String) -> usize {
        let mut turns = self.lock();
        turns.push(Turn::new(role, text));
        let index = turns.len() - 1;
        tracing::debug!(?role, index, "appended turn");
        index
    }

    pub fn all_turns(&self) -> Vec<Turn> {
        self.lock().clone()
    }

    pub fn to_provider_messages(&self, roles: &RoleVocabulary) -> Vec<ProviderMessage> {
        self.lock()
            .iter()
            .map(|t| ProviderMessage {
                role: roles.label(t.role).to_string(),
                content: t.text.clone(),
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
