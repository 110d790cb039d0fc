use std::collections::HashMap;

use kestrel_types::models::{Conversation, ConversationKey, MessageEntry, PendingState};
use uuid::Uuid;

/// Client-local view of every known conversation. Derived state only; the
/// network stays the source of truth.
#[derive(Debug, Default, Clone)]
pub struct ConversationMirror {
    conversations: HashMap<ConversationKey, Conversation>,
}

impl ConversationMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ConversationKey) -> Option<&Conversation> {
        self.conversations.get(key)
    }

    pub fn get_mut(&mut self, key: &ConversationKey) -> Option<&mut Conversation> {
        self.conversations.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConversationKey, &Conversation)> {
        self.conversations.iter()
    }

    /// Insert `conversation` unless its key is already present. Existing
    /// entries, and their messages, are never replaced. Returns true if
    /// inserted.
    pub fn insert_if_absent(&mut self, conversation: Conversation) -> bool {
        let key = conversation.key();
        if self.conversations.contains_key(&key) {
            return false;
        }
        self.conversations.insert(key, conversation);
        true
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
    }

    /// True if the conversation holds a provisional entry whose send has
    /// not been answered yet.
    pub fn has_in_flight(&self, key: &ConversationKey) -> bool {
        self.conversations.get(key).is_some_and(|c| {
            c.messages
                .iter()
                .any(|m| m.pending.is_some_and(|p| p.state == PendingState::InFlight))
        })
    }

    /// Put a provisional entry at the head of the conversation.
    pub fn prepend(&mut self, key: &ConversationKey, entry: MessageEntry) -> bool {
        match self.conversations.get_mut(key) {
            Some(conversation) => {
                conversation.messages.insert(0, entry);
                true
            }
            None => false,
        }
    }

    /// Remove the provisional entry created with `local_id`. Returns false
    /// if it is already gone (superseded by a merge, or a logout).
    pub fn remove_provisional(&mut self, key: &ConversationKey, local_id: Uuid) -> bool {
        let Some(conversation) = self.conversations.get_mut(key) else {
            return false;
        };
        let before = conversation.messages.len();
        conversation
            .messages
            .retain(|m| m.local_id() != Some(local_id));
        conversation.messages.len() != before
    }

    /// Flip a provisional entry from in-flight to sent.
    pub fn mark_sent(&mut self, key: &ConversationKey, local_id: Uuid) -> Option<MessageEntry> {
        let conversation = self.conversations.get_mut(key)?;
        let entry = conversation
            .messages
            .iter_mut()
            .find(|m| m.local_id() == Some(local_id))?;
        if let Some(pending) = entry.pending.as_mut() {
            pending.state = PendingState::Sent;
        }
        Some(entry.clone())
    }
}
