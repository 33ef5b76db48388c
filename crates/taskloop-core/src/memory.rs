//! Conversation Memory
//!
//! Bounded, ordered turn log for a single agent run. When the cap is
//! exceeded the first entry (normally the original request) stays as an
//! anchor and only the most recent `cap - 1` entries are kept beside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Role;

/// Default number of entries kept
pub const DEFAULT_MEMORY_CAP: usize = 100;

/// One turn in the log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: Role,
    pub content: String,
    pub turn: usize,

    /// Tools the assistant used in this turn (assistant entries only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn user(content: impl Into<String>, turn: usize) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            turn,
            tools_used: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, turn: usize, tools_used: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            turn,
            tools_used: Some(tools_used),
            timestamp: Utc::now(),
        }
    }

    fn render(&self) -> String {
        match self.role {
            Role::Assistant => match self.tools_used.as_deref() {
                Some(tools) if !tools.is_empty() => format!(
                    "Assistant (Turn {}) [Used tools: {}]: {}",
                    self.turn,
                    tools.join(", "),
                    self.content
                ),
                _ => format!("Assistant (Turn {}): {}", self.turn, self.content),
            },
            Role::User => format!("User (Turn {}): {}", self.turn, self.content),
            Role::System => format!("System (Turn {}): {}", self.turn, self.content),
        }
    }
}

/// Anchor-preserving, capped turn log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    entries: Vec<MemoryEntry>,
    max_entries: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAP)
    }
}

impl ConversationMemory {
    /// Empty memory holding at most `max_entries` (at least 1)
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn add_user(&mut self, content: impl Into<String>, turn: usize) {
        self.push(MemoryEntry::user(content, turn));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>, turn: usize, tools_used: Vec<String>) {
        self.push(MemoryEntry::assistant(content, turn, tools_used));
    }

    /// Append an entry, trimming if the cap is exceeded
    pub fn push(&mut self, entry: MemoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            let keep_recent = self.max_entries - 1;
            self.retain_anchor_and_recent(keep_recent);
            tracing::debug!(cap = self.max_entries, "Trimmed conversation memory");
        }
    }

    /// Reduce to the anchor plus the last `keep_recent` entries.
    ///
    /// Never called by the agent loop itself.
    pub fn compress(&mut self, keep_recent: usize) {
        self.retain_anchor_and_recent(keep_recent);
    }

    fn retain_anchor_and_recent(&mut self, keep_recent: usize) {
        if self.entries.len() <= keep_recent + 1 {
            return;
        }
        let tail_start = self.entries.len() - keep_recent;
        self.entries.drain(1..tail_start);
    }

    /// Render the transcript, optionally only the last `recent_only` entries
    pub fn build_context(&self, recent_only: Option<usize>) -> String {
        let start = recent_only.map_or(0, |n| self.entries.len().saturating_sub(n));
        self.entries[start..]
            .iter()
            .map(MemoryEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Owned copy of the current entries
    pub fn snapshot(&self) -> Vec<MemoryEntry> {
        self.entries.clone()
    }

    pub fn last(&self) -> Option<&MemoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
