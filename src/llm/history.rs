//! Append-only conversation history with oldest-first truncation

use serde::Serialize;

/// Entries that survive truncation even when still over budget
pub const MIN_RETAINED_ENTRIES: usize = 2;

/// Speaker of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Label used in plain-text transcripts
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One role-tagged entry of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    pub role: Role,
    pub content: String,
}

impl Utterance {
    /// `Role: content` line for transcript-style prompts
    #[must_use]
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.label(), self.content)
    }
}

/// Chronological conversation history for providers without native sessions
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    entries: Vec<Utterance>,
}

impl ConversationHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(Utterance {
            role,
            content: content.into(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn entries(&self) -> &[Utterance] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain-text prompt: one `Role: content` line per entry, then an open
    /// `Assistant:` line for the model to complete
    #[must_use]
    pub fn transcript_prompt(&self) -> String {
        let mut prompt = self
            .entries
            .iter()
            .map(Utterance::transcript_line)
            .collect::<Vec<_>>()
            .join("\n");
        if !prompt.is_empty() {
            prompt.push('\n');
        }
        prompt.push_str("Assistant:");
        prompt
    }

    /// Drop entries from the oldest end until `size_of(self) <= budget`
    ///
    /// Never leaves fewer than [`MIN_RETAINED_ENTRIES`]; stops there even if the
    /// history is still over budget. Returns the number of entries removed.
    pub fn truncate_to_budget<F>(&mut self, budget: usize, size_of: F) -> usize
    where
        F: Fn(&Self) -> usize,
    {
        let mut removed = 0;
        while size_of(self) > budget && self.entries.len() > MIN_RETAINED_ENTRIES {
            self.entries.remove(0);
            removed += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt_len(history: &ConversationHistory) -> usize {
        history.transcript_prompt().len()
    }

    fn sample_history(turns: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..turns {
            history.push(Role::User, format!("question number {i}"));
            history.push(Role::Assistant, format!("answer number {i}"));
        }
        history
    }

    #[test]
    fn test_transcript_prompt_format() {
        let mut history = ConversationHistory::new();
        assert_eq!(history.transcript_prompt(), "Assistant:");

        history.push(Role::User, "Hi");
        history.push(Role::Assistant, "Hello");
        history.push(Role::User, "Joke?");
        assert_eq!(
            history.transcript_prompt(),
            "User: Hi\nAssistant: Hello\nUser: Joke?\nAssistant:"
        );
    }

    #[test]
    fn test_truncation_removes_oldest_first() {
        let mut history = sample_history(5);
        let newest: Vec<_> = history.entries()[6..].to_vec();

        let budget = prompt_len(&history) - 30;
        let removed = history.truncate_to_budget(budget, prompt_len);

        assert!(removed > 0);
        assert!(prompt_len(&history) <= budget);
        // Survivors keep their relative order and are the newest entries
        assert!(history.entries().ends_with(&newest));
        assert_eq!(history.entries()[0].content, sample_history(5).entries()[removed].content);
    }

    #[test]
    fn test_truncation_respects_floor() {
        let mut history = sample_history(4);
        let removed = history.truncate_to_budget(1, prompt_len);

        assert_eq!(removed, 6);
        assert_eq!(history.len(), MIN_RETAINED_ENTRIES);
        assert_eq!(history.entries()[0].content, "question number 3");
        assert_eq!(history.entries()[1].content, "answer number 3");
    }

    #[test]
    fn test_truncation_is_idempotent_within_budget() {
        let mut history = sample_history(3);
        let budget = prompt_len(&history) - 20;
        history.truncate_to_budget(budget, prompt_len);
        let snapshot = history.entries().to_vec();

        assert_eq!(history.truncate_to_budget(budget, prompt_len), 0);
        assert_eq!(history.entries(), snapshot.as_slice());
    }

    #[test]
    fn test_short_history_untouched() {
        let mut history = ConversationHistory::new();
        history.push(Role::User, "a very long message that blows the budget");
        assert_eq!(history.truncate_to_budget(5, prompt_len), 0);
        assert_eq!(history.len(), 1);
    }
}
