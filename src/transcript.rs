//! Rolling conversation log built from incremental transcription fragments.
//!
//! Per stream (`User`, `Ai`) there is at most one trailing non-final entry.
//! A fragment for the same stream replaces that entry's text; a fragment for
//! the other stream finalizes it first, modeling the turn hand-off. A
//! turn-complete signal finalizes whatever is open. `System` entries are
//! final on insertion.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationMessage {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Default)]
pub struct TranscriptLog {
    messages: Vec<ConversationMessage>,
    open: Option<usize>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a partial fragment. The fragment text is the stream's full
    /// current-turn text, not a delta.
    pub fn apply_partial(&mut self, speaker: Speaker, text: &str) {
        debug_assert!(speaker != Speaker::System, "system entries are never partial");
        if let Some(index) = self.open {
            if self.messages[index].speaker == speaker {
                self.messages[index].text = text.to_string();
                return;
            }
            // Hand-off to the other stream closes the open entry.
            self.messages[index].is_final = true;
        }
        self.messages.push(ConversationMessage {
            speaker,
            text: text.to_string(),
            is_final: false,
        });
        self.open = Some(self.messages.len() - 1);
    }

    /// Finalizes the open entry, if any. Called on turn completion and
    /// proactively before a fresh text turn is sent.
    pub fn finalize_open(&mut self) {
        if let Some(index) = self.open.take() {
            self.messages[index].is_final = true;
        }
    }

    /// Appends an immediately-final system entry (tool mutations, errors).
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.messages.push(ConversationMessage {
            speaker: Speaker::System,
            text: text.into(),
            is_final: true,
        });
    }

    /// The live current-turn text for a stream, empty once finalized.
    pub fn open_text(&self, speaker: Speaker) -> String {
        self.open
            .map(|index| &self.messages[index])
            .filter(|message| message.speaker == speaker)
            .map(|message| message.text.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_partials_merge_into_one_message() {
        let mut log = TranscriptLog::new();
        log.apply_partial(Speaker::User, "Hel");
        log.apply_partial(Speaker::User, "Hello");
        assert_eq!(log.messages().len(), 1);
        assert_eq!(log.messages()[0].text, "Hello");
        assert!(!log.messages()[0].is_final);
    }

    #[test]
    fn stream_hand_off_finalizes_the_prior_entry() {
        let mut log = TranscriptLog::new();
        log.apply_partial(Speaker::User, "Add a task");
        log.apply_partial(Speaker::Ai, "Sure, adding");
        assert_eq!(log.messages().len(), 2);
        assert!(log.messages()[0].is_final);
        assert_eq!(log.messages()[0].speaker, Speaker::User);
        assert!(!log.messages()[1].is_final);
        assert_eq!(log.open_text(Speaker::Ai), "Sure, adding");
        assert_eq!(log.open_text(Speaker::User), "");
    }

    #[test]
    fn turn_complete_finalizes_and_clears_the_live_text() {
        let mut log = TranscriptLog::new();
        log.apply_partial(Speaker::Ai, "Done.");
        log.finalize_open();
        assert!(log.messages()[0].is_final);
        assert_eq!(log.open_text(Speaker::Ai), "");

        // A later fragment opens a fresh entry rather than reviving the old one.
        log.apply_partial(Speaker::Ai, "Anything else?");
        assert_eq!(log.messages().len(), 2);
    }

    #[test]
    fn system_entries_are_final_and_leave_open_entries_alone() {
        let mut log = TranscriptLog::new();
        log.apply_partial(Speaker::Ai, "Adding the task now");
        log.push_system("Added task \"Write report\" to the plan.");
        assert_eq!(log.messages().len(), 2);
        assert!(log.messages()[1].is_final);
        // The AI's open entry is still live.
        assert_eq!(log.open_text(Speaker::Ai), "Adding the task now");
        log.apply_partial(Speaker::Ai, "Adding the task now. Done");
        assert_eq!(log.open_text(Speaker::Ai), "Adding the task now. Done");
    }
}
