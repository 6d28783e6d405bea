//! In-memory conversation transcript for the current view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// File name, or "Recorded Audio", for a user entry with an attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: String, attachment: Option<String>, mode: Mode) {
        self.entries.push(TranscriptEntry {
            id: Uuid::new_v4(),
            role: Role::User,
            content,
            attachment,
            mode: Some(mode),
            at: Utc::now(),
        });
    }

    /// Mirror the running reply into the trailing assistant entry.
    pub fn update_assistant(&mut self, reply: &str) {
        match self.entries.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.clear();
                last.content.push_str(reply);
            }
            _ => self.entries.push(TranscriptEntry {
                id: Uuid::new_v4(),
                role: Role::Assistant,
                content: reply.to_string(),
                attachment: None,
                mode: None,
                at: Utc::now(),
            }),
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_updates_in_place() {
        let mut t = Transcript::new();
        t.push_user("hi".into(), None, Mode::Generic);
        t.update_assistant("He");
        t.update_assistant("Hello");
        assert_eq!(t.len(), 2);
        assert_eq!(t.last().unwrap().role, Role::Assistant);
        assert_eq!(t.last().unwrap().content, "Hello");
    }

    #[test]
    fn new_turn_gets_new_assistant_entry() {
        let mut t = Transcript::new();
        t.push_user("one".into(), None, Mode::Generic);
        t.update_assistant("first");
        t.push_user("two".into(), Some("report.pdf".into()), Mode::DocumentProcessing);
        t.update_assistant("second");

        let roles: Vec<Role> = t.entries().iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(t.entries()[1].content, "first");
        assert_eq!(t.entries()[2].attachment.as_deref(), Some("report.pdf"));
        assert_eq!(t.entries()[2].mode, Some(Mode::DocumentProcessing));
    }

    #[test]
    fn entry_serde_omits_empty_fields() {
        let mut t = Transcript::new();
        t.update_assistant("x");
        let v = serde_json::to_value(&t.entries()[0]).unwrap();
        assert_eq!(v["role"], "assistant");
        assert!(v.get("attachment").is_none());
        assert!(v.get("mode").is_none());
    }
}
