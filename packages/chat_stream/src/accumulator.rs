//! Response accumulator: merges inbound fragments into one growing reply.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How inbound fragments relate to the running reply.
///
/// This is the one place where fragments are interpreted; the accumulator
/// itself only ever appends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentDiscipline {
    /// Each fragment is the next chunk of the reply.
    #[default]
    Delta,
    /// Each fragment is the full reply so far.
    Snapshot,
}

impl FragmentDiscipline {
    /// Turn an inbound fragment into the text to append to `current`.
    ///
    /// Returns `None` when there is nothing to append. Under `Snapshot`, a
    /// fragment that does not extend `current` is dropped.
    pub fn to_delta(&self, current: &str, incoming: String) -> Option<String> {
        match self {
            FragmentDiscipline::Delta => Some(incoming),
            FragmentDiscipline::Snapshot => match incoming.strip_prefix(current) {
                Some("") => None,
                Some(suffix) => Some(suffix.to_string()),
                None => {
                    warn!(
                        current_len = current.len(),
                        incoming_len = incoming.len(),
                        "snapshot does not extend the running reply, dropping"
                    );
                    None
                }
            },
        }
    }
}

/// Append-only reply buffer for one turn.
#[derive(Debug, Default, Clone)]
pub struct ResponseAccumulator {
    reply: String,
    fragments: usize,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.reply.push_str(fragment);
        self.fragments += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.reply
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_order() {
        let mut acc = ResponseAccumulator::new();
        acc.push("He");
        acc.push("llo");
        assert_eq!(acc.as_str(), "Hello");
        assert_eq!(acc.fragment_count(), 2);
    }

    #[test]
    fn empty_fragment_still_counts() {
        let mut acc = ResponseAccumulator::new();
        assert!(acc.is_empty());
        acc.push("");
        assert!(!acc.is_empty());
        assert_eq!(acc.as_str(), "");
    }

    #[test]
    fn delta_passes_through() {
        let d = FragmentDiscipline::Delta;
        assert_eq!(d.to_delta("Hel", "lo".to_string()).as_deref(), Some("lo"));
        assert_eq!(d.to_delta("Hel", "Hello".to_string()).as_deref(), Some("Hello"));
    }

    #[test]
    fn snapshot_yields_suffix() {
        let s = FragmentDiscipline::Snapshot;
        assert_eq!(s.to_delta("", "He".to_string()).as_deref(), Some("He"));
        assert_eq!(s.to_delta("He", "Hello".to_string()).as_deref(), Some("llo"));
        assert_eq!(s.to_delta("Hello", "Hello".to_string()), None);
    }

    #[test]
    fn snapshot_rewrite_is_dropped() {
        let s = FragmentDiscipline::Snapshot;
        assert_eq!(s.to_delta("Hello", "Help".to_string()), None);
    }

    #[test]
    fn discipline_config_names() {
        let d: FragmentDiscipline = serde_json::from_str("\"snapshot\"").unwrap();
        assert_eq!(d, FragmentDiscipline::Snapshot);
        assert_eq!(FragmentDiscipline::default(), FragmentDiscipline::Delta);
    }
}
