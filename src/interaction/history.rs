//! Bounded conversation history for one room.

use std::collections::VecDeque;

use crate::base::types::Event;

/// Ordered buffer of at most `capacity` recorded events; the oldest is evicted first.
///
/// Events are kept exactly in recording order. Duplicates are kept as distinct entries.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    capacity: usize,
    entries: VecDeque<Event>,
}

impl ConversationHistory {
    /// Create an empty history.
    ///
    /// A capacity of zero is raised to one so the triggering event is always part of its context.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an event, evicting the oldest entry when full.
    pub fn record(&mut self, event: Event) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(event);
    }

    /// Read-only view of the recorded events, oldest first.
    pub fn snapshot(&self) -> impl ExactSizeIterator<Item = &Event> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn event(id: &str) -> Event {
        Event::new(id, "@alice:example.org", id, Utc::now(), "!room:example.org", json!({ "body": id }))
    }

    fn ids(history: &ConversationHistory) -> Vec<&str> {
        history.snapshot().map(|e| e.event_id.as_str()).collect()
    }

    #[test]
    fn test_record_keeps_insertion_order() {
        let mut history = ConversationHistory::new(3);

        history.record(event("$1"));
        history.record(event("$2"));

        assert_eq!(ids(&history), vec!["$1", "$2"]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_record_evicts_oldest_when_full() {
        let n = 4;
        let mut history = ConversationHistory::new(n);

        for i in 1..=n + 1 {
            history.record(event(&format!("${i}")));
        }

        assert_eq!(history.len(), n);
        assert_eq!(ids(&history), vec!["$2", "$3", "$4", "$5"]);
    }

    #[test]
    fn test_capacity_two_retains_last_two() {
        let mut history = ConversationHistory::new(2);

        history.record(event("$first"));
        history.record(event("$second"));
        history.record(event("$third"));

        assert_eq!(ids(&history), vec!["$second", "$third"]);
    }

    #[test]
    fn test_duplicates_are_distinct_entries() {
        let mut history = ConversationHistory::new(3);

        history.record(event("$dup"));
        history.record(event("$dup"));

        assert_eq!(ids(&history), vec!["$dup", "$dup"]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut history = ConversationHistory::new(0);

        history.record(event("$1"));
        history.record(event("$2"));

        assert_eq!(history.capacity(), 1);
        assert_eq!(ids(&history), vec!["$2"]);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut history = ConversationHistory::new(2);
        history.record(event("$1"));

        let _ = history.snapshot().count();
        let _ = history.snapshot().count();

        assert_eq!(ids(&history), vec!["$1"]);
    }
}
