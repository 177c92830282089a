//! Ordered, deduplicated message list backing the conversation timeline.
//!
//! Identity is the message id. The id sequence holds membership and display
//! order; the content map holds the latest copy of each message.
//!
//! `append` does not re-sort: ids land at the end of the sequence and the
//! order may be temporarily unsorted until the next `merge`. Callers that
//! append a batch and then merge avoid sorting twice. Order-dependent reads
//! (`first`, `last`, `index_of`, `message_at`) reflect the sequence as it is.

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{Message, MessageId};

/// Checked failures for positional access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message list is empty")]
    Empty,
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no content stored for message {0}")]
    MissingContent(MessageId),
}

#[derive(Debug, Default)]
pub struct MessageStore {
    ids: Vec<MessageId>,
    messages: HashMap<MessageId, Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Content for a known id.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if self.contains(id) {
            self.messages.get(id)
        } else {
            None
        }
    }

    /// Overwrite content by id without touching membership or order.
    ///
    /// Content for an id not yet in the list is kept and picked up when that
    /// id is later appended.
    pub fn update<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        for msg in messages {
            self.messages.insert(msg.id.clone(), msg);
        }
    }

    /// Add unseen ids to the end of the list and write content.
    pub fn append<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        let msgs: Vec<Message> = messages.into_iter().collect();
        for msg in &msgs {
            if !self.contains(&msg.id) {
                self.ids.push(msg.id.clone());
            }
        }
        self.update(msgs);
    }

    /// Append, then restore strict ascending `created_at` order.
    ///
    /// The sort is stable, so equal timestamps keep their current relative
    /// order.
    pub fn merge<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        self.append(messages);
        let messages = &self.messages;
        self.ids
            .sort_by_key(|id| messages.get(id).map(|m| m.created_at));
    }

    pub fn remove<'a, I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = &'a Message>,
    {
        self.remove_ids(messages.into_iter().map(|m| &m.id));
    }

    /// Delete by id. Unknown ids are ignored.
    pub fn remove_ids<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a MessageId>,
    {
        for id in ids {
            self.ids.retain(|known| known != id);
            self.messages.remove(id);
        }
    }

    pub fn remove_all(&mut self) {
        self.ids.clear();
        self.messages.clear();
    }

    /// Swap an entry's identity in place (provisional id -> server id).
    ///
    /// If `message.id` is already listed, the old entry is dropped and the new
    /// content overwrites the existing one. If `old_id` is unknown the message
    /// is appended.
    pub fn replace(&mut self, old_id: &MessageId, message: Message) {
        if *old_id == message.id {
            self.update([message]);
            return;
        }
        if self.contains(&message.id) {
            self.remove_ids([old_id]);
            self.update([message]);
            return;
        }
        match self.index_of(old_id) {
            Some(index) => {
                self.messages.remove(old_id);
                self.ids[index] = message.id.clone();
                self.messages.insert(message.id.clone(), message);
            }
            None => self.append([message]),
        }
    }

    pub fn index_of(&self, id: &MessageId) -> Option<usize> {
        self.ids.iter().position(|known| known == id)
    }

    pub fn message_at(&self, index: usize) -> Result<&Message, StoreError> {
        let id = self.ids.get(index).ok_or(StoreError::IndexOutOfRange {
            index,
            len: self.ids.len(),
        })?;
        self.messages
            .get(id)
            .ok_or_else(|| StoreError::MissingContent(id.clone()))
    }

    /// First message in list order whose last send did not fail.
    ///
    /// Used as the pagination cursor so a failed optimistic message never
    /// becomes the history boundary.
    pub fn first_success_message(&self) -> Option<&Message> {
        self.iter().find(|m| !m.failed)
    }

    pub fn first(&self) -> Result<&Message, StoreError> {
        if self.is_empty() {
            return Err(StoreError::Empty);
        }
        self.message_at(0)
    }

    pub fn last(&self) -> Result<&Message, StoreError> {
        if self.is_empty() {
            return Err(StoreError::Empty);
        }
        self.message_at(self.len() - 1)
    }

    /// Messages in list order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.ids.iter().filter_map(|id| self.messages.get(id))
    }

    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn msg(id: &str, secs: i64) -> Message {
        Message {
            id: id.into(),
            author_id: "alice".to_string(),
            created_at: at(secs),
            body: Some(format!("body {}", id)),
            attachment: None,
            delivery_state: None,
            failed: false,
        }
    }

    fn order(store: &MessageStore) -> Vec<&str> {
        store.ids().iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn test_merge_sorts_by_created_at() {
        let mut store = MessageStore::new();
        store.append([msg("c", 30), msg("a", 10)]);
        // Append leaves insertion order alone.
        assert_eq!(order(&store), vec!["c", "a"]);

        store.merge([msg("b", 20)]);
        assert_eq!(order(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_ties_keep_insertion_order() {
        let mut store = MessageStore::new();
        store.append([msg("x", 5), msg("y", 5)]);
        store.merge([msg("z", 5), msg("early", 1)]);
        assert_eq!(order(&store), vec!["early", "x", "y", "z"]);
    }

    #[test]
    fn test_reinsert_overwrites_content_not_position() {
        let mut store = MessageStore::new();
        store.merge([msg("a", 10), msg("b", 20)]);

        let mut edited = msg("a", 10);
        edited.body = Some("edited".to_string());
        store.append([edited]);

        assert_eq!(order(&store), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.first().unwrap().text(), "edited");
    }

    #[test]
    fn test_update_does_not_change_membership() {
        let mut store = MessageStore::new();
        store.merge([msg("a", 10), msg("b", 20)]);

        let mut changed = msg("b", 20);
        changed.failed = true;
        store.update([changed, msg("ghost", 5)]);

        assert_eq!(order(&store), vec!["a", "b"]);
        assert!(!store.contains(&"ghost".into()));
        assert!(store.get(&"ghost".into()).is_none());
        assert!(store.last().unwrap().failed);
    }

    #[test]
    fn test_update_content_picked_up_by_later_append() {
        let mut store = MessageStore::new();
        let mut early = msg("a", 10);
        early.body = Some("from update".to_string());
        store.update([early]);
        assert!(store.is_empty());

        store.merge([msg("a", 10)]);
        assert_eq!(store.first().unwrap().text(), "body a");
    }

    #[test]
    fn test_remove_and_contains() {
        let mut store = MessageStore::new();
        let a = msg("a", 10);
        store.merge([a.clone(), msg("b", 20)]);

        store.remove([&a]);
        assert!(!store.contains(&a.id));
        assert_eq!(store.len(), 1);

        // Unknown ids are ignored.
        store.remove_ids([&MessageId::from("nope")]);
        assert_eq!(order(&store), vec!["b"]);
    }

    #[test]
    fn test_remove_all() {
        let mut store = MessageStore::new();
        store.merge([msg("a", 10), msg("b", 20)]);
        store.remove_all();
        assert!(store.is_empty());
        assert_eq!(store.first(), Err(StoreError::Empty));
        assert_eq!(store.last(), Err(StoreError::Empty));
    }

    #[test]
    fn test_index_of_and_message_at() {
        let mut store = MessageStore::new();
        store.merge([msg("a", 10), msg("b", 20)]);

        assert_eq!(store.index_of(&"b".into()), Some(1));
        assert_eq!(store.index_of(&"zzz".into()), None);
        assert_eq!(store.message_at(0).unwrap().id.as_str(), "a");
        assert_eq!(
            store.message_at(2),
            Err(StoreError::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn test_first_success_message_skips_failed() {
        let mut store = MessageStore::new();
        assert!(store.first_success_message().is_none());

        let mut failed = msg("a", 10);
        failed.failed = true;
        store.merge([failed.clone()]);
        assert!(store.first_success_message().is_none());

        store.merge([msg("b", 20), msg("c", 30)]);
        assert_eq!(store.first_success_message().unwrap().id.as_str(), "b");
    }

    #[test]
    fn test_replace_swaps_identity_in_place() {
        let mut store = MessageStore::new();
        store.merge([msg("a", 10), msg("tmp", 20), msg("c", 30)]);

        let mut confirmed = msg("server-1", 20);
        confirmed.body = Some("confirmed".to_string());
        store.replace(&"tmp".into(), confirmed);

        assert_eq!(order(&store), vec!["a", "server-1", "c"]);
        assert!(!store.contains(&"tmp".into()));
        assert_eq!(store.message_at(1).unwrap().text(), "confirmed");
    }

    #[test]
    fn test_replace_when_new_id_already_listed() {
        let mut store = MessageStore::new();
        store.merge([msg("tmp", 10), msg("server-1", 11)]);

        store.replace(&"tmp".into(), msg("server-1", 11));
        assert_eq!(order(&store), vec!["server-1"]);
    }

    #[test]
    fn test_replace_unknown_old_id_appends() {
        let mut store = MessageStore::new();
        store.replace(&"tmp".into(), msg("server-1", 11));
        assert_eq!(order(&store), vec!["server-1"]);
    }

    #[test]
    fn test_append_then_merge_sorted_for_many_sequences() {
        // Rotations of the same timestamps, including duplicates.
        let stamps = [7, 3, 9, 3, 1, 8, 7, 2, 0, 5];
        for rotation in 0..stamps.len() {
            let mut store = MessageStore::new();
            let rotated = stamps.iter().cycle().skip(rotation).take(stamps.len());
            for (i, s) in rotated.enumerate() {
                store.append([msg(&format!("m{}", i), *s)]);
            }
            store.merge(std::iter::empty());

            let entries: Vec<(DateTime<Utc>, usize)> = store
                .iter()
                .map(|m| (m.created_at, m.id.as_str()[1..].parse().unwrap()))
                .collect();
            assert_eq!(entries.len(), stamps.len());
            // Strictly ordered by (created_at, insertion index).
            assert!(entries.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
