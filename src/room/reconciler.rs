use std::collections::HashSet;

use uuid::Uuid;

use crate::common::{ChatMessage, MessageOrigin};

/// What happened to a message handed to [`MessageReconciler::push_live`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Appended,
    /// The echo of one of our optimistic sends took its place.
    Confirmed,
    /// Its id is already in the list.
    Duplicate,
}

/// Gộp lịch sử, tin nhắn realtime và tin gửi lạc quan thành một danh sách hiển thị.
///
/// The list is append-only in arrival order with unique ids. The only
/// exceptions are history, which always sits in front of anything that
/// arrived live before it, and an optimistic entry, which is swapped in
/// place for its confirmed echo when the echo carries the same `client_id`.
#[derive(Debug, Default)]
pub struct MessageReconciler {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    /// Inserts a history page after any history already present and before
    /// live/optimistic entries. Returns how many messages were new.
    pub fn load_history(&mut self, history: Vec<ChatMessage>) -> usize {
        let fresh: Vec<ChatMessage> = history
            .into_iter()
            .filter(|message| self.ids.insert(message.id.clone()))
            .collect();
        let added = fresh.len();

        let at = self
            .messages
            .iter()
            .take_while(|message| message.origin == MessageOrigin::History)
            .count();
        self.messages.splice(at..at, fresh);
        added
    }

    pub fn push_live(&mut self, message: ChatMessage) -> Reconciled {
        if let Some(client_id) = message.client_id {
            let pending = self
                .messages
                .iter()
                .position(|entry| entry.is_pending() && entry.client_id == Some(client_id));
            if let Some(pos) = pending {
                return self.confirm(pos, message);
            }
        }

        if !self.ids.insert(message.id.clone()) {
            log::debug!("Dropping duplicate message {}", message.id);
            return Reconciled::Duplicate;
        }
        self.messages.push(message);
        Reconciled::Appended
    }

    pub fn push_optimistic(&mut self, message: ChatMessage) {
        debug_assert!(message.is_pending());
        self.ids.insert(message.id.clone());
        self.messages.push(message);
    }

    /// Removes the optimistic entry for `client_id`, if it is still pending.
    pub fn discard_pending(&mut self, client_id: Uuid) -> Option<ChatMessage> {
        let pos = self
            .messages
            .iter()
            .position(|entry| entry.is_pending() && entry.client_id == Some(client_id))?;
        let discarded = self.messages.remove(pos);
        self.ids.remove(&discarded.id);
        Some(discarded)
    }

    /// Appends the messages of a re-fetched page that are not in the list yet.
    /// Returns how many were added or confirmed.
    pub fn merge_gap(&mut self, page: Vec<ChatMessage>) -> usize {
        page.into_iter()
            .map(|message| self.push_live(message))
            .filter(|outcome| *outcome != Reconciled::Duplicate)
            .count()
    }

    fn confirm(&mut self, pos: usize, message: ChatMessage) -> Reconciled {
        let optimistic = std::mem::replace(&mut self.messages[pos], message);
        self.ids.remove(&optimistic.id);

        let confirmed_id = self.messages[pos].id.clone();
        if !self.ids.insert(confirmed_id) {
            // The server id was already delivered through another path.
            self.messages.remove(pos);
            return Reconciled::Duplicate;
        }
        Reconciled::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Session, WireMessage};

    fn wire(id: Option<&str>, author: &str, body: &str, client_id: Option<Uuid>) -> WireMessage {
        WireMessage {
            id: id.map(str::to_string),
            username: author.to_string(),
            message: body.to_string(),
            client_id,
            sent_at: None,
        }
    }

    fn history(session: &Session, entries: &[(&str, &str)]) -> Vec<ChatMessage> {
        entries
            .iter()
            .map(|(id, author)| {
                let record = wire(Some(id), author, "text", None);
                ChatMessage::from_wire(record, MessageOrigin::History, session)
            })
            .collect()
    }

    fn live(session: &Session, id: &str, author: &str, client_id: Option<Uuid>) -> ChatMessage {
        let record = wire(Some(id), author, "text", client_id);
        ChatMessage::from_wire(record, MessageOrigin::Live, session)
    }

    fn ids(reconciler: &MessageReconciler) -> Vec<&str> {
        reconciler.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn history_is_tagged_against_the_session() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        let page = history(&session, &[("1", "pjh1"), ("2", "pjh2"), ("3", "pjh1")]);
        reconciler.load_history(page);

        let own: Vec<bool> = reconciler.messages().iter().map(|m| m.is_own).collect();
        assert_eq!(own, vec![false, true, false]);
    }

    #[test]
    fn live_messages_go_to_the_tail() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        reconciler.load_history(history(&session, &[("1", "pjh1"), ("2", "pjh2")]));

        let outcome = reconciler.push_live(live(&session, "7", "pjh1", None));
        assert_eq!(outcome, Reconciled::Appended);
        assert_eq!(ids(&reconciler), vec!["1", "2", "7"]);
        assert!(!reconciler.messages()[2].is_own);
    }

    #[test]
    fn late_history_lands_in_front_of_early_live_messages() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        reconciler.push_live(live(&session, "9", "pjh1", None));
        let page = history(&session, &[("1", "pjh1"), ("9", "pjh1"), ("2", "pjh1")]);
        reconciler.load_history(page);

        assert_eq!(ids(&reconciler), vec!["1", "2", "9"]);
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        reconciler.push_live(live(&session, "7", "pjh1", None));
        let outcome = reconciler.push_live(live(&session, "7", "pjh1", None));
        assert_eq!(outcome, Reconciled::Duplicate);
        assert_eq!(reconciler.len(), 1);
    }

    #[test]
    fn echo_with_client_id_replaces_the_optimistic_entry() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        let client_id = Uuid::new_v4();
        reconciler.push_live(live(&session, "1", "pjh1", None));
        reconciler.push_optimistic(ChatMessage::optimistic(&session, "hello", client_id));
        reconciler.push_live(live(&session, "2", "pjh1", None));

        let outcome = reconciler.push_live(live(&session, "42", "pjh2", Some(client_id)));

        assert_eq!(outcome, Reconciled::Confirmed);
        assert_eq!(ids(&reconciler), vec!["1", "42", "2"]);
        assert_eq!(reconciler.pending(), 0);
        assert!(reconciler.messages()[1].is_own);
    }

    #[test]
    fn echo_without_client_id_is_appended_next_to_the_optimistic_copy() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        reconciler.push_optimistic(ChatMessage::optimistic(&session, "hello", Uuid::new_v4()));

        let outcome = reconciler.push_live(live(&session, "42", "pjh2", None));
        assert_eq!(outcome, Reconciled::Appended);
        assert_eq!(reconciler.len(), 2);
        assert_eq!(reconciler.pending(), 1);
    }

    #[test]
    fn gap_fill_only_adds_unknown_messages() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        reconciler.load_history(history(&session, &[("1", "pjh1"), ("2", "pjh1")]));
        reconciler.push_live(live(&session, "3", "pjh1", None));

        let refetched = history(
            &session,
            &[("2", "pjh1"), ("3", "pjh1"), ("4", "pjh1"), ("5", "pjh2")],
        );
        assert_eq!(reconciler.merge_gap(refetched), 2);
        assert_eq!(ids(&reconciler), vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn discarded_send_leaves_no_trace() {
        let session = Session::new("pjh2", "");
        let mut reconciler = MessageReconciler::new();
        let client_id = Uuid::new_v4();
        reconciler.push_live(live(&session, "1", "pjh1", None));
        reconciler.push_optimistic(ChatMessage::optimistic(&session, "hello", client_id));

        let discarded = reconciler.discard_pending(client_id).unwrap();
        assert_eq!(discarded.body, "hello");
        assert_eq!(ids(&reconciler), vec!["1"]);
        assert!(reconciler.discard_pending(client_id).is_none());

        // A confirmed message is no longer pending and stays.
        let confirmed = Uuid::new_v4();
        reconciler.push_optimistic(ChatMessage::optimistic(&session, "again", confirmed));
        reconciler.push_live(live(&session, "2", "pjh2", Some(confirmed)));
        assert!(reconciler.discard_pending(confirmed).is_none());
        assert_eq!(ids(&reconciler), vec!["1", "2"]);
    }
}
