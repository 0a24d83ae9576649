/// A single tracked message within an in-memory conversation window.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    pub id: i64,
    pub user_id: Option<i64>,
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub ts: i64,
}

/// In-memory-only tracker for one `(chat_id, thread_id)` conversation,
/// exclusively owned by the episode engine per the ownership invariant: no
/// other component reads or writes a `ConversationWindow` directly.
#[derive(Debug, Clone, Default)]
pub struct ConversationWindow {
    pub messages: Vec<WindowMessage>,
    pub participant_ids: std::collections::HashSet<i64>,
    pub last_activity: i64,
}

impl ConversationWindow {
    pub fn push(&mut self, msg: WindowMessage) {
        self.last_activity = msg.ts;
        if let Some(uid) = msg.user_id {
            self.participant_ids.insert(uid);
        }
        self.messages.push(msg);
    }

    pub fn is_idle(&self, now: i64, timeout_secs: u64) -> bool {
        now - self.last_activity > timeout_secs as i64
    }

    pub fn at_capacity(&self, max_messages: usize) -> bool {
        self.messages.len() >= max_messages
    }

    pub fn eligible_for_episode(&self, min_messages: usize) -> bool {
        self.messages.len() >= min_messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_updates_participants_and_last_activity() {
        let mut window = ConversationWindow::default();
        window.push(WindowMessage { id: 1, user_id: Some(7), text: None, embedding: None, ts: 100 });
        window.push(WindowMessage { id: 2, user_id: Some(8), text: None, embedding: None, ts: 150 });

        assert_eq!(window.last_activity, 150);
        assert_eq!(window.participant_ids.len(), 2);
    }

    #[test]
    fn idle_detection_uses_timeout() {
        let mut window = ConversationWindow::default();
        window.push(WindowMessage { id: 1, user_id: None, text: None, embedding: None, ts: 0 });
        assert!(window.is_idle(2000, 1800));
        assert!(!window.is_idle(100, 1800));
    }
}
