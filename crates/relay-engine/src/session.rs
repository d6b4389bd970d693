use relay_contracts::events::now_utc_iso;
use relay_contracts::rules::RuleIndex;
use relay_contracts::session::{Role, SessionSummary, Transcript, Turn};
use uuid::Uuid;

use crate::thread::ConversationThread;

/// Everything one user session owns. Passed by `&mut` into each turn, so a
/// session can have at most one turn in flight.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    started_at: String,
    pub(crate) thread: ConversationThread,
    pub(crate) rules: RuleIndex,
    pub(crate) transcript: Transcript,
    /// Most recent upload, sent with the next user message.
    pub(crate) pending_attachment: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Self::new_id())
    }

    pub fn with_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: now_utc_iso(),
            thread: ConversationThread::new(),
            rules: RuleIndex::new(),
            transcript: Transcript::new(),
            pending_attachment: None,
        }
    }

    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread.thread_id()
    }

    pub fn rules(&self) -> &RuleIndex {
        &self.rules
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Records an upload for file rules and queues it as the attachment of
    /// the next user message, replacing any upload still queued.
    pub fn register_upload(&mut self, name: impl Into<String>, remote_id: impl Into<String>) {
        let remote_id = remote_id.into();
        self.rules.register_upload(name, remote_id.clone());
        self.pending_attachment = Some(remote_id);
    }

    pub(crate) fn record(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub fn summary(&self) -> SessionSummary {
        let images_attached = self
            .transcript
            .turns()
            .iter()
            .filter(|turn| turn.role == Role::Assistant && turn.image.is_some())
            .count();
        SessionSummary {
            session_id: self.session_id.clone(),
            thread_id: self.thread.thread_id().map(str::to_string),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            user_turns: self.transcript.count(Role::User) as u64,
            assistant_turns: self.transcript.count(Role::Assistant) as u64,
            images_attached: images_attached as u64,
            rule_count: self.rules.rules().len() as u64,
            uploads: SessionSummary::upload_rows(&self.rules.uploads()),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use relay_contracts::session::{Turn, TurnImage};
    use uuid::Uuid;

    use super::Session;

    #[test]
    fn new_sessions_get_distinct_uuid_ids() {
        let first = Session::new();
        let second = Session::new();
        assert_ne!(first.session_id(), second.session_id());
        assert!(Uuid::parse_str(first.session_id()).is_ok());
        assert_eq!(first.thread_id(), None);
        assert!(first.transcript().is_empty());
    }

    #[test]
    fn summary_counts_turns_images_and_uploads() -> anyhow::Result<()> {
        let mut session = Session::with_id("sess-1");
        session.register_upload("cat.png", "file_cat");
        session.register_upload("dog.png", "file_dog");
        session
            .rules
            .load_rules_str(r#"{"rules": [{"match": "cat", "file": "cat.png"}]}"#)?;
        session.record(Turn::user("show me the cat"));
        session.record(Turn::assistant(
            "here",
            Some(TurnImage {
                remote_id: "file_cat".to_string(),
                bytes: vec![1],
            }),
        ));
        session.record(Turn::user("and a dog"));
        session.record(Turn::assistant("no image", None));

        assert_eq!(session.pending_attachment.as_deref(), Some("file_dog"));
        let summary = session.summary();

        assert_eq!(summary.session_id, "sess-1");
        assert_eq!(summary.thread_id, None);
        assert_eq!(summary.user_turns, 2);
        assert_eq!(summary.assistant_turns, 2);
        assert_eq!(summary.images_attached, 1);
        assert_eq!(summary.rule_count, 1);
        assert_eq!(summary.uploads.len(), 2);
        assert_eq!(summary.uploads[0]["name"], "cat.png");
        assert_eq!(summary.uploads[1]["remote_id"], "file_dog");
        Ok(())
    }
}
