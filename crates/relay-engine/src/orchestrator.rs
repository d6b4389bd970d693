use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use relay_contracts::events::{EventPayload, EventWriter};
use relay_contracts::runs::RunStatus;
use relay_contracts::session::{write_summary, SessionSummary, Turn, TurnImage};
use relay_contracts::RelayResult;
use serde_json::{json, Map, Value};

use crate::api::AssistantApi;
use crate::config::RelayConfig;
use crate::extract::ResponseExtractor;
use crate::files::RemoteFileStore;
use crate::session::Session;
use crate::thread::RunEvent;

/// Shown when a completed run produced no text.
pub const NO_TEXT_PLACEHOLDER: &str = "(no text reply)";

/// Runs one user utterance through the assistant and the rule index.
pub struct TurnOrchestrator {
    api: Arc<dyn AssistantApi>,
    config: RelayConfig,
    events: EventWriter,
}

enum RunOutcome {
    Reply(String),
    Ended(RunStatus),
}

impl TurnOrchestrator {
    pub fn new(api: Arc<dyn AssistantApi>, config: RelayConfig, events: EventWriter) -> Self {
        Self {
            api,
            config,
            events,
        }
    }

    /// Opens a session whose id matches the event log's.
    pub fn start_session(&self) -> Session {
        let session = Session::with_id(self.events.session_id());
        self.events.emit_or_warn(
            "session_started",
            map_object(json!({
                "assistant_id": self.config.assistant_id,
                "api_base": self.config.api_base,
                "citations": self.config.citations,
                "poll_interval_s": self.config.poll.interval.as_secs_f64(),
                "poll_timeout_s": self.config.poll.timeout.as_secs_f64(),
            })),
        );
        session
    }

    /// Produces the assistant turn for `utterance`. Never fails: remote
    /// problems are reported in the turn text.
    pub fn handle_turn(&self, session: &mut Session, utterance: &str) -> Turn {
        session.record(Turn::user(utterance));

        let (mut text, outcome) = match self.run_assistant(session, utterance) {
            Ok(RunOutcome::Reply(text)) => (text, "completed".to_string()),
            Ok(RunOutcome::Ended(status)) => (
                format!("The assistant run ended with status '{status}'."),
                status.as_str().to_string(),
            ),
            Err(err) => (
                format!("The assistant request failed: {err}"),
                err.kind().to_string(),
            ),
        };

        let image = self.resolve_image(session, utterance, &mut text);

        let turn = Turn::assistant(text, image);
        session.record(turn.clone());
        self.events.emit_or_warn(
            "turn_finished",
            map_object(json!({
                "thread_id": session.thread_id(),
                "turn_index": session.transcript().len(),
                "outcome": outcome,
                "has_image": turn.image.is_some(),
                "chars": turn.text.chars().count(),
            })),
        );
        turn
    }

    fn run_assistant(&self, session: &mut Session, utterance: &str) -> RelayResult<RunOutcome> {
        let api = self.api.as_ref();
        let created = session.thread.thread_id().is_none();
        let thread_id = session.thread.ensure_thread(api)?;
        if created {
            self.events
                .emit_or_warn("thread_created", map_object(json!({ "thread_id": thread_id })));
        }

        let attachments: Vec<String> = session.pending_attachment.iter().cloned().collect();
        let handle = session.thread.send_and_run(
            api,
            &self.config.assistant_id,
            utterance,
            &attachments,
        )?;
        session.pending_attachment = None;
        self.events.emit_or_warn(
            "message_created",
            map_object(json!({
                "thread_id": thread_id,
                "chars": utterance.chars().count(),
                "attachments": attachments,
            })),
        );
        self.events.emit_or_warn(
            "run_created",
            map_object(json!({
                "thread_id": thread_id,
                "run_id": handle.run_id,
                "assistant_id": self.config.assistant_id,
                "status": handle.status.as_str(),
            })),
        );

        let started = Instant::now();
        let events = &self.events;
        let finished = session.thread.await_completion(
            api,
            handle,
            &self.config.poll,
            &mut |event: RunEvent| emit_run_event(events, event),
        )?;
        self.events.emit_or_warn(
            "run_finished",
            map_object(json!({
                "thread_id": thread_id,
                "run_id": finished.run_id,
                "status": finished.status.as_str(),
                "elapsed_s": started.elapsed().as_secs_f64(),
            })),
        );
        if !finished.status.is_success() {
            return Ok(RunOutcome::Ended(finished.status));
        }

        let extractor = ResponseExtractor::new(api, self.config.message_limit);
        let reply = extractor.extract_latest_assistant_reply(&thread_id, self.config.citations)?;
        self.events.emit_or_warn(
            "reply_extracted",
            map_object(json!({
                "thread_id": thread_id,
                "message_id": reply.message_id,
                "chars": reply.body.chars().count(),
                "footnotes": reply.footnotes.len(),
                "attachments": reply.attachments.len(),
            })),
        );
        if reply.is_empty() {
            return Ok(RunOutcome::Reply(NO_TEXT_PLACEHOLDER.to_string()));
        }
        Ok(RunOutcome::Reply(reply.render()))
    }

    fn resolve_image(&self, session: &Session, utterance: &str, text: &mut String) -> Option<TurnImage> {
        let remote_id = session.rules.resolve(utterance)?;
        match RemoteFileStore::new(self.api.as_ref()).fetch(&remote_id) {
            Ok(bytes) => {
                self.events.emit_or_warn(
                    "image_resolved",
                    map_object(json!({
                        "file_id": remote_id,
                        "bytes": bytes.len(),
                    })),
                );
                Some(TurnImage { remote_id, bytes })
            }
            Err(err) => {
                self.events.emit_or_warn(
                    "image_fetch_failed",
                    map_object(json!({
                        "file_id": remote_id,
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                    })),
                );
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&format!("(image {remote_id} could not be loaded: {err})"));
                None
            }
        }
    }

    /// Replaces the session's rule set with the mapping document in `raw`.
    /// A rejected document leaves the current rules in place.
    pub fn load_rules(&self, session: &mut Session, raw: &str) -> RelayResult<usize> {
        let loaded = session.rules.load_rules_str(raw);
        self.log_rules_result(&loaded);
        loaded
    }

    fn log_rules_result(&self, loaded: &RelayResult<usize>) {
        match loaded {
            Ok(count) => self
                .events
                .emit_or_warn("rules_loaded", map_object(json!({ "count": count }))),
            Err(err) => self
                .events
                .emit_or_warn("rules_rejected", map_object(json!({ "error": err.to_string() }))),
        }
    }

    /// Uploads `bytes` under `name`, makes it available to file rules and
    /// attaches it to the next user message.
    pub fn upload(&self, session: &mut Session, name: &str, bytes: Vec<u8>) -> RelayResult<String> {
        let size = bytes.len();
        match RemoteFileStore::new(self.api.as_ref()).upload(name, bytes) {
            Ok(remote_id) => {
                session.register_upload(name, remote_id.clone());
                self.events.emit_or_warn(
                    "file_uploaded",
                    map_object(json!({
                        "name": name,
                        "remote_id": remote_id,
                        "bytes": size,
                    })),
                );
                Ok(remote_id)
            }
            Err(err) => {
                self.events.emit_or_warn(
                    "file_upload_failed",
                    map_object(json!({
                        "name": name,
                        "bytes": size,
                        "error": err.to_string(),
                    })),
                );
                Err(err)
            }
        }
    }

    /// Writes the session summary to `summary_path` and closes the event log.
    pub fn finish(&self, session: &Session, summary_path: &Path) -> Result<SessionSummary> {
        let summary = session.summary();
        let mut extra = Map::new();
        extra.insert(
            "events_path".to_string(),
            Value::String(self.events.path().to_string_lossy().to_string()),
        );
        write_summary(summary_path, &summary, Some(&extra))?;
        self.events.emit(
            "session_finished",
            map_object(json!({
                "thread_id": summary.thread_id,
                "user_turns": summary.user_turns,
                "assistant_turns": summary.assistant_turns,
                "summary_path": summary_path.to_string_lossy(),
            })),
        )?;
        Ok(summary)
    }
}

fn emit_run_event(events: &EventWriter, event: RunEvent) {
    match event {
        RunEvent::StatusChanged { run_id, from, to } => events.emit_or_warn(
            "run_status",
            map_object(json!({
                "run_id": run_id,
                "from": from.as_str(),
                "status": to.as_str(),
            })),
        ),
        RunEvent::Cancelled { run_id, status } => events.emit_or_warn(
            "run_status",
            map_object(json!({
                "run_id": run_id,
                "status": status.as_str(),
                "reason": "timeout",
            })),
        ),
        RunEvent::CancelFailed { run_id, error } => events.emit_or_warn(
            "run_cancel_failed",
            map_object(json!({
                "run_id": run_id,
                "error": error,
            })),
        ),
    }
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}
