use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::anyhow;
use relay_contracts::content::ThreadMessage;
use relay_contracts::runs::{RunHandle, RunStatus};
use relay_contracts::{RelayError, RelayResult};
use serde_json::Value;

use crate::api::{AssistantApi, FileMetadata};

/// In-memory assistant service for tests. Runs follow a scripted sequence of
/// statuses; every call is counted.
pub(crate) struct FakeAssistantApi {
    state: Mutex<FakeState>,
}

struct FakeState {
    threads_created: usize,
    sent_messages: Vec<String>,
    sent_attachments: Vec<Vec<String>>,
    run_assistants: Vec<String>,
    run_script: VecDeque<RunStatus>,
    final_status: RunStatus,
    cancel_requested: bool,
    cancels: usize,
    messages: Vec<ThreadMessage>,
    files: BTreeMap<String, (String, Vec<u8>)>,
    upload_purposes: Vec<String>,
    next_file: usize,
    fail_threads: bool,
    fail_uploads: bool,
    fail_cancels: bool,
    fail_content: bool,
    calls: Vec<&'static str>,
}

impl FakeAssistantApi {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                threads_created: 0,
                sent_messages: Vec::new(),
                sent_attachments: Vec::new(),
                run_assistants: Vec::new(),
                run_script: VecDeque::new(),
                final_status: RunStatus::Completed,
                cancel_requested: false,
                cancels: 0,
                messages: Vec::new(),
                files: BTreeMap::new(),
                upload_purposes: Vec::new(),
                next_file: 0,
                fail_threads: false,
                fail_uploads: false,
                fail_cancels: false,
                fail_content: false,
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    /// Statuses returned by successive `retrieve_run` calls, then
    /// `final_status` forever. A cancelled run reports `cancelled`.
    pub(crate) fn script_run(&self, statuses: &[RunStatus], final_status: RunStatus) {
        let mut state = self.state();
        state.run_script = statuses.iter().copied().collect();
        state.final_status = final_status;
    }

    /// Adds a message as the newest one in the thread.
    pub(crate) fn push_message(&self, value: Value) {
        let message = ThreadMessage::from_value(&value).expect("fake message should parse");
        self.state().messages.insert(0, message);
    }

    pub(crate) fn store_file(&self, file_id: &str, name: &str, bytes: Vec<u8>) {
        self.state()
            .files
            .insert(file_id.to_string(), (name.to_string(), bytes));
    }

    pub(crate) fn fail_threads(&self) {
        self.state().fail_threads = true;
    }

    pub(crate) fn fail_uploads(&self) {
        self.state().fail_uploads = true;
    }

    pub(crate) fn fail_cancels(&self) {
        self.state().fail_cancels = true;
    }

    pub(crate) fn fail_content(&self) {
        self.state().fail_content = true;
    }

    pub(crate) fn threads_created(&self) -> usize {
        self.state().threads_created
    }

    pub(crate) fn sent_messages(&self) -> Vec<String> {
        self.state().sent_messages.clone()
    }

    /// Attachment ids sent with each message, in send order.
    pub(crate) fn sent_attachments(&self) -> Vec<Vec<String>> {
        self.state().sent_attachments.clone()
    }

    pub(crate) fn run_assistants(&self) -> Vec<String> {
        self.state().run_assistants.clone()
    }

    pub(crate) fn cancels(&self) -> usize {
        self.state().cancels
    }

    pub(crate) fn upload_purposes(&self) -> Vec<String> {
        self.state().upload_purposes.clone()
    }

    pub(crate) fn stored_file_ids(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }
}

impl AssistantApi for FakeAssistantApi {
    fn create_thread(&self) -> RelayResult<String> {
        let mut state = self.state();
        state.calls.push("create_thread");
        if state.fail_threads {
            return Err(RelayError::transport(anyhow!("connection refused")));
        }
        state.threads_created += 1;
        Ok(format!("thread_{}", state.threads_created))
    }

    fn create_message(
        &self,
        _thread_id: &str,
        text: &str,
        attachments: &[String],
    ) -> RelayResult<String> {
        let mut state = self.state();
        state.calls.push("create_message");
        state.sent_messages.push(text.to_string());
        state.sent_attachments.push(attachments.to_vec());
        Ok(format!("msg_{}", state.sent_messages.len()))
    }

    fn create_run(&self, thread_id: &str, assistant_id: &str) -> RelayResult<RunHandle> {
        let mut state = self.state();
        state.calls.push("create_run");
        state.run_assistants.push(assistant_id.to_string());
        Ok(RunHandle {
            thread_id: thread_id.to_string(),
            run_id: format!("run_{}", state.run_assistants.len()),
            status: RunStatus::Queued,
        })
    }

    fn retrieve_run(&self, thread_id: &str, run_id: &str) -> RelayResult<RunHandle> {
        let mut state = self.state();
        state.calls.push("retrieve_run");
        let scripted = state.run_script.pop_front();
        let status = if state.cancel_requested {
            RunStatus::Cancelled
        } else {
            scripted.unwrap_or(state.final_status)
        };
        Ok(RunHandle {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            status,
        })
    }

    fn cancel_run(&self, thread_id: &str, run_id: &str) -> RelayResult<RunHandle> {
        let mut state = self.state();
        state.calls.push("cancel_run");
        if state.fail_cancels {
            return Err(RelayError::transport(anyhow!("cancel rejected")));
        }
        state.cancels += 1;
        state.cancel_requested = true;
        Ok(RunHandle {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            status: RunStatus::Cancelling,
        })
    }

    fn list_messages(&self, _thread_id: &str, limit: u32) -> RelayResult<Vec<ThreadMessage>> {
        let mut state = self.state();
        state.calls.push("list_messages");
        Ok(state
            .messages
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn create_file(&self, name: &str, bytes: Vec<u8>, purpose: &str) -> RelayResult<String> {
        let mut state = self.state();
        state.calls.push("create_file");
        if state.fail_uploads {
            return Err(RelayError::transport(anyhow!("upload request failed (500)")));
        }
        state.next_file += 1;
        let file_id = format!("file_{}", state.next_file);
        state.upload_purposes.push(purpose.to_string());
        state
            .files
            .insert(file_id.clone(), (name.to_string(), bytes));
        Ok(file_id)
    }

    fn file_content(&self, file_id: &str) -> RelayResult<Vec<u8>> {
        let mut state = self.state();
        state.calls.push("file_content");
        if state.fail_content {
            return Err(RelayError::transport(anyhow!("file content request failed (503)")));
        }
        state
            .files
            .get(file_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| RelayError::NotFound(file_id.to_string()))
    }

    fn file_metadata(&self, file_id: &str) -> RelayResult<FileMetadata> {
        let mut state = self.state();
        state.calls.push("file_metadata");
        state
            .files
            .get(file_id)
            .map(|(name, _)| FileMetadata {
                id: file_id.to_string(),
                filename: name.clone(),
            })
            .ok_or_else(|| RelayError::NotFound(file_id.to_string()))
    }

    fn file_content_url(&self, file_id: &str) -> String {
        format!("https://fake.test/v1/files/{file_id}/content")
    }
}
