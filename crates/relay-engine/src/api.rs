use relay_contracts::content::ThreadMessage;
use relay_contracts::runs::RunHandle;
use relay_contracts::RelayResult;

/// Purpose tag sent with every upload.
pub const FILE_PURPOSE: &str = "assistants";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
}

/// Operations the relay consumes from the remote assistant service.
pub trait AssistantApi: Send + Sync {
    fn create_thread(&self) -> RelayResult<String>;

    /// Appends a user message. `text` is sent as the plain message content;
    /// `attachments` are previously uploaded file ids handed to the
    /// assistant alongside it.
    fn create_message(
        &self,
        thread_id: &str,
        text: &str,
        attachments: &[String],
    ) -> RelayResult<String>;

    fn create_run(&self, thread_id: &str, assistant_id: &str) -> RelayResult<RunHandle>;

    fn retrieve_run(&self, thread_id: &str, run_id: &str) -> RelayResult<RunHandle>;

    fn cancel_run(&self, thread_id: &str, run_id: &str) -> RelayResult<RunHandle>;

    /// Messages of a thread, newest first.
    fn list_messages(&self, thread_id: &str, limit: u32) -> RelayResult<Vec<ThreadMessage>>;

    fn create_file(&self, name: &str, bytes: Vec<u8>, purpose: &str) -> RelayResult<String>;

    fn file_content(&self, file_id: &str) -> RelayResult<Vec<u8>>;

    fn file_metadata(&self, file_id: &str) -> RelayResult<FileMetadata>;

    /// Link a user can follow to download a file's content.
    fn file_content_url(&self, file_id: &str) -> String;
}
