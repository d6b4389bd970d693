use relay_contracts::RelayResult;

use crate::api::{AssistantApi, FILE_PURPOSE};

/// Uploads to and reads from the service's object store.
pub struct RemoteFileStore<'a> {
    api: &'a dyn AssistantApi,
}

impl<'a> RemoteFileStore<'a> {
    pub fn new(api: &'a dyn AssistantApi) -> Self {
        Self { api }
    }

    /// Takes ownership of `bytes`; the buffer is released when the request
    /// returns, whatever the outcome.
    pub fn upload(&self, name: &str, bytes: Vec<u8>) -> RelayResult<String> {
        self.api.create_file(name, bytes, FILE_PURPOSE)
    }

    pub fn fetch(&self, remote_id: &str) -> RelayResult<Vec<u8>> {
        self.api.file_content(remote_id)
    }

    pub fn filename(&self, remote_id: &str) -> RelayResult<String> {
        Ok(self.api.file_metadata(remote_id)?.filename)
    }

    pub fn download_url(&self, remote_id: &str) -> String {
        self.api.file_content_url(remote_id)
    }
}
