use anyhow::{anyhow, bail, Context, Result};
use relay_contracts::content::ThreadMessage;
use relay_contracts::runs::{RunHandle, RunStatus};
use relay_contracts::{RelayError, RelayResult};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::api::{AssistantApi, FileMetadata};
use crate::config::RelayConfig;

const ASSISTANTS_BETA_HEADER: &str = "OpenAI-Beta";
const ASSISTANTS_BETA_VALUE: &str = "assistants=v2";

/// `AssistantApi` over the hosted Assistants HTTP API.
pub struct OpenAiAssistantsClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl OpenAiAssistantsClient {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: HttpClient::new(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.api_key.clone(), config.api_base.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER, ASSISTANTS_BETA_VALUE)
    }

    fn post_json(&self, label: &str, path: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint(path);
        let response = self
            .authorized(self.http.post(&endpoint))
            .json(payload)
            .send()
            .with_context(|| format!("{label} request failed ({endpoint})"))?;
        response_json_or_error(label, response)
    }

    fn get_json(&self, label: &str, path: &str) -> Result<Value> {
        let endpoint = self.endpoint(path);
        let response = self
            .authorized(self.http.get(&endpoint))
            .send()
            .with_context(|| format!("{label} request failed ({endpoint})"))?;
        response_json_or_error(label, response)
    }

    /// GET for file endpoints, where a 404 means the id is unknown.
    fn get_file(&self, label: &str, file_id: &str, path: &str) -> RelayResult<HttpResponse> {
        let endpoint = self.endpoint(path);
        let response = self
            .authorized(self.http.get(&endpoint))
            .send()
            .with_context(|| format!("{label} request failed ({endpoint})"))
            .map_err(RelayError::Transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RelayError::NotFound(file_id.to_string()));
        }
        Ok(response)
    }
}

impl AssistantApi for OpenAiAssistantsClient {
    fn create_thread(&self) -> RelayResult<String> {
        let payload = self
            .post_json("create thread", "threads", &json!({}))
            .map_err(RelayError::Transport)?;
        required_str(&payload, "id", "create thread").map_err(RelayError::Transport)
    }

    fn create_message(
        &self,
        thread_id: &str,
        text: &str,
        attachments: &[String],
    ) -> RelayResult<String> {
        let payload = self
            .post_json(
                "create message",
                &format!("threads/{thread_id}/messages"),
                &user_message_payload(text, attachments),
            )
            .map_err(RelayError::Transport)?;
        required_str(&payload, "id", "create message").map_err(RelayError::Transport)
    }

    fn create_run(&self, thread_id: &str, assistant_id: &str) -> RelayResult<RunHandle> {
        let payload = self
            .post_json(
                "create run",
                &format!("threads/{thread_id}/runs"),
                &json!({ "assistant_id": assistant_id }),
            )
            .map_err(RelayError::Transport)?;
        run_handle_from_payload(thread_id, &payload).map_err(RelayError::Transport)
    }

    fn retrieve_run(&self, thread_id: &str, run_id: &str) -> RelayResult<RunHandle> {
        let payload = self
            .get_json("retrieve run", &format!("threads/{thread_id}/runs/{run_id}"))
            .map_err(RelayError::Transport)?;
        run_handle_from_payload(thread_id, &payload).map_err(RelayError::Transport)
    }

    fn cancel_run(&self, thread_id: &str, run_id: &str) -> RelayResult<RunHandle> {
        let payload = self
            .post_json(
                "cancel run",
                &format!("threads/{thread_id}/runs/{run_id}/cancel"),
                &json!({}),
            )
            .map_err(RelayError::Transport)?;
        run_handle_from_payload(thread_id, &payload).map_err(RelayError::Transport)
    }

    fn list_messages(&self, thread_id: &str, limit: u32) -> RelayResult<Vec<ThreadMessage>> {
        let payload = self
            .get_json(
                "list messages",
                &format!("threads/{thread_id}/messages?order=desc&limit={}", limit.clamp(1, 100)),
            )
            .map_err(RelayError::Transport)?;
        Ok(messages_from_payload(&payload))
    }

    fn create_file(&self, name: &str, bytes: Vec<u8>, purpose: &str) -> RelayResult<String> {
        let endpoint = self.endpoint("files");
        let upload = || -> Result<String> {
            let mut part = MultipartPart::bytes(bytes).file_name(name.to_string());
            if let Some(mime) = mime_for_name(name) {
                part = part
                    .mime_str(mime)
                    .with_context(|| format!("invalid mime '{mime}' for {name}"))?;
            }
            let form = MultipartForm::new()
                .text("purpose", purpose.to_string())
                .part("file", part);
            let response = self
                .authorized(self.http.post(&endpoint))
                .multipart(form)
                .send()
                .with_context(|| format!("upload request failed ({endpoint})"))?;
            let payload = response_json_or_error("upload", response)?;
            required_str(&payload, "id", "upload")
        };
        upload().map_err(RelayError::Transport)
    }

    fn file_content(&self, file_id: &str) -> RelayResult<Vec<u8>> {
        let response = self.get_file("file content", file_id, &format!("files/{file_id}/content"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(RelayError::Transport(anyhow!(
                "file content request failed ({code}): {}",
                truncate_text(&body, 512)
            )));
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .with_context(|| format!("failed reading content of {file_id}"))
            .map_err(RelayError::Transport)
    }

    fn file_metadata(&self, file_id: &str) -> RelayResult<FileMetadata> {
        let response = self.get_file("file metadata", file_id, &format!("files/{file_id}"))?;
        let payload = response_json_or_error("file metadata", response).map_err(RelayError::Transport)?;
        Ok(FileMetadata {
            id: payload
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(file_id)
                .to_string(),
            filename: payload
                .get("filename")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(file_id)
                .to_string(),
        })
    }

    fn file_content_url(&self, file_id: &str) -> String {
        self.endpoint(&format!("files/{file_id}/content"))
    }
}

/// Message body for a user turn. The content is the bare utterance string;
/// typed content-block arrays are not accepted by every service version.
/// Uploaded files ride along as `attachments` for the code interpreter tool,
/// which is the tool that can open images.
fn user_message_payload(text: &str, attachments: &[String]) -> Value {
    let mut payload = json!({
        "role": "user",
        "content": text,
    });
    if !attachments.is_empty() {
        payload["attachments"] = Value::Array(
            attachments
                .iter()
                .map(|file_id| {
                    json!({
                        "file_id": file_id,
                        "tools": [{"type": "code_interpreter"}],
                    })
                })
                .collect(),
        );
    }
    payload
}

fn run_handle_from_payload(thread_id: &str, payload: &Value) -> Result<RunHandle> {
    let run_id = required_str(payload, "id", "run")?;
    let raw_status = payload
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("run {run_id} response missing status"))?;
    let status = raw_status
        .parse::<RunStatus>()
        .map_err(|err| anyhow!("run {run_id}: {err}"))?;
    Ok(RunHandle {
        thread_id: payload
            .get("thread_id")
            .and_then(Value::as_str)
            .unwrap_or(thread_id)
            .to_string(),
        run_id,
        status,
    })
}

fn messages_from_payload(payload: &Value) -> Vec<ThreadMessage> {
    payload
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(ThreadMessage::from_value).collect())
        .unwrap_or_default()
}

fn required_str(payload: &Value, key: &str, label: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{label} response missing '{key}'"))
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    if !status.is_success() {
        bail!("{label} request failed ({code}): {}", truncate_text(&body, 512));
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{label} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "json" => Some("application/json"),
        "pdf" => Some("application/pdf"),
        "txt" | "md" => Some("text/plain"),
        "csv" => Some("text/csv"),
        _ => None,
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
