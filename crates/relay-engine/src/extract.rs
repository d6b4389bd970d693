use std::collections::HashMap;

use relay_contracts::content::{annotate_message, latest_assistant, render_footnotes};
use relay_contracts::RelayResult;

use crate::api::AssistantApi;
use crate::files::RemoteFileStore;

/// Text of the newest assistant message, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssistantReply {
    pub message_id: Option<String>,
    pub body: String,
    pub footnotes: Vec<String>,
    /// `Attachment: name (url)` lines for images the assistant produced.
    pub attachments: Vec<String>,
    pub image_file_ids: Vec<String>,
}

impl AssistantReply {
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty() && self.footnotes.is_empty() && self.attachments.is_empty()
    }

    /// Body, footnote block and attachment lines separated by blank lines.
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        if !self.body.trim().is_empty() {
            sections.push(self.body.clone());
        }
        if !self.footnotes.is_empty() {
            sections.push(self.footnotes.join("\n"));
        }
        if !self.attachments.is_empty() {
            sections.push(self.attachments.join("\n"));
        }
        sections.join("\n\n")
    }
}

pub struct ResponseExtractor<'a> {
    api: &'a dyn AssistantApi,
    message_limit: u32,
}

impl<'a> ResponseExtractor<'a> {
    pub fn new(api: &'a dyn AssistantApi, message_limit: u32) -> Self {
        Self { api, message_limit }
    }

    /// Joined text parts of the newest assistant message, or an empty
    /// string when the thread has none.
    pub fn extract_latest_assistant_text(&self, thread_id: &str) -> RelayResult<String> {
        let messages = self.api.list_messages(thread_id, self.message_limit)?;
        Ok(latest_assistant(&messages)
            .map(|message| message.plain_text())
            .unwrap_or_default())
    }

    pub fn extract_latest_assistant_reply(
        &self,
        thread_id: &str,
        citations: bool,
    ) -> RelayResult<AssistantReply> {
        let messages = self.api.list_messages(thread_id, self.message_limit)?;
        let Some(message) = latest_assistant(&messages) else {
            return Ok(AssistantReply::default());
        };

        let store = RemoteFileStore::new(self.api);
        let mut names: HashMap<String, String> = HashMap::new();
        let mut filename = |file_id: &str| -> String {
            names
                .entry(file_id.to_string())
                .or_insert_with(|| {
                    store
                        .filename(file_id)
                        .unwrap_or_else(|_| file_id.to_string())
                })
                .clone()
        };

        let (body, footnotes) = if citations {
            let annotated = annotate_message(message);
            let lines = render_footnotes(&annotated.footnotes, &mut filename, |file_id| {
                store.download_url(file_id)
            });
            (annotated.text, lines)
        } else {
            (message.plain_text(), Vec::new())
        };

        let image_file_ids = message.image_file_ids();
        let attachments = image_file_ids
            .iter()
            .map(|file_id| {
                format!(
                    "Attachment: {} ({})",
                    filename(file_id),
                    store.download_url(file_id)
                )
            })
            .collect();

        Ok(AssistantReply {
            message_id: Some(message.id.clone()).filter(|id| !id.is_empty()),
            body,
            footnotes,
            attachments,
            image_file_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AssistantReply, ResponseExtractor};
    use crate::fake::FakeAssistantApi;

    #[test]
    fn newest_assistant_message_wins() -> anyhow::Result<()> {
        let api = FakeAssistantApi::new();
        api.push_message(json!({
            "id": "msg_old", "role": "assistant",
            "content": [{"type": "text", "text": "older answer"}]
        }));
        api.push_message(json!({
            "id": "msg_new", "role": "assistant",
            "content": [
                {"type": "text", "text": {"value": "line one", "annotations": []}},
                {"type": "image_file", "image_file": {"file_id": "file_img"}},
                {"type": "text", "text": "line two"}
            ]
        }));
        api.push_message(json!({
            "id": "msg_user", "role": "user",
            "content": [{"type": "text", "text": "question"}]
        }));

        let extractor = ResponseExtractor::new(&api, 20);
        assert_eq!(
            extractor.extract_latest_assistant_text("thread_1")?,
            "line one\nline two"
        );
        Ok(())
    }

    #[test]
    fn no_assistant_message_gives_empty_text() -> anyhow::Result<()> {
        let api = FakeAssistantApi::new();
        api.push_message(json!({
            "id": "msg_user", "role": "user",
            "content": [{"type": "text", "text": "anyone?"}]
        }));
        let extractor = ResponseExtractor::new(&api, 20);

        assert_eq!(extractor.extract_latest_assistant_text("thread_1")?, "");
        let reply = extractor.extract_latest_assistant_reply("thread_1", true)?;
        assert!(reply.is_empty());
        assert_eq!(reply, AssistantReply::default());
        Ok(())
    }

    #[test]
    fn citations_render_footnotes_with_filenames() -> anyhow::Result<()> {
        let api = FakeAssistantApi::new();
        api.store_file("file_doc", "handbook.pdf", b"%PDF".to_vec());
        api.push_message(json!({
            "id": "msg_1", "role": "assistant",
            "content": [{"type": "text", "text": {
                "value": "Cats sleep a lot [src] and here is a chart [dl].",
                "annotations": [
                    {"type": "file_citation", "text": "[src]",
                     "file_citation": {"file_id": "file_doc", "quote": "16 hours a day"}},
                    {"type": "file_path", "text": "[dl]",
                     "file_path": {"file_id": "file_gone"}}
                ]
            }}]
        }));
        let extractor = ResponseExtractor::new(&api, 20);

        let reply = extractor.extract_latest_assistant_reply("thread_1", true)?;

        assert_eq!(reply.body, "Cats sleep a lot [0] and here is a chart [1].");
        assert_eq!(
            reply.footnotes,
            vec![
                "[0] \"16 hours a day\" from handbook.pdf".to_string(),
                "[1] download file_gone (https://fake.test/v1/files/file_gone/content)".to_string(),
            ]
        );
        assert_eq!(
            reply.render(),
            "Cats sleep a lot [0] and here is a chart [1].\n\n[0] \"16 hours a day\" from handbook.pdf\n[1] download file_gone (https://fake.test/v1/files/file_gone/content)"
        );
        Ok(())
    }

    #[test]
    fn citations_off_keeps_source_text() -> anyhow::Result<()> {
        let api = FakeAssistantApi::new();
        api.push_message(json!({
            "id": "msg_1", "role": "assistant",
            "content": [{"type": "text", "text": {
                "value": "Cats sleep a lot [src].",
                "annotations": [
                    {"type": "file_citation", "text": "[src]",
                     "file_citation": {"file_id": "file_doc", "quote": ""}}
                ]
            }}]
        }));
        let extractor = ResponseExtractor::new(&api, 20);

        let reply = extractor.extract_latest_assistant_reply("thread_1", false)?;

        assert_eq!(reply.render(), "Cats sleep a lot [src].");
        assert!(reply.footnotes.is_empty());
        Ok(())
    }

    #[test]
    fn assistant_images_become_attachment_lines() -> anyhow::Result<()> {
        let api = FakeAssistantApi::new();
        api.store_file("file_chart", "chart.png", vec![1, 2, 3]);
        api.push_message(json!({
            "id": "msg_1", "role": "assistant",
            "content": [
                {"type": "image_file", "image_file": {"file_id": "file_chart"}}
            ]
        }));
        let extractor = ResponseExtractor::new(&api, 20);

        let reply = extractor.extract_latest_assistant_reply("thread_1", false)?;

        assert_eq!(reply.body, "");
        assert_eq!(reply.image_file_ids, vec!["file_chart".to_string()]);
        assert_eq!(
            reply.render(),
            "Attachment: chart.png (https://fake.test/v1/files/file_chart/content)"
        );
        assert!(!reply.is_empty());
        Ok(())
    }
}
