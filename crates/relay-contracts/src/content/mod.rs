mod footnotes;

use serde_json::Value;

pub use footnotes::{annotate_message, render_footnotes, AnnotatedText, Footnote, FootnoteKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    Other,
}

impl MessageRole {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Other,
        }
    }
}

/// Reference attached to a span of response text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// The exact span of the response text the annotation covers.
    pub text: String,
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationKind {
    FileCitation { file_id: String, quote: String },
    FilePath { file_id: String },
    Other,
}

/// One entry of a message's content list.
///
/// Service versions disagree on where the text lives: older payloads carry
/// `"text": "..."`, newer ones `"text": {"value": "...", "annotations": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    PlainText(String),
    WrappedText {
        value: String,
        annotations: Vec<Annotation>,
    },
    ImageFile {
        file_id: String,
    },
    Skip,
}

impl ContentPart {
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Skip;
        };
        match obj.get("text") {
            Some(Value::String(text)) => return Self::PlainText(text.clone()),
            Some(Value::Object(wrapped)) => {
                let Some(text) = wrapped.get("value").and_then(Value::as_str) else {
                    return Self::Skip;
                };
                let annotations = wrapped
                    .get("annotations")
                    .and_then(Value::as_array)
                    .map(|rows| rows.iter().filter_map(parse_annotation).collect())
                    .unwrap_or_default();
                return Self::WrappedText {
                    value: text.to_string(),
                    annotations,
                };
            }
            Some(_) => return Self::Skip,
            None => {}
        }

        let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind == "image_file" {
            if let Some(file_id) = obj
                .get("image_file")
                .and_then(|image| image.get("file_id"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                return Self::ImageFile {
                    file_id: file_id.to_string(),
                };
            }
        }
        Self::Skip
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::PlainText(text) => Some(text.as_str()),
            Self::WrappedText { value, .. } => Some(value.as_str()),
            Self::ImageFile { .. } | Self::Skip => None,
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        match self {
            Self::WrappedText { annotations, .. } => annotations.as_slice(),
            _ => &[],
        }
    }
}

fn parse_annotation(value: &Value) -> Option<Annotation> {
    let obj = value.as_object()?;
    let text = obj
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let file_id_of = |key: &str| {
        obj.get(key)
            .and_then(|inner| inner.get("file_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let kind = match obj.get("type").and_then(Value::as_str).unwrap_or_default() {
        "file_citation" => match file_id_of("file_citation") {
            Some(file_id) => AnnotationKind::FileCitation {
                file_id,
                quote: obj
                    .get("file_citation")
                    .and_then(|inner| inner.get("quote"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            None => AnnotationKind::Other,
        },
        "file_path" => match file_id_of("file_path") {
            Some(file_id) => AnnotationKind::FilePath { file_id },
            None => AnnotationKind::Other,
        },
        _ => AnnotationKind::Other,
    };
    Some(Annotation { text, kind })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl ThreadMessage {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            id: obj
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            role: MessageRole::parse(obj.get("role").and_then(Value::as_str).unwrap_or_default()),
            content: obj
                .get("content")
                .and_then(Value::as_array)
                .map(|rows| rows.iter().map(ContentPart::from_value).collect())
                .unwrap_or_default(),
        })
    }

    /// Every non-empty text-bearing part, in order, joined by a newline.
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<&str>>()
            .join("\n")
    }

    pub fn image_file_ids(&self) -> Vec<String> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ImageFile { file_id } => Some(file_id.clone()),
                _ => None,
            })
            .collect()
    }
}

/// First assistant message of a newest-first listing.
pub fn latest_assistant(messages: &[ThreadMessage]) -> Option<&ThreadMessage> {
    messages
        .iter()
        .find(|message| message.role == MessageRole::Assistant)
}
