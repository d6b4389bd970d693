use super::{AnnotationKind, ThreadMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FootnoteKind {
    Citation { file_id: String, quote: String },
    Download { file_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footnote {
    pub index: usize,
    pub kind: FootnoteKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnotatedText {
    pub text: String,
    pub footnotes: Vec<Footnote>,
}

/// Rewrites a message's text with `[i]` markers in place of annotated spans.
///
/// `i` is the annotation's position in the message's annotation sequence
/// (parts taken in order), so numbering restarts for every message. Spans are
/// located in the part's original text: each annotation takes the first
/// occurrence not already taken by an earlier one, and inserted markers are
/// never searched. The message is left untouched.
pub fn annotate_message(message: &ThreadMessage) -> AnnotatedText {
    let mut index = 0usize;
    let mut chunks: Vec<String> = Vec::new();
    let mut footnotes: Vec<Footnote> = Vec::new();

    for part in &message.content {
        let Some(text) = part.text() else {
            continue;
        };
        let mut spans: Vec<MarkedSpan> = Vec::new();
        for annotation in part.annotations() {
            let position = index;
            index += 1;
            let kind = match &annotation.kind {
                AnnotationKind::FileCitation { file_id, quote } => FootnoteKind::Citation {
                    file_id: file_id.clone(),
                    quote: quote.clone(),
                },
                AnnotationKind::FilePath { file_id } => FootnoteKind::Download {
                    file_id: file_id.clone(),
                },
                AnnotationKind::Other => continue,
            };
            if let Some(start) = first_free_occurrence(text, &annotation.text, &spans) {
                spans.push(MarkedSpan {
                    start,
                    end: start + annotation.text.len(),
                    position,
                });
            }
            footnotes.push(Footnote {
                index: position,
                kind,
            });
        }
        let rewritten = splice_markers(text, spans);
        if !rewritten.is_empty() {
            chunks.push(rewritten);
        }
    }

    AnnotatedText {
        text: chunks.join("\n"),
        footnotes,
    }
}

/// Byte range of the source text replaced by marker `[position]`.
struct MarkedSpan {
    start: usize,
    end: usize,
    position: usize,
}

fn first_free_occurrence(text: &str, needle: &str, taken: &[MarkedSpan]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    text.match_indices(needle)
        .map(|(start, _)| start)
        .find(|start| {
            let end = start + needle.len();
            taken
                .iter()
                .all(|span| end <= span.start || *start >= span.end)
        })
}

fn splice_markers(text: &str, mut spans: Vec<MarkedSpan>) -> String {
    spans.sort_by_key(|span| span.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for span in spans {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&format!("[{}]", span.position));
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// One display line per footnote. `filename` maps a file id to a display
/// name and `download_url` to a link for file-path citations.
pub fn render_footnotes(
    footnotes: &[Footnote],
    mut filename: impl FnMut(&str) -> String,
    download_url: impl Fn(&str) -> String,
) -> Vec<String> {
    footnotes
        .iter()
        .map(|footnote| match &footnote.kind {
            FootnoteKind::Citation { file_id, quote } => {
                let name = filename(file_id);
                if quote.trim().is_empty() {
                    format!("[{}] from {name}", footnote.index)
                } else {
                    format!("[{}] \"{}\" from {name}", footnote.index, quote.trim())
                }
            }
            FootnoteKind::Download { file_id } => {
                let name = filename(file_id);
                format!(
                    "[{}] download {name} ({})",
                    footnote.index,
                    download_url(file_id)
                )
            }
        })
        .collect()
}
