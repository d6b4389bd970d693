use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;
use crate::rules::UploadedFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub thread_id: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub user_turns: u64,
    pub assistant_turns: u64,
    pub images_attached: u64,
    pub rule_count: u64,
    pub uploads: Vec<Map<String, Value>>,
}

impl SessionSummary {
    pub fn upload_rows(uploads: &[UploadedFile]) -> Vec<Map<String, Value>> {
        uploads
            .iter()
            .map(|upload| {
                let mut row = Map::new();
                row.insert("name".to_string(), Value::String(upload.name.clone()));
                row.insert(
                    "remote_id".to_string(),
                    Value::String(upload.remote_id.clone()),
                );
                row
            })
            .collect()
    }
}

/// Writes `summary.json` for a finished session. Never read back.
pub fn write_summary(
    path: &Path,
    summary: &SessionSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{write_summary, SessionSummary};
    use crate::rules::UploadedFile;

    #[test]
    fn write_summary_generates_expected_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("summary.json");

        let summary = SessionSummary {
            session_id: "session-123".to_string(),
            thread_id: Some("thread_a".to_string()),
            started_at: "2026-02-19T00:00:00+00:00".to_string(),
            finished_at: "2026-02-19T00:10:00+00:00".to_string(),
            user_turns: 2,
            assistant_turns: 2,
            images_attached: 1,
            rule_count: 3,
            uploads: SessionSummary::upload_rows(&[UploadedFile {
                name: "cat.png".to_string(),
                remote_id: "file_abc".to_string(),
            }]),
        };
        let mut extra = Map::new();
        extra.insert("extra_key".to_string(), Value::String("extra".to_string()));
        write_summary(&path, &summary, Some(&extra))?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(parsed["session_id"], json!("session-123"));
        assert_eq!(parsed["thread_id"], json!("thread_a"));
        assert_eq!(parsed["user_turns"], json!(2));
        assert_eq!(parsed["uploads"][0]["remote_id"], json!("file_abc"));
        assert_eq!(parsed["extra_key"], json!("extra"));
        assert!(parsed.get("ts").and_then(Value::as_str).is_some());
        Ok(())
    }
}
