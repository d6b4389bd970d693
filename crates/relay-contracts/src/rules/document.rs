use serde_json::{Map, Value};

use super::{MatchRule, RuleSet, RuleTarget};
use crate::error::{RelayError, RelayResult};

/// Parses a mapping document:
/// `{"rules": [{"match": "...", "file": "..."} | {"match": "...", "file_id": "..."}]}`.
///
/// The whole document is rejected on the first malformed entry so a load is
/// all-or-nothing.
pub fn parse_rule_document(document: &Value) -> RelayResult<RuleSet> {
    let obj = document
        .as_object()
        .ok_or_else(|| RelayError::validation("document must be a JSON object"))?;
    let rows = match obj.get("rules") {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(RelayError::validation("'rules' must be an array")),
        None => return Err(RelayError::validation("missing 'rules' field")),
    };

    let mut rules = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let entry = row
            .as_object()
            .ok_or_else(|| RelayError::validation(format!("rules[{idx}] must be an object")))?;
        rules.push(parse_rule(idx, entry)?);
    }
    Ok(RuleSet { rules })
}

pub fn parse_rule_document_str(raw: &str) -> RelayResult<RuleSet> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|err| RelayError::validation(format!("not valid JSON: {err}")))?;
    parse_rule_document(&document)
}

fn parse_rule(idx: usize, entry: &Map<String, Value>) -> RelayResult<MatchRule> {
    let match_text = entry
        .get("match")
        .and_then(Value::as_str)
        .ok_or_else(|| RelayError::validation(format!("rules[{idx}].match must be a string")))?;
    let string_field = |key: &str| -> RelayResult<Option<String>> {
        match entry.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(RelayError::validation(format!(
                "rules[{idx}].{key} must be a string"
            ))),
        }
    };
    let target = match (string_field("file_id")?, string_field("file")?) {
        (Some(file_id), _) => {
            if !is_plain_file_id(&file_id) {
                return Err(RelayError::validation(format!(
                    "rules[{idx}].file_id '{file_id}' is not a valid file id"
                )));
            }
            RuleTarget::FileId(file_id)
        }
        (None, Some(name)) => RuleTarget::FileName(name),
        (None, None) => {
            return Err(RelayError::validation(format!(
                "rules[{idx}] needs a 'file' or 'file_id'"
            )))
        }
    };
    Ok(MatchRule {
        match_text: match_text.to_string(),
        target,
    })
}

/// File ids end up as a URL path segment, so they must be a single
/// non-empty segment.
fn is_plain_file_id(file_id: &str) -> bool {
    !file_id.is_empty()
        && !file_id.contains("..")
        && !file_id
            .chars()
            .any(|ch| matches!(ch, '/' | '\\' | '?' | '#' | '%') || ch.is_whitespace())
}
