mod document;

use indexmap::IndexMap;
use serde_json::Value;

pub use document::{parse_rule_document, parse_rule_document_str};

use crate::error::RelayResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    FileId(String),
    FileName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub match_text: String,
    pub target: RuleTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSet {
    pub rules: Vec<MatchRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub remote_id: String,
}

/// Ordered match rules plus the session's uploaded-file table.
///
/// Matching is a case-insensitive, unanchored substring test, so a short
/// rule like `cat` also fires on "category".
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    rule_set: RuleSet,
    uploads: IndexMap<String, String>,
}

impl RuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active rule set. On error the previous set stays active.
    pub fn load_rules(&mut self, document: &Value) -> RelayResult<usize> {
        let parsed = parse_rule_document(document)?;
        let count = parsed.rules.len();
        self.rule_set = parsed;
        Ok(count)
    }

    pub fn load_rules_str(&mut self, raw: &str) -> RelayResult<usize> {
        let parsed = parse_rule_document_str(raw)?;
        let count = parsed.rules.len();
        self.rule_set = parsed;
        Ok(count)
    }

    pub fn register_upload(&mut self, name: impl Into<String>, remote_id: impl Into<String>) {
        self.uploads.insert(name.into(), remote_id.into());
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rule_set.rules
    }

    pub fn uploads(&self) -> Vec<UploadedFile> {
        self.uploads
            .iter()
            .map(|(name, remote_id)| UploadedFile {
                name: name.clone(),
                remote_id: remote_id.clone(),
            })
            .collect()
    }

    pub fn upload_id(&self, name: &str) -> Option<&str> {
        self.uploads.get(name).map(String::as_str)
    }

    /// First rule whose text occurs in the utterance and whose target can be
    /// resolved wins. A rule naming an unknown upload is skipped.
    pub fn resolve(&self, utterance: &str) -> Option<String> {
        let haystack = utterance.to_lowercase();
        for rule in &self.rule_set.rules {
            let needle = rule.match_text.to_lowercase();
            if needle.is_empty() || !haystack.contains(&needle) {
                continue;
            }
            match &rule.target {
                RuleTarget::FileId(remote_id) => return Some(remote_id.clone()),
                RuleTarget::FileName(name) => {
                    if let Some(remote_id) = self.uploads.get(name) {
                        return Some(remote_id.clone());
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::RelayError;

    fn cat_index() -> RuleIndex {
        let mut index = RuleIndex::new();
        index
            .load_rules(&json!({"rules": [{"match": "cat", "file": "cat.png"}]}))
            .expect("valid rules");
        index.register_upload("cat.png", "file_abc");
        index
    }

    #[test]
    fn resolves_uploaded_name_case_insensitively() {
        let index = cat_index();
        assert_eq!(index.resolve("show me the cat photo").as_deref(), Some("file_abc"));
        assert_eq!(index.resolve("Show me the CAT").as_deref(), Some("file_abc"));
    }

    #[test]
    fn no_rule_matches() {
        assert_eq!(cat_index().resolve("show me a dog"), None);
    }

    #[test]
    fn resolve_is_deterministic() {
        let index = cat_index();
        let first = index.resolve("cat please");
        for _ in 0..5 {
            assert_eq!(index.resolve("cat please"), first);
        }
    }

    #[test]
    fn earlier_rule_wins_when_both_match() {
        let mut index = RuleIndex::new();
        index
            .load_rules(&json!({"rules": [
                {"match": "dog", "file_id": "file_dog"},
                {"match": "cat", "file_id": "file_cat"}
            ]}))
            .expect("valid rules");

        assert_eq!(index.resolve("a cat and a dog").as_deref(), Some("file_dog"));
    }

    #[test]
    fn unknown_upload_name_is_skipped_not_terminal() {
        let mut index = RuleIndex::new();
        index
            .load_rules(&json!({"rules": [
                {"match": "cat", "file": "missing.png"},
                {"match": "cat", "file": "cat.png"}
            ]}))
            .expect("valid rules");
        assert_eq!(index.resolve("cat"), None);

        index.register_upload("cat.png", "file_abc");
        assert_eq!(index.resolve("cat").as_deref(), Some("file_abc"));
    }

    #[test]
    fn empty_match_text_never_matches() {
        let mut index = RuleIndex::new();
        index
            .load_rules(&json!({"rules": [
                {"match": "", "file_id": "file_everything"},
                {"match": "x", "file_id": "file_x"}
            ]}))
            .expect("valid rules");

        assert_eq!(index.resolve("anything"), None);
        assert_eq!(index.resolve("box").as_deref(), Some("file_x"));
    }

    #[test]
    fn short_rules_over_match_inside_words() {
        assert_eq!(cat_index().resolve("pick a category").as_deref(), Some("file_abc"));
    }

    #[test]
    fn invalid_load_leaves_previous_rules_active() {
        let mut index = cat_index();
        let before = index.rules().to_vec();

        let err = index.load_rules(&json!({"rules": "cat"})).err();
        assert!(matches!(err, Some(RelayError::Validation(_))));
        let err = index.load_rules_str("not json").err();
        assert!(matches!(err, Some(RelayError::Validation(_))));

        assert_eq!(index.rules(), before.as_slice());
        assert_eq!(index.resolve("show me the cat photo").as_deref(), Some("file_abc"));
    }

    #[test]
    fn valid_load_replaces_rules_wholesale() -> anyhow::Result<()> {
        let mut index = cat_index();
        let count = index.load_rules_str(r#"{"rules": [{"match": "dog", "file_id": "file_dog"}]}"#)?;

        assert_eq!(count, 1);
        assert_eq!(index.resolve("cat"), None);
        assert_eq!(index.resolve("dog").as_deref(), Some("file_dog"));
        Ok(())
    }

    #[test]
    fn register_upload_overwrites_and_keeps_order() {
        let mut index = RuleIndex::new();
        index.register_upload("a.png", "file_1");
        index.register_upload("b.png", "file_2");
        index.register_upload("a.png", "file_3");

        let uploads = index.uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].name, "a.png");
        assert_eq!(uploads[0].remote_id, "file_3");
        assert_eq!(index.upload_id("b.png"), Some("file_2"));
    }
}
