//! Dictionaries handed to the transport layer.

use revfield_core::{ChangesetRecord, DiffRecord, InlineCommentRecord};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffInfo {
    pub id: i64,
    pub phid: String,
    pub uri: String,
}

impl DiffInfo {
    pub fn new(diff: &DiffRecord, production_uri: &str) -> Self {
        Self {
            id: diff.id,
            phid: diff.phid.to_string(),
            uri: format!(
                "{}/differential/diff/{}/",
                production_uri.trim_end_matches('/'),
                diff.id
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineInfo {
    pub id: i64,
    #[serde(rename = "authorPHID")]
    pub author_phid: String,
    pub file_path: Option<String>,
    pub is_new_file: bool,
    pub line_number: u32,
    pub line_length: u32,
    #[serde(rename = "diffID")]
    pub diff_id: Option<i64>,
    pub content: String,
}

impl InlineInfo {
    /// `changeset` is the one the comment was left on, when it is known.
    pub fn new(inline: &InlineCommentRecord, changeset: Option<&ChangesetRecord>) -> Self {
        let file_path = changeset.and_then(|changeset| {
            if inline.is_new_file {
                Some(changeset.filename.clone())
            } else {
                changeset.old_file.clone()
            }
        });
        Self {
            id: inline.id,
            author_phid: inline.author.to_string(),
            file_path,
            is_new_file: inline.is_new_file,
            line_number: inline.line_number,
            line_length: inline.line_length,
            diff_id: changeset.map(|changeset| changeset.diff_id),
            content: inline.content.clone(),
        }
    }
}
