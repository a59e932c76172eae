//! Front-matter block of a mirror document.
//!
//! A document is `---\n<yaml>\n---` followed by a body that belongs to the
//! user and is carried through re-exports byte for byte.

use crate::{Result, SyncError};
use serde::Serialize;
use serde_yaml::Value;

pub const KEY_ID: &str = "ext_ro_id";
pub const KEY_DESC: &str = "ext_rw_desc";
pub const KEY_NOTE: &str = "ext_rw_note";
pub const KEY_ENABLED: &str = "ext_rw_enabled";
pub const KEY_REPO: &str = "ext_rwc_repo";
pub const KEY_GROUP: &str = "ext_ro_group";
pub const KEY_TAGS: &str = "ext_ro_tags";
pub const KEY_DELAY: &str = "ext_ro_delay";
pub const KEY_INSTALLED: &str = "ext_ro_installed_by_tool";

const FENCE: &str = "---";

/// Fields written into a document on export, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFields {
    pub ext_ro_id: String,
    pub ext_rw_desc: String,
    pub ext_rw_note: String,
    pub ext_rw_enabled: bool,
    pub ext_rwc_repo: String,
    pub ext_ro_group: String,
    pub ext_ro_tags: Vec<String>,
    pub ext_ro_delay: String,
    pub ext_ro_installed_by_tool: bool,
}

/// Fields read back from a document. Absent keys stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedFields {
    pub id: Option<String>,
    pub description: Option<String>,
    pub note: Option<String>,
    pub enabled: Option<bool>,
    pub repo: Option<String>,
}

/// Split `content` into the raw front-matter text and the body.
///
/// Both fences must be lines holding exactly `---` (trailing whitespace is
/// allowed). Returns `None` for the front-matter when the document does not
/// open with a fence or the block is never closed; the body is then the
/// whole input.
pub fn split_document(content: &str) -> (Option<&str>, &str) {
    let Some(first_end) = content.find('\n') else {
        return (None, content);
    };
    if !is_fence(&content[..first_end]) {
        return (None, content);
    }

    let yaml_start = first_end + 1;
    let mut pos = yaml_start;
    while pos < content.len() {
        let end = content[pos..].find('\n').map_or(content.len(), |i| pos + i);
        if is_fence(&content[pos..end]) {
            let yaml = content[yaml_start..pos.saturating_sub(1).max(yaml_start)]
                .trim_end_matches('\r');
            let body = content[pos + FENCE.len()..].trim_start_matches([' ', '\t']);
            return (Some(yaml), body);
        }
        pos = end + 1;
    }
    (None, content)
}

fn is_fence(line: &str) -> bool {
    line.trim_end() == FENCE
}

/// Parse a document. `Ok(None)` means there is no front-matter block.
pub fn parse_document(content: &str) -> Result<Option<(ImportedFields, String)>> {
    let (yaml, body) = split_document(content);
    let Some(yaml) = yaml else {
        return Ok(None);
    };

    let value: Value = serde_yaml::from_str(yaml)?;
    let fields = match value {
        Value::Null => ImportedFields::default(),
        Value::Mapping(map) => {
            let get = |key: &str| map.get(key);
            ImportedFields {
                id: get(KEY_ID).and_then(scalar_string).filter(|s| !s.is_empty()),
                description: get(KEY_DESC).map(text_or_empty),
                note: get(KEY_NOTE).map(text_or_empty),
                enabled: get(KEY_ENABLED).and_then(as_bool),
                repo: get(KEY_REPO)
                    .and_then(scalar_string)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            }
        }
        _ => {
            return Err(SyncError::FrontMatter {
                message: "front-matter is not a key/value block".into(),
                path: None,
            })
        }
    };
    Ok(Some((fields, body.to_string())))
}

/// Render front-matter plus body.
pub fn render_document(fields: &ExportFields, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(fields)?;
    let sep = if body.starts_with('\n') || body.starts_with("\r\n") {
        ""
    } else {
        "\n"
    };
    Ok(format!("{FENCE}\n{}\n{FENCE}{sep}{body}", yaml.trim_end()))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_or_empty(value: &Value) -> String {
    scalar_string(value).unwrap_or_default()
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Some(true),
            "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
