//! Issue-tracker record mapping

use serde_json::Value;

use super::document::{Comment, TrainingDocument};
use super::text::to_plain_text;
use super::{Transform, TransformError};
use crate::types::RawRecord;

/// Maps a search-API issue object onto a `TrainingDocument`
#[derive(Debug, Clone, Default)]
pub struct IssueTransform {
    /// Base URL used to build `{base}/browse/{key}` links
    browse_base: Option<String>,
}

impl IssueTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach browse links rooted at `base_url`
    pub fn with_browse_base(base_url: impl Into<String>) -> Self {
        Self {
            browse_base: Some(base_url.into().trim_end_matches('/').to_string()),
        }
    }
}

/// Non-empty string at `pointer`
fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `name` of a nested object such as `status` or `priority`
fn named(fields: &Value, field: &str) -> Option<String> {
    string_at(fields, &format!("/{}/name", field))
}

/// Display name of a user field, falling back to the account name
fn user(fields: &Value, field: &str) -> Option<String> {
    string_at(fields, &format!("/{}/displayName", field))
        .or_else(|| string_at(fields, &format!("/{}/name", field)))
}

fn labels(fields: &Value) -> Result<Vec<String>, TransformError> {
    match fields.get("labels") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()),
        Some(other) => Err(TransformError::InvalidField {
            field: "fields.labels",
            reason: format!("expected array, found {}", kind_of(other)),
        }),
    }
}

fn components(fields: &Value) -> Result<Vec<String>, TransformError> {
    match fields.get("components") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|c| string_at(c, "/name"))
            .collect()),
        Some(other) => Err(TransformError::InvalidField {
            field: "fields.components",
            reason: format!("expected array, found {}", kind_of(other)),
        }),
    }
}

fn comments(fields: &Value) -> Vec<Comment> {
    fields
        .pointer("/comment/comments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| {
                    let body = to_plain_text(c.get("body").and_then(Value::as_str)?);
                    if body.is_empty() {
                        return None;
                    }
                    Some(Comment {
                        author: user(c, "author"),
                        created: string_at(c, "/created"),
                        body,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Transform for IssueTransform {
    fn transform(
        &self,
        record: &RawRecord,
        collection_id: &str,
    ) -> Result<TrainingDocument, TransformError> {
        if !record.is_object() {
            return Err(TransformError::NotAnObject);
        }

        let key = string_at(record, "/key").ok_or(TransformError::MissingField("key"))?;
        let fields = record
            .get("fields")
            .filter(|f| f.is_object())
            .ok_or(TransformError::MissingField("fields"))?;
        let title =
            string_at(fields, "/summary").ok_or(TransformError::MissingField("fields.summary"))?;

        // Ids arrive as strings, but tolerate numbers
        let id = match record.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => key.clone(),
        };

        let description = fields
            .get("description")
            .and_then(Value::as_str)
            .map(to_plain_text)
            .unwrap_or_default();

        let mut builder = TrainingDocument::builder(key.clone(), collection_id, title)
            .id(id)
            .description(description)
            .status(named(fields, "status"))
            .priority(named(fields, "priority"))
            .issue_type(named(fields, "issuetype"))
            .labels(labels(fields)?)
            .components(components(fields)?)
            .reporter(user(fields, "reporter"))
            .assignee(user(fields, "assignee"))
            .resolution(named(fields, "resolution"))
            .created(string_at(fields, "/created"))
            .updated(string_at(fields, "/updated"))
            .comments(comments(fields));

        if let Some(base) = &self.browse_base {
            builder = builder.url(format!("{}/browse/{}", base, key));
        }

        Ok(builder.build())
    }

    fn name(&self) -> &str {
        "issue"
    }
}
