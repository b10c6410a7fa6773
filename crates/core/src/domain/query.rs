use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model-generated SQL. Untrusted until it has passed the safety guard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlCandidate {
    pub raw_text: String,
}

impl SqlCandidate {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self { raw_text: raw_text.into() }
    }

    /// Strips a surrounding Markdown code fence, which models emit despite instructions.
    pub fn from_model_output(output: &str) -> Self {
        let trimmed = output.trim();
        let Some(fenced) = trimmed.strip_prefix("```") else {
            return Self::new(trimmed);
        };
        let Some(body) = fenced.strip_suffix("```") else {
            return Self::new(trimmed);
        };

        let body = match body.split_once('\n') {
            Some((language, rest))
                if language.trim().chars().all(|ch| ch.is_ascii_alphanumeric()) =>
            {
                rest
            }
            _ => body,
        };

        Self::new(body.trim())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotSelect,
    MultiStatement,
    CommentOrSeparator,
    ForbiddenKeyword,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSelect => "not_select",
            Self::MultiStatement => "multi_statement",
            Self::CommentOrSeparator => "comment_or_separator",
            Self::ForbiddenKeyword => "forbidden_keyword",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlVerdict {
    Allow,
    Reject,
}

/// Outcome of the safety guard. `Allow` is the only verdict that permits execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlValidationResult {
    pub verdict: SqlVerdict,
    pub reason: Option<RejectReason>,
    /// The offending keyword or marker, for logs only.
    pub detail: Option<String>,
}

impl SqlValidationResult {
    pub fn allow() -> Self {
        Self { verdict: SqlVerdict::Allow, reason: None, detail: None }
    }

    pub fn reject(reason: RejectReason, detail: Option<String>) -> Self {
        Self { verdict: SqlVerdict::Reject, reason: Some(reason), detail }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == SqlVerdict::Allow
    }
}

/// One result row; columns keep the order the database returned them in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRow {
    pub columns: Vec<(String, Value)>,
}

impl QueryRow {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    /// One JSON-style object in column order. Repeated column names, as joins
    /// produce, each keep their own value.
    fn to_prompt_line(&self) -> String {
        let fields = self
            .columns
            .iter()
            .map(|(name, value)| format!("{}:{value}", Value::from(name.as_str())))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{fields}}}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<QueryRow>,
}

impl QueryResult {
    pub fn new(rows: Vec<QueryRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps the first `max_rows` rows and reports how many were dropped.
    pub fn truncate(&mut self, max_rows: usize) -> usize {
        let dropped = self.rows.len().saturating_sub(max_rows);
        self.rows.truncate(max_rows);
        dropped
    }

    /// Renders rows as one JSON object per line for the summarizer prompt.
    pub fn to_prompt_text(&self) -> String {
        if self.rows.is_empty() {
            return "(no rows)".to_owned();
        }

        self.rows.iter().map(QueryRow::to_prompt_line).collect::<Vec<_>>().join("\n")
    }
}
