use fred_core::{RejectReason, SqlCandidate, SqlValidationResult};

const ALLOWED_PREFIX: &str = "SELECT";

const COMMENT_MARKERS: [&str; 3] = ["--", "/*", "*/"];

const FORBIDDEN_KEYWORDS: [&str; 10] = [
    "DROP", "ALTER", "INSERT", "UPDATE", "DELETE", "TRUNCATE", "CALL", "CREATE", "GRANT", "REVOKE",
];

const FORBIDDEN_PHRASES: [(&str, &str); 2] = [("INTO", "OUTFILE"), ("LOAD", "DATA")];

/// Gate between model-generated SQL and the warehouse.
///
/// Pure and deterministic. Every check must pass for `Allow`; anything the
/// checks cannot classify is rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqlSafetyGuard;

impl SqlSafetyGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, candidate: &SqlCandidate) -> SqlValidationResult {
        validate(candidate)
    }
}

pub fn validate(candidate: &SqlCandidate) -> SqlValidationResult {
    let statement = candidate.raw_text.trim();

    if !starts_with_select(statement) {
        return SqlValidationResult::reject(RejectReason::NotSelect, None);
    }

    let body = statement.strip_suffix(';').unwrap_or(statement);
    if body.contains(';') {
        return SqlValidationResult::reject(RejectReason::MultiStatement, Some(";".to_owned()));
    }

    if let Some(marker) = COMMENT_MARKERS.iter().find(|marker| body.contains(*marker)) {
        return SqlValidationResult::reject(
            RejectReason::CommentOrSeparator,
            Some((*marker).to_owned()),
        );
    }

    if let Some(keyword) = forbidden_keyword(body) {
        return SqlValidationResult::reject(RejectReason::ForbiddenKeyword, Some(keyword));
    }

    SqlValidationResult::allow()
}

fn starts_with_select(statement: &str) -> bool {
    let Some(prefix) = statement.get(..ALLOWED_PREFIX.len()) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case(ALLOWED_PREFIX) {
        return false;
    }
    // `SELECTED ...` is not a SELECT statement.
    !statement[ALLOWED_PREFIX.len()..].chars().next().is_some_and(is_word_char)
}

fn forbidden_keyword(body: &str) -> Option<String> {
    let words: Vec<String> = body
        .split(|ch: char| !is_word_char(ch))
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();

    if let Some(word) = words.iter().find(|word| FORBIDDEN_KEYWORDS.contains(&word.as_str())) {
        return Some(word.clone());
    }

    words.windows(2).find_map(|pair| {
        FORBIDDEN_PHRASES
            .iter()
            .find(|(first, second)| pair[0] == *first && pair[1] == *second)
            .map(|(first, second)| format!("{first} {second}"))
    })
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}
