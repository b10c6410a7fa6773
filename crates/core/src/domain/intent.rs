use std::fmt;

use serde::{Deserialize, Serialize};

/// The classified purpose of one inbound message. Assigned once per message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Database,
    Chatbot,
    Other,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Database, Intent::Chatbot, Intent::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Chatbot => "chatbot",
            Self::Other => "other",
        }
    }

    /// Strict label parser for model output.
    ///
    /// Accepts exactly one known label, ignoring case, surrounding whitespace,
    /// quoting and a single trailing full stop. Anything else is `None`.
    pub fn from_label(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
        let trimmed = trimmed.trim_matches(|ch| matches!(ch, '"' | '\'' | '`' | '*')).trim();

        Self::ALL.into_iter().find(|intent| trimmed.eq_ignore_ascii_case(intent.as_str()))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Intent;

    #[test]
    fn parses_each_known_label() {
        assert_eq!(Intent::from_label("database"), Some(Intent::Database));
        assert_eq!(Intent::from_label("chatbot"), Some(Intent::Chatbot));
        assert_eq!(Intent::from_label("other"), Some(Intent::Other));
    }

    #[test]
    fn tolerates_case_whitespace_and_quoting() {
        assert_eq!(Intent::from_label("  Database\n"), Some(Intent::Database));
        assert_eq!(Intent::from_label("`chatbot`"), Some(Intent::Chatbot));
        assert_eq!(Intent::from_label("\"OTHER\"."), Some(Intent::Other));
    }

    #[test]
    fn ambiguous_or_unknown_output_is_rejected() {
        assert_eq!(Intent::from_label(""), None);
        assert_eq!(Intent::from_label("database or chatbot"), None);
        assert_eq!(Intent::from_label("The intent is database"), None);
        assert_eq!(Intent::from_label("sql"), None);
    }
}
