use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use fred_core::config::{AppConfig, LoadOptions};
use fred_core::{ConversationHistory, ConversationTurn, UserId};
use fred_db::{connect_with_settings, migrations, HistoryRepository, SqlHistoryRepository};

use crate::commands::CommandResult;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub turns: usize,
}

/// One entry of the legacy file format: `{"role": "user"|"model", "parts": [...]}`.
#[derive(Debug, Deserialize)]
struct LegacyEntry {
    role: String,
    #[serde(default)]
    parts: Vec<Value>,
}

pub fn run(source: &Path, max_turns: Option<usize>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "import-history",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    if !source.is_dir() {
        return CommandResult::failure(
            "import-history",
            "source_missing",
            format!("source directory {} does not exist", source.display()),
            2,
        );
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "import-history",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let cap = import_cap(max_turns, config.history.max_turns);
    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.history.url,
            config.history.max_connections,
            config.history.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repository = SqlHistoryRepository::new(pool.clone());
        let summary = import_dir(&repository, source, cap)
            .await
            .map_err(|error| ("import", error, 6u8))?;
        pool.close().await;
        Ok::<ImportSummary, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success(
            "import-history",
            format!(
                "imported {} histories ({} turns, last {cap} per user); skipped {} empty or unreadable files",
                summary.imported, summary.turns, summary.skipped
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("import-history", error_class, message, exit_code)
        }
    }
}

/// Replaces each user's stored history with the last `cap` turns of their
/// legacy file. Files are visited in name order.
pub async fn import_dir(
    repository: &dyn HistoryRepository,
    source: &Path,
    cap: usize,
) -> Result<ImportSummary, String> {
    let mut files = fs::read_dir(source)
        .map_err(|error| format!("cannot list {}: {error}", source.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect::<Vec<PathBuf>>();
    files.sort();

    let mut summary = ImportSummary::default();
    for path in files {
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            summary.skipped += 1;
            continue;
        };
        let turns = fs::read_to_string(&path).map(|raw| parse_legacy_history(&raw)).unwrap_or_default();
        if turns.is_empty() {
            summary.skipped += 1;
            continue;
        }

        let mut history = ConversationHistory::new(turns);
        history.evict_to(cap);
        summary.turns += history.len();
        repository
            .replace(&legacy_user_id(stem), history)
            .await
            .map_err(|error| format!("failed to import {}: {error}", path.display()))?;
        summary.imported += 1;
    }

    Ok(summary)
}

/// `--max-turns` may lower the configured cap but never raise it.
pub fn import_cap(requested: Option<usize>, configured: usize) -> usize {
    requested.map_or(configured, |requested| requested.min(configured)).max(1)
}

/// Reverses the legacy file naming, `ana_at_example_dot_org` -> `ana@example.org`.
pub fn legacy_user_id(stem: &str) -> UserId {
    UserId(stem.replace("_dot_", ".").replace("_at_", "@"))
}

/// Unknown roles and non-object entries are dropped; unparseable input yields nothing.
pub fn parse_legacy_history(raw: &str) -> Vec<ConversationTurn> {
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<LegacyEntry>(entry).ok())
        .filter_map(|entry| {
            let text = entry
                .parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.clone()),
                    Value::Object(fields) => {
                        fields.get("text").and_then(Value::as_str).map(str::to_owned)
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            match entry.role.as_str() {
                "user" => Some(ConversationTurn::user(text, None)),
                "model" | "assistant" => Some(ConversationTurn::assistant(text, None)),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use fred_core::Role;

    use super::{import_cap, legacy_user_id, parse_legacy_history};

    #[test]
    fn requested_cap_never_exceeds_configured_history_length() {
        assert_eq!(import_cap(None, 20), 20);
        assert_eq!(import_cap(Some(8), 20), 8);
        assert_eq!(import_cap(Some(500), 20), 20);
        assert_eq!(import_cap(Some(0), 20), 1);
    }

    #[test]
    fn file_stems_decode_to_emails() {
        assert_eq!(legacy_user_id("ana_dot_lopez_at_example_dot_org").0, "ana.lopez@example.org");
    }

    #[test]
    fn legacy_roles_map_to_turn_roles() {
        let turns = parse_legacy_history(
            r#"[
                {"role": "user", "parts": ["How many languages?"]},
                {"role": "model", "parts": ["SELECT COUNT(*) FROM languages"]},
                {"role": "model", "parts": [{"text": "There are 12."}]},
                {"role": "system", "parts": ["ignored"]},
                "not an object"
            ]"#,
        );

        let roles = turns.iter().map(|turn| turn.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Assistant]);
        assert_eq!(turns[2].text, "There are 12.");
    }

    #[test]
    fn corrupt_or_non_list_content_yields_nothing() {
        assert!(parse_legacy_history("{not json").is_empty());
        assert!(parse_legacy_history(r#"{"role": "user"}"#).is_empty());
    }
}
