pub mod check_sql;
pub mod config;
pub mod doctor;
pub mod import_history;
pub mod migrate;

use serde::Serialize;

/// What a `fred` command prints and exits with.
///
/// `output` is always one JSON object `{command, status, error_class, message}`.
/// Exit codes: 0 ok, 1 statement rejected by the SQL guard, 2 bad config or
/// input, 3 async runtime, 4 history database unreachable, 5 migration,
/// 6 history import.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::render(0, CommandOutcome {
            command,
            status: "ok",
            error_class: None,
            message: message.into(),
        })
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::render(exit_code, CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
        })
    }

    fn render(exit_code: u8, outcome: CommandOutcome<'_>) -> Self {
        let output = serde_json::to_string(&outcome).unwrap_or_else(|error| {
            format!(
                "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":{}}}",
                serde_json::Value::from(error.to_string())
            )
        });
        Self { exit_code, output }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn success_has_no_error_class() {
        let result = CommandResult::success("migrate", "applied pending history migrations");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 0);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["error_class"], Value::Null);
    }

    #[test]
    fn failure_keeps_exit_code_and_class() {
        let result =
            CommandResult::failure("import-history", "source_missing", "no \"dir\" here", 2);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 2);
        assert_eq!(payload["command"], "import-history");
        assert_eq!(payload["error_class"], "source_missing");
        assert_eq!(payload["message"], "no \"dir\" here");
    }
}
