use fred_agent::SqlSafetyGuard;
use fred_core::SqlCandidate;

use crate::commands::CommandResult;

/// Exit code 1 means the guard rejected the statement.
pub fn run(sql: &str) -> CommandResult {
    let verdict = SqlSafetyGuard::new().validate(&SqlCandidate::new(sql));

    match verdict.reason.filter(|_| !verdict.is_allowed()) {
        None => CommandResult::success("check-sql", "allow"),
        Some(reason) => {
            let message = match verdict.detail {
                Some(detail) => format!("reject: {reason} ({detail})"),
                None => format!("reject: {reason}"),
            };
            CommandResult::failure("check-sql", "sql_rejected", message, 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::run;

    fn payload(output: &str) -> Value {
        serde_json::from_str(output).expect("json")
    }

    #[test]
    fn allowed_statement_reports_allow() {
        let result = run("SELECT name FROM languages WHERE status = 'active' LIMIT 10");
        assert_eq!(result.exit_code, 0);
        assert_eq!(payload(&result.output)["message"], "allow");
    }

    #[test]
    fn rejected_statement_names_the_reason() {
        let result = run("SELECT 1; DROP TABLE users");
        let payload = payload(&result.output);

        assert_eq!(result.exit_code, 1);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "sql_rejected");
        assert!(payload["message"].as_str().unwrap_or_default().contains("multi_statement"));
    }
}
