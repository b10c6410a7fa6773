use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use fred_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in effective_values(&config) {
        let source =
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, &'static str)> {
    let optional = |value: Option<&str>| value.unwrap_or("<unset>").to_string();

    vec![
        ("history.url", config.history.url.clone(), "FRED_HISTORY_URL"),
        (
            "history.max_connections",
            config.history.max_connections.to_string(),
            "FRED_HISTORY_MAX_CONNECTIONS",
        ),
        ("history.timeout_secs", config.history.timeout_secs.to_string(), "FRED_HISTORY_TIMEOUT_SECS"),
        ("history.max_turns", config.history.max_turns.to_string(), "FRED_HISTORY_MAX_TURNS"),
        ("warehouse.url", redact_url(config.warehouse.url.expose_secret()), "FRED_WAREHOUSE_URL"),
        (
            "warehouse.max_connections",
            config.warehouse.max_connections.to_string(),
            "FRED_WAREHOUSE_MAX_CONNECTIONS",
        ),
        (
            "warehouse.query_timeout_secs",
            config.warehouse.query_timeout_secs.to_string(),
            "FRED_WAREHOUSE_QUERY_TIMEOUT_SECS",
        ),
        (
            "warehouse.schema_path",
            config.warehouse.schema_path.display().to_string(),
            "FRED_WAREHOUSE_SCHEMA_PATH",
        ),
        (
            "warehouse.rules_path",
            config.warehouse.rules_path.display().to_string(),
            "FRED_WAREHOUSE_RULES_PATH",
        ),
        (
            "warehouse.max_summary_rows",
            config.warehouse.max_summary_rows.to_string(),
            "FRED_WAREHOUSE_MAX_SUMMARY_ROWS",
        ),
        ("llm.provider", format!("{:?}", config.llm.provider), "FRED_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "FRED_LLM_MODEL"),
        ("llm.fallback_model", optional(config.llm.fallback_model.as_deref()), "FRED_LLM_FALLBACK_MODEL"),
        ("llm.base_url", optional(config.llm.base_url.as_deref()), "FRED_LLM_BASE_URL"),
        (
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            "FRED_LLM_API_KEY",
        ),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), "FRED_LLM_TIMEOUT_SECS"),
        ("llm.max_retries", config.llm.max_retries.to_string(), "FRED_LLM_MAX_RETRIES"),
        ("zulip.site", config.zulip.site.clone(), "FRED_ZULIP_SITE"),
        ("zulip.bot_email", config.zulip.bot_email.clone(), "FRED_ZULIP_BOT_EMAIL"),
        ("zulip.bot_api_key", redact_token(config.zulip.bot_api_key.expose_secret()), "FRED_ZULIP_BOT_API_KEY"),
        (
            "zulip.webhook_token",
            redact_token(config.zulip.webhook_token.expose_secret()),
            "FRED_ZULIP_WEBHOOK_TOKEN",
        ),
        (
            "zulip.send_timeout_secs",
            config.zulip.send_timeout_secs.to_string(),
            "FRED_ZULIP_SEND_TIMEOUT_SECS",
        ),
        (
            "orchestrator.graph_dispatch",
            config.orchestrator.graph_dispatch.to_string(),
            "FRED_ORCHESTRATOR_GRAPH_DISPATCH",
        ),
        (
            "orchestrator.classifier_history_window",
            config.orchestrator.classifier_history_window.to_string(),
            "FRED_ORCHESTRATOR_CLASSIFIER_HISTORY_WINDOW",
        ),
        (
            "orchestrator.total_timeout_secs",
            config.orchestrator.total_timeout_secs.to_string(),
            "FRED_ORCHESTRATOR_TOTAL_TIMEOUT_SECS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "FRED_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "FRED_SERVER_PORT"),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "FRED_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        ("logging.level", config.logging.level.clone(), "FRED_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "FRED_LOGGING_FORMAT"),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("fred.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/fred.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    "<redacted>".to_string()
}

/// Keeps scheme, host and path; drops credentials.
fn redact_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{scheme}://***@{host}"),
            None => url.to_string(),
        },
        None => "<redacted>".to_string(),
    }
}
