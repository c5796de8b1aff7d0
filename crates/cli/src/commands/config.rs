use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hrbridge_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "upstream.base_url",
        &config.upstream.base_url,
        field_source(
            "upstream.base_url",
            Some("HRBRIDGE_UPSTREAM_BASE_URL"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "upstream.database",
        &config.upstream.database,
        field_source(
            "upstream.database",
            Some("HRBRIDGE_UPSTREAM_DATABASE"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "upstream.auth_timeout_secs",
        &config.upstream.auth_timeout_secs.to_string(),
        field_source(
            "upstream.auth_timeout_secs",
            Some("HRBRIDGE_UPSTREAM_AUTH_TIMEOUT_SECS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "upstream.call_timeout_secs",
        &config.upstream.call_timeout_secs.to_string(),
        field_source(
            "upstream.call_timeout_secs",
            Some("HRBRIDGE_UPSTREAM_CALL_TIMEOUT_SECS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "upstream.report_timeout_secs",
        &config.upstream.report_timeout_secs.to_string(),
        field_source(
            "upstream.report_timeout_secs",
            Some("HRBRIDGE_UPSTREAM_REPORT_TIMEOUT_SECS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    let login = config
        .service_account
        .as_ref()
        .map(|account| account.login.clone())
        .unwrap_or_else(|| "<unset>".to_string());
    let password = if config.service_account.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "service_account.login",
        &login,
        field_source(
            "service_account.login",
            Some("HRBRIDGE_SERVICE_LOGIN"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "service_account.password",
        password,
        field_source(
            "service_account.password",
            Some("HRBRIDGE_SERVICE_PASSWORD"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source(
            "logging.level",
            Some("HRBRIDGE_LOGGING_LEVEL"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        field_source(
            "logging.format",
            Some("HRBRIDGE_LOGGING_FORMAT"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("hrbridge.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/hrbridge.toml");
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
