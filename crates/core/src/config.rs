use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub service_account: Option<ServiceAccountConfig>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub database: String,
    /// Login round trips are cheap; keep this tight.
    pub auth_timeout_secs: u64,
    pub call_timeout_secs: u64,
    /// Balance and report queries scan more rows upstream.
    pub report_timeout_secs: u64,
}

/// Service-account credentials for the shared-session executor and CLI
/// preflight. Never used for user-attributed writes.
#[derive(Clone, Debug)]
pub struct ServiceAccountConfig {
    pub login: String,
    pub password: SecretString,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub database: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig {
                base_url: "http://localhost:8069".to_string(),
                database: "hr".to_string(),
                auth_timeout_secs: 10,
                call_timeout_secs: 15,
                report_timeout_secs: 30,
            },
            service_account: None,
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hrbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(upstream) = patch.upstream {
            if let Some(base_url) = upstream.base_url {
                self.upstream.base_url = base_url;
            }
            if let Some(database) = upstream.database {
                self.upstream.database = database;
            }
            if let Some(auth_timeout_secs) = upstream.auth_timeout_secs {
                self.upstream.auth_timeout_secs = auth_timeout_secs;
            }
            if let Some(call_timeout_secs) = upstream.call_timeout_secs {
                self.upstream.call_timeout_secs = call_timeout_secs;
            }
            if let Some(report_timeout_secs) = upstream.report_timeout_secs {
                self.upstream.report_timeout_secs = report_timeout_secs;
            }
        }

        if let Some(account) = patch.service_account {
            if let (Some(login), Some(password)) = (account.login, account.password) {
                self.service_account =
                    Some(ServiceAccountConfig { login, password: password.into() });
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HRBRIDGE_UPSTREAM_BASE_URL") {
            self.upstream.base_url = value;
        }
        if let Some(value) = read_env("HRBRIDGE_UPSTREAM_DATABASE") {
            self.upstream.database = value;
        }
        if let Some(value) = read_env("HRBRIDGE_UPSTREAM_AUTH_TIMEOUT_SECS") {
            self.upstream.auth_timeout_secs =
                parse_u64("HRBRIDGE_UPSTREAM_AUTH_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HRBRIDGE_UPSTREAM_CALL_TIMEOUT_SECS") {
            self.upstream.call_timeout_secs =
                parse_u64("HRBRIDGE_UPSTREAM_CALL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HRBRIDGE_UPSTREAM_REPORT_TIMEOUT_SECS") {
            self.upstream.report_timeout_secs =
                parse_u64("HRBRIDGE_UPSTREAM_REPORT_TIMEOUT_SECS", &value)?;
        }

        let login = read_env("HRBRIDGE_SERVICE_LOGIN");
        let password = read_env("HRBRIDGE_SERVICE_PASSWORD");
        if let (Some(login), Some(password)) = (login, password) {
            self.service_account =
                Some(ServiceAccountConfig { login, password: password.into() });
        }

        let log_level =
            read_env("HRBRIDGE_LOGGING_LEVEL").or_else(|| read_env("HRBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HRBRIDGE_LOGGING_FORMAT").or_else(|| read_env("HRBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.upstream.base_url = base_url;
        }
        if let Some(database) = overrides.database {
            self.upstream.database = database;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_upstream(&self.upstream)?;
        if let Some(account) = &self.service_account {
            validate_service_account(account)?;
        }
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hrbridge.toml"), PathBuf::from("config/hrbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_upstream(upstream: &UpstreamConfig) -> Result<(), ConfigError> {
    let base_url = upstream.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "upstream.base_url must start with http:// or https://".to_string(),
        ));
    }

    if upstream.database.trim().is_empty() {
        return Err(ConfigError::Validation("upstream.database must not be empty".to_string()));
    }

    for (name, value) in [
        ("upstream.auth_timeout_secs", upstream.auth_timeout_secs),
        ("upstream.call_timeout_secs", upstream.call_timeout_secs),
        ("upstream.report_timeout_secs", upstream.report_timeout_secs),
    ] {
        if value == 0 || value > 300 {
            return Err(ConfigError::Validation(format!("{name} must be in range 1..=300")));
        }
    }

    Ok(())
}

fn validate_service_account(account: &ServiceAccountConfig) -> Result<(), ConfigError> {
    if account.login.trim().is_empty() {
        return Err(ConfigError::Validation(
            "service_account.login must not be empty".to_string(),
        ));
    }
    if account.password.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "service_account.password must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    upstream: Option<UpstreamPatch>,
    service_account: Option<ServiceAccountPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamPatch {
    base_url: Option<String>,
    database: Option<String>,
    auth_timeout_secs: Option<u64>,
    call_timeout_secs: Option<u64>,
    report_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceAccountPatch {
    login: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SERVICE_PASSWORD", "from-env-secret");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("hrbridge.toml");
            fs::write(
                &path,
                r#"
[upstream]
base_url = "https://erp.example.com"
database = "prod"

[service_account]
login = "bridge-bot"
password = "${TEST_SERVICE_PASSWORD}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let account = config.service_account.ok_or("service account should be set")?;
            ensure(
                account.password.expose_secret() == "from-env-secret",
                "password should be interpolated from environment",
            )?;
            ensure(
                config.upstream.base_url == "https://erp.example.com",
                "base url should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SERVICE_PASSWORD"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HRBRIDGE_UPSTREAM_DATABASE", "from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("hrbridge.toml");
            fs::write(
                &path,
                r#"
[upstream]
base_url = "https://erp-file.example.com"
database = "from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    base_url: Some("https://erp-override.example.com".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.upstream.base_url == "https://erp-override.example.com",
                "override base url should win",
            )?;
            ensure(config.upstream.database == "from-env", "env database should win over file")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["HRBRIDGE_UPSTREAM_DATABASE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HRBRIDGE_UPSTREAM_BASE_URL", "ftp://erp.example.com");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("upstream.base_url")
            );
            ensure(has_message, "validation failure should mention upstream.base_url")
        })();

        clear_vars(&["HRBRIDGE_UPSTREAM_BASE_URL"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HRBRIDGE_SERVICE_LOGIN", "bridge-bot");
        env::set_var("HRBRIDGE_SERVICE_PASSWORD", "super-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-value"),
                "debug output should not contain the service password",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["HRBRIDGE_SERVICE_LOGIN", "HRBRIDGE_SERVICE_PASSWORD"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HRBRIDGE_LOG_LEVEL", "warn");
        env::set_var("HRBRIDGE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should come from env")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should come from env",
            )?;
            Ok(())
        })();

        clear_vars(&["HRBRIDGE_LOG_LEVEL", "HRBRIDGE_LOG_FORMAT"]);
        result
    }
}
