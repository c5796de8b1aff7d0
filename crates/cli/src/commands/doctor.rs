use std::sync::Arc;

use hrbridge_core::config::{AppConfig, LoadOptions};
use hrbridge_erp::{Executor, HttpTransport, InMemoryVault};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_service_account(&config));
            checks.push(check_upstream_authentication(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "service_account_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "upstream_authentication",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    // Skipped checks count as passing: a deployment without a service
    // account is a valid stateless-mode deployment.
    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_service_account(config: &AppConfig) -> DoctorCheck {
    match &config.service_account {
        Some(account) => DoctorCheck {
            name: "service_account_readiness",
            status: CheckStatus::Pass,
            details: format!("service account `{}` configured", account.login),
        },
        None => DoctorCheck {
            name: "service_account_readiness",
            status: CheckStatus::Skipped,
            details: "no service account configured; stateful calls will require vault tokens"
                .to_string(),
        },
    }
}

fn check_upstream_authentication(config: &AppConfig) -> DoctorCheck {
    let Some(account) = config.service_account.clone() else {
        return DoctorCheck {
            name: "upstream_authentication",
            status: CheckStatus::Skipped,
            details: "skipped because no service account is configured".to_string(),
        };
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "upstream_authentication",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let base_url = config.upstream.base_url.clone();
    let upstream = config.upstream.clone();
    let result = runtime.block_on(async {
        let transport = HttpTransport::new(&base_url)
            .map_err(|error| format!("failed to build http transport: {error}"))?;
        let executor =
            Executor::new(Arc::new(transport), Arc::new(InMemoryVault::default()), upstream);

        let session = executor
            .authenticate(&account.login, &account.password)
            .await
            .map_err(|error| format!("authentication failed: {error}"))?;

        match executor.probe_session(&session).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("session expired immediately after login".to_string()),
            Err(error) => Err(format!("session probe failed: {error}")),
        }
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "upstream_authentication",
            status: CheckStatus::Pass,
            details: format!("authenticated against `{}`", config.upstream.base_url),
        },
        Err(error) => {
            DoctorCheck { name: "upstream_authentication", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> DoctorReport {
        DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Pass,
                    details: "configuration loaded and validated".to_string(),
                },
                DoctorCheck {
                    name: "service_account_readiness",
                    status: CheckStatus::Skipped,
                    details: "no service account configured".to_string(),
                },
                DoctorCheck {
                    name: "upstream_authentication",
                    status: CheckStatus::Fail,
                    details: "authentication failed: connection refused".to_string(),
                },
            ],
        }
    }

    #[test]
    fn render_human_lists_each_check_with_status_marker() {
        let rendered = render_human(&sample_report());
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], "doctor: one or more readiness checks failed");
        assert_eq!(lines[1], "- [ok] config_validation: configuration loaded and validated");
        assert_eq!(lines[2], "- [skip] service_account_readiness: no service account configured");
        assert_eq!(
            lines[3],
            "- [fail] upstream_authentication: authentication failed: connection refused"
        );
    }

    #[test]
    fn report_serializes_statuses_in_snake_case() {
        let json = serde_json::to_value(sample_report()).unwrap();

        assert_eq!(json["overall_status"], "fail");
        assert_eq!(json["checks"][0]["status"], "pass");
        assert_eq!(json["checks"][1]["status"], "skipped");
    }

    #[test]
    fn escape_json_quotes_backslashes_and_double_quotes() {
        assert_eq!(escape_json(r#"path "C:\tmp""#), r#"path \"C:\\tmp\""#);
    }
}
