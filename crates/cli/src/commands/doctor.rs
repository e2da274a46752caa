use pillar_core::config::{AppConfig, LoadOptions};
use pillar_db::connect_with_settings;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{runtime, CommandResult};

const DOCTOR_FAILED_EXIT: u8 = 6;

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

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { DOCTOR_FAILED_EXIT };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"command\":\"doctor\",\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_slack_tokens(&config));
            checks.push(check_database_connectivity(&config));
            checks.extend(check_integrations(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["slack_token_readiness", "database_connectivity"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    // Unconfigured optional integrations are skipped, not failed.
    let healthy = checks.iter().all(|check| check.status != CheckStatus::Fail)
        && checks.iter().any(|check| check.status == CheckStatus::Pass);
    let overall_status = if healthy { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if healthy {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { command: "doctor", overall_status, summary, checks }
}

fn check_slack_tokens(config: &AppConfig) -> DoctorCheck {
    let app_ok = config.slack.app_token.expose_secret().starts_with("xapp-");
    let bot_ok = config.slack.bot_token.expose_secret().starts_with("xoxb-");

    match (app_ok, bot_ok) {
        (true, true) => DoctorCheck::new(
            "slack_token_readiness",
            CheckStatus::Pass,
            "app token (xapp-) and bot token (xoxb-) present",
        ),
        _ => DoctorCheck::new(
            "slack_token_readiness",
            CheckStatus::Fail,
            "slack.app_token must start with `xapp-` and slack.bot_token with `xoxb-`",
        ),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err((_, message, _)) => {
            return DoctorCheck::new("database_connectivity", CheckStatus::Fail, message);
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        ),
        Err(error) => DoctorCheck::new("database_connectivity", CheckStatus::Fail, error),
    }
}

fn check_integrations(config: &AppConfig) -> Vec<DoctorCheck> {
    [
        ("web_search", config.search.is_configured(), "search.tavily_api_key"),
        ("google_docs", config.google.is_configured(), "google.client_id/google.client_secret"),
        ("airtable", config.airtable.is_configured(), "airtable.api_key/airtable.base_id"),
    ]
    .into_iter()
    .map(|(name, configured, keys)| {
        if configured {
            DoctorCheck::new(name, CheckStatus::Pass, "configured")
        } else {
            DoctorCheck::new(name, CheckStatus::Skipped, format!("optional; set {keys} to enable"))
        }
    })
    .collect()
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
