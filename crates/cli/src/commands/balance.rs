use std::sync::Arc;

use chrono::{Datelike, Utc};
use hrbridge_core::config::{AppConfig, LoadOptions};
use hrbridge_core::format_remaining_message;
use hrbridge_erp::{BalanceService, Executor, HttpTransport, InMemoryVault};

use super::CommandResult;

pub fn run(employee_id: i64, year: Option<i32>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("balance", "config", error.to_string(), 2);
        }
    };

    let Some(account) = config.service_account.clone() else {
        return CommandResult::failure(
            "balance",
            "config",
            "no service account configured; set HRBRIDGE_SERVICE_LOGIN and HRBRIDGE_SERVICE_PASSWORD",
            2,
        );
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "balance",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    let current_year = year.unwrap_or_else(|| Utc::now().year());
    let upstream = config.upstream.clone();
    let result = runtime.block_on(async {
        let transport = HttpTransport::new(&upstream.base_url)
            .map_err(|error| format!("failed to build http transport: {error}"))?;
        let executor = Arc::new(Executor::new(
            Arc::new(transport),
            Arc::new(InMemoryVault::default()),
            upstream,
        ));

        let session = executor
            .authenticate(&account.login, &account.password)
            .await
            .map_err(|error| format!("authentication failed: {error}"))?;

        let balances = BalanceService::new(executor)
            .remaining_for_display(&session, None, employee_id, current_year)
            .await
            .map_err(|error| format!("balance fetch failed: {error}"))?;

        Ok::<String, String>(format_remaining_message(&balances.balances))
    });

    match result {
        Ok(message) => CommandResult::success("balance", message),
        Err(error) => CommandResult::failure("balance", "upstream", error, 1),
    }
}
