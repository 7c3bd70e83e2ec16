use anyhow::Context;
use chrono::Local; // timestamp in log lines
use clap::Parser;
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::process::ExitCode;

use stripe_migrate::{
    cli::Cli,
    config::Config,
    external::StripeClient,
    models::RunReport,
    services::MigrationService,
};

fn init_logger(default_filter: &str) {
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<RunReport> {
    let config = Config::from_toml().context("failed to load configuration")?;
    let run_config = cli.run_config(&config);
    let retry = config.retry.policy();

    let source = StripeClient::new(config.source.clone(), retry.clone(), "source")
        .context("failed to build source account client")?;
    let target = StripeClient::new(config.target.clone(), retry, "target")
        .context("failed to build target account client")?;

    if run_config.live {
        log::warn!("LIVE mode: changes will be written to the target account");
    } else {
        log::info!("Dry run: no changes will be made. Pass --live to apply");
    }
    log::info!(
        "Running step '{}' with price status policy {:?}",
        run_config.step,
        run_config.price_status_policy
    );

    let report = MigrationService::new(&source, &target, run_config)
        .run()
        .await;

    if let Some(path) = &cli.report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        log::info!("Run report written to {}", path.display());
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logger(cli.log_filter());

    match run(&cli).await {
        Ok(report) if report.is_clean() => {
            log::info!("Migration finished without problems");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            let summary = report.summary();
            log::warn!(
                "Migration finished with {} failed and {} skipped item(s)",
                summary.failed,
                summary.skipped_no_payment_method
            );
            ExitCode::from(1)
        }
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
