// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GasWatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod cli;
mod config;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use gaswatch_core::{
    CycleOutcome, CycleSettings, JsonFileStorage, Orchestrator, run_cycle_isolated,
};
use gaswatch_portal::{
    PayloadFormat, PortalClient, Remediation, ResponseClassifier, UsageParser,
};
use gaswatch_types::UsageRecord;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::{Cli, Commands, InspectArgs};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.system.log_level)?;

    match cli.command {
        Commands::Run => run_daemon(&config).await,
        Commands::Once => run_once(&config).await,
        Commands::Verify => verify(&config).await,
        Commands::Inspect(args) => inspect(&config, &args),
    }
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .with_context(|| format!("Invalid log level '{log_level}'"))?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")
}

fn portal_client(config: &AppConfig) -> Result<PortalClient> {
    let credentials = config.credentials()?;
    let classifier = ResponseClassifier::new(config.indicators.table());
    let client = PortalClient::new(config.portal.clone(), credentials)
        .context("Failed to create portal client")?
        .with_classifier(classifier);
    Ok(client)
}

fn build_orchestrator(config: &AppConfig) -> Result<Arc<Orchestrator>> {
    let client = portal_client(config)?;
    let storage = JsonFileStorage::new(&config.storage.path);
    let settings = CycleSettings {
        schedule: config.schedule.resolve()?,
        model: config.model.clone(),
        billing: config.billing,
    };

    Ok(Arc::new(Orchestrator::new(
        Arc::new(client),
        Arc::new(storage),
        settings,
    )))
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received");
                token.cancel();
            }
            Err(e) => warn!("Unable to listen for shutdown signal: {}", e),
        }
    });
}

async fn run_daemon(config: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    info!("🚀 Starting GasWatch");
    info!("📋 Configuration Summary:");
    info!("   Portal: {}", config.portal.base_url);
    info!(
        "   Account: {}",
        config.credentials()?.masked_username()
    );
    info!(
        "   Schedule: daily at {} ({})",
        config.schedule.run_at, config.schedule.timezone
    );
    info!(
        "   Request spacing: {}s, attempts: {}",
        config.portal.min_request_interval_secs, config.portal.max_attempts
    );
    info!("   History: {}", config.storage.path);

    // First cycle runs immediately
    let mut next_run = Utc::now();

    loop {
        let wait = (next_run - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            info!("💤 Next acquisition cycle at {}", next_run);
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }

        let outcome =
            run_cycle_isolated(Arc::clone(&orchestrator), Utc::now(), shutdown.clone()).await;
        if shutdown.is_cancelled() {
            break;
        }

        if let CycleOutcome::Failed { error, .. } = &outcome
            && error.remediation() == Remediation::Reauthenticate
        {
            anyhow::bail!(
                "Portal rejected the configured credentials ({error}); update them and restart"
            );
        }
        next_run = outcome.next_run();
    }

    info!("👋 GasWatch stopped");
    Ok(())
}

async fn run_once(config: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match run_cycle_isolated(orchestrator, Utc::now(), cancel).await {
        CycleOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        CycleOutcome::Failed { error, next_run } => Err(anyhow::Error::new(error))
            .with_context(|| format!("Acquisition cycle failed (next scheduled run {next_run})")),
    }
}

async fn verify(config: &AppConfig) -> Result<()> {
    let client = portal_client(config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    client
        .verify_credentials(&cancel)
        .await
        .with_context(|| {
            format!(
                "Credential check failed for {}",
                client.credentials().masked_username()
            )
        })?;

    info!("✅ Credentials accepted by the portal");
    println!("Credentials OK");
    Ok(())
}

#[derive(Debug, Serialize)]
struct InspectSummary {
    format: PayloadFormat,
    columns: Vec<String>,
    dated_records: usize,
    rows_skipped: usize,
    total_usage: f64,
    latest_usage: f64,
    period_start: Option<String>,
    period_end: Option<String>,
    estimated_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<Vec<UsageRecord>>,
}

fn inspect(config: &AppConfig, args: &InspectArgs) -> Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let parser = UsageParser::new(ResponseClassifier::new(config.indicators.table()));
    let report = parser
        .parse(&bytes)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;

    let summary = InspectSummary {
        format: report.format,
        columns: report.columns.clone(),
        dated_records: report.records.len(),
        rows_skipped: report.rows_skipped,
        total_usage: report.total_usage,
        latest_usage: report.latest_usage,
        period_start: report.period_start.clone(),
        period_end: report.period_end.clone(),
        estimated_cost: config.billing.estimate(report.total_usage.max(0.0)),
        records: args.records.then(|| report.records.clone()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
