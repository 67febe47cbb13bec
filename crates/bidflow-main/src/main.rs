// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of BidFlow.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! BidFlow - day-ahead bid submission for metering points

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bidflow_core::{ALERT_CHANNEL, ForecastStore, LogNotifier, Notifier};
use bidflow_main::ats::AtsClient;
use bidflow_main::certificates::ConfigCertificateStore;
use bidflow_main::config::LoggingSettings;
use bidflow_main::db::SqliteStore;
use bidflow_main::mail::SmtpProbe;
use bidflow_main::notifications::TelegramNotifier;
use bidflow_main::sender::ProcessSender;
use bidflow_main::{AppConfig, Collaborators, Pipeline, RunOptions};

#[derive(Parser)]
#[command(name = "bidflow")]
#[command(about = "Build and submit day-ahead bids from the latest forecast", long_about = None)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "bidflow.toml")]
    config: PathBuf,

    /// Target date (YYYY-MM-DD); tomorrow in the configured timezone by default
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Only write documents; no sending, no waiting, no reconciliation
    #[arg(long)]
    skip_dispatch: bool,

    /// Skip the monitoring report reconciliation
    #[arg(long)]
    skip_reconcile: bool,
}

fn init_tracing(logging: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_file(&cli.config)?;
    init_tracing(&config.logging)?;

    let target_date = match cli.date {
        Some(date) => date,
        None => config.target_date(Utc::now())?,
    };
    info!(config = %cli.config.display(), %target_date, "Starting BidFlow");

    let store = match SqliteStore::open(&config.database) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "Forecast store could not be opened");
            None
        }
    };

    let notifier: Box<dyn Notifier> = if config.notifications.channels.is_empty() {
        info!("No notification channels configured, notifications go to the log");
        Box::new(LogNotifier)
    } else {
        Box::new(TelegramNotifier::new(&config.notifications)?)
    };

    let certificates = ConfigCertificateStore::new(config.certificates.clone());
    let sender = ProcessSender::new(config.submission.launcher.clone());
    let reports = AtsClient::new(config.ats.clone(), notifier.as_ref());

    let deps = Collaborators {
        store: store.as_ref().map(|s| s as &dyn ForecastStore),
        notifier: notifier.as_ref(),
        certificates: &certificates,
        sender: &sender,
        reports: &reports,
        mail_probe: &SmtpProbe,
    };
    let options = RunOptions {
        target_date,
        dispatch: !cli.skip_dispatch,
        reconcile: !cli.skip_reconcile,
    };

    match Pipeline::new(&config, deps).run(options) {
        Ok(summary) => {
            info!(
                documents = summary.documents.len(),
                pending_documents = summary.pending_documents.len(),
                failed_documents = summary.failed_documents.len(),
                failed_dispatches = ?summary.failed_dispatches,
                skipped_companies = ?summary.skipped_companies,
                "BidFlow finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            notifier.notify(ALERT_CHANNEL, &format!("BidFlow run for {target_date} aborted: {e}"));
            Err(e.into())
        }
    }
}
