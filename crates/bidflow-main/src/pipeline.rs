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

//! Run orchestrator
//!
//! One run: load the forecast of each direction, write a bid document per
//! metering point, hand every company's documents to the sender, wait until
//! they are gone, then compare the operator's monitoring report with what
//! was forecast.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{error, info, warn};

use bidflow_core::document::document_dir;
use bidflow_core::dispatch::write_dispatch_artifacts;
use bidflow_core::monitoring::{
    count_discrepancies, reconcile, reconciliation_path, write_reconciliation,
};
use bidflow_core::normalizer::{companies, hourly_values, metering_points_of};
use bidflow_core::{
    ALERT_CHANNEL, BidDocument, BidError, BidTemplate, Certificate, CertificateCache,
    CertificateStore, Contact, DispatchPlan, ExternalSender, ForecastLoader, ForecastStore,
    LOG_CHANNEL, MailMode, MailSettings, Notifier, ReportSource, Result, SnapshotStore,
    SubmissionGate,
};
use bidflow_shared::{Direction, NormalizedForecastRow};

use crate::config::AppConfig;
use crate::mail::{MailProbe, select_mail};

/// Everything the run needs from the outside world.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// `None` when the forecast store could not be opened.
    pub store: Option<&'a dyn ForecastStore>,
    pub notifier: &'a dyn Notifier,
    pub certificates: &'a dyn CertificateStore,
    pub sender: &'a dyn ExternalSender,
    pub reports: &'a dyn ReportSource,
    pub mail_probe: &'a dyn MailProbe,
}

impl fmt::Debug for Collaborators<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("store_available", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub target_date: NaiveDate,
    /// Launch the sender and wait for it. Without it only documents are written.
    pub dispatch: bool,
    pub reconcile: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationOutcome {
    Written {
        company: String,
        path: PathBuf,
        rows: usize,
        discrepancies: usize,
    },
    Failed {
        company: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub documents: Vec<PathBuf>,
    /// Documents left unsent by an earlier run, dispatched again as they are.
    pub pending_documents: Vec<PathBuf>,
    /// Metering points whose document could not be written.
    pub failed_documents: Vec<String>,
    /// Companies whose sender could not be launched. Their documents are
    /// moved to the `failed` directory next to the dated document folders.
    pub failed_dispatches: Vec<String>,
    pub skipped_companies: Vec<String>,
    pub reconciliations: Vec<ReconciliationOutcome>,
}

impl RunSummary {
    fn skip_company(&mut self, company: &str) {
        if !self.skipped_companies.iter().any(|c| c == company) {
            self.skipped_companies.push(company.to_owned());
        }
    }
}

#[derive(Debug)]
pub struct Pipeline<'a> {
    config: &'a AppConfig,
    deps: Collaborators<'a>,
}

/// A company whose documents were written, with what reconciliation needs.
#[derive(Debug)]
struct ProcessedCompany {
    code: String,
    certificate: Certificate,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a AppConfig, deps: Collaborators<'a>) -> Self {
        Self { config, deps }
    }

    pub fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let config = self.config;
        let target_date = options.target_date;
        info!(%target_date, dispatch = options.dispatch, reconcile = options.reconcile, "Run started");

        let (mode, mail) = if options.dispatch {
            select_mail(&config.mail, self.deps.mail_probe)
        } else {
            (MailMode::Basic, &config.mail.basic)
        };

        let snapshot = SnapshotStore::new(&config.paths.snapshot_dir);
        let loader = ForecastLoader::new(&snapshot);
        let gate = SubmissionGate::new(
            config.submission.poll_interval(),
            config.submission.propagation_delay(),
        );
        let documents_dir = document_dir(&config.paths.documents_dir, target_date);

        let mut certificates = CertificateCache::new();
        let mut summary = RunSummary::default();
        let mut processed: Vec<ProcessedCompany> = Vec::new();
        let mut merged: Vec<NormalizedForecastRow> = Vec::new();
        let mut dispatched_any = false;

        for &direction in &config.directions {
            info!(%direction, stage = "load", "Loading forecast");
            let loaded = loader.load(
                self.deps.store,
                config.forecast.sources(direction),
                direction,
                target_date,
                self.deps.notifier,
            )?;

            let mut dispatched = false;
            for company in companies(&loaded.rows) {
                let Some(certificate) =
                    self.resolve_company(&company, &mut certificates, &mut summary)
                else {
                    continue;
                };

                let written = self.write_documents(
                    &company,
                    direction,
                    target_date,
                    mail,
                    &loaded.rows,
                    &mut summary,
                );

                if options.dispatch && !written.is_empty() {
                    let metering_points: Vec<String> =
                        written.iter().map(|(point, _)| point.clone()).collect();
                    let plan = DispatchPlan {
                        company: &company,
                        direction,
                        target_date,
                        metering_points: &metering_points,
                        documents_dir: &documents_dir,
                        accepted_dir: &config.paths.accepted_dir,
                        mail,
                        mode,
                        certificate: &certificate,
                    };
                    match self.dispatch(&plan) {
                        Ok(()) => dispatched = true,
                        Err(e) => {
                            error!(%company, %direction, stage = "dispatch", error = %e, "Dispatch failed");
                            self.deps.notifier.notify(
                                ALERT_CHANNEL,
                                &format!("Dispatch of {direction} bids for {company} failed: {e}"),
                            );
                            // Nothing will pick these up; the gate must not wait for them.
                            self.set_aside(&company, written.iter().map(|(_, path)| path.as_path()))?;
                            summary.failed_dispatches.push(company.clone());
                        }
                    }
                }

                if !processed.iter().any(|p| p.code == company) {
                    processed.push(ProcessedCompany {
                        code: company,
                        certificate,
                    });
                }
            }

            merged.extend(loaded.rows);

            if dispatched {
                info!(%direction, stage = "gate", "Waiting for the sender");
                gate.await_drain(&documents_dir)?;
                self.deps
                    .notifier
                    .notify(LOG_CHANNEL, &format!("{direction} bids for {target_date} sent"));
                dispatched_any = true;
            }
        }

        if options.dispatch && options.reconcile {
            if dispatched_any {
                gate.await_propagation();
            }
            summary.reconciliations = self.reconcile_all(&processed, &merged, target_date);
        }

        info!(
            documents = summary.documents.len(),
            pending_documents = summary.pending_documents.len(),
            failed_documents = summary.failed_documents.len(),
            failed_dispatches = summary.failed_dispatches.len(),
            skipped_companies = summary.skipped_companies.len(),
            reconciliations = summary.reconciliations.len(),
            "Run finished"
        );
        Ok(summary)
    }

    /// Settings and certificate of a company, or `None` when it has to be skipped.
    fn resolve_company(
        &self,
        company: &str,
        certificates: &mut CertificateCache,
        summary: &mut RunSummary,
    ) -> Option<Certificate> {
        let resolved = self
            .config
            .company(company)
            .ok_or_else(|| BidError::UnknownCompany(company.to_owned()))
            .and_then(|settings| {
                certificates
                    .resolve(company, &settings.certificate_serial, self.deps.certificates)
                    .cloned()
            });

        match resolved {
            Ok(certificate) => Some(certificate),
            Err(e) => {
                warn!(company, stage = "certificate", error = %e, "Company skipped");
                self.deps
                    .notifier
                    .notify(ALERT_CHANNEL, &format!("Company {company} skipped: {e}"));
                summary.skip_company(company);
                None
            }
        }
    }

    /// Writes one document per metering point and returns the points ready
    /// to send with their files.
    ///
    /// An existing file is an unsent bid of an earlier run: it is kept as it is
    /// and sent again instead of being replaced.
    fn write_documents(
        &self,
        company: &str,
        direction: Direction,
        target_date: NaiveDate,
        mail: &MailSettings,
        rows: &[NormalizedForecastRow],
        summary: &mut RunSummary,
    ) -> Vec<(String, PathBuf)> {
        let Some(settings) = self.config.company(company) else {
            return Vec::new();
        };
        let template = BidTemplate {
            direction,
            target_date,
            contact: Contact {
                sender: settings.sender.clone(),
                representative: settings.representative().to_owned(),
                email: mail.e_mail.clone(),
            },
            params: self.config.bid.clone(),
        };

        let mut written = Vec::new();
        for metering_point in metering_points_of(rows, company) {
            let values = hourly_values(rows, &metering_point);
            let result = BidDocument::build(company, &metering_point, &values, &template)
                .and_then(|document| document.write(&self.config.paths.documents_dir));

            match result {
                Ok(path) => {
                    info!(company, %metering_point, stage = "document", path = %path.display(), "Bid document written");
                    summary.documents.push(path.clone());
                    written.push((metering_point, path));
                }
                Err(BidError::DocumentExists(path)) => {
                    warn!(company, %metering_point, stage = "document", path = %path.display(), "Unsent bid document found, sending it as is");
                    summary.pending_documents.push(path.clone());
                    written.push((metering_point, path));
                }
                Err(e) => {
                    error!(company, %metering_point, stage = "document", error = %e, "Bid document failed");
                    self.deps.notifier.notify(
                        ALERT_CHANNEL,
                        &format!("Bid document for {metering_point} ({company}) failed: {e}"),
                    );
                    summary.failed_documents.push(metering_point);
                }
            }
        }

        self.deps.notifier.notify(
            LOG_CHANNEL,
            &format!(
                "{direction} bids for {company}: {} documents ready",
                written.len()
            ),
        );
        written
    }

    /// Moves documents out of the folder the submission gate watches.
    fn set_aside<'p>(&self, company: &str, paths: impl Iterator<Item = &'p Path>) -> Result<()> {
        let failed_dir = self.config.paths.documents_dir.join("failed");
        fs::create_dir_all(&failed_dir)?;
        for path in paths {
            let Some(name) = path.file_name() else {
                continue;
            };
            let target = failed_dir.join(name);
            if let Err(e) = fs::rename(path, &target) {
                warn!(company, path = %path.display(), error = %e, "Cannot move unsent document, removing it");
                fs::remove_file(path)?;
            } else {
                info!(company, path = %target.display(), "Unsent document set aside");
            }
        }
        Ok(())
    }

    fn dispatch(&self, plan: &DispatchPlan<'_>) -> Result<()> {
        let artifacts = write_dispatch_artifacts(
            plan,
            &self.config.paths.work_dir,
            &self.config.submission.script_name,
            self.config.paths.sender_executable.as_deref(),
        )?;
        self.deps
            .sender
            .launch(&artifacts.script_path, &artifacts.work_dir)
    }

    fn reconcile_all(
        &self,
        processed: &[ProcessedCompany],
        forecast: &[NormalizedForecastRow],
        target_date: NaiveDate,
    ) -> Vec<ReconciliationOutcome> {
        processed
            .iter()
            .map(|company| {
                match self.reconcile_company(company, forecast, target_date) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(company = %company.code, stage = "reconcile", error = %e, "Reconciliation failed");
                        self.deps.notifier.notify(
                            ALERT_CHANNEL,
                            &format!("Reconciliation for {} failed: {e}", company.code),
                        );
                        ReconciliationOutcome::Failed {
                            company: company.code.clone(),
                            reason: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    fn reconcile_company(
        &self,
        company: &ProcessedCompany,
        forecast: &[NormalizedForecastRow],
        target_date: NaiveDate,
    ) -> Result<ReconciliationOutcome> {
        let code = company.code.as_str();
        info!(company = code, stage = "reconcile", "Fetching monitoring report");

        let report = self
            .deps
            .reports
            .fetch_report(code, target_date, &company.certificate)?;
        let records = reconcile(&report, forecast, code);
        let discrepancies = count_discrepancies(code, &records);

        let ats = &self.config.ats;
        let path = reconciliation_path(&self.config.paths.reports_dir, &ats.report_type, code, target_date);
        write_reconciliation(&path, &records)?;

        self.deps.notifier.notify(
            LOG_CHANNEL,
            &format!(
                "Monitoring report for {code}: {} metering points, {discrepancies} discrepancies",
                records.len()
            ),
        );

        Ok(ReconciliationOutcome::Written {
            company: code.to_owned(),
            path,
            rows: records.len(),
            discrepancies,
        })
    }
}
