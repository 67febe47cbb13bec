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

//! BidFlow core - forecast selection, bid documents and report reconciliation
//!
//! Pure pipeline logic. Everything that talks to the network, the database or
//! the operating system sits behind the traits in [`traits`] and is provided
//! by `bidflow-main`.

pub mod certificates;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod gate;
pub mod monitoring;
pub mod normalizer;
pub mod retry;
pub mod selector;
pub mod snapshot;
pub mod traits;

pub use certificates::CertificateCache;
pub use dispatch::{DispatchArtifacts, DispatchPlan, MailMode, MailSettings};
pub use document::{BidDocument, BidParameters, BidTemplate, Contact, DocumentIdentity};
pub use error::{BidError, Result};
pub use gate::SubmissionGate;
pub use retry::{Backoff, RetryPolicy};
pub use selector::{ForecastLoader, ForecastOrigin, LoadedForecast, select_forecast};
pub use snapshot::SnapshotStore;
pub use traits::{
    ALERT_CHANNEL, Certificate, CertificateStore, ExternalSender, ForecastStore, LOG_CHANNEL,
    LogNotifier, Notifier, ReportSource,
};
