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

//! BidFlow application - configuration, adapters and the run orchestrator

pub mod ats;
pub mod certificates;
pub mod config;
pub mod db;
pub mod mail;
pub mod notifications;
pub mod pipeline;
pub mod sender;

pub use config::AppConfig;
pub use pipeline::{Collaborators, Pipeline, ReconciliationOutcome, RunOptions, RunSummary};
