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

//! Submission gate - waits until the sender has consumed every document

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct SubmissionGate {
    poll_interval: Duration,
    propagation_delay: Duration,
}

impl SubmissionGate {
    pub fn new(poll_interval: Duration, propagation_delay: Duration) -> Self {
        Self {
            poll_interval,
            propagation_delay,
        }
    }

    /// Blocks until `dir` holds no entries. There is no upper bound.
    ///
    /// A directory that does not exist has nothing pending.
    pub fn await_drain(&self, dir: &Path) -> Result<()> {
        let start = Instant::now();
        info!(dir = %dir.display(), "Waiting for pending documents to be sent");

        loop {
            match pending_entries(dir)? {
                None => {
                    warn!(dir = %dir.display(), "Document directory missing, nothing pending");
                    return Ok(());
                }
                Some(0) => {
                    info!(
                        dir = %dir.display(),
                        waited_secs = start.elapsed().as_secs(),
                        "All documents sent"
                    );
                    return Ok(());
                }
                Some(pending) => {
                    debug!(pending, "Documents still pending");
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
    }

    /// Gives the operator time to register the submissions before reports are fetched.
    pub fn await_propagation(&self) {
        info!(secs = self.propagation_delay.as_secs(), "Waiting for submissions to propagate");
        std::thread::sleep(self.propagation_delay);
    }
}

fn pending_entries(dir: &Path) -> Result<Option<usize>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(Some(entries.count())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
