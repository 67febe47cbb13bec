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

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use bidflow_core::{BidError, ExternalSender, Result};

/// Starts the dispatch script through a launcher such as `cmd /C`.
#[derive(Debug, Clone)]
pub struct ProcessSender {
    launcher: Vec<String>,
}

impl ProcessSender {
    #[must_use]
    pub fn new(launcher: Vec<String>) -> Self {
        Self { launcher }
    }
}

impl ExternalSender for ProcessSender {
    fn launch(&self, script: &Path, work_dir: &Path) -> Result<()> {
        let Some((program, args)) = self.launcher.split_first() else {
            return Err(BidError::Dispatch("launcher is empty".to_owned()));
        };

        let child = Command::new(program)
            .args(args)
            .arg(script)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BidError::Dispatch(format!("failed to start {program} {}: {e}", script.display())))?;

        // Not waited on; the submission gate observes completion.
        info!(pid = child.id(), script = %script.display(), "Sender launched");
        Ok(())
    }
}
