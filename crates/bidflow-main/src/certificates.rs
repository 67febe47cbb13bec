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

use tracing::warn;

use bidflow_core::{Certificate, CertificateStore};

use crate::config::CertificateEntry;

/// Certificate table populated from configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigCertificateStore {
    entries: Vec<CertificateEntry>,
}

impl ConfigCertificateStore {
    #[must_use]
    pub fn new(entries: Vec<CertificateEntry>) -> Self {
        Self { entries }
    }
}

/// Serials compare without case and whitespace.
fn normalize_serial(serial: &str) -> String {
    serial
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

impl CertificateStore for ConfigCertificateStore {
    fn find_certificate(&self, serial: &str) -> Option<Certificate> {
        let wanted = normalize_serial(serial);
        let entry = self
            .entries
            .iter()
            .find(|entry| normalize_serial(&entry.serial) == wanted)?;

        let identity_pem = entry.identity_pem.as_ref().and_then(|path| {
            std::fs::read(path)
                .map_err(|e| {
                    warn!(path = %path.display(), error = %e, "Failed to read client identity");
                })
                .ok()
        });

        Some(Certificate {
            serial: entry.serial.clone(),
            subject: entry.subject.clone(),
            thumbprint: entry.thumbprint.clone(),
            identity_pem,
        })
    }
}
