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

use std::collections::HashMap;

use tracing::debug;

use crate::error::{BidError, Result};
use crate::traits::{Certificate, CertificateStore};

/// Certificates resolved during one run, keyed by company.
#[derive(Debug, Default)]
pub struct CertificateCache {
    by_company: HashMap<String, Certificate>,
}

impl CertificateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks the company's certificate up once and reuses it afterwards.
    pub fn resolve(
        &mut self,
        company: &str,
        serial: &str,
        store: &dyn CertificateStore,
    ) -> Result<&Certificate> {
        if !self.by_company.contains_key(company) {
            let certificate =
                store
                    .find_certificate(serial)
                    .ok_or_else(|| BidError::CertificateNotFound {
                        company: company.to_owned(),
                        serial: serial.to_owned(),
                    })?;
            debug!(company, subject = %certificate.subject, "Certificate resolved");
            self.by_company.insert(company.to_owned(), certificate);
        }
        self.by_company
            .get(company)
            .ok_or_else(|| BidError::CertificateNotFound {
                company: company.to_owned(),
                serial: serial.to_owned(),
            })
    }

    #[must_use]
    pub fn get(&self, company: &str) -> Option<&Certificate> {
        self.by_company.get(company)
    }
}
