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

use std::time::Duration;

use lettre::SmtpTransport;
use lettre::transport::smtp::authentication::Credentials;
use tracing::{info, warn};

use bidflow_core::{MailMode, MailSettings};

use crate::config::MailConfig;

/// Checks whether an SMTP account accepts connections.
pub trait MailProbe {
    fn is_available(&self, settings: &MailSettings) -> bool;
}

/// Connects and authenticates against the real server.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpProbe;

impl MailProbe for SmtpProbe {
    fn is_available(&self, settings: &MailSettings) -> bool {
        let transport = SmtpTransport::builder_dangerous(&settings.smtp_host)
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.smtp_user.clone(),
                settings.smtp_password.clone(),
            ))
            .timeout(Some(Duration::from_secs(settings.smtp_timeout)))
            .build();

        match transport.test_connection() {
            Ok(available) => available,
            Err(e) => {
                warn!(host = %settings.smtp_host, port = settings.smtp_port, error = %e, "SMTP probe failed");
                false
            }
        }
    }
}

/// Basic transport unless it is down and a reserve one is configured.
pub fn select_mail<'a>(config: &'a MailConfig, probe: &dyn MailProbe) -> (MailMode, &'a MailSettings) {
    if probe.is_available(&config.basic) {
        info!(host = %config.basic.smtp_host, "Using basic mail transport");
        return (MailMode::Basic, &config.basic);
    }

    match &config.reserve {
        Some(reserve) => {
            warn!(host = %reserve.smtp_host, "Basic mail transport unavailable, using reserve");
            (MailMode::Reserve, reserve)
        }
        None => {
            warn!("Basic mail transport unavailable and no reserve configured");
            (MailMode::Basic, &config.basic)
        }
    }
}
