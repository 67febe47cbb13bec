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

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde_json::json;
use tracing::{debug, error, warn};

use bidflow_core::{Backoff, Notifier};

use crate::config::{NotificationSettings, TelegramChannel};

/// Statuses worth retrying; anything else fails the message immediately.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Telegram's limit for one message.
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug)]
pub struct TelegramNotifier {
    client: Client,
    api_base_url: String,
    channels: Vec<TelegramChannel>,
    backoff: Backoff,
}

impl TelegramNotifier {
    pub fn new(settings: &NotificationSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_owned(),
            channels: settings.channels.clone(),
            backoff: Backoff::new(settings.max_retries, Duration::from_millis(settings.backoff_ms)),
        })
    }

    fn send(&self, channel: &TelegramChannel, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base_url, channel.bot_token);
        let text: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        let body = json!({ "chat_id": channel.chat_id, "text": text });

        let mut retries = 0;
        loop {
            match self.client.post(&url).json(&body).send() {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response)
                    if RETRY_STATUSES.contains(&response.status().as_u16())
                        && retries < self.backoff.max_retries =>
                {
                    warn!(status = %response.status(), retries, "Telegram API busy, retrying");
                }
                Ok(response) => bail!("Telegram API returned HTTP {}", response.status()),
                Err(e) if retries < self.backoff.max_retries => {
                    warn!(error = %e, retries, "Telegram request failed, retrying");
                }
                Err(e) => return Err(e).context("Telegram request failed"),
            }
            retries += 1;
            std::thread::sleep(self.backoff.delay_for(retries));
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, channel: usize, text: &str) {
        let Some(target) = self.channels.get(channel) else {
            warn!(channel, "Notification channel not configured, message dropped");
            return;
        };

        match self.send(target, text) {
            Ok(()) => debug!(channel, "Notification sent"),
            Err(e) => error!(channel, error = %e, "Failed to send notification"),
        }
    }
}
