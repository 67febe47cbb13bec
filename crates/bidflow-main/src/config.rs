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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use bidflow_core::monitoring::REPORT_HEADER_MARKER;
use bidflow_core::{BidParameters, MailSettings, RetryPolicy};
use bidflow_shared::{Direction, ForecastSource};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Timezone the target date is computed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Directions processed in one run, in order.
    #[serde(default = "default_directions")]
    pub directions: Vec<Direction>,
    #[serde(default)]
    pub logging: LoggingSettings,
    pub paths: PathSettings,
    pub database: DatabaseSettings,
    pub forecast: ForecastSettings,
    #[serde(default)]
    pub bid: BidParameters,
    #[serde(default)]
    pub submission: SubmissionSettings,
    #[serde(default)]
    pub ats: AtsSettings,
    pub mail: MailConfig,
    #[serde(default)]
    pub notifications: NotificationSettings,
    pub companies: BTreeMap<String, CompanySettings>,
    #[serde(default)]
    pub certificates: Vec<CertificateEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Log file; logs go to stderr when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSettings {
    /// Base directory; documents land in `{documents_dir}/{YYYY}/{MM}/`.
    pub documents_dir: PathBuf,
    /// Where the sender moves documents it submitted.
    pub accepted_dir: PathBuf,
    /// Per-company sender work directories are created below this.
    pub work_dir: PathBuf,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Sender executable copied into each work directory.
    #[serde(default)]
    pub sender_executable: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub forecast_path: PathBuf,
    /// Database holding the metering point reference table. Defaults to the forecast database.
    #[serde(default)]
    pub reference_path: Option<PathBuf>,
}

/// Forecast providers per direction, most accurate first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastSettings {
    #[serde(default)]
    pub generation: Vec<ForecastSource>,
    #[serde(default)]
    pub consumption: Vec<ForecastSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_propagation_delay_secs")]
    pub propagation_delay_secs: u64,
    /// Script file name; `{company}` is replaced by the company code.
    #[serde(default = "default_script_name")]
    pub script_name: String,
    /// Program and arguments the script path is appended to.
    #[serde(default = "default_launcher")]
    pub launcher: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtsSettings {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_reports_url")]
    pub reports_url: String,
    #[serde(default = "default_monitoring_url")]
    pub monitoring_url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Unlimited when unset.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_report_type")]
    pub report_type: String,
    #[serde(default = "default_header_marker")]
    pub header_marker: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub basic: MailSettings,
    #[serde(default)]
    pub reserve: Option<MailSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_telegram_api")]
    pub api_base_url: String,
    #[serde(default = "default_notify_retries")]
    pub max_retries: u32,
    #[serde(default = "default_notify_backoff_ms")]
    pub backoff_ms: u64,
    /// Index in this list is the channel number used by the pipeline.
    #[serde(default)]
    pub channels: Vec<TelegramChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChannel {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanySettings {
    /// Serial number of the company's signing certificate.
    pub certificate_serial: String,
    pub sender: String,
    /// Defaults to the sender.
    #[serde(default)]
    pub representative: Option<String>,
}

impl CompanySettings {
    #[must_use]
    pub fn representative(&self) -> &str {
        self.representative.as_deref().unwrap_or(&self.sender)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateEntry {
    pub serial: String,
    #[serde(default)]
    pub subject: String,
    pub thumbprint: String,
    /// PEM file with the client certificate and key.
    #[serde(default)]
    pub identity_pem: Option<PathBuf>,
}

fn default_timezone() -> String {
    "Europe/Moscow".to_owned()
}

fn default_directions() -> Vec<Direction> {
    vec![Direction::Generation]
}

fn default_log_filter() -> String {
    "bidflow=info".to_owned()
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_propagation_delay_secs() -> u64 {
    300
}

fn default_script_name() -> String {
    "send_bids_{company}.bat".to_owned()
}

fn default_launcher() -> Vec<String> {
    vec!["cmd".to_owned(), "/C".to_owned()]
}

fn default_auth_url() -> String {
    "https://www.atsenergo.ru/auth".to_owned()
}

fn default_reports_url() -> String {
    "https://protected.atsenergo.ru/f800xx_reports/".to_owned()
}

fn default_monitoring_url() -> String {
    "https://protected.atsenergo.ru/bids-monitoring/zxweb.report.gtp_status.form.do".to_owned()
}

fn default_origin() -> String {
    "https://www.atsenergo.ru".to_owned()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0 Safari/537.36"
        .to_owned()
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_report_type() -> String {
    "bids_monitoring".to_owned()
}

fn default_header_marker() -> String {
    REPORT_HEADER_MARKER.to_owned()
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_owned()
}

fn default_notify_retries() -> u32 {
    3
}

fn default_notify_backoff_ms() -> u64 {
    1000
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
        }
    }
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            propagation_delay_secs: default_propagation_delay_secs(),
            script_name: default_script_name(),
            launcher: default_launcher(),
        }
    }
}

impl Default for AtsSettings {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            reports_url: default_reports_url(),
            monitoring_url: default_monitoring_url(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: None,
            request_timeout_secs: default_request_timeout_secs(),
            report_type: default_report_type(),
            header_marker: default_header_marker(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_telegram_api(),
            max_retries: default_notify_retries(),
            backoff_ms: default_notify_backoff_ms(),
            channels: Vec::new(),
        }
    }
}

impl ForecastSettings {
    #[must_use]
    pub fn sources(&self, direction: Direction) -> &[ForecastSource] {
        match direction {
            Direction::Generation => &self.generation,
            Direction::Consumption => &self.consumption,
        }
    }
}

impl SubmissionSettings {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }
}

impl AtsSettings {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(self.retry_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

impl DatabaseSettings {
    #[must_use]
    pub fn reference_path(&self) -> &Path {
        self.reference_path.as_deref().unwrap_or(&self.forecast_path)
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.directions.is_empty() {
            bail!("directions must name at least one direction");
        }
        for direction in &self.directions {
            if self.forecast.sources(*direction).is_empty() {
                bail!("forecast.{direction} must list at least one source");
            }
        }
        if self.companies.is_empty() {
            bail!("companies must contain at least one company");
        }
        if self.submission.poll_interval_ms == 0 {
            bail!("submission.poll_interval_ms must be greater than zero");
        }
        if self.submission.launcher.is_empty() {
            bail!("submission.launcher must name a program");
        }
        if self.mail.basic.smtp_host.is_empty() {
            bail!("mail.basic.smtp_host must be set");
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone {}: {e}", self.timezone))
    }

    /// Tomorrow in the configured timezone.
    pub fn target_date(&self, now: DateTime<Utc>) -> Result<NaiveDate> {
        now.with_timezone(&self.tz()?)
            .date_naive()
            .checked_add_days(Days::new(1))
            .context("Target date out of range")
    }

    /// Company settings; company codes compare case-insensitively.
    #[must_use]
    pub fn company(&self, code: &str) -> Option<&CompanySettings> {
        self.companies.get(code).or_else(|| {
            let wanted = code.to_lowercase();
            self.companies
                .iter()
                .find(|(key, _)| key.to_lowercase() == wanted)
                .map(|(_, settings)| settings)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"
directions = ["generation", "consumption"]

[paths]
documents_dir = "/srv/cz"
accepted_dir = "/srv/cz/accepted"
work_dir = "/srv/work"

[database]
forecast_path = "/srv/db/forecast.db"

[[forecast.generation]]
name = "skm_LGBM_2024"
id = 29

[[forecast.generation]]
name = "skm_ecmwf"
id = 27

[[forecast.consumption]]
name = "skm_LGBM_2024"
id = 35

[mail.basic]
e_mail = "bids@example.com"
smtp_host = "smtp.example.com"
smtp_user = "bids"
smtp_password = "secret"

[companies.SOLAR1]
certificate_serial = "01AB"
sender = "Ivanov I.I."
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = AppConfig::parse(SAMPLE).unwrap();

        assert_eq!(config.timezone, "Europe/Moscow");
        assert_eq!(config.directions, vec![Direction::Generation, Direction::Consumption]);
        let names: Vec<_> = config
            .forecast
            .sources(Direction::Generation)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["skm_LGBM_2024", "skm_ecmwf"]);
        assert_eq!(config.bid, BidParameters::default());
        assert_eq!(config.submission.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.submission.propagation_delay(), Duration::from_secs(300));
        assert_eq!(config.mail.basic.smtp_port, 25);
        assert!(config.mail.reserve.is_none());
        assert_eq!(config.ats.retry_policy().max_attempts, None);
        assert_eq!(config.database.reference_path(), Path::new("/srv/db/forecast.db"));
        assert_eq!(config.company("SOLAR1").unwrap().representative(), "Ivanov I.I.");
    }

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::parse(include_str!("../../../bidflow.example.toml")).unwrap();
        assert_eq!(config.notifications.channels.len(), 2);
        assert_eq!(config.mail.reserve.as_ref().unwrap().smtp_port, 465);
        assert_eq!(config.company("solar1").unwrap().representative(), "Petrov P.P.");
        assert_eq!(config.certificates[0].serial, "01AB9F");
    }

    #[test]
    fn test_company_lookup_ignores_case() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        assert!(config.company("solar1").is_some());
        assert!(config.company("SOLAR2").is_none());
    }

    #[test]
    fn test_missing_sources_for_enabled_direction() {
        let content = SAMPLE.replace("[[forecast.consumption]]\nname = \"skm_LGBM_2024\"\nid = 35\n", "");
        let err = AppConfig::parse(&content).unwrap_err();
        assert!(err.to_string().contains("forecast.consumption"));
    }

    #[test]
    fn test_invalid_timezone() {
        let content = format!("timezone = \"Mars/Olympus\"\n{SAMPLE}");
        assert!(AppConfig::parse(&content).is_err());
    }

    #[test]
    fn test_target_date_is_tomorrow_in_configured_timezone() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        // 22:30 UTC is already the next day in Moscow (UTC+3).
        let now = Utc.with_ymd_and_hms(2025, 7, 3, 22, 30, 0).unwrap();
        assert_eq!(
            config.target_date(now).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 5).unwrap()
        );
    }
}
