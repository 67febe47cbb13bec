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

//! Client for the market operator's protected report area.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use bidflow_core::monitoring::parse_report;
use bidflow_core::{
    BidError, Certificate, LOG_CHANNEL, Notifier, ReportSource, Result, RetryPolicy,
};
use bidflow_shared::MonitoringReportRow;

use crate::config::AtsSettings;

/// Forces the server to send a fresh report instead of a cached one.
const NOT_MODIFIED_SINCE: &str = "Sat, 1 Jan 2000 00:00:00 GMT";

pub struct AtsClient<'a> {
    settings: AtsSettings,
    retry: RetryPolicy,
    notifier: &'a dyn Notifier,
}

impl fmt::Debug for AtsClient<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtsClient")
            .field("auth_url", &self.settings.auth_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<'a> AtsClient<'a> {
    pub fn new(settings: AtsSettings, notifier: &'a dyn Notifier) -> Self {
        let retry = settings.retry_policy();
        Self {
            settings,
            retry,
            notifier,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn client_for(&self, certificate: &Certificate) -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            header::ACCEPT_CHARSET,
            HeaderValue::from_static("windows-1251,utf-8;q=0.7,*;q=0.7"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(header::ORIGIN, header_value(&self.settings.origin)?);
        headers.insert(header::USER_AGENT, header_value(&self.settings.user_agent)?);

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(self.settings.request_timeout_secs));

        if let Some(pem) = &certificate.identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| BidError::Report(format!("invalid client identity {}: {e}", certificate.serial)))?;
            builder = builder.identity(identity);
        } else {
            warn!(serial = %certificate.serial, "No client identity for certificate, connecting without one");
        }

        builder
            .build()
            .map_err(|e| BidError::Report(format!("failed to build HTTP client: {e}")))
    }

    /// Runs the session handshake and downloads the raw report spreadsheet.
    pub fn download_report(
        &self,
        company: &str,
        date: NaiveDate,
        certificate: &Certificate,
    ) -> Result<Vec<u8>> {
        let client = self.client_for(certificate)?;

        let auth = self.send_with_retry(&self.settings.auth_url, || client.get(&self.settings.auth_url))?;
        let mut cookies = session_cookies(&auth);
        debug!(company, cookies = cookies.len(), "Session opened");

        let entry = self.send_with_retry(&self.settings.reports_url, || {
            client
                .post(&self.settings.reports_url)
                .header(header::COOKIE, cookies.join("; "))
        })?;
        cookies.extend(session_cookies(&entry));
        let cookie = cookies.join("; ");

        let day = date.format("%d.%m.%Y").to_string();
        let query = [
            ("str_trader_code", company),
            ("dt_begin_date", day.as_str()),
            ("dt_end_date", day.as_str()),
            ("gtp_group_id", "-1"),
        ];
        let report = self.send_with_retry(&self.settings.monitoring_url, || {
            client
                .get(&self.settings.monitoring_url)
                .query(&query)
                .header(header::COOKIE, cookie.as_str())
                .header(header::IF_MODIFIED_SINCE, NOT_MODIFIED_SINCE)
        })?;

        let bytes = report.bytes().map_err(|e| BidError::Request {
            url: self.settings.monitoring_url.clone(),
            attempts: 1,
            reason: e.to_string(),
        })?;
        info!(company, %date, bytes = bytes.len(), "Monitoring report downloaded");
        Ok(bytes.to_vec())
    }

    /// Sends until a 200 arrives or the retry policy gives up.
    fn send_with_retry(&self, url: &str, request: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut attempts = 0;
        loop {
            let reason = match request().send() {
                Ok(response) if response.status() == StatusCode::OK => return Ok(response),
                Ok(response) => format!("HTTP {}", response.status()),
                Err(e) => e.to_string(),
            };
            attempts += 1;

            warn!(url, attempts, %reason, "Platform request failed");
            self.notifier.notify(
                LOG_CHANNEL,
                &format!("Request to {url} failed (attempt {attempts}): {reason}"),
            );

            if !self.retry.allows_retry(attempts) {
                return Err(BidError::Request {
                    url: url.to_owned(),
                    attempts,
                    reason,
                });
            }
            std::thread::sleep(self.retry.delay);
        }
    }
}

impl ReportSource for AtsClient<'_> {
    fn fetch_report(
        &self,
        company: &str,
        date: NaiveDate,
        certificate: &Certificate,
    ) -> Result<Vec<MonitoringReportRow>> {
        let bytes = self.download_report(company, date, certificate)?;
        parse_report(&bytes, &self.settings.header_marker)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| BidError::Report(format!("invalid header value {value:?}: {e}")))
}

/// `name=value` pairs of every `Set-Cookie` header.
fn session_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(|pair| pair.trim().to_owned())
        .filter(|pair| !pair.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidflow_core::LogNotifier;
    use mockito::{Matcher, Server};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: RefCell<Vec<(usize, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, channel: usize, text: &str) {
            self.messages.borrow_mut().push((channel, text.to_owned()));
        }
    }

    fn settings(server: &Server) -> AtsSettings {
        AtsSettings {
            auth_url: format!("{}/auth", server.url()),
            reports_url: format!("{}/reports/", server.url()),
            monitoring_url: format!("{}/monitoring.do", server.url()),
            origin: server.url(),
            ..AtsSettings::default()
        }
    }

    fn certificate() -> Certificate {
        Certificate {
            serial: "01AB".to_owned(),
            subject: "CN=Solar One".to_owned(),
            thumbprint: "FFEE".to_owned(),
            identity_pem: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 4).unwrap()
    }

    #[test]
    fn test_download_carries_session_and_query() {
        let mut server = Server::new();
        let auth = server
            .mock("GET", "/auth")
            .with_status(200)
            .with_header("set-cookie", "SESSION=abc123; Path=/; HttpOnly")
            .create();
        let entry = server
            .mock("POST", "/reports/")
            .match_header("cookie", "SESSION=abc123")
            .with_status(200)
            .create();
        let report = server
            .mock("GET", "/monitoring.do")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("str_trader_code".into(), "SOLAR1".into()),
                Matcher::UrlEncoded("dt_begin_date".into(), "04.07.2025".into()),
                Matcher::UrlEncoded("dt_end_date".into(), "04.07.2025".into()),
                Matcher::UrlEncoded("gtp_group_id".into(), "-1".into()),
            ]))
            .match_header("cookie", "SESSION=abc123")
            .match_header("if-modified-since", NOT_MODIFIED_SINCE)
            .with_status(200)
            .with_body("report-bytes")
            .create();

        let client = AtsClient::new(settings(&server), &LogNotifier)
            .with_retry_policy(RetryPolicy::bounded(1, Duration::ZERO));
        let bytes = client.download_report("SOLAR1", date(), &certificate()).unwrap();

        assert_eq!(bytes, b"report-bytes");
        auth.assert();
        entry.assert();
        report.assert();
    }

    #[test]
    fn test_failed_attempts_are_notified_until_limit() {
        let mut server = Server::new();
        let auth = server.mock("GET", "/auth").with_status(503).expect(3).create();
        let notifier = RecordingNotifier::default();

        let client = AtsClient::new(settings(&server), &notifier)
            .with_retry_policy(RetryPolicy::bounded(3, Duration::from_millis(1)));
        let err = client.download_report("SOLAR1", date(), &certificate()).unwrap_err();

        assert!(matches!(err, BidError::Request { attempts: 3, .. }));
        auth.assert();
        let messages = notifier.messages.borrow();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|(channel, _)| *channel == LOG_CHANNEL));
    }

    #[test]
    fn test_debug_shows_endpoint_and_retry() {
        let settings = AtsSettings {
            auth_url: "https://ats.example/auth".to_owned(),
            ..AtsSettings::default()
        };
        let client = AtsClient::new(settings, &LogNotifier)
            .with_retry_policy(RetryPolicy::bounded(2, Duration::ZERO));

        let rendered = format!("{client:?}");

        assert!(rendered.starts_with("AtsClient"));
        assert!(rendered.contains("https://ats.example/auth"));
        assert!(rendered.contains("RetryPolicy"));
    }

    #[test]
    fn test_unparsable_report_is_an_error() {
        let mut server = Server::new();
        server.mock("GET", "/auth").with_status(200).create();
        server.mock("POST", "/reports/").with_status(200).create();
        server
            .mock("GET", "/monitoring.do")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>session expired</html>")
            .create();

        let client = AtsClient::new(settings(&server), &LogNotifier)
            .with_retry_policy(RetryPolicy::bounded(1, Duration::ZERO));
        let err = client.fetch_report("SOLAR1", date(), &certificate()).unwrap_err();

        assert!(!matches!(err, BidError::Request { .. }));
    }

    #[test]
    fn test_session_cookie_pairs() {
        let mut server = Server::new();
        server
            .mock("GET", "/auth")
            .with_status(200)
            .with_header("set-cookie", "A=1; Path=/")
            .with_header("set-cookie", "B=2")
            .create();

        let response = Client::new().get(format!("{}/auth", server.url())).send().unwrap();
        assert_eq!(session_cookies(&response), vec!["A=1", "B=2"]);
    }
}
