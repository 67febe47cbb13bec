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

//! Artifacts consumed by the external signing mail sender
//!
//! For every company we write a `CryptoSendMail.ini` carrying the SMTP
//! settings and signing certificate, plus a batch script that submits each
//! metering point's document and moves it to the accepted directory once the
//! sender reports success.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bidflow_shared::Direction;

use crate::error::{BidError, Result};
use crate::traits::Certificate;

pub const SENDER_CONFIG_FILE: &str = "CryptoSendMail.ini";
pub const SENDER_LOG_FILE: &str = "CryptoEnergyPro.log";

const LINE_END: &str = "\r\n";

/// Which mail transport the sender uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailMode {
    Basic,
    /// Fallback transport; needs the relaxed SSL block in the script.
    Reserve,
}

impl fmt::Display for MailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Reserve => write!(f, "reserve"),
        }
    }
}

/// SMTP account the sender submits documents through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    /// Contact address written into the documents.
    pub e_mail: String,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_smtp_timeout")]
    pub smtp_timeout: u64,
    pub smtp_user: String,
    pub smtp_password: String,
    /// Additional sender options copied verbatim into the ini file.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_smtp_port() -> u16 {
    25
}

fn default_smtp_timeout() -> u64 {
    60
}

/// Inputs of one company's dispatch artifacts.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPlan<'a> {
    pub company: &'a str,
    pub direction: Direction,
    pub target_date: NaiveDate,
    pub metering_points: &'a [String],
    /// Directory holding the documents of the target date.
    pub documents_dir: &'a Path,
    pub accepted_dir: &'a Path,
    pub mail: &'a MailSettings,
    pub mode: MailMode,
    pub certificate: &'a Certificate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchArtifacts {
    pub work_dir: PathBuf,
    pub config_path: PathBuf,
    pub script_path: PathBuf,
}

/// `CryptoSendMail.ini` contents.
#[must_use]
pub fn render_sender_config(mail: &MailSettings, certificate: &Certificate) -> String {
    let fixed = [
        ("SMTPHost", mail.smtp_host.clone()),
        ("SMTPPort", mail.smtp_port.to_string()),
        ("SMTPTimeOut", mail.smtp_timeout.to_string()),
        ("SMTPUser", mail.smtp_user.clone()),
        ("SMTPPassword", mail.smtp_password.clone()),
    ];
    let extra = mail
        .extra
        .iter()
        .map(|(key, value)| (key.as_str(), value.clone()));
    let sign = [("CertSign", certificate.thumbprint.to_lowercase())];

    let mut out = format!("[Config]{LINE_END}");
    for (key, value) in fixed.into_iter().chain(extra).chain(sign) {
        out.push_str(&format!("{key}={value}{LINE_END}"));
    }
    out
}

/// Batch script submitting every metering point of the plan.
#[must_use]
pub fn render_dispatch_script(plan: &DispatchPlan<'_>) -> String {
    let prefix = plan.direction.file_prefix();
    let company = plan.company;
    let mail = plan.mail;
    let mut lines: Vec<String> = vec![
        format!("set sentdate={}", plan.target_date.format("%Y%m%d")),
        format!("set pMail={}", mail.smtp_host),
        format!("set pPort={}", mail.smtp_port),
        format!("set pTimeout={}", mail.smtp_timeout),
        format!("set pUser={}", mail.smtp_user),
        format!("set pPassword={}", mail.smtp_password),
    ];

    if plan.mode == MailMode::Reserve {
        lines.extend(
            [
                "set ssl_mode=2",
                "set ssl_ver=auto",
                "set ssl_check_cert=N",
                "set ssl_check_cert_online=N",
            ]
            .map(str::to_owned),
        );
    }

    lines.extend([
        format!("set pCl={SENDER_LOG_FILE}"),
        format!("set pSubj=ATS-Request:{prefix}_{company}"),
        format!(
            "set pPath={}\\{prefix}_{company}",
            windows_path(plan.documents_dir)
        ),
        format!("set pPathMove={}", windows_path(plan.accepted_dir)),
        "set pSmtp_auth=Y".to_owned(),
        "set pS=Y".to_owned(),
        "set pE=Y".to_owned(),
        String::new(),
    ]);

    let mut variables = Vec::with_capacity(plan.metering_points.len());
    for (index, metering_point) in plan.metering_points.iter().enumerate() {
        let n = index + 1;
        lines.push(format!("set p{n}={metering_point}"));
        variables.push(format!("%p{n}%"));
    }
    lines.push(String::new());

    lines.extend([
        format!("FOR %%G IN ({}) DO (Call :PCall %%G%)", variables.join(", ")),
        String::new(),
        "goto finish".to_owned(),
        String::new(),
        ":pCall".to_owned(),
        "TIMEOUT /T 1 /NOBREAK".to_owned(),
        "set pGTP=%1".to_owned(),
        String::new(),
        "CryptoSendMail /i= /s=%pS% /e=%pE% /cs= /ce= /from= /to= \
         /smtp_host=%pMail% /smtt_port=%pPort% /smtp_timeout=%pTimeout% \
         /smtp_auth=%pSmtp_auth%  /smtp_user=%pUser% /smtp_password=%pPassword%  \
         /cl=%pCl% /subj=%pSubj%_%pGTP%_%sentdate%  %pPath%_%pGTP%_%sentdate%.xml"
            .to_owned(),
        "set Err1=%errorlevel%".to_owned(),
        "set ERROk=0".to_owned(),
        "IF %ERR1%==%ErrOk% move %pPath%_%pGTP%_%sentdate%.xml %pPathMove%".to_owned(),
        "exit /b".to_owned(),
        String::new(),
        ":finish".to_owned(),
    ]);

    let mut script = lines.join(LINE_END);
    script.push_str(LINE_END);
    script
}

fn windows_path(path: &Path) -> String {
    path.display().to_string().trim_end_matches(['\\', '/']).to_owned()
}

/// Writes the ini and the script into `{work_root}/{company}/`.
///
/// `sender_executable` is copied next to them when the work directory does
/// not have one yet.
pub fn write_dispatch_artifacts(
    plan: &DispatchPlan<'_>,
    work_root: &Path,
    script_name: &str,
    sender_executable: Option<&Path>,
) -> Result<DispatchArtifacts> {
    if plan.metering_points.is_empty() {
        return Err(BidError::Dispatch(format!(
            "no metering points to dispatch for {}",
            plan.company
        )));
    }

    let work_dir = work_root.join(plan.company);
    fs::create_dir_all(&work_dir)?;

    if let Some(executable) = sender_executable {
        ensure_sender_executable(executable, &work_dir)?;
    }

    let config_path = work_dir.join(SENDER_CONFIG_FILE);
    fs::write(&config_path, render_sender_config(plan.mail, plan.certificate))?;

    let script_path = work_dir.join(script_name.replace("{company}", plan.company));
    fs::write(&script_path, render_dispatch_script(plan))?;

    info!(
        company = plan.company,
        mode = %plan.mode,
        metering_points = plan.metering_points.len(),
        script = %script_path.display(),
        "Dispatch artifacts written"
    );

    Ok(DispatchArtifacts {
        work_dir,
        config_path,
        script_path,
    })
}

fn ensure_sender_executable(source: &Path, work_dir: &Path) -> Result<()> {
    let Some(file_name) = source.file_name() else {
        return Err(BidError::Dispatch(format!(
            "sender executable path has no file name: {}",
            source.display()
        )));
    };
    let target = work_dir.join(file_name);
    if target.exists() {
        return Ok(());
    }
    fs::copy(source, &target).map_err(|e| {
        BidError::Dispatch(format!(
            "failed to copy {} to {}: {e}",
            source.display(),
            target.display()
        ))
    })?;
    debug!(path = %target.display(), "Sender executable copied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mail() -> MailSettings {
        MailSettings {
            e_mail: "bids@example.com".to_owned(),
            smtp_host: "smtp.example.com".to_owned(),
            smtp_port: 587,
            smtp_timeout: 30,
            smtp_user: "bids".to_owned(),
            smtp_password: "secret".to_owned(),
            extra: BTreeMap::from([("POP3Host".to_owned(), "pop.example.com".to_owned())]),
        }
    }

    fn certificate() -> Certificate {
        Certificate {
            serial: "01AB".to_owned(),
            subject: "CN=Solar One".to_owned(),
            thumbprint: "A1B2C3D4".to_owned(),
            identity_pem: None,
        }
    }

    fn plan<'a>(
        mail: &'a MailSettings,
        certificate: &'a Certificate,
        metering_points: &'a [String],
        mode: MailMode,
    ) -> DispatchPlan<'a> {
        DispatchPlan {
            company: "SOLAR1",
            direction: Direction::Generation,
            target_date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            metering_points,
            documents_dir: Path::new(r"\\fs\cz\2025\07"),
            accepted_dir: Path::new(r"\\fs\cz\accepted"),
            mail,
            mode,
            certificate,
        }
    }

    #[test]
    fn test_sender_config() {
        let ini = render_sender_config(&mail(), &certificate());
        let lines: Vec<_> = ini.split("\r\n").collect();

        assert_eq!(lines[0], "[Config]");
        assert_eq!(lines[1], "SMTPHost=smtp.example.com");
        assert!(lines.contains(&"POP3Host=pop.example.com"));
        assert_eq!(lines[lines.len() - 2], "CertSign=a1b2c3d4");
    }

    #[test]
    fn test_sender_config_without_extra_options() {
        let mut mail = mail();
        mail.extra.clear();

        let ini = render_sender_config(&mail, &certificate());

        assert_eq!(
            ini,
            "[Config]\r\nSMTPHost=smtp.example.com\r\nSMTPPort=587\r\nSMTPTimeOut=30\r\n\
             SMTPUser=bids\r\nSMTPPassword=secret\r\nCertSign=a1b2c3d4\r\n"
        );
    }

    #[test]
    fn test_script_lists_metering_points() {
        let (mail, cert) = (mail(), certificate());
        let points = vec!["GVIE0101".to_owned(), "GVIE0102".to_owned()];
        let script = render_dispatch_script(&plan(&mail, &cert, &points, MailMode::Basic));

        assert!(script.starts_with("set sentdate=20250704\r\n"));
        assert!(script.contains("set pSubj=ATS-Request:ASP_SOLAR1\r\n"));
        assert!(script.contains(r"set pPath=\\fs\cz\2025\07\ASP_SOLAR1"));
        assert!(script.contains("set p1=GVIE0101\r\nset p2=GVIE0102\r\n"));
        assert!(script.contains("FOR %%G IN (%p1%, %p2%) DO (Call :PCall %%G%)"));
        assert!(script.contains("move %pPath%_%pGTP%_%sentdate%.xml %pPathMove%"));
        assert!(!script.contains("ssl_mode"));
    }

    #[test]
    fn test_reserve_mode_adds_ssl_block() {
        let (mail, cert) = (mail(), certificate());
        let points = vec!["GVIE0101".to_owned()];
        let script = render_dispatch_script(&plan(&mail, &cert, &points, MailMode::Reserve));

        assert!(script.contains("set pPassword=secret\r\nset ssl_mode=2\r\n"));
        assert!(script.contains("set ssl_check_cert_online=N\r\nset pCl=CryptoEnergyPro.log"));
    }

    #[test]
    fn test_write_artifacts_copies_executable_once() {
        let dir = tempdir().unwrap();
        let executable = dir.path().join("CryptoSendMail.exe");
        fs::write(&executable, b"v1").unwrap();

        let (mail, cert) = (mail(), certificate());
        let points = vec!["GVIE0101".to_owned()];
        let plan = plan(&mail, &cert, &points, MailMode::Basic);
        let work_root = dir.path().join("work");

        let artifacts =
            write_dispatch_artifacts(&plan, &work_root, "send_{company}.bat", Some(&executable))
                .unwrap();
        assert_eq!(artifacts.work_dir, work_root.join("SOLAR1"));
        assert_eq!(artifacts.script_path, work_root.join("SOLAR1").join("send_SOLAR1.bat"));
        assert!(artifacts.config_path.exists());

        fs::write(&executable, b"v2").unwrap();
        write_dispatch_artifacts(&plan, &work_root, "send_{company}.bat", Some(&executable))
            .unwrap();
        let copied = fs::read(work_root.join("SOLAR1").join("CryptoSendMail.exe")).unwrap();
        assert_eq!(copied, b"v1");
    }

    #[test]
    fn test_no_metering_points_is_rejected() {
        let dir = tempdir().unwrap();
        let (mail, cert) = (mail(), certificate());
        let plan = plan(&mail, &cert, &[], MailMode::Basic);

        let err = write_dispatch_artifacts(&plan, dir.path(), "send.bat", None).unwrap_err();
        assert!(matches!(err, BidError::Dispatch(_)));
    }
}
