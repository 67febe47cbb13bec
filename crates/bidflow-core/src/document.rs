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

//! Bid documents
//!
//! One document per company and metering point, holding 24 hourly volumes.
//! Documents are serialized as windows-1251 XML in the layout the trading
//! platform accepts and are written to disk exactly once.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use encoding_rs::WINDOWS_1251;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use bidflow_shared::Direction;

use crate::error::{BidError, Result};
use crate::normalizer::apply_zero_volume_policy;

pub const HOURS_PER_DAY: u32 = 24;

/// Values that are the same in every document. Defaults match the platform's
/// standard request format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BidParameters {
    pub class_type: String,
    pub version: String,
    pub modification_consent: String,
    pub integral_type: String,
    pub phone: String,
    pub bilateral_volume: String,
    pub rd_priority_volume: String,
    pub interval_number: String,
    pub price: String,
}

impl Default for BidParameters {
    fn default() -> Self {
        Self {
            class_type: "REQ".to_owned(),
            version: "86".to_owned(),
            modification_consent: "False".to_owned(),
            integral_type: "0".to_owned(),
            phone: "1".to_owned(),
            bilateral_volume: "0".to_owned(),
            rd_priority_volume: "0".to_owned(),
            interval_number: "0".to_owned(),
            price: "0".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub sender: String,
    pub representative: String,
    pub email: String,
}

/// Everything a document needs apart from the company, metering point and volumes.
#[derive(Debug, Clone)]
pub struct BidTemplate {
    pub direction: Direction,
    pub target_date: NaiveDate,
    pub contact: Contact,
    pub params: BidParameters,
}

/// Per-document identity. Injected so serialization can be reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentIdentity {
    pub id: Uuid,
    pub local_id: i64,
    pub created: NaiveDateTime,
}

impl DocumentIdentity {
    #[must_use]
    pub fn fresh() -> Self {
        let now = Local::now();
        Self {
            id: Uuid::new_v4(),
            local_id: now.timestamp(),
            created: now.naive_local(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub sender: String,
    pub representative: String,
    pub phone: String,
    pub email: String,
    pub company_code: String,
    pub metering_point_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyEntry {
    pub hour_number: u32,
    pub bilateral_volume: String,
    pub rd_priority_volume: String,
    pub interval_number: String,
    pub volume: f64,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BidDocument {
    pub class_type: String,
    pub version: String,
    pub direction: Direction,
    pub modification_consent: Option<String>,
    pub integral_type: String,
    pub target_date: NaiveDate,
    pub organization: Organization,
    pub hourly_entries: Vec<HourlyEntry>,
    pub identity: DocumentIdentity,
}

impl BidDocument {
    /// Builds a document with a fresh identity.
    pub fn build(
        company: &str,
        metering_point: &str,
        tg_values: &BTreeMap<u32, f64>,
        template: &BidTemplate,
    ) -> Result<Self> {
        Self::build_with_identity(
            company,
            metering_point,
            tg_values,
            template,
            DocumentIdentity::fresh(),
        )
    }

    /// `tg_values` must hold exactly the hours 0..23.
    pub fn build_with_identity(
        company: &str,
        metering_point: &str,
        tg_values: &BTreeMap<u32, f64>,
        template: &BidTemplate,
        identity: DocumentIdentity,
    ) -> Result<Self> {
        let invalid = |reason: String| BidError::InvalidHourlyValues {
            metering_point: metering_point.to_owned(),
            reason,
        };

        if let Some(hour) = tg_values.keys().find(|hour| **hour >= HOURS_PER_DAY) {
            return Err(invalid(format!("unexpected hour {hour}")));
        }

        let params = &template.params;
        let hourly_entries = (0..HOURS_PER_DAY)
            .map(|hour| -> Result<HourlyEntry> {
                let volume = tg_values
                    .get(&hour)
                    .copied()
                    .ok_or_else(|| invalid(format!("missing hour {hour}")))?;
                Ok(HourlyEntry {
                    hour_number: hour,
                    bilateral_volume: params.bilateral_volume.clone(),
                    rd_priority_volume: params.rd_priority_volume.clone(),
                    interval_number: params.interval_number.clone(),
                    volume: apply_zero_volume_policy(volume),
                    price: params.price.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let direction = template.direction;
        Ok(Self {
            class_type: params.class_type.clone(),
            version: params.version.clone(),
            direction,
            modification_consent: direction
                .declares_modification_consent()
                .then(|| params.modification_consent.clone()),
            integral_type: params.integral_type.clone(),
            target_date: template.target_date,
            organization: Organization {
                sender: template.contact.sender.clone(),
                representative: template.contact.representative.clone(),
                phone: params.phone.clone(),
                email: template.contact.email.clone(),
                company_code: company.to_owned(),
                metering_point_code: metering_point.to_owned(),
            },
            hourly_entries,
            identity,
        })
    }

    /// `{ASP|BSP}_{company}_{metering_point}_{YYYYMMDD}.xml`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.xml",
            self.direction.file_prefix(),
            self.organization.company_code,
            self.organization.metering_point_code,
            self.target_date.format("%Y%m%d")
        )
    }

    /// The document as UTF-8 XML text.
    pub fn to_xml(&self) -> Result<String> {
        let mut xml = XmlWriter::new();
        xml.declaration()?;

        let created = self.identity.created.format("%Y%m%d%H%M%S").to_string();
        let id = format!("{{{}}}", self.identity.id.to_string().to_uppercase());
        let local_id = self.identity.local_id.to_string();

        xml.start(
            "message",
            &[
                ("class", self.class_type.as_str()),
                ("id", id.as_str()),
                ("local-id", local_id.as_str()),
                ("version", self.version.as_str()),
            ],
        )?;

        let mut request = vec![
            ("direction", self.direction.wire_value()),
            ("created", created.as_str()),
            ("last-modified", created.as_str()),
        ];
        if let Some(consent) = &self.modification_consent {
            request.push(("modification-consent", consent.as_str()));
        }
        request.push(("integral-type", self.integral_type.as_str()));
        xml.start("request", &request)?;

        let target_date = self.target_date.format("%Y%m%d").to_string();
        xml.empty("target-date", &[("value", target_date.as_str())])?;

        let org = &self.organization;
        xml.start("organization", &[])?;
        xml.start("contacts", &[])?;
        xml.text_element("sender", &org.sender)?;
        xml.text_element("rep", &org.representative)?;
        xml.text_element("phone", &org.phone)?;
        xml.text_element("e-mail", &org.email)?;
        xml.end("contacts")?;
        xml.text_element("code1", &org.company_code)?;
        xml.text_element("code3", &org.metering_point_code)?;
        xml.end("organization")?;

        xml.start("hourly-data", &[])?;
        for entry in &self.hourly_entries {
            let number = entry.hour_number.to_string();
            xml.start(
                "hour",
                &[
                    ("number", number.as_str()),
                    ("bilateral-volume", entry.bilateral_volume.as_str()),
                    ("RD-priority-volume", entry.rd_priority_volume.as_str()),
                ],
            )?;
            xml.start("prices", &[])?;
            xml.start("intervals", &[])?;
            xml.start("interval", &[("number", entry.interval_number.as_str())])?;
            xml.text_element("high-value", &format_volume(entry.volume))?;
            xml.text_element("price", &entry.price)?;
            xml.end("interval")?;
            xml.end("intervals")?;
            xml.end("prices")?;
            xml.end("hour")?;
        }
        xml.end("hourly-data")?;

        xml.end("request")?;
        xml.end("message")?;
        xml.finish()
    }

    /// The document as windows-1251 bytes, ready to be written.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let xml = self.to_xml()?;
        let (bytes, _, had_unmappable) = WINDOWS_1251.encode(&xml);
        if had_unmappable {
            warn!(
                file = %self.file_name(),
                "Characters outside windows-1251 written as character references"
            );
        }
        Ok(bytes.into_owned())
    }

    /// Writes the document under `{base_dir}/{YYYY}/{MM}/` and returns its path.
    ///
    /// An existing file with the same name is never replaced.
    pub fn write(&self, base_dir: &Path) -> Result<PathBuf> {
        let dir = document_dir(base_dir, self.target_date);
        fs::create_dir_all(&dir)?;

        let path = dir.join(self.file_name());
        let bytes = self.serialize()?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BidError::DocumentExists(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes)?;
        file.sync_all()?;

        debug!(path = %path.display(), bytes = bytes.len(), "Bid document written");
        Ok(path)
    }
}

/// Directory holding the documents of one target date.
#[must_use]
pub fn document_dir(base_dir: &Path, target_date: NaiveDate) -> PathBuf {
    base_dir
        .join(format!("{:04}", target_date.year()))
        .join(format!("{:02}", target_date.month()))
}

/// Shortest round-trip decimal with at least one fraction digit and a comma separator.
#[must_use]
pub fn format_volume(volume: f64) -> String {
    format!("{volume:?}").replace('.', ",")
}

struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b'\t', 1),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| BidError::Serialization(e.to_string()))
    }

    fn declaration(&mut self) -> Result<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("windows-1251"), Some("no"))))
    }

    fn element<'a>(name: &'a str, attributes: &[(&str, &str)]) -> BytesStart<'a> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        element
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        self.write(Event::Start(Self::element(name, attributes)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        self.write(Event::Empty(Self::element(name, attributes)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name, &[])?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> Result<String> {
        let mut text = String::from_utf8(self.writer.into_inner())
            .map_err(|e| BidError::Serialization(e.to_string()))?;
        text.push('\n');
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn template(direction: Direction) -> BidTemplate {
        BidTemplate {
            direction,
            target_date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            contact: Contact {
                sender: "Иванов И.И.".to_owned(),
                representative: "Иванов И.И.".to_owned(),
                email: "bids@example.com".to_owned(),
            },
            params: BidParameters::default(),
        }
    }

    fn identity() -> DocumentIdentity {
        DocumentIdentity {
            id: Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef),
            local_id: 1_751_500_000,
            created: NaiveDate::from_ymd_opt(2025, 7, 3)
                .unwrap()
                .and_hms_opt(9, 5, 7)
                .unwrap(),
        }
    }

    fn full_day(volume: f64) -> BTreeMap<u32, f64> {
        (0..24).map(|hour| (hour, volume)).collect()
    }

    fn build(direction: Direction, values: &BTreeMap<u32, f64>) -> BidDocument {
        BidDocument::build_with_identity("SOLAR1", "GVIE0101", values, &template(direction), identity())
            .unwrap()
    }

    #[test]
    fn test_missing_hour_is_rejected() {
        let mut values = full_day(1.0);
        values.remove(&17);

        let err = BidDocument::build("SOLAR1", "GVIE0101", &values, &template(Direction::Generation))
            .unwrap_err();
        assert!(matches!(err, BidError::InvalidHourlyValues { .. }));
        assert!(err.to_string().contains("missing hour 17"));
    }

    #[test]
    fn test_out_of_range_hour_is_rejected() {
        let mut values = full_day(1.0);
        values.insert(24, 1.0);

        let err = BidDocument::build("SOLAR1", "GVIE0101", &values, &template(Direction::Generation))
            .unwrap_err();
        assert!(err.to_string().contains("unexpected hour 24"));
    }

    #[test]
    fn test_modification_consent_only_for_ask() {
        let ask = build(Direction::Generation, &full_day(1.0)).to_xml().unwrap();
        let bid = build(Direction::Consumption, &full_day(1.0)).to_xml().unwrap();

        assert!(ask.contains(r#"direction="ask""#));
        assert!(ask.contains(r#"modification-consent="False""#));
        assert!(bid.contains(r#"direction="bid""#));
        assert!(!bid.contains("modification-consent"));
    }

    #[test]
    fn test_zero_hour_renders_substitute() {
        let mut values = full_day(2.5);
        values.insert(0, 0.0);

        let xml = build(Direction::Generation, &values).to_xml().unwrap();
        assert!(xml.contains("<high-value>0,1</high-value>"));
        assert!(xml.contains("<high-value>2,5</high-value>"));
    }

    #[test]
    fn test_volume_formatting() {
        assert_eq!(format_volume(0.5), "0,5");
        assert_eq!(format_volume(1.0), "1,0");
        assert_eq!(format_volume(12.34), "12,34");
    }

    #[test]
    fn test_layout() {
        let doc = build(Direction::Generation, &full_day(1.0));
        let xml = doc.to_xml().unwrap();

        assert!(xml.starts_with(
            r#"<?xml version="1.0" encoding="windows-1251" standalone="no"?>"#
        ));
        assert!(xml.contains(r#"id="{01234567-89AB-CDEF-0123-456789ABCDEF}""#));
        assert!(xml.contains(r#"local-id="1751500000""#));
        assert!(xml.contains(r#"created="20250703090507""#));
        assert!(xml.contains(r#"last-modified="20250703090507""#));
        assert!(xml.contains(r#"<target-date value="20250704"/>"#));
        assert!(xml.contains("<code1>SOLAR1</code1>"));
        assert!(xml.contains("<code3>GVIE0101</code3>"));
        assert!(xml.contains(r#"<hour number="23" bilateral-volume="0" RD-priority-volume="0">"#));
        assert_eq!(xml.matches("<hour ").count(), 24);
        assert_eq!(xml.matches("<price>0</price>").count(), 24);
    }

    #[test]
    fn test_fixed_identity_is_deterministic() {
        let values = full_day(0.75);
        let first = build(Direction::Generation, &values).serialize().unwrap();
        let second = build(Direction::Generation, &values).serialize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_serialize_uses_windows_1251() {
        let bytes = build(Direction::Generation, &full_day(1.0)).serialize().unwrap();
        // "Иванов" in windows-1251
        let sender = [0xC8, 0xE2, 0xE0, 0xED, 0xEE, 0xE2];
        assert!(bytes.windows(sender.len()).any(|w| w == sender));
        assert!(std::str::from_utf8(&bytes).is_err());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            build(Direction::Generation, &full_day(1.0)).file_name(),
            "ASP_SOLAR1_GVIE0101_20250704.xml"
        );
        assert_eq!(
            build(Direction::Consumption, &full_day(1.0)).file_name(),
            "BSP_SOLAR1_GVIE0101_20250704.xml"
        );
    }

    #[test]
    fn test_write_creates_dated_directory_once() {
        let dir = tempdir().unwrap();
        let doc = build(Direction::Generation, &full_day(1.0));

        let path = doc.write(dir.path()).unwrap();
        assert_eq!(
            path,
            dir.path().join("2025").join("07").join("ASP_SOLAR1_GVIE0101_20250704.xml")
        );
        assert_eq!(fs::read(&path).unwrap(), doc.serialize().unwrap());

        let err = doc.write(dir.path()).unwrap_err();
        assert!(matches!(err, BidError::DocumentExists(_)));
    }
}
