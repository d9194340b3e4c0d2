//! Header aliasing and up-front row validation.
//!
//! Source sheets label the same column many ways ("Serial No",
//! "serialNumber", "Projector Serial", ...). [`ColumnMap`] folds those
//! aliases onto canonical [`RowField`]s. [`NormalizedRow::from_raw`] then
//! normalizes every field before anything is written, so a row that fails
//! validation never leaves partial entities behind.

use std::collections::HashMap;

use chrono::NaiveDate;
use projtrack_core::enums::EnumDomain;
use projtrack_core::matcher::CaseKeys;
use projtrack_core::normalize::{normalize, FieldKind, NormalizedValue, RawValue};
use serde::Serialize;

use crate::error::ReconcileError;
use crate::source::RawRow;

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Canonical row fields the engine interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowField {
    SiteName,
    AudiNo,
    SerialNumber,
    ModelNo,
    Manufacturer,
    ProjectorStatus,
    CallLogNumber,
    RmaNumber,
    CaseType,
    CaseStatus,
    ReportedOn,
}

impl RowField {
    pub const ALL: [RowField; 11] = [
        Self::SiteName,
        Self::AudiNo,
        Self::SerialNumber,
        Self::ModelNo,
        Self::Manufacturer,
        Self::ProjectorStatus,
        Self::CallLogNumber,
        Self::RmaNumber,
        Self::CaseType,
        Self::CaseStatus,
        Self::ReportedOn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiteName => "site_name",
            Self::AudiNo => "audi_no",
            Self::SerialNumber => "serial_number",
            Self::ModelNo => "model_no",
            Self::Manufacturer => "manufacturer",
            Self::ProjectorStatus => "projector_status",
            Self::CallLogNumber => "call_log_number",
            Self::RmaNumber => "rma_number",
            Self::CaseType => "case_type",
            Self::CaseStatus => "case_status",
            Self::ReportedOn => "reported_on",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::SiteName | Self::Manufacturer => FieldKind::Name,
            Self::AudiNo
            | Self::SerialNumber
            | Self::ModelNo
            | Self::CallLogNumber
            | Self::RmaNumber => FieldKind::Identifier,
            Self::ProjectorStatus => FieldKind::Enum(EnumDomain::ProjectorStatus),
            Self::CaseType => FieldKind::Enum(EnumDomain::CaseType),
            Self::CaseStatus => FieldKind::Enum(EnumDomain::CaseStatus),
            Self::ReportedOn => FieldKind::Date,
        }
    }

    /// Header spellings seen in the source sheets, in [`header_key`] form.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::SiteName => &["site", "sitename", "cinema", "theatre", "location"],
            Self::AudiNo => &["audi", "audino", "audinumber", "screen", "screenno"],
            Self::SerialNumber => &[
                "serial",
                "serialno",
                "serialnumber",
                "projectorserial",
                "projectorserialno",
                "projectorsn",
                "sn",
            ],
            Self::ModelNo => &["model", "modelno", "modelnumber", "projectormodel"],
            Self::Manufacturer => &["make", "brand", "manufacturer", "oem"],
            Self::ProjectorStatus => &["projectorstatus", "projstatus"],
            Self::CallLogNumber => &[
                "calllog",
                "calllogno",
                "calllognumber",
                "casenumber",
                "caseno",
                "dtrno",
                "dtrnumber",
            ],
            Self::RmaNumber => &["rma", "rmano", "rmanumber"],
            Self::CaseType => &["type", "casetype", "calltype"],
            Self::CaseStatus => &["casestatus", "callstatus"],
            Self::ReportedOn => &["date", "reportedon", "reporteddate", "calldate", "logdate"],
        }
    }
}

impl std::fmt::Display for RowField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bare "Status" header: case status on case rows, projector status on
/// inventory rows.
const SHARED_STATUS_KEY: &str = "status";

/// Header comparison key: lowercase ASCII alphanumerics only.
pub fn header_key(header: &str) -> String {
    header
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Column map
// ---------------------------------------------------------------------------

/// Maps source headers onto canonical fields. Headers that map to nothing
/// are carried into the case payload untouched.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    by_key: HashMap<String, RowField>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        let by_key = RowField::ALL
            .iter()
            .flat_map(|field| field.aliases().iter().map(|a| (header_key(a), *field)))
            .collect();
        Self { by_key }
    }
}

impl ColumnMap {
    /// Add or override an alias.
    pub fn with_alias(mut self, header: &str, field: RowField) -> Self {
        self.by_key.insert(header_key(header), field);
        self
    }

    /// The field a header maps to regardless of the row's content.
    pub fn field_for(&self, header: &str) -> Option<RowField> {
        self.by_key.get(&header_key(header)).copied()
    }

    /// The field a header maps to in a row that does (`case_row`) or does
    /// not carry a case key.
    pub fn resolve(&self, header: &str, case_row: bool) -> Option<RowField> {
        let key = header_key(header);
        match self.by_key.get(&key) {
            Some(field) => Some(*field),
            None if key == SHARED_STATUS_KEY && case_row => Some(RowField::CaseStatus),
            None if key == SHARED_STATUS_KEY => Some(RowField::ProjectorStatus),
            None => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized row
// ---------------------------------------------------------------------------

/// A fully validated row. Every value is already in canonical form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedRow {
    /// Zero-based position in the source.
    pub index: usize,
    pub site_name: Option<String>,
    pub audi_no: Option<String>,
    pub serial_number: Option<String>,
    pub model_no: Option<String>,
    pub manufacturer: Option<String>,
    pub projector_status: Option<String>,
    pub case_keys: CaseKeys,
    pub case_type: Option<String>,
    pub case_status: Option<String>,
    pub reported_on: Option<NaiveDate>,
    /// Unmapped columns, kept as source values.
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl NormalizedRow {
    /// Normalize and validate a raw row.
    ///
    /// All fields are checked; every failure is returned, each naming its
    /// field. When two headers map to the same field, the first non-empty
    /// value in sorted header order wins.
    pub fn from_raw(
        index: usize,
        raw: &RawRow,
        columns: &ColumnMap,
    ) -> Result<Self, Vec<ReconcileError>> {
        let mut row = Self {
            index,
            ..Self::default()
        };
        let mut errors = Vec::new();
        let case_row = raw.iter().any(|(header, value)| {
            matches!(
                columns.field_for(header),
                Some(RowField::CallLogNumber | RowField::RmaNumber)
            ) && matches!(normalize(FieldKind::Identifier, value), Ok(Some(_)))
        });

        for (header, value) in raw {
            let Some(field) = columns.resolve(header, case_row) else {
                if let Some(json) = payload_value(value) {
                    row.payload.insert(header.clone(), json);
                }
                continue;
            };
            match normalize(field.kind(), value) {
                Ok(Some(normalized)) => row.set(field, normalized),
                Ok(None) => {}
                Err(e) => errors.push(ReconcileError::from_field(field.as_str(), e)),
            }
        }

        errors.extend(row.check_required());
        if errors.is_empty() {
            Ok(row)
        } else {
            Err(errors)
        }
    }

    fn set(&mut self, field: RowField, value: NormalizedValue) {
        if field == RowField::ReportedOn {
            if self.reported_on.is_none() {
                self.reported_on = value.as_date();
            }
            return;
        }
        let slot = match field {
            RowField::SiteName => &mut self.site_name,
            RowField::AudiNo => &mut self.audi_no,
            RowField::SerialNumber => &mut self.serial_number,
            RowField::ModelNo => &mut self.model_no,
            RowField::Manufacturer => &mut self.manufacturer,
            RowField::ProjectorStatus => &mut self.projector_status,
            RowField::CallLogNumber => &mut self.case_keys.call_log_number,
            RowField::RmaNumber => &mut self.case_keys.rma_number,
            RowField::CaseType => &mut self.case_type,
            RowField::CaseStatus => &mut self.case_status,
            RowField::ReportedOn => return,
        };
        if slot.is_none() {
            *slot = value.into_text();
        }
    }

    /// Cross-field requirements.
    fn check_required(&self) -> Vec<ReconcileError> {
        let mut errors = Vec::new();
        let identifies_something = self.site_name.is_some()
            || self.model_no.is_some()
            || self.serial_number.is_some()
            || !self.case_keys.is_empty();
        if !identifies_something {
            errors.push(ReconcileError::validation(
                "row",
                "no site, model, serial number or case key present",
            ));
        }
        if self.audi_no.is_some() && self.site_name.is_none() {
            errors.push(ReconcileError::validation(
                RowField::SiteName.as_str(),
                "required when an audi number is given",
            ));
        }
        if self.has_case() && self.site_name.is_none() && self.serial_number.is_none() {
            errors.push(ReconcileError::validation(
                RowField::SiteName.as_str(),
                "a case needs a site name or a serial number to locate its site",
            ));
        }
        errors
    }

    pub fn has_case(&self) -> bool {
        !self.case_keys.is_empty()
    }
}

fn payload_value(value: &RawValue) -> Option<serde_json::Value> {
    match value {
        RawValue::Empty => None,
        RawValue::Text(s) if s.trim().is_empty() => None,
        RawValue::Text(s) => Some(serde_json::Value::String(s.clone())),
        RawValue::Number(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
        RawValue::Date(d) => Some(serde_json::Value::String(d.format("%Y-%m-%d").to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn raw(pairs: &[(&str, RawValue)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    // -- column map --

    #[test]
    fn aliases_fold_onto_fields() {
        let map = ColumnMap::default();
        assert_eq!(map.field_for("Serial No"), Some(RowField::SerialNumber));
        assert_eq!(map.field_for("serialNumber"), Some(RowField::SerialNumber));
        assert_eq!(map.field_for("Call Log No."), Some(RowField::CallLogNumber));
        assert_eq!(map.field_for("caseNumber"), Some(RowField::CallLogNumber));
        assert_eq!(map.field_for("RMA #"), Some(RowField::RmaNumber));
        assert_eq!(map.field_for("Remarks"), None);
    }

    #[test]
    fn custom_alias_overrides_default() {
        let map = ColumnMap::default().with_alias("Status", RowField::ProjectorStatus);
        assert_eq!(map.field_for("status"), Some(RowField::ProjectorStatus));
        assert_eq!(map.resolve("Status", true), Some(RowField::ProjectorStatus));
    }

    #[test]
    fn bare_status_follows_the_row() {
        let map = ColumnMap::default();
        assert_eq!(map.field_for("Status"), None);
        assert_eq!(map.resolve("Status", true), Some(RowField::CaseStatus));
        assert_eq!(map.resolve("Status", false), Some(RowField::ProjectorStatus));
        assert_eq!(map.resolve("Case Status", false), Some(RowField::CaseStatus));
    }

    #[test]
    fn inventory_status_is_a_projector_status() {
        let row = NormalizedRow::from_raw(
            0,
            &raw(&[
                ("Site", text("PVR Phoenix")),
                ("Serial No", text("411034563")),
                ("Status", text("Working")),
            ]),
            &ColumnMap::default(),
        )
        .unwrap();
        assert_eq!(row.case_status, None);
        assert!(row.projector_status.is_some());

        let row = NormalizedRow::from_raw(
            0,
            &raw(&[
                ("Call Log No", text("694531")),
                ("Serial No", text("411034563")),
                ("Status", text("Closed")),
            ]),
            &ColumnMap::default(),
        )
        .unwrap();
        assert!(row.case_status.is_some());
        assert_eq!(row.projector_status, None);
    }

    // -- normalization --

    #[test]
    fn row_is_normalized_field_by_field() {
        let row = NormalizedRow::from_raw(
            3,
            &raw(&[
                ("Call Log No", text(" 694531 ")),
                ("Serial No", RawValue::Number(411034563.0)),
                ("Site", text("  Suman  City Gandhinagar ")),
                ("Type", text("RMA CI")),
                ("Date", RawValue::Number(45292.0)),
                ("Remarks", text("lamp flicker")),
            ]),
            &ColumnMap::default(),
        )
        .unwrap();

        assert_eq!(row.index, 3);
        assert_eq!(row.case_keys.call_log_number.as_deref(), Some("694531"));
        assert_eq!(row.serial_number.as_deref(), Some("411034563"));
        assert_eq!(row.site_name.as_deref(), Some("Suman City Gandhinagar"));
        assert_eq!(row.case_type.as_deref(), Some("RMA_CL"));
        assert_eq!(row.reported_on, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(row.payload.get("Remarks"), Some(&serde_json::json!("lamp flicker")));
    }

    #[test]
    fn placeholders_are_empty_not_keys() {
        let row = NormalizedRow::from_raw(
            0,
            &raw(&[("Serial No", text("-")), ("Model", text("CP2220"))]),
            &ColumnMap::default(),
        )
        .unwrap();
        assert_eq!(row.serial_number, None);
        assert_eq!(row.model_no.as_deref(), Some("CP2220"));
    }

    // -- validation --

    #[test]
    fn every_invalid_field_is_reported() {
        let errors = NormalizedRow::from_raw(
            0,
            &raw(&[
                ("Call Log No", text("1")),
                ("Site", text("PVR")),
                ("Status", text("sort of open")),
                ("Date", text("2024-02-30")),
            ]),
            &ColumnMap::default(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(
            |e| matches!(e, ReconcileError::Validation { field, .. } if field == "case_status")
        ));
        assert!(errors.iter().any(
            |e| matches!(e, ReconcileError::Validation { field, .. } if field == "reported_on")
        ));
    }

    #[test]
    fn empty_row_is_rejected() {
        let errors =
            NormalizedRow::from_raw(0, &raw(&[("Remarks", text("x"))]), &ColumnMap::default())
                .unwrap_err();
        assert_matches!(&errors[..], [ReconcileError::Validation { field, .. }] if field == "row");
    }

    #[test]
    fn audi_without_site_is_rejected() {
        let errors = NormalizedRow::from_raw(
            0,
            &raw(&[("Audi", text("Audi 2")), ("Serial No", text("S1"))]),
            &ColumnMap::default(),
        )
        .unwrap_err();
        assert_matches!(
            &errors[..],
            [ReconcileError::Validation { field, .. }] if field == "site_name"
        );
    }

    #[test]
    fn case_needs_site_or_serial() {
        let errors = NormalizedRow::from_raw(
            0,
            &raw(&[("RMA No", text("R-1"))]),
            &ColumnMap::default(),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);

        let ok = NormalizedRow::from_raw(
            0,
            &raw(&[("RMA No", text("R-1")), ("Serial No", text("S1"))]),
            &ColumnMap::default(),
        );
        assert!(ok.is_ok());
    }
}
