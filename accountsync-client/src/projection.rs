//! Uniform field view over account and contact records.
//!
//! Both record kinds are rendered through the same logical fields. Each kind
//! has a static table mapping a logical field to a JSONPath into the fetched
//! record; a contact's `Parent*` fields go through its owning account.

use serde::Serialize;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

use crate::tree::Kind;

/// A fetched record as returned by the record source.
pub type Record = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalField {
    PrimaryName,
    Phone,
    Website,
    Type,
    Email,
    Title,
    ParentName,
    ParentType,
    ParentPhone,
    ParentWebsite,
}

impl LogicalField {
    pub const ALL: [LogicalField; 10] = [
        LogicalField::PrimaryName,
        LogicalField::Phone,
        LogicalField::Website,
        LogicalField::Type,
        LogicalField::Email,
        LogicalField::Title,
        LogicalField::ParentName,
        LogicalField::ParentType,
        LogicalField::ParentPhone,
        LogicalField::ParentWebsite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalField::PrimaryName => "primary_name",
            LogicalField::Phone => "phone",
            LogicalField::Website => "website",
            LogicalField::Type => "type",
            LogicalField::Email => "email",
            LogicalField::Title => "title",
            LogicalField::ParentName => "parent_name",
            LogicalField::ParentType => "parent_type",
            LogicalField::ParentPhone => "parent_phone",
            LogicalField::ParentWebsite => "parent_website",
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a logical field lives in a record of the given kind. `None` means the
/// kind does not carry that field.
pub fn field_path(kind: Kind, field: LogicalField) -> Option<&'static str> {
    use LogicalField::*;
    match (kind, field) {
        (Kind::Account, PrimaryName) => Some("$.Name"),
        (Kind::Account, Phone) => Some("$.Phone"),
        (Kind::Account, Website) => Some("$.Website"),
        (Kind::Account, Type) => Some("$.Type"),
        (Kind::Account, Email) | (Kind::Account, Title) => None,
        (Kind::Account, ParentName) => Some("$.Parent.Name"),
        (Kind::Account, ParentType) => Some("$.Parent.Type"),
        (Kind::Account, ParentPhone) => Some("$.Parent.Phone"),
        (Kind::Account, ParentWebsite) => Some("$.Parent.Website"),

        (Kind::Contact, PrimaryName) => Some("$.Name"),
        (Kind::Contact, Phone) => Some("$.Phone"),
        (Kind::Contact, Email) => Some("$.Email"),
        (Kind::Contact, Title) => Some("$.Title"),
        (Kind::Contact, Website) | (Kind::Contact, Type) => None,
        (Kind::Contact, ParentName) => Some("$.Account.Name"),
        (Kind::Contact, ParentType) => Some("$.Account.Type"),
        (Kind::Contact, ParentPhone) => Some("$.Account.Phone"),
        (Kind::Contact, ParentWebsite) => Some("$.Account.Website"),
    }
}

type PathTable = HashMap<LogicalField, JsonPath>;

fn compile_table(kind: Kind) -> PathTable {
    LogicalField::ALL
        .iter()
        .filter_map(|&field| {
            let raw = field_path(kind, field)?;
            match JsonPath::parse(raw) {
                Ok(path) => Some((field, path)),
                Err(e) => {
                    warn!(%kind, %field, path = raw, error = %e, "invalid field path");
                    None
                }
            }
        })
        .collect()
}

fn path_table(kind: Kind) -> &'static PathTable {
    static ACCOUNT: OnceLock<PathTable> = OnceLock::new();
    static CONTACT: OnceLock<PathTable> = OnceLock::new();
    match kind {
        Kind::Account => ACCOUNT.get_or_init(|| compile_table(Kind::Account)),
        Kind::Contact => CONTACT.get_or_init(|| compile_table(Kind::Contact)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Present(String),
    /// Missing, `null`, or not carried by this kind. Serializes as `null`.
    Absent,
}

impl FieldValue {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            FieldValue::Present(v) => Some(v),
            FieldValue::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => FieldValue::Present(s.clone()),
            Value::Number(n) => FieldValue::Present(n.to_string()),
            Value::Bool(b) => FieldValue::Present(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => FieldValue::Absent,
        }
    }
}

/// Read view over one fetched record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordProjection {
    kind: Kind,
    fields: BTreeMap<LogicalField, FieldValue>,
}

impl RecordProjection {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn get(&self, field: LogicalField) -> &FieldValue {
        self.fields.get(&field).unwrap_or(&FieldValue::Absent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalField, &FieldValue)> {
        self.fields.iter().map(|(f, v)| (*f, v))
    }

    /// Whether `Parent*` fields come from a related account rather than the
    /// record's own parent link.
    pub fn parent_via_account(&self) -> bool {
        self.kind == Kind::Contact
    }
}

pub fn project(record: &Record, kind: Kind) -> RecordProjection {
    let table = path_table(kind);
    let fields = LogicalField::ALL
        .iter()
        .map(|&field| {
            let value = table
                .get(&field)
                .and_then(|path| path.query(record).at_most_one().ok().flatten())
                .map(FieldValue::from_json)
                .unwrap_or(FieldValue::Absent);
            (field, value)
        })
        .collect();

    RecordProjection { kind, fields }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_field_path_compiles() {
        for kind in [Kind::Account, Kind::Contact] {
            let expected = LogicalField::ALL
                .iter()
                .filter(|&&f| field_path(kind, f).is_some())
                .count();
            assert_eq!(path_table(kind).len(), expected);
        }
    }

    #[test]
    fn test_contact_parent_name_goes_through_account() {
        let record = json!({
            "Name": "Jane Roe",
            "Phone": "555-0100",
            "Email": "jane@acme.test",
            "Account": { "Name": "Acme", "Type": "Customer", "Phone": null }
        });

        let view = project(&record, Kind::Contact);
        assert_eq!(view.get(LogicalField::ParentName).as_deref(), Some("Acme"));
        assert_eq!(view.get(LogicalField::ParentType).as_deref(), Some("Customer"));
        assert!(view.get(LogicalField::ParentPhone).is_absent());
        assert!(view.get(LogicalField::ParentWebsite).is_absent());
        assert_eq!(view.get(LogicalField::Email).as_deref(), Some("jane@acme.test"));
        assert!(view.parent_via_account());
    }

    #[test]
    fn test_account_parent_name_uses_own_path() {
        let record = json!({
            "Name": "Acme West",
            "Website": "https://west.acme.test",
            "Parent": { "Name": "Acme" },
            "Account": { "Name": "should not be read" }
        });

        let view = project(&record, Kind::Account);
        assert_eq!(view.get(LogicalField::PrimaryName).as_deref(), Some("Acme West"));
        assert_eq!(view.get(LogicalField::ParentName).as_deref(), Some("Acme"));
        assert!(!view.parent_via_account());
    }

    #[test]
    fn test_null_parent_projects_absent() {
        let account = project(&json!({ "Name": "Solo", "Parent": null }), Kind::Account);
        assert!(account.get(LogicalField::ParentName).is_absent());

        let contact = project(&json!({ "Name": "Orphan", "Account": null }), Kind::Contact);
        assert!(contact.get(LogicalField::ParentName).is_absent());
    }

    #[test]
    fn test_fields_not_carried_by_kind_are_absent() {
        let record = json!({ "Name": "Acme", "Email": "ignored@acme.test", "Website": "acme.test" });

        let account = project(&record, Kind::Account);
        assert!(account.get(LogicalField::Email).is_absent());
        assert_eq!(account.get(LogicalField::Website).as_deref(), Some("acme.test"));

        let contact = project(&record, Kind::Contact);
        assert!(contact.get(LogicalField::Website).is_absent());
    }

    #[test]
    fn test_scalar_values_render_as_text() {
        let record = json!({ "Name": "Acme", "Phone": 5550100, "Type": true });
        let view = project(&record, Kind::Account);
        assert_eq!(view.get(LogicalField::Phone).as_deref(), Some("5550100"));
        assert_eq!(view.get(LogicalField::Type).as_deref(), Some("true"));
    }

    #[test]
    fn test_non_object_record_projects_all_absent() {
        let view = project(&json!("not a record"), Kind::Contact);
        assert!(view.iter().all(|(_, v)| v.is_absent()));
        assert_eq!(view.iter().count(), LogicalField::ALL.len());
    }

    #[test]
    fn test_projection_serializes_absent_as_null() {
        let view = project(&json!({ "Name": "Acme" }), Kind::Account);
        let out = serde_json::to_value(&view).unwrap();
        assert_eq!(out["kind"], json!("Account"));
        assert_eq!(out["fields"]["primary_name"], json!("Acme"));
        assert_eq!(out["fields"]["parent_name"], Value::Null);
    }
}
