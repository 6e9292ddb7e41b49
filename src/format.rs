//! Normalizes raw contract replies into canonical typed records.
//!
//! Replies arrive with heterogeneous encodings: integers as JSON numbers,
//! decimal strings or `0x` quantities, timestamps as seconds since the epoch,
//! enumerations as small integers. Each [`RecordKind`] carries a fixed field
//! table that says how to decode every known field.
//!
//! Formatting never fails. A field that cannot be decoded is kept as its raw
//! JSON value and a warning is logged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// The all-zero address a contract returns for an unset struct.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Label used for enumeration values outside the known table.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

pub const USER_ROLES: &[&str] = &[
    "FARMER",
    "PROCESSOR",
    "TRANSPORTER",
    "WAREHOUSE",
    "RETAILER",
    "CONSUMER",
];

pub const EVENT_TYPES: &[&str] = &[
    "HARVEST",
    "PROCESSING",
    "TRANSPORT_START",
    "TRANSPORT_END",
    "WAREHOUSE_IN",
    "WAREHOUSE_OUT",
    "RETAIL_RECEIVE",
    "SALE",
];

/// How a raw field is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Integer,
    /// Seconds since the Unix epoch.
    Timestamp,
    /// Index into a fixed label table.
    Enum(&'static [&'static str]),
    Bool,
    Text,
}

/// One entry of a record's field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Name in the contract reply.
    pub raw: &'static str,
    /// Canonical name in the formatted record.
    pub name: &'static str,
    pub encoding: Encoding,
}

const fn field(raw: &'static str, name: &'static str, encoding: Encoding) -> FieldSpec {
    FieldSpec { raw, name, encoding }
}

const USER_FIELDS: &[FieldSpec] = &[
    field("userAddress", "address", Encoding::Text),
    field("role", "role", Encoding::Enum(USER_ROLES)),
    field("companyName", "company_name", Encoding::Text),
    field("isVerified", "is_verified", Encoding::Bool),
    field("isActive", "is_active", Encoding::Bool),
    field("registrationDate", "registration_date", Encoding::Timestamp),
];

const PRODUCT_FIELDS: &[FieldSpec] = &[
    field("productId", "product_id", Encoding::Integer),
    field("batchId", "batch_id", Encoding::Text),
    field("farmer", "farmer", Encoding::Text),
    field("productName", "product_name", Encoding::Text),
    field("category", "category", Encoding::Text),
    field("origin", "origin", Encoding::Text),
    field("harvestDate", "harvest_date", Encoding::Timestamp),
    field("expiryDate", "expiry_date", Encoding::Timestamp),
    field("quantity", "quantity", Encoding::Integer),
    field("unit", "unit", Encoding::Text),
    field("ipfsHash", "ipfs_hash", Encoding::Text),
    field("isActive", "is_active", Encoding::Bool),
    field("currentOwner", "current_owner", Encoding::Text),
    field("createdAt", "created_at", Encoding::Timestamp),
];

const SUMMARY_FIELDS: &[FieldSpec] = &[
    field("productName", "product_name", Encoding::Text),
    field("category", "category", Encoding::Text),
    field("origin", "origin", Encoding::Text),
    field("harvestDate", "harvest_date", Encoding::Timestamp),
    field("expiryDate", "expiry_date", Encoding::Timestamp),
    field("quantity", "quantity", Encoding::Integer),
    field("unit", "unit", Encoding::Text),
    field("currentOwner", "current_owner", Encoding::Text),
    field("eventCount", "event_count", Encoding::Integer),
];

const EVENT_FIELDS: &[FieldSpec] = &[
    field("eventId", "event_id", Encoding::Integer),
    field("batchId", "batch_id", Encoding::Text),
    field("eventType", "event_type", Encoding::Enum(EVENT_TYPES)),
    field("actor", "actor", Encoding::Text),
    field("location", "location", Encoding::Text),
    field("timestamp", "timestamp", Encoding::Timestamp),
    field("ipfsHash", "ipfs_hash", Encoding::Text),
    field("notes", "notes", Encoding::Text),
];

/// The record shapes the contract returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    User,
    Product,
    ProductSummary,
    Event,
}

impl RecordKind {
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            RecordKind::User => USER_FIELDS,
            RecordKind::Product => PRODUCT_FIELDS,
            RecordKind::ProductSummary => SUMMARY_FIELDS,
            RecordKind::Event => EVENT_FIELDS,
        }
    }

    /// Contract view method that returns this kind.
    pub fn query_method(self) -> &'static str {
        match self {
            RecordKind::User => "getUser",
            RecordKind::Product => "getProduct",
            RecordKind::ProductSummary => "getProductSummary",
            RecordKind::Event => "getEvents",
        }
    }

    /// Raw field whose zero value means the record does not exist.
    pub fn sentinel(self) -> Option<&'static str> {
        match self {
            RecordKind::User => Some("userAddress"),
            RecordKind::Product => Some("farmer"),
            RecordKind::ProductSummary => Some("currentOwner"),
            RecordKind::Event => None,
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(u64),
    Instant(DateTime<Utc>),
    Label(String),
    Bool(bool),
    Text(String),
    /// Kept verbatim because it could not be decoded.
    Raw(Value),
}

/// A canonical record produced from one contract reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub kind: RecordKind,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Text(s) | FieldValue::Label(s) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn instant(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name)? {
            FieldValue::Instant(t) => Some(*t),
            _ => None,
        }
    }
}

/// Whether `raw` is the contract's "nothing here" reply for `kind`.
pub fn is_absent(kind: RecordKind, raw: &Value) -> bool {
    let Some(sentinel) = kind.sentinel() else {
        return false;
    };
    match raw_field(kind, raw, sentinel) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => is_zero_address(s),
        Some(_) => false,
    }
}

fn is_zero_address(s: &str) -> bool {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    digits.chars().all(|c| c == '0')
}

fn raw_field<'a>(kind: RecordKind, raw: &'a Value, name: &str) -> Option<&'a Value> {
    match raw {
        Value::Object(map) => map.get(name),
        Value::Array(items) => kind
            .fields()
            .iter()
            .position(|f| f.raw == name)
            .and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Decode a raw reply of the given kind. Objects are read by field name,
/// arrays positionally in field-table order.
pub fn format_record(kind: RecordKind, raw: &Value) -> Record {
    let specs = kind.fields();
    let mut fields = BTreeMap::new();

    match raw {
        Value::Object(map) => {
            for (key, value) in map {
                if is_positional_artifact(key) {
                    continue;
                }
                match specs.iter().find(|s| s.raw == key) {
                    Some(spec) => {
                        fields.insert(spec.name.to_string(), decode(spec, value));
                    }
                    None => {
                        fields.insert(key.clone(), FieldValue::Raw(value.clone()));
                    }
                }
            }
        }
        Value::Array(items) => {
            for (i, value) in items.iter().enumerate() {
                match specs.get(i) {
                    Some(spec) => {
                        fields.insert(spec.name.to_string(), decode(spec, value));
                    }
                    None => {
                        fields.insert(i.to_string(), FieldValue::Raw(value.clone()));
                    }
                }
            }
        }
        other => {
            tracing::warn!(?kind, raw = %other, "reply is not a struct; keeping raw value");
            fields.insert("value".to_string(), FieldValue::Raw(other.clone()));
        }
    }

    Record { kind, fields }
}

/// Web3 bindings return tuple members under both their name and their index.
fn is_positional_artifact(key: &str) -> bool {
    key == "__length__" || (!key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()))
}

fn decode(spec: &FieldSpec, value: &Value) -> FieldValue {
    let decoded = match spec.encoding {
        Encoding::Integer => parse_integer(value).map(FieldValue::Integer),
        Encoding::Timestamp => parse_integer(value)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(FieldValue::Instant),
        Encoding::Enum(labels) => decode_label(labels, value),
        Encoding::Bool => parse_bool(value).map(FieldValue::Bool),
        Encoding::Text => value.as_str().map(|s| FieldValue::Text(s.to_string())),
    };

    decoded.unwrap_or_else(|| {
        tracing::warn!(field = spec.raw, raw = %value, "could not decode field; keeping raw value");
        FieldValue::Raw(value.clone())
    })
}

fn decode_label(labels: &'static [&'static str], value: &Value) -> Option<FieldValue> {
    if let Some(s) = value.as_str()
        && let Some(label) = labels.iter().find(|l| l.eq_ignore_ascii_case(s.trim()))
    {
        return Some(FieldValue::Label((*label).to_string()));
    }

    let index = parse_integer(value)?;
    let label = usize::try_from(index)
        .ok()
        .and_then(|i| labels.get(i))
        .copied()
        .unwrap_or(UNKNOWN_LABEL);
    Some(FieldValue::Label(label.to_string()))
}

/// JSON number, decimal string, or `0x` hex quantity.
pub fn parse_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

/// JSON bool, `"true"`/`"false"`, or `0`/`1`.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}
