use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ─── Protocol ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    pub fn path_prefix(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "v1",
            ProtocolVersion::V2 => "v2",
        }
    }

    /// Label used by the 2000 error family. The wording changed between
    /// protocol generations and suppliers must match their version.
    pub fn malformed_date_label(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "Incorrect date format",
            ProtocolVersion::V2 => "Malformed datetime",
        }
    }
}

/// Allowed values for `required_order_data` in the v2 catalog.
pub const ORDER_DATA_FIELDS: [&str; 5] = [
    "pickup_location",
    "dropoff_location",
    "nationality",
    "flight_number",
    "passport_id",
];

/// Allowed values for `required_visitor_data` in the v2 catalog.
pub const VISITOR_DATA_FIELDS: [&str; 6] = [
    "full_name",
    "email",
    "phone",
    "address",
    "passport_id",
    "date_of_birth",
];

pub const BARCODE_FORMATS_V1: [&str; 6] =
    ["QRCODE", "CODE128", "CODE39", "ITF", "DATAMATRIX", "EAN13"];

pub const BARCODE_FORMATS_V2: [&str; 7] =
    ["QRCODE", "CODE128", "CODE39", "ITF", "DATAMATRIX", "EAN13", "PDF"];

// ─── Catalog ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductV1 {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub use_timeslots: bool,
    pub is_refundable: bool,
    pub cutoff_time: i64,
    pub max_tickets_per_order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductV2 {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub use_timeslots: bool,
    pub is_refundable: bool,
    pub cutoff_time: i64,
    pub provides_pricing: bool,
    pub required_order_data: Option<Vec<String>>,
    pub required_visitor_data: Option<Vec<String>>,
    pub max_tickets_per_order: Option<i64>,
}

/// Version-independent view of a catalog entry.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub use_timeslots: bool,
    pub is_refundable: bool,
    pub cutoff_time: i64,
    pub provides_pricing: bool,
    pub required_order_data: Vec<String>,
    pub required_visitor_data: Vec<String>,
}

impl From<ProductV1> for Product {
    fn from(p: ProductV1) -> Self {
        Product {
            id: p.id,
            name: p.name,
            description: p.description,
            use_timeslots: p.use_timeslots,
            is_refundable: p.is_refundable,
            cutoff_time: p.cutoff_time,
            provides_pricing: false,
            required_order_data: Vec::new(),
            required_visitor_data: Vec::new(),
        }
    }
}

impl From<ProductV2> for Product {
    fn from(p: ProductV2) -> Self {
        Product {
            id: p.id,
            name: p.name,
            description: p.description,
            use_timeslots: p.use_timeslots,
            is_refundable: p.is_refundable,
            cutoff_time: p.cutoff_time,
            provides_pricing: p.provides_pricing,
            required_order_data: p.required_order_data.unwrap_or_default(),
            required_visitor_data: p.required_visitor_data.unwrap_or_default(),
        }
    }
}

// ─── Availability ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DailyAvailability {
    pub date: NaiveDate,
    pub max_tickets: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantV1 {
    pub id: String,
    pub name: String,
    pub max_tickets: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DailyVariants {
    pub date: NaiveDate,
    pub max_tickets: i64,
    pub variants: Vec<VariantV1>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timeslot {
    pub date: NaiveDate,
    pub start: String,
    pub end: String,
    pub max_tickets: i64,
    pub variants: Vec<VariantV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantPrice {
    pub currency: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantV2 {
    pub id: String,
    pub name: String,
    pub available_tickets: i64,
    pub price: Option<VariantPrice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayEntryV2 {
    pub available_tickets: i64,
    pub variants: Vec<VariantV2>,
}

/// One bookable slot in a version-independent shape. v1 `/variants` days
/// have no timeslot; v1 `/timeslots` carry start/end; v2 availability keys
/// carry an HH:MM timeslot.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySlot {
    pub date: NaiveDate,
    pub timeslot: Option<String>,
    pub available_tickets: i64,
    pub variants: Vec<SlotVariant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotVariant {
    pub id: String,
    pub name: String,
    pub available_tickets: i64,
    pub price: Option<VariantPrice>,
}

impl DaySlot {
    pub fn from_daily_variants(day: &DailyVariants) -> Self {
        DaySlot {
            date: day.date,
            timeslot: None,
            available_tickets: day.max_tickets,
            variants: day.variants.iter().map(SlotVariant::from_v1).collect(),
        }
    }

    pub fn from_timeslot(slot: &Timeslot) -> Self {
        DaySlot {
            date: slot.date,
            timeslot: Some(slot.start.clone()),
            available_tickets: slot.max_tickets,
            variants: slot.variants.iter().map(SlotVariant::from_v1).collect(),
        }
    }
}

impl SlotVariant {
    fn from_v1(v: &VariantV1) -> Self {
        SlotVariant {
            id: v.id.clone(),
            name: v.name.clone(),
            available_tickets: v.max_tickets,
            price: None,
        }
    }

    pub fn from_v2(v: &VariantV2) -> Self {
        SlotVariant {
            id: v.id.clone(),
            name: v.name.clone(),
            available_tickets: v.available_tickets,
            price: v.price.clone(),
        }
    }
}

// ─── Reservation & booking ────────────────────────────────────────────────────

/// Expiry timestamp that remembers whether the wire value carried an
/// explicit UTC offset. v1 requires the offset to be UTC, v2 only requires
/// it to be present; both checks need the distinction after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiryTimestamp {
    pub value: DateTime<Utc>,
    pub offset: Option<FixedOffset>,
}

impl<'de> Deserialize<'de> for ExpiryTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::<FixedOffset>::parse_from_rfc3339(&raw) {
            return Ok(ExpiryTimestamp {
                value: parsed.with_timezone(&Utc),
                offset: Some(*parsed.offset()),
            });
        }
        let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| serde::de::Error::custom(format!("invalid datetime: {raw}")))?;
        Ok(ExpiryTimestamp {
            value: naive.and_utc(),
            offset: None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reservation {
    pub reservation_id: String,
    pub expires_at: ExpiryTimestamp,
    pub unit_price: Option<HashMap<String, VariantPrice>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingV1 {
    pub booking_id: String,
    pub barcode_format: String,
    pub barcode_position: String,
    pub barcode: Option<String>,
    pub tickets: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingV2 {
    pub booking_id: String,
    pub barcode_format: String,
    pub barcode_scope: String,
    pub barcode: Option<String>,
    pub tickets: Option<HashMap<String, Vec<String>>>,
}

/// Version-independent booking confirmation. The scope field is called
/// `barcode_position` on the v1 wire and `barcode_scope` on v2.
#[derive(Debug, Clone)]
pub struct Booking {
    pub booking_id: String,
    pub barcode_format: String,
    pub barcode_scope: String,
    pub barcode: Option<String>,
    pub tickets: Option<HashMap<String, Vec<String>>>,
}

// ─── Errors & results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub error_code: i64,
    pub error: String,
    pub message: String,
}

/// Full capture of one HTTP exchange, attached to failed or warning
/// results so the report can dump what actually went over the wire.
#[derive(Debug, Clone)]
pub struct ExchangeCapture {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub payload: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Warning,
    Fail,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub title: String,
    pub severity: Severity,
    pub message: Option<String>,
    pub duration_ms: u64,
    pub response: Option<ExchangeCapture>,
}

impl TestResult {
    pub fn ok() -> Self {
        TestResult {
            title: String::new(),
            severity: Severity::Ok,
            message: None,
            duration_ms: 0,
            response: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        TestResult {
            title: String::new(),
            severity: Severity::Warning,
            message: Some(message.into()),
            duration_ms: 0,
            response: None,
        }
    }

    pub fn with_response(mut self, response: ExchangeCapture) -> Self {
        self.response = Some(response);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    pub fn is_fail(&self) -> bool {
        self.severity == Severity::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_timestamp_keeps_utc_offset() {
        let ts: ExpiryTimestamp =
            serde_json::from_value(serde_json::json!("2026-08-07T12:30:00+00:00"))
                .expect("parse expiry");
        assert_eq!(ts.offset.map(|o| o.local_minus_utc()), Some(0));
    }

    #[test]
    fn expiry_timestamp_accepts_naive_datetime_without_offset() {
        let ts: ExpiryTimestamp =
            serde_json::from_value(serde_json::json!("2026-08-07T12:30:00.123456"))
                .expect("parse expiry");
        assert!(ts.offset.is_none());
    }

    #[test]
    fn expiry_timestamp_rejects_garbage() {
        let result: Result<ExpiryTimestamp, _> =
            serde_json::from_value(serde_json::json!("not-a-date"));
        assert!(result.is_err());
    }

    #[test]
    fn product_v1_defaults_to_no_pricing() {
        let raw = serde_json::json!({
            "id": "A500-FX",
            "name": "A500-FX",
            "use_timeslots": false,
            "is_refundable": true,
            "cutoff_time": 0,
        });
        let product: Product = serde_json::from_value::<ProductV1>(raw)
            .expect("parse product")
            .into();
        assert!(!product.provides_pricing);
        assert!(product.required_order_data.is_empty());
    }
}
