use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDateTime;
use serde_json::Value;

use crate::domain::{
    ApiError, Booking, BookingV1, BookingV2, DailyAvailability, DailyVariants, DaySlot, Product,
    ProductV1, ProductV2, ProtocolVersion, Reservation, SlotVariant, Timeslot, BARCODE_FORMATS_V1,
    BARCODE_FORMATS_V2,
};
use crate::engine::client::ApiResponse;
use crate::engine::ProbeError;

fn bad_format(endpoint: &str, err: &serde_json::Error, raw: &ApiResponse) -> ProbeError {
    ProbeError::protocol_with(
        format!("Incorrect JSON format in response from the {endpoint} endpoint: {err}"),
        raw.capture(),
    )
}

fn expect_array<'a>(
    raw: &ApiResponse,
    value: Option<&'a Value>,
) -> Result<&'a Vec<Value>, ProbeError> {
    match value.and_then(Value::as_array) {
        Some(items) => Ok(items),
        None => Err(ProbeError::protocol_with(
            "The response should be a JSON Array",
            raw.capture(),
        )),
    }
}

fn expect_object<'a>(raw: &ApiResponse, value: Option<&'a Value>) -> Result<&'a Value, ProbeError> {
    match value {
        Some(v) if v.is_object() => Ok(v),
        _ => Err(ProbeError::protocol_with(
            "The response should be a JSON Object",
            raw.capture(),
        )),
    }
}

/// Decodes the `/products` catalog. Unknown fields are rejected per schema;
/// the two protocol generations differ in the pricing/required-data fields.
pub fn decode_products(
    version: ProtocolVersion,
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<Vec<Product>, ProbeError> {
    let items = expect_array(raw, value)?;
    let mut products = Vec::with_capacity(items.len());
    for item in items {
        let product = match version {
            ProtocolVersion::V1 => serde_json::from_value::<ProductV1>(item.clone())
                .map(Product::from)
                .map_err(|err| bad_format("/products", &err, raw))?,
            ProtocolVersion::V2 => serde_json::from_value::<ProductV2>(item.clone())
                .map(Product::from)
                .map_err(|err| bad_format("/products", &err, raw))?,
        };
        products.push(product);
    }
    Ok(products)
}

pub fn decode_daily_availability(
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<Vec<DailyAvailability>, ProbeError> {
    let items = expect_array(raw, value)?;
    items
        .iter()
        .map(|item| {
            serde_json::from_value::<DailyAvailability>(item.clone())
                .map_err(|err| bad_format("/dates", &err, raw))
        })
        .collect()
}

pub fn decode_daily_variants(
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<Vec<DailyVariants>, ProbeError> {
    let items = expect_array(raw, value)?;
    items
        .iter()
        .map(|item| {
            serde_json::from_value::<DailyVariants>(item.clone())
                .map_err(|err| bad_format("/variants", &err, raw))
        })
        .collect()
}

pub fn decode_timeslots(
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<Vec<Timeslot>, ProbeError> {
    let items = expect_array(raw, value)?;
    items
        .iter()
        .map(|item| {
            serde_json::from_value::<Timeslot>(item.clone())
                .map_err(|err| bad_format("/timeslots", &err, raw))
        })
        .collect()
}

/// Decodes the v2 unified availability object, keyed by `YYYY-MM-DDTHH:MM`.
pub fn decode_availability_v2(
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<Vec<DaySlot>, ProbeError> {
    let Some(Value::Object(map)) = value else {
        return Err(ProbeError::protocol_with(
            "The response should be a JSON Object",
            raw.capture(),
        ));
    };
    let mut slots = Vec::with_capacity(map.len());
    for (key, entry) in map {
        let parsed = NaiveDateTime::parse_from_str(key, "%Y-%m-%dT%H:%M").map_err(|_| {
            ProbeError::protocol_with(
                format!(
                    "Incorrect JSON format in response from the /availability endpoint: \
                     key {key} is not in the YYYY-MM-DDTHH:MM format"
                ),
                raw.capture(),
            )
        })?;
        let day: crate::domain::DayEntryV2 = serde_json::from_value(entry.clone())
            .map_err(|err| bad_format("/availability", &err, raw))?;
        slots.push(DaySlot {
            date: parsed.date(),
            timeslot: Some(parsed.time().format("%H:%M").to_string()),
            available_tickets: day.available_tickets,
            variants: day.variants.iter().map(SlotVariant::from_v2).collect(),
        });
    }
    slots.sort_by(|a, b| (a.date, a.timeslot.clone()).cmp(&(b.date, b.timeslot.clone())));
    Ok(slots)
}

pub fn decode_reservation(
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<Reservation, ProbeError> {
    let object = expect_object(raw, value)?;
    serde_json::from_value::<Reservation>(object.clone())
        .map_err(|err| bad_format("/reservation", &err, raw))
}

fn base64_round_trips(item: &str) -> bool {
    match BASE64.decode(item) {
        Ok(decoded) => BASE64.encode(decoded) == item,
        Err(_) => false,
    }
}

fn validate_pdf_codes(booking: &Booking, raw: &ApiResponse) -> Result<(), ProbeError> {
    if booking.barcode_scope == "order" {
        let barcode = booking.barcode.as_deref().unwrap_or("");
        if !base64_round_trips(barcode) {
            return Err(ProbeError::protocol_with(
                "Error while decoding (base64) PDF voucher for the order",
                raw.capture(),
            ));
        }
    } else if booking.barcode_scope == "ticket" {
        for codes in booking.tickets.iter().flat_map(|t| t.values()) {
            for code in codes {
                if !base64_round_trips(code) {
                    return Err(ProbeError::protocol_with(
                        "Error while decoding (base64) PDF voucher for the ticket",
                        raw.capture(),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Decodes a booking confirmation and enforces the cross-field rules:
/// known barcode format, valid scope, scope-dependent presence, and the
/// base64 round-trip for PDF vouchers.
pub fn decode_booking(
    version: ProtocolVersion,
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<Booking, ProbeError> {
    let object = expect_object(raw, value)?;
    let booking = match version {
        ProtocolVersion::V1 => {
            let b: BookingV1 = serde_json::from_value(object.clone())
                .map_err(|err| bad_format("/booking", &err, raw))?;
            Booking {
                booking_id: b.booking_id,
                barcode_format: b.barcode_format,
                barcode_scope: b.barcode_position,
                barcode: b.barcode,
                tickets: b.tickets,
            }
        }
        ProtocolVersion::V2 => {
            let b: BookingV2 = serde_json::from_value(object.clone())
                .map_err(|err| bad_format("/booking", &err, raw))?;
            Booking {
                booking_id: b.booking_id,
                barcode_format: b.barcode_format,
                barcode_scope: b.barcode_scope,
                barcode: b.barcode,
                tickets: b.tickets,
            }
        }
    };

    let formats: &[&str] = match version {
        ProtocolVersion::V1 => &BARCODE_FORMATS_V1,
        ProtocolVersion::V2 => &BARCODE_FORMATS_V2,
    };
    if !formats.contains(&booking.barcode_format.as_str()) {
        return Err(ProbeError::protocol_with(
            format!("Incorrect barcode format ({})", booking.barcode_format),
            raw.capture(),
        ));
    }
    if booking.barcode_scope != "order" && booking.barcode_scope != "ticket" {
        return Err(ProbeError::protocol_with(
            format!(
                "Incorrect value in the barcode scope field: {}",
                booking.barcode_scope
            ),
            raw.capture(),
        ));
    }
    if booking.barcode_scope == "order" && booking.barcode.as_deref().unwrap_or("").is_empty() {
        return Err(ProbeError::protocol_with(
            "Barcode for the whole order is empty",
            raw.capture(),
        ));
    }
    if booking.barcode_scope == "ticket"
        && booking.tickets.as_ref().is_none_or(|t| t.is_empty())
    {
        return Err(ProbeError::protocol_with(
            "Tickets Array is empty",
            raw.capture(),
        ));
    }
    if booking.barcode_format == "PDF" {
        validate_pdf_codes(&booking, raw)?;
    }

    Ok(booking)
}

/// Unpacks a 400 error body. A success status where an error was expected
/// is itself a violation.
pub fn decode_api_error(
    raw: &ApiResponse,
    value: Option<&Value>,
) -> Result<ApiError, ProbeError> {
    if raw.is_success() {
        return Err(ProbeError::protocol_with(
            format!("Expected HTTP 400 but got HTTP {} instead.", raw.status),
            raw.capture(),
        ));
    }
    let object = match value {
        Some(v) if v.is_object() => v,
        _ => {
            return Err(ProbeError::protocol_with(
                "400 error response should be a JSON Object",
                raw.capture(),
            ));
        }
    };
    serde_json::from_value::<ApiError>(object.clone()).map_err(|err| {
        ProbeError::protocol_with(
            format!("Incorrect response format for 400 error: {err}"),
            raw.capture(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw() -> ApiResponse {
        ApiResponse {
            url: "http://localhost/v2/products".to_string(),
            status: 200,
            headers: Vec::new(),
            body: String::new(),
            payload: None,
        }
    }

    fn raw_with_status(status: u16) -> ApiResponse {
        ApiResponse {
            status,
            ..raw()
        }
    }

    #[test]
    fn decode_products_round_trips_valid_catalog() {
        let value = json!([{
            "id": "A500-FX",
            "name": "A500-FX",
            "description": "Test non timeslot product",
            "use_timeslots": false,
            "is_refundable": true,
            "cutoff_time": 0,
            "provides_pricing": false,
            "required_order_data": ["pickup_location"],
            "required_visitor_data": null,
            "max_tickets_per_order": 25,
        }]);
        let products =
            decode_products(ProtocolVersion::V2, &raw(), Some(&value)).expect("decode catalog");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "A500-FX");
        assert_eq!(products[0].required_order_data, vec!["pickup_location"]);
    }

    #[test]
    fn decode_products_rejects_unknown_field() {
        let value = json!([{
            "id": "A500-FX",
            "name": "A500-FX",
            "use_timeslots": false,
            "is_refundable": true,
            "cutoff_time": 0,
            "provides_pricing": false,
            "surprise": 1,
        }]);
        let err = decode_products(ProtocolVersion::V2, &raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("surprise"), "{err}");
        assert!(err.to_string().contains("/products"), "{err}");
    }

    #[test]
    fn decode_products_rejects_missing_field() {
        let value = json!([{
            "id": "A500-FX",
            "use_timeslots": false,
            "is_refundable": true,
            "cutoff_time": 0,
            "provides_pricing": false,
        }]);
        let err = decode_products(ProtocolVersion::V2, &raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("name"), "{err}");
    }

    #[test]
    fn decode_products_rejects_wrong_type() {
        let value = json!([{
            "id": "A500-FX",
            "name": "A500-FX",
            "use_timeslots": "yes",
            "is_refundable": true,
            "cutoff_time": 0,
            "provides_pricing": false,
        }]);
        let err = decode_products(ProtocolVersion::V2, &raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("use_timeslots"), "{err}");
    }

    #[test]
    fn decode_products_rejects_non_array() {
        let value = json!({"products": []});
        let err = decode_products(ProtocolVersion::V1, &raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("JSON Array"), "{err}");
    }

    #[test]
    fn decode_availability_v2_splits_datetime_keys() {
        let value = json!({
            "2026-08-10T17:30": {
                "available_tickets": 10,
                "variants": [
                    {"id": "1", "name": "Adult", "available_tickets": 6, "price": null},
                    {"id": "2", "name": "Child", "available_tickets": 4},
                ],
            },
        });
        let slots = decode_availability_v2(&raw(), Some(&value)).expect("decode availability");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].timeslot.as_deref(), Some("17:30"));
        assert_eq!(slots[0].variants.len(), 2);
    }

    #[test]
    fn decode_availability_v2_rejects_bad_key() {
        let value = json!({"10-08-2026": {"available_tickets": 1, "variants": []}});
        let err = decode_availability_v2(&raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DDTHH:MM"), "{err}");
    }

    #[test]
    fn decode_booking_enforces_ticket_scope_presence() {
        let value = json!({
            "booking_id": "B-1",
            "barcode_format": "CODE128",
            "barcode_scope": "ticket",
            "barcode": null,
            "tickets": {},
        });
        let err = decode_booking(ProtocolVersion::V2, &raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("Tickets Array is empty"), "{err}");
    }

    #[test]
    fn decode_booking_rejects_unknown_barcode_format() {
        let value = json!({
            "booking_id": "B-1",
            "barcode_format": "AZTEC",
            "barcode_scope": "order",
            "barcode": "aGVsbG8=",
            "tickets": null,
        });
        let err = decode_booking(ProtocolVersion::V2, &raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("Incorrect barcode format"), "{err}");
    }

    #[test]
    fn decode_booking_pdf_requires_base64_codes() {
        let value = json!({
            "booking_id": "B-1",
            "barcode_format": "PDF",
            "barcode_scope": "ticket",
            "barcode": null,
            "tickets": {"1": ["not base64 at all!!"]},
        });
        let err = decode_booking(ProtocolVersion::V2, &raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("PDF voucher"), "{err}");

        let good = json!({
            "booking_id": "B-1",
            "barcode_format": "PDF",
            "barcode_scope": "ticket",
            "barcode": null,
            "tickets": {"1": [BASE64.encode("voucher-1")]},
        });
        decode_booking(ProtocolVersion::V2, &raw(), Some(&good)).expect("valid PDF booking");
    }

    #[test]
    fn decode_booking_v1_uses_barcode_position() {
        let value = json!({
            "booking_id": "B-1",
            "barcode_format": "CODE128",
            "barcode_position": "ticket",
            "tickets": {"1": ["123"]},
        });
        let booking =
            decode_booking(ProtocolVersion::V1, &raw(), Some(&value)).expect("decode v1 booking");
        assert_eq!(booking.barcode_scope, "ticket");
    }

    #[test]
    fn decode_api_error_flags_success_status() {
        let value = json!({"error_code": 1000, "error": "Missing argument", "message": "x"});
        let err = decode_api_error(&raw_with_status(200), Some(&value)).unwrap_err();
        assert!(
            err.to_string().contains("Expected HTTP 400 but got HTTP 200"),
            "{err}"
        );
    }

    #[test]
    fn decode_api_error_accepts_contract_shape() {
        let value = json!({
            "error_code": 2009,
            "error": "Incorrect date",
            "message": "Cannot use the past date",
        });
        let api_error =
            decode_api_error(&raw_with_status(400), Some(&value)).expect("decode error body");
        assert_eq!(api_error.error_code, 2009);
    }

    #[test]
    fn decode_reservation_rejects_extra_fields() {
        let value = json!({
            "reservation_id": "abc",
            "expires_at": "2026-08-07T12:30:00+00:00",
            "debug": true,
        });
        let err = decode_reservation(&raw(), Some(&value)).unwrap_err();
        assert!(err.to_string().contains("debug"), "{err}");
    }
}
