//! Reservation probes: the write path that places a time-limited hold.

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};

use crate::domain::{ProtocolVersion, Reservation, Severity, TestResult};
use crate::engine::client::{call, ApiResponse, API_KEY_HEADER};
use crate::engine::decode::{decode_api_error, decode_reservation};
use crate::engine::errors::{check_api_error, ExpectedError};
use crate::engine::slot::{build_reservation_request, get_reservation_slot};
use crate::engine::{ProbeContext, ProbeError};
use crate::probes::availability::check_forbidden;
use crate::probes::{probe, Probe, ProbeResult};

/// The hold must last at least 15 minutes; one minute of tolerance covers
/// clock skew between runner and supplier.
fn min_checked_hold() -> Duration {
    Duration::minutes(14)
}

async fn post_reservation(
    ctx: &ProbeContext,
    url: &str,
    payload: &Value,
    header_override: Option<&[(String, String)]>,
) -> Result<(ApiResponse, Option<Value>), ProbeError> {
    call(
        &ctx.client,
        url,
        &ctx.api_key,
        Method::POST,
        &[],
        Some(payload),
        header_override,
    )
    .await
}

/// Request without API-Key.
async fn missing_api_key(ctx: &ProbeContext) -> ProbeResult {
    let url = ctx.product_url("reservation");
    let (raw, _) = post_reservation(ctx, &url, &json!({}), Some(&[])).await?;
    check_forbidden(&raw)
}

/// Request with incorrect API-Key.
async fn incorrect_api_key(ctx: &ProbeContext) -> ProbeResult {
    let url = ctx.product_url("reservation");
    let headers = [(
        API_KEY_HEADER.to_string(),
        "NON-EXISTING-API-KEY".to_string(),
    )];
    let (raw, _) = post_reservation(ctx, &url, &json!({}), Some(&headers)).await?;
    check_forbidden(&raw)
}

fn date_field(version: ProtocolVersion) -> &'static str {
    match version {
        ProtocolVersion::V1 => "date",
        ProtocolVersion::V2 => "datetime",
    }
}

/// Testing missing argument errors: the payload grows field by field and
/// each step expects the next missing-field rejection. Wording deviations
/// are collected as warnings since ordering is implementation-defined.
async fn missing_argument_error(ctx: &ProbeContext) -> ProbeResult {
    let url = ctx.product_url("reservation");
    let slot = get_reservation_slot(ctx).await?;
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let mut warnings: Vec<String> = Vec::new();
    let mut payload = json!({});

    let steps: [(&str, Value); 3] = [
        (
            date_field(ctx.version),
            match ctx.version {
                ProtocolVersion::V1 => json!(tomorrow.format("%Y-%m-%d").to_string()),
                ProtocolVersion::V2 => json!(format!("{}T00:00", tomorrow.format("%Y-%m-%d"))),
            },
        ),
        (
            "tickets",
            json!([{"variant_id": slot.variants[0].id, "quantity": 1}]),
        ),
        ("customer", json!({})),
    ];

    for (field, value) in steps {
        let expected = ExpectedError::new(
            1000,
            "Missing argument",
            format!("Required argument \"{field}\" was not found"),
        );
        let (raw, decoded) = post_reservation(ctx, &url, &payload, None).await?;
        let api_error = decode_api_error(&raw, decoded.as_ref())?;
        let result = check_api_error(&raw, &api_error, &expected)?;
        if result.severity == Severity::Warning {
            if let Some(message) = result.message {
                warnings.push(message);
            }
        }
        payload[field] = value;
    }

    if warnings.is_empty() {
        Ok(TestResult::ok())
    } else {
        Ok(TestResult::warning(warnings.join("\n ")))
    }
}

/// Testing reservation for non-existing product.
async fn non_existing_product(ctx: &ProbeContext) -> ProbeResult {
    let slot = get_reservation_slot(ctx).await?;
    let request = build_reservation_request(ctx, &slot, 1, 1).await?;
    let url = ctx.product_url_for("NON-EXISTING-PRODUCT-ID", "reservation");
    let (raw, decoded) = post_reservation(ctx, &url, &request.payload, None).await?;
    let api_error = decode_api_error(&raw, decoded.as_ref())?;
    let expected = ExpectedError::new(
        1001,
        "Missing product",
        "Product with ID NON-EXISTING-PRODUCT-ID doesn't exist",
    );
    check_api_error(&raw, &api_error, &expected)
}

/// Testing reservation with incorrect date format.
async fn incorrect_date_format(ctx: &ProbeContext) -> ProbeResult {
    let slot = get_reservation_slot(ctx).await?;
    let mut request = build_reservation_request(ctx, &slot, 1, 1).await?;
    let bad = "05/05/2020";
    request.payload[date_field(ctx.version)] = json!(bad);
    let url = ctx.product_url("reservation");
    let (raw, decoded) = post_reservation(ctx, &url, &request.payload, None).await?;
    let api_error = decode_api_error(&raw, decoded.as_ref())?;
    let format_name = match ctx.version {
        ProtocolVersion::V1 => "YYYY-MM-DD",
        ProtocolVersion::V2 => "YYYY-MM-DDTHH:MM",
    };
    let expected = ExpectedError::new(
        2000,
        ctx.version.malformed_date_label(),
        format!("Incorrect date format {bad}, please use the {format_name} format"),
    );
    check_api_error(&raw, &api_error, &expected)
}

/// Testing reservation with past date.
async fn past_date(ctx: &ProbeContext) -> ProbeResult {
    let slot = get_reservation_slot(ctx).await?;
    let mut request = build_reservation_request(ctx, &slot, 1, 1).await?;
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    request.payload[date_field(ctx.version)] = match ctx.version {
        ProtocolVersion::V1 => json!(yesterday.format("%Y-%m-%d").to_string()),
        ProtocolVersion::V2 => json!(format!("{}T00:00", yesterday.format("%Y-%m-%d"))),
    };
    let url = ctx.product_url("reservation");
    let (raw, decoded) = post_reservation(ctx, &url, &request.payload, None).await?;
    let api_error = decode_api_error(&raw, decoded.as_ref())?;
    let expected = ExpectedError::new(2009, "Incorrect date", "Cannot use the past date");
    check_api_error(&raw, &api_error, &expected)
}

/// Testing methods that are not allowed.
async fn not_allowed_method(ctx: &ProbeContext) -> ProbeResult {
    let slot = get_reservation_slot(ctx).await?;
    let request = build_reservation_request(ctx, &slot, 1, 1).await?;
    let url = ctx.product_url("reservation");
    for method in [Method::GET, Method::PUT, Method::PATCH, Method::DELETE] {
        let (raw, _) = call(
            &ctx.client,
            &url,
            &ctx.api_key,
            method.clone(),
            &[],
            Some(&request.payload),
            None,
        )
        .await?;
        if raw.status != 405 {
            return Err(ProbeError::protocol_with(
                format!(
                    "Incorrect status code \"{}\" when calling the API via method {method}. \
                     Expected status code: \"405\".",
                    raw.status
                ),
                raw.capture(),
            ));
        }
    }
    Ok(TestResult::ok())
}

/// Pure reservation invariants: non-empty id, timezone discipline per
/// protocol version, and the minimum hold duration.
pub fn check_reservation(
    version: ProtocolVersion,
    reservation: &Reservation,
    now: DateTime<Utc>,
    raw: &ApiResponse,
) -> Result<(), ProbeError> {
    if reservation.reservation_id.is_empty() {
        return Err(ProbeError::protocol_with(
            "No reservation ID found",
            raw.capture(),
        ));
    }
    match (version, reservation.expires_at.offset) {
        (ProtocolVersion::V1, offset) if offset.is_none_or(|o| o.local_minus_utc() != 0) => {
            return Err(ProbeError::assertion_with(
                "Expiration time should be in the UTC timezone.",
                raw.capture(),
            ));
        }
        (ProtocolVersion::V2, None) => {
            return Err(ProbeError::assertion_with(
                "Expiration time should have the timezone.",
                raw.capture(),
            ));
        }
        _ => {}
    }
    if now + min_checked_hold() > reservation.expires_at.value {
        return Err(ProbeError::assertion_with(
            "Reservation should be held at least 15 minutes.",
            raw.capture(),
        ));
    }
    Ok(())
}

/// Reserving tickets for at least 1 variant.
async fn reservation_round_trip(ctx: &ProbeContext) -> ProbeResult {
    let slot = get_reservation_slot(ctx).await?;
    let request = build_reservation_request(ctx, &slot, 1, 1).await?;
    let url = ctx.product_url("reservation");
    let (raw, decoded) = post_reservation(ctx, &url, &request.payload, None).await?;
    let reservation = decode_reservation(&raw, decoded.as_ref())?;
    check_reservation(ctx.version, &reservation, Utc::now(), &raw)?;
    Ok(TestResult::ok())
}

/// Testing reservation for product with provides_pricing=true: every
/// reserved variant must be echoed in `unit_price` with a usable amount.
async fn unit_prices(ctx: &ProbeContext) -> ProbeResult {
    let (_, product) = crate::engine::catalog::get_product(ctx).await?;
    if !product.provides_pricing {
        return Ok(TestResult::warning(
            "Skipping the test because the product does not provide pricing.",
        ));
    }

    let slot = get_reservation_slot(ctx).await?;
    let request = build_reservation_request(ctx, &slot, 1, 1).await?;
    let url = ctx.product_url("reservation");
    let (raw, decoded) = post_reservation(ctx, &url, &request.payload, None).await?;
    let reservation = decode_reservation(&raw, decoded.as_ref())?;

    let Some(unit_price) = &reservation.unit_price else {
        return Err(ProbeError::assertion_with(
            format!(
                "Product {} provides pricing but the response does not include unit_price.",
                ctx.product_id
            ),
            raw.capture(),
        ));
    };
    for variant_id in request.quantities.keys() {
        match unit_price.get(variant_id) {
            None => {
                return Err(ProbeError::assertion_with(
                    format!(
                        "Product {} provides pricing but the response is missing unit price \
                         for a variant",
                        ctx.product_id
                    ),
                    raw.capture(),
                ));
            }
            Some(price) if price.currency.is_empty() || price.amount.is_empty() => {
                return Err(ProbeError::assertion_with(
                    format!(
                        "Product {} provides pricing but the response is missing unit price \
                         (amount, currency)",
                        ctx.product_id
                    ),
                    raw.capture(),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(TestResult::ok())
}

pub fn probes(version: ProtocolVersion) -> Vec<Probe> {
    let mut probes = vec![
        probe!("Request without API-Key", missing_api_key),
        probe!("Request with incorrect API-Key", incorrect_api_key),
        probe!("Testing missing argument errors", missing_argument_error),
        probe!("Reserving tickets for at least 1 variant", reservation_round_trip),
        probe!(
            "Testing reservation for non-existing product",
            non_existing_product
        ),
        probe!(
            "Testing reservation with incorrect date format",
            incorrect_date_format
        ),
        probe!("Testing reservation with past date", past_date),
        probe!("Testing methods that are not allowed", not_allowed_method),
    ];
    if version == ProtocolVersion::V2 {
        probes.push(probe!(
            "Testing reservation for product with provides_pricing=True",
            unit_prices
        ));
    }
    probes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExpiryTimestamp;
    use chrono::FixedOffset;

    fn raw() -> ApiResponse {
        ApiResponse {
            url: "http://localhost/v2/products/A500-FX/reservation".to_string(),
            status: 200,
            headers: Vec::new(),
            body: String::new(),
            payload: None,
        }
    }

    fn reservation(expires_in: Duration, offset: Option<i32>) -> Reservation {
        let now = Utc::now();
        Reservation {
            reservation_id: "RSV-1".to_string(),
            expires_at: ExpiryTimestamp {
                value: now + expires_in,
                offset: offset.map(|secs| FixedOffset::east_opt(secs).expect("offset")),
            },
            unit_price: None,
        }
    }

    #[test]
    fn fifteen_minute_hold_passes() {
        let r = reservation(Duration::minutes(30), Some(0));
        check_reservation(ProtocolVersion::V2, &r, Utc::now(), &raw()).expect("valid hold");
    }

    #[test]
    fn ten_minute_hold_fails() {
        let r = reservation(Duration::minutes(10), Some(0));
        let err = check_reservation(ProtocolVersion::V2, &r, Utc::now(), &raw()).unwrap_err();
        assert!(err.to_string().contains("at least 15 minutes"), "{err}");
    }

    #[test]
    fn hold_tolerance_allows_fourteen_and_a_half_minutes() {
        let r = reservation(Duration::seconds(14 * 60 + 30), Some(0));
        check_reservation(ProtocolVersion::V2, &r, Utc::now(), &raw())
            .expect("within tolerance");
    }

    #[test]
    fn v1_requires_utc_offset() {
        let r = reservation(Duration::minutes(30), Some(3600));
        let err = check_reservation(ProtocolVersion::V1, &r, Utc::now(), &raw()).unwrap_err();
        assert!(err.to_string().contains("UTC timezone"), "{err}");
    }

    #[test]
    fn v2_accepts_any_offset_but_requires_one() {
        let r = reservation(Duration::minutes(30), Some(3600));
        check_reservation(ProtocolVersion::V2, &r, Utc::now(), &raw()).expect("offset ok");

        let r = reservation(Duration::minutes(30), None);
        let err = check_reservation(ProtocolVersion::V2, &r, Utc::now(), &raw()).unwrap_err();
        assert!(err.to_string().contains("should have the timezone"), "{err}");
    }

    #[test]
    fn empty_reservation_id_fails() {
        let mut r = reservation(Duration::minutes(30), Some(0));
        r.reservation_id.clear();
        assert!(check_reservation(ProtocolVersion::V2, &r, Utc::now(), &raw()).is_err());
    }
}
