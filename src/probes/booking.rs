//! Booking probes: confirming reservations, verifying issued tickets, and
//! walking the full cancellation state machine.

use chrono::{NaiveDateTime, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};

use crate::domain::{Booking, DaySlot, Product, TestResult};
use crate::engine::catalog::get_catalog;
use crate::engine::client::{call, ApiResponse, API_KEY_HEADER};
use crate::engine::decode::{decode_api_error, decode_booking, decode_reservation};
use crate::engine::errors::{check_api_error, ExpectedError};
use crate::engine::slot::{build_reservation_request, get_reservation_slot, ReservationRequest};
use crate::engine::{ProbeContext, ProbeError};
use crate::probes::availability::check_forbidden;
use crate::probes::{probe, Probe, ProbeResult};

async fn post_booking(
    ctx: &ProbeContext,
    payload: &Value,
    header_override: Option<&[(String, String)]>,
) -> Result<(ApiResponse, Option<Value>), ProbeError> {
    let url = ctx.url("booking");
    call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::POST,
        &[],
        Some(payload),
        header_override,
    )
    .await
}

async fn delete_booking(
    ctx: &ProbeContext,
    booking_id: &str,
) -> Result<(ApiResponse, Option<Value>), ProbeError> {
    let url = ctx.url(&format!("booking/{booking_id}"));
    call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::DELETE,
        &[],
        None,
        None,
    )
    .await
}

/// Booking without the reservation ID.
async fn missing_reservation_id(ctx: &ProbeContext) -> ProbeResult {
    let (raw, decoded) = post_booking(ctx, &json!({}), None).await?;
    let api_error = decode_api_error(&raw, decoded.as_ref())?;
    let expected = ExpectedError::new(
        1000,
        "Missing argument",
        "Required argument \"reservation_id\" was not found",
    );
    check_api_error(&raw, &api_error, &expected)
}

/// Booking without the API key.
async fn missing_api_key(ctx: &ProbeContext) -> ProbeResult {
    let (raw, _) = post_booking(ctx, &json!({}), Some(&[])).await?;
    check_forbidden(&raw)
}

/// Booking with incorrect API-Key.
async fn incorrect_api_key(ctx: &ProbeContext) -> ProbeResult {
    let headers = [(
        API_KEY_HEADER.to_string(),
        "NON-EXISTING-API-KEY".to_string(),
    )];
    let (raw, _) = post_booking(ctx, &json!({}), Some(&headers)).await?;
    check_forbidden(&raw)
}

/// Testing methods that are not allowed.
async fn not_allowed_method(ctx: &ProbeContext) -> ProbeResult {
    let url = ctx.url("booking");
    for method in [Method::GET, Method::PUT, Method::PATCH, Method::DELETE] {
        let (raw, _) = call(
            &ctx.client,
            &url,
            &ctx.api_key,
            method.clone(),
            &[],
            Some(&json!({})),
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

/// Booking with incorrect reservation ID.
async fn incorrect_reservation_id(ctx: &ProbeContext) -> ProbeResult {
    // base64("NON-EXISTING-ID\n") with the token padding substitution
    let payload = json!({"reservation_id": "Tk9OLUVYSVNUSU5HLUlECg!!"});
    let (raw, decoded) = post_booking(ctx, &payload, None).await?;
    let api_error = decode_api_error(&raw, decoded.as_ref())?;
    let expected = ExpectedError::new(
        3002,
        "Incorrect reservation ID",
        "Given reservation ID is incorrect",
    );
    check_api_error(&raw, &api_error, &expected)
}

struct FreshBooking {
    booking: Booking,
    slot: DaySlot,
    request: ReservationRequest,
    raw: ApiResponse,
}

/// Reserve a representative slot, then confirm it. The booking probes all
/// start from this sequence because a booking only exists downstream of a
/// live reservation.
async fn reserve_and_book(
    ctx: &ProbeContext,
    extra_booking_fields: &[(&str, Value)],
) -> Result<FreshBooking, ProbeError> {
    let slot = get_reservation_slot(ctx).await?;
    let request = build_reservation_request(ctx, &slot, 2, 2).await?;
    let url = ctx.product_url("reservation");
    let (raw, decoded) = call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::POST,
        &[],
        Some(&request.payload),
        None,
    )
    .await?;
    let reservation = decode_reservation(&raw, decoded.as_ref())?;

    let mut payload = json!({"reservation_id": reservation.reservation_id});
    for (key, value) in extra_booking_fields {
        payload[*key] = value.clone();
    }
    let (raw, decoded) = post_booking(ctx, &payload, None).await?;
    let booking = decode_booking(ctx.version, &raw, decoded.as_ref())?;
    Ok(FreshBooking {
        booking,
        slot,
        request,
        raw,
    })
}

/// Booking tickets for at least 1 variant. When barcodes are per-ticket,
/// the number of issued codes must match the reserved quantity for every
/// variant.
async fn booking_round_trip(ctx: &ProbeContext) -> ProbeResult {
    let fresh = reserve_and_book(ctx, &[("order_reference", json!("12345678910"))]).await?;
    if fresh.booking.barcode_scope == "ticket" {
        let tickets = fresh.booking.tickets.as_ref();
        for (variant_id, quantity) in &fresh.request.quantities {
            let codes = tickets.and_then(|t| t.get(variant_id));
            match codes {
                None => {
                    return Err(ProbeError::assertion_with(
                        format!("No tickets for variant {variant_id}"),
                        fresh.raw.capture(),
                    ));
                }
                Some(codes) if codes.len() as i64 != *quantity => {
                    return Err(ProbeError::assertion_with(
                        format!(
                            "Expected {quantity} codes for variant {variant_id} but got only {}",
                            codes.len()
                        ),
                        fresh.raw.capture(),
                    ));
                }
                Some(_) => {}
            }
        }
    }
    Ok(TestResult::ok())
}

fn slot_start_datetime(product: &Product, slot: &DaySlot) -> NaiveDateTime {
    let time = if product.use_timeslots {
        slot.timeslot
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight"))
    } else {
        NaiveTime::from_hms_opt(0, 0, 0).expect("midnight")
    };
    slot.date.and_time(time)
}

/// Perform booking that will be cancelled: walks refund policy, cutoff
/// arithmetic, double cancellation and the missing-booking case.
async fn cancellation_workflow(ctx: &ProbeContext) -> ProbeResult {
    let fresh = reserve_and_book(ctx, &[]).await?;
    let booking_id = fresh.booking.booking_id.clone();

    let (_, products) = get_catalog(ctx, None).await?;
    let Some(product) = products.into_iter().find(|p| p.id == ctx.product_id) else {
        return Err(ProbeError::assertion(format!(
            "Product {} was not found in the catalog",
            ctx.product_id
        )));
    };

    // first cancellation
    let (raw, decoded) = delete_booking(ctx, &booking_id).await?;

    if !product.is_refundable {
        let api_error = decode_api_error(&raw, decoded.as_ref())?;
        let expected = ExpectedError::new(
            3004,
            "Cancellation not possible",
            "The booking cannot be cancelled, the product does not allow cancellations",
        );
        check_api_error(&raw, &api_error, &expected)?;
        return Ok(TestResult::warning(
            "Skipping that test because the product does not support cancellations",
        ));
    }

    let slot_start = slot_start_datetime(&product, &fresh.slot);
    let now = Utc::now().naive_utc();
    if slot_start < now {
        let api_error = decode_api_error(&raw, decoded.as_ref())?;
        let expected = ExpectedError::new(2009, "Incorrect date", "Cannot use the past date");
        check_api_error(&raw, &api_error, &expected)?;
    }

    let hours_in_advance =
        ((slot_start - now).num_seconds() as f64 / 3600.0).round() as i64;
    if product.cutoff_time != 0 && product.cutoff_time > hours_in_advance {
        let api_error = decode_api_error(&raw, decoded.as_ref())?;
        let expected = ExpectedError::new(
            2009,
            "Incorrect date",
            format!(
                "The booking can only be cancelled {} hours in advance",
                product.cutoff_time
            ),
        );
        check_api_error(&raw, &api_error, &expected)?;
    }

    // second cancellation of the same booking
    let cancel_date_ok = slot_start > now;
    let before_cutoff = product.cutoff_time == 0 || product.cutoff_time < hours_in_advance;
    if cancel_date_ok && before_cutoff {
        let (raw, decoded) = delete_booking(ctx, &booking_id).await?;
        let api_error = decode_api_error(&raw, decoded.as_ref())?;
        let expected = ExpectedError::new(
            3003,
            "Already cancelled",
            format!("The booking with ID {booking_id} was already cancelled"),
        );
        check_api_error(&raw, &api_error, &expected)?;
    }

    // cancellation of a booking that never existed
    let ghost_id = "I-DO-NOT-EXIST";
    let (raw, decoded) = delete_booking(ctx, ghost_id).await?;
    let api_error = decode_api_error(&raw, decoded.as_ref())?;
    let expected = ExpectedError::new(
        1004,
        "Missing booking",
        format!("Booking with ID {ghost_id} doesn't exist"),
    );
    check_api_error(&raw, &api_error, &expected)
}

pub fn probes() -> Vec<Probe> {
    vec![
        probe!("Booking without the reservation ID", missing_reservation_id),
        probe!("Booking without the API key", missing_api_key),
        probe!("Booking with incorrect API-Key", incorrect_api_key),
        probe!("Testing methods that are not allowed", not_allowed_method),
        probe!(
            "Booking with incorrect reservation ID",
            incorrect_reservation_id
        ),
        probe!("Booking tickets for at least 1 variant", booking_round_trip),
        probe!(
            "Perform booking that will be cancelled",
            cancellation_workflow
        ),
    ]
}
