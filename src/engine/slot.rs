use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::domain::{DaySlot, Product, ProtocolVersion};
use crate::engine::catalog::get_product;
use crate::engine::client::{call, ApiResponse};
use crate::engine::decode::{decode_availability_v2, decode_daily_variants, decode_timeslots};
use crate::engine::{ProbeContext, ProbeError};

/// Memo for the representative reservation slot. Owned by the harness,
/// populated at most once per run, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SlotCache {
    inner: Arc<Mutex<Option<DaySlot>>>,
}

/// Fetches the next 30 days of bookable slots through whichever endpoint
/// the protocol version and product type dictate.
pub async fn fetch_slots(ctx: &ProbeContext) -> Result<(Vec<DaySlot>, ApiResponse), ProbeError> {
    let start = Utc::now().date_naive();
    let end = start + Duration::days(30);
    let params = [
        ("start", start.format("%Y-%m-%d").to_string()),
        ("end", end.format("%Y-%m-%d").to_string()),
    ];

    let endpoint = match (ctx.version, ctx.timeslots) {
        (ProtocolVersion::V2, _) => "availability",
        (ProtocolVersion::V1, true) => "timeslots",
        (ProtocolVersion::V1, false) => "variants",
    };
    let url = ctx.product_url(endpoint);
    let (raw, decoded) = call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::GET,
        &params,
        None,
        None,
    )
    .await?;

    let slots = match (ctx.version, ctx.timeslots) {
        (ProtocolVersion::V2, _) => decode_availability_v2(&raw, decoded.as_ref())?,
        (ProtocolVersion::V1, true) => decode_timeslots(&raw, decoded.as_ref())?
            .iter()
            .map(DaySlot::from_timeslot)
            .collect(),
        (ProtocolVersion::V1, false) => decode_daily_variants(&raw, decoded.as_ref())?
            .iter()
            .map(DaySlot::from_daily_variants)
            .collect(),
    };
    Ok((slots, raw))
}

/// Deterministic slot choice: drop sold-out days, prefer the first slot
/// offering more than one variant with positive availability, fall back to
/// the first slot with any availability at all.
pub fn select_slot(slots: &[DaySlot]) -> Option<&DaySlot> {
    let usable: Vec<&DaySlot> = slots
        .iter()
        .filter(|slot| !slot.variants.is_empty() && slot.available_tickets > 0)
        .collect();

    let mut single_variant_slot = None;
    for slot in &usable {
        let open_variants = slot
            .variants
            .iter()
            .filter(|v| v.available_tickets > 0)
            .count();
        if open_variants > 1 {
            return Some(slot);
        }
        if single_variant_slot.is_none() && open_variants > 0 {
            single_variant_slot = Some(*slot);
        }
    }
    single_variant_slot
}

/// Returns the memoized representative slot, computing it on first use.
pub async fn get_reservation_slot(ctx: &ProbeContext) -> Result<DaySlot, ProbeError> {
    let mut cached = ctx.slot_cache.inner.lock().await;
    if let Some(slot) = cached.as_ref() {
        return Ok(slot.clone());
    }

    let (slots, raw) = fetch_slots(ctx).await?;
    match select_slot(&slots) {
        Some(slot) => {
            *cached = Some(slot.clone());
            Ok(slot.clone())
        }
        None => Err(ProbeError::assertion_with(
            "There is no availability in the next 30 days to test a reservation.",
            raw.capture(),
        )),
    }
}

/// A reservation request body plus the per-variant quantities it asked for,
/// kept so the booking probes can verify issued ticket counts.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub payload: Value,
    pub quantities: HashMap<String, i64>,
}

fn customer_fixture() -> Value {
    json!({
        "first_name": "Jon",
        "last_name": "Snow",
        "email": "tests@example.com",
        "phone": "+31 85 888 4442",
        "country": "NL",
    })
}

fn visitor_data_fixture(fields: &[String], quantity: i64) -> Value {
    let visitors: Vec<Value> = (1..=quantity)
        .map(|i| {
            let mut entry = serde_json::Map::new();
            for field in fields {
                entry.insert(field.clone(), json!(format!("test {field} {i}")));
            }
            Value::Object(entry)
        })
        .collect();
    Value::Array(visitors)
}

fn order_data_fixture(fields: &[String]) -> Value {
    let mut entry = serde_json::Map::new();
    for field in fields {
        entry.insert(field.clone(), json!(format!("test {field}")));
    }
    Value::Object(entry)
}

/// Selects the variants to reserve: those with at least `min_quantity`
/// tickets get `variant_quantity` each; if none qualify, the first open
/// variant is taken with quantity 1 so the probe still exercises the flow.
fn pick_quantities(
    slot: &DaySlot,
    variant_quantity: i64,
    min_quantity: i64,
) -> Vec<(String, i64)> {
    let picked: Vec<(String, i64)> = slot
        .variants
        .iter()
        .filter(|v| v.available_tickets >= min_quantity)
        .map(|v| (v.id.clone(), variant_quantity))
        .collect();
    if !picked.is_empty() {
        return picked;
    }
    slot.variants
        .iter()
        .find(|v| v.available_tickets > 0)
        .map(|v| vec![(v.id.clone(), 1)])
        .unwrap_or_default()
}

/// Builds the version-appropriate reservation payload for a slot. v2
/// payloads are enriched with the required order/visitor data the catalog
/// declares, so the product is looked up first.
pub async fn build_reservation_request(
    ctx: &ProbeContext,
    slot: &DaySlot,
    variant_quantity: i64,
    min_quantity: i64,
) -> Result<ReservationRequest, ProbeError> {
    let picked = pick_quantities(slot, variant_quantity, min_quantity);
    let quantities: HashMap<String, i64> = picked.iter().cloned().collect();

    let payload = match ctx.version {
        ProtocolVersion::V1 => {
            let tickets: Vec<Value> = picked
                .iter()
                .map(|(id, quantity)| json!({"variant_id": id, "quantity": quantity}))
                .collect();
            let mut payload = json!({
                "date": slot.date.format("%Y-%m-%d").to_string(),
                "tickets": tickets,
                "customer": customer_fixture(),
            });
            if ctx.timeslots {
                if let Some(start) = &slot.timeslot {
                    payload["timeslot"] = json!(start);
                }
            }
            payload
        }
        ProtocolVersion::V2 => {
            let (_, product) = get_product(ctx).await?;
            build_v2_payload(&product, slot, &picked)
        }
    };

    Ok(ReservationRequest { payload, quantities })
}

fn build_v2_payload(product: &Product, slot: &DaySlot, picked: &[(String, i64)]) -> Value {
    let timeslot = if product.use_timeslots {
        slot.timeslot.clone().unwrap_or_else(|| "00:00".to_string())
    } else {
        "00:00".to_string()
    };
    let tickets: Vec<Value> = picked
        .iter()
        .map(|(id, quantity)| {
            let mut ticket = json!({"variant_id": id, "quantity": quantity});
            if !product.required_visitor_data.is_empty() {
                ticket["required_visitor_data"] =
                    visitor_data_fixture(&product.required_visitor_data, *quantity);
            }
            ticket
        })
        .collect();

    let mut payload = json!({
        "datetime": format!("{}T{timeslot}", slot.date.format("%Y-%m-%d")),
        "tickets": tickets,
        "customer": customer_fixture(),
    });
    if !product.required_order_data.is_empty() {
        payload["required_order_data"] = order_data_fixture(&product.required_order_data);
    }
    payload
}
