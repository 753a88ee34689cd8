//! Opaque token codec for reservation and booking ids.
//!
//! Both tokens are `base64(JSON array)` with `=` padding swapped for `!`
//! so the ids stay URL-path safe. Schemas (field order is part of the
//! format):
//!
//! - reservation: `[expires_at RFC3339, {variant_id: quantity}, product_id,
//!   slot "YYYY-MM-DDTHH:MM:SS"]`
//! - booking: `[slot "YYYY-MM-DDTHH:MM:SS", product_id, issued_at RFC3339]`

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BadToken {
    #[error("token is not valid base64")]
    NotBase64,
    #[error("token payload is malformed")]
    Malformed,
}

const SLOT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn encode_wire(value: &Value) -> String {
    BASE64.encode(value.to_string()).replace('=', "!")
}

fn decode_wire(token: &str) -> Result<Value, BadToken> {
    let bytes = BASE64
        .decode(token.replace('!', "="))
        .map_err(|_| BadToken::NotBase64)?;
    serde_json::from_slice(&bytes).map_err(|_| BadToken::Malformed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationToken {
    pub expires_at: DateTime<Utc>,
    pub quantities: BTreeMap<String, i64>,
    pub product_id: String,
    pub slot: NaiveDateTime,
}

impl ReservationToken {
    pub fn encode(&self) -> String {
        let quantities: serde_json::Map<String, Value> = self
            .quantities
            .iter()
            .map(|(id, quantity)| (id.clone(), json!(quantity)))
            .collect();
        encode_wire(&json!([
            self.expires_at.to_rfc3339(),
            quantities,
            self.product_id,
            self.slot.format(SLOT_FORMAT).to_string(),
        ]))
    }

    pub fn decode(token: &str) -> Result<Self, BadToken> {
        let value = decode_wire(token)?;
        let parts = value.as_array().ok_or(BadToken::Malformed)?;
        let [expires_at, quantities, product_id, slot] = parts.as_slice() else {
            return Err(BadToken::Malformed);
        };

        let expires_at = expires_at
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .ok_or(BadToken::Malformed)?
            .with_timezone(&Utc);
        let quantities = quantities
            .as_object()
            .ok_or(BadToken::Malformed)?
            .iter()
            .map(|(id, quantity)| {
                quantity
                    .as_i64()
                    .map(|q| (id.clone(), q))
                    .ok_or(BadToken::Malformed)
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let product_id = product_id.as_str().ok_or(BadToken::Malformed)?.to_string();
        let slot = slot
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, SLOT_FORMAT).ok())
            .ok_or(BadToken::Malformed)?;

        Ok(ReservationToken {
            expires_at,
            quantities,
            product_id,
            slot,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingToken {
    pub slot: NaiveDateTime,
    pub product_id: String,
    pub issued_at: DateTime<Utc>,
}

impl BookingToken {
    pub fn encode(&self) -> String {
        encode_wire(&json!([
            self.slot.format(SLOT_FORMAT).to_string(),
            self.product_id,
            self.issued_at.to_rfc3339(),
        ]))
    }

    pub fn decode(token: &str) -> Result<Self, BadToken> {
        let value = decode_wire(token)?;
        let parts = value.as_array().ok_or(BadToken::Malformed)?;
        let [slot, product_id, issued_at] = parts.as_slice() else {
            return Err(BadToken::Malformed);
        };

        let slot = slot
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, SLOT_FORMAT).ok())
            .ok_or(BadToken::Malformed)?;
        let product_id = product_id.as_str().ok_or(BadToken::Malformed)?.to_string();
        let issued_at = issued_at
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .ok_or(BadToken::Malformed)?
            .with_timezone(&Utc);

        Ok(BookingToken {
            slot,
            product_id,
            issued_at,
        })
    }
}
