//! The fixture catalog and the mutable per-run state. Internal bookkeeping
//! (ticket format, aggregation policy, cancelled bookings) lives here and
//! never leaks into the wire representation.

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::domain::ProtocolVersion;

#[derive(Debug, Clone)]
pub struct MockProduct {
    pub id: &'static str,
    pub name: &'static str,
    pub description: Option<&'static str>,
    pub use_timeslots: bool,
    pub is_refundable: bool,
    pub cutoff_time: i64,
    pub max_tickets_per_order: i64,
    pub required_order_data: &'static [&'static str],
    pub required_visitor_data: &'static [&'static str],
    /// Barcode format issued for this product's tickets.
    pub ticket_format: &'static str,
    /// Whether the aggregate count reports the sum of the variants or the
    /// largest single variant; both policies are contract-legal.
    pub aggregate_as_sum: bool,
    /// Pricing currency; `None` means the product does not provide pricing.
    pub currency: Option<&'static str>,
}

impl MockProduct {
    pub fn provides_pricing(&self) -> bool {
        self.currency.is_some()
    }

    pub fn to_json(&self, version: ProtocolVersion) -> Value {
        let mut product = json!({
            "id": self.id,
            "name": self.name,
            "use_timeslots": self.use_timeslots,
            "is_refundable": self.is_refundable,
            "cutoff_time": self.cutoff_time,
            "max_tickets_per_order": self.max_tickets_per_order,
        });
        if let Some(description) = self.description {
            product["description"] = json!(description);
        }
        if version == ProtocolVersion::V2 {
            product["provides_pricing"] = json!(self.provides_pricing());
            product["required_order_data"] = json!(self.required_order_data);
            product["required_visitor_data"] = json!(self.required_visitor_data);
        }
        product
    }
}

static PRODUCTS: [MockProduct; 5] = [
    MockProduct {
        id: "A300-FX",
        name: "A300-FX",
        description: None,
        use_timeslots: true,
        is_refundable: true,
        cutoff_time: 24,
        max_tickets_per_order: 10,
        required_order_data: &[],
        required_visitor_data: &[],
        ticket_format: "CODE128",
        aggregate_as_sum: true,
        currency: None,
    },
    MockProduct {
        id: "A400-FX",
        name: "A400-FX",
        description: Some("Test timeslot product"),
        use_timeslots: true,
        is_refundable: false,
        cutoff_time: 0,
        max_tickets_per_order: 10,
        required_order_data: &["pickup_location", "passport_id"],
        required_visitor_data: &["full_name", "phone"],
        ticket_format: "CODE128",
        aggregate_as_sum: false,
        currency: Some("USD"),
    },
    MockProduct {
        id: "A500-FX",
        name: "A500-FX",
        description: Some("Test non timeslot product"),
        use_timeslots: false,
        is_refundable: true,
        cutoff_time: 0,
        max_tickets_per_order: 25,
        required_order_data: &[],
        required_visitor_data: &[],
        ticket_format: "CODE128",
        aggregate_as_sum: false,
        currency: None,
    },
    MockProduct {
        id: "A550-FX",
        name: "A550-FX",
        description: Some("Test PDF barcode product"),
        use_timeslots: false,
        is_refundable: true,
        cutoff_time: 10,
        max_tickets_per_order: 10,
        required_order_data: &[],
        required_visitor_data: &["email", "date_of_birth"],
        ticket_format: "PDF",
        aggregate_as_sum: false,
        currency: None,
    },
    MockProduct {
        id: "A600-FX",
        name: "A600-FX",
        description: None,
        use_timeslots: false,
        is_refundable: false,
        cutoff_time: 0,
        max_tickets_per_order: 5,
        required_order_data: &["nationality"],
        required_visitor_data: &[],
        ticket_format: "CODE128",
        aggregate_as_sum: false,
        currency: None,
    },
];

#[derive(Debug, Default)]
pub struct Repository {
    cancelled: Mutex<HashSet<String>>,
}

impl Repository {
    pub fn products(&self) -> &'static [MockProduct] {
        &PRODUCTS
    }

    pub fn find(&self, product_id: &str) -> Option<&'static MockProduct> {
        PRODUCTS.iter().find(|p| p.id == product_id)
    }

    pub fn is_cancelled(&self, booking_id: &str) -> bool {
        self.cancelled
            .lock()
            .expect("cancelled set lock")
            .contains(booking_id)
    }

    pub fn mark_cancelled(&self, booking_id: &str) {
        self.cancelled
            .lock()
            .expect("cancelled set lock")
            .insert(booking_id.to_string());
    }
}
