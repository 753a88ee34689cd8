//! Product catalog probes.

use crate::domain::{Product, ProtocolVersion, TestResult, ORDER_DATA_FIELDS, VISITOR_DATA_FIELDS};
use crate::engine::catalog::get_catalog;
use crate::engine::client::ApiResponse;
use crate::engine::{ProbeContext, ProbeError};
use crate::probes::{probe, Probe, ProbeResult};

/// Get product catalog. On v2, additionally flag products that demand
/// extra order/visitor data: requiring it is legal but should only be done
/// when fulfillment genuinely needs it.
async fn get_products(ctx: &ProbeContext) -> ProbeResult {
    let (_, products) = get_catalog(ctx, None).await?;
    if ctx.version == ProtocolVersion::V1 {
        return Ok(TestResult::ok());
    }
    for product in &products {
        if !product.required_order_data.is_empty() || !product.required_visitor_data.is_empty() {
            return Ok(TestResult::warning(
                "Note that the main booker's name, email address and phone number are sent \
                 with each reservation. Requiring ADDITIONAL customer data either at the order \
                 level (required_order_data) and/or for each individual travel group member \
                 (required_visitor_data) should be done only if this is a hard requirement for \
                 the fulfillment or visitor entrance process.",
            ));
        }
    }
    Ok(TestResult::ok())
}

/// Declared required fields must come from the fixed vocabulary.
async fn required_data_vocabulary(ctx: &ProbeContext) -> ProbeResult {
    let (raw, products) = get_catalog(ctx, None).await?;
    for product in &products {
        check_vocabulary(&raw, product, &product.required_order_data, &ORDER_DATA_FIELDS,
            "required_order_data")?;
        check_vocabulary(&raw, product, &product.required_visitor_data, &VISITOR_DATA_FIELDS,
            "required_visitor_data")?;
    }
    Ok(TestResult::ok())
}

fn check_vocabulary(
    raw: &ApiResponse,
    product: &Product,
    declared: &[String],
    allowed: &[&str],
    field: &str,
) -> Result<(), ProbeError> {
    for entry in declared {
        if !allowed.contains(&entry.as_str()) {
            return Err(ProbeError::protocol_with(
                format!(
                    "Product {} declares unknown {field} value \"{entry}\". \
                     Allowed values: {}",
                    product.id,
                    allowed.join(", ")
                ),
                raw.capture(),
            ));
        }
    }
    Ok(())
}

fn check_filter(
    raw: &ApiResponse,
    products: &[Product],
    use_timeslots: bool,
) -> Result<(), ProbeError> {
    for product in products {
        if product.use_timeslots != use_timeslots {
            return Err(ProbeError::assertion_with(
                format!(
                    "Product {} with non matching use_timeslots returned",
                    product.id
                ),
                raw.capture(),
            ));
        }
    }
    Ok(())
}

/// Get product catalog with use_timeslots=true query filter.
async fn timeslot_products_filter(ctx: &ProbeContext) -> ProbeResult {
    let (raw, products) = get_catalog(ctx, Some(true)).await?;
    check_filter(&raw, &products, true)?;
    Ok(TestResult::ok())
}

/// Get product catalog with use_timeslots=false query filter.
async fn no_timeslot_products_filter(ctx: &ProbeContext) -> ProbeResult {
    let (raw, products) = get_catalog(ctx, Some(false)).await?;
    check_filter(&raw, &products, false)?;
    Ok(TestResult::ok())
}

pub fn probes(version: ProtocolVersion) -> Vec<Probe> {
    let mut probes = vec![
        probe!("Get product catalog", get_products),
        probe!(
            "Get product catalog with use_timeslots=True query filter",
            timeslot_products_filter
        ),
        probe!(
            "Get product catalog with use_timeslots=False query filter",
            no_timeslot_products_filter
        ),
    ];
    if version == ProtocolVersion::V2 {
        probes.push(probe!(
            "Checking required order and visitor data vocabulary",
            required_data_vocabulary
        ));
    }
    probes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> ApiResponse {
        ApiResponse {
            url: "http://localhost/v2/products".to_string(),
            status: 200,
            headers: Vec::new(),
            body: String::new(),
            payload: None,
        }
    }

    fn product(id: &str, use_timeslots: bool) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            use_timeslots,
            is_refundable: true,
            cutoff_time: 0,
            provides_pricing: false,
            required_order_data: Vec::new(),
            required_visitor_data: Vec::new(),
        }
    }

    #[test]
    fn filter_mismatch_is_detected() {
        let products = vec![product("A300-FX", true), product("A500-FX", false)];
        assert!(check_filter(&raw(), &products, true).is_err());
        assert!(check_filter(&raw(), &products[..1], true).is_ok());
    }

    #[test]
    fn unknown_vocabulary_entry_fails() {
        let mut p = product("A500-FX", false);
        p.required_order_data = vec!["shoe_size".to_string()];
        let err = check_vocabulary(
            &raw(),
            &p,
            &p.required_order_data,
            &ORDER_DATA_FIELDS,
            "required_order_data",
        )
        .unwrap_err();
        assert!(err.to_string().contains("shoe_size"), "{err}");
    }

    #[test]
    fn known_vocabulary_entries_pass() {
        let mut p = product("A500-FX", false);
        p.required_visitor_data = vec!["email".to_string(), "date_of_birth".to_string()];
        check_vocabulary(
            &raw(),
            &p,
            &p.required_visitor_data,
            &VISITOR_DATA_FIELDS,
            "required_visitor_data",
        )
        .expect("valid vocabulary");
    }
}
