use reqwest::Method;

use crate::domain::Product;
use crate::engine::client::{call, ApiResponse};
use crate::engine::decode::decode_products;
use crate::engine::{ProbeContext, ProbeError};

/// Fetches and decodes the product catalog, optionally filtered by the
/// `use_timeslots` query parameter.
pub async fn get_catalog(
    ctx: &ProbeContext,
    use_timeslots: Option<bool>,
) -> Result<(ApiResponse, Vec<Product>), ProbeError> {
    let url = ctx.url("products");
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(filter) = use_timeslots {
        params.push(("use_timeslots", filter.to_string()));
    }
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
    let products = decode_products(ctx.version, &raw, decoded.as_ref())?;
    Ok((raw, products))
}

/// Looks up the product under test in the catalog.
pub async fn get_product(ctx: &ProbeContext) -> Result<(ApiResponse, Product), ProbeError> {
    let (raw, products) = get_catalog(ctx, None).await?;
    match products.into_iter().find(|p| p.id == ctx.product_id) {
        Some(product) => Ok((raw, product)),
        None => Err(ProbeError::assertion_with(
            format!("Product {} was not found in the catalog", ctx.product_id),
            raw.capture(),
        )),
    }
}
