//! v1 `/variants` family: per-day variant availability for non-timeslot
//! products.

use crate::engine::ProbeContext;
use crate::probes::availability::{self, AvailabilityFamily};
use crate::probes::{probe, Probe, ProbeResult};

const FAMILY: AvailabilityFamily = AvailabilityFamily::Variants;

async fn response_format(ctx: &ProbeContext) -> ProbeResult {
    availability::response_format(ctx, FAMILY).await
}

async fn next_30_days(ctx: &ProbeContext) -> ProbeResult {
    availability::next_30_days_with_variants(ctx, FAMILY).await
}

async fn missing_api_key(ctx: &ProbeContext) -> ProbeResult {
    availability::missing_api_key(ctx, FAMILY).await
}

async fn incorrect_api_key(ctx: &ProbeContext) -> ProbeResult {
    availability::incorrect_api_key(ctx, FAMILY).await
}

async fn missing_argument_error(ctx: &ProbeContext) -> ProbeResult {
    availability::missing_argument_error(ctx, FAMILY).await
}

async fn non_existing_product(ctx: &ProbeContext) -> ProbeResult {
    availability::non_existing_product(ctx, FAMILY).await
}

async fn incorrect_date_format(ctx: &ProbeContext) -> ProbeResult {
    availability::incorrect_date_format(ctx, FAMILY).await
}

async fn end_before_start(ctx: &ProbeContext) -> ProbeResult {
    availability::end_before_start(ctx, FAMILY).await
}

async fn past_start_date(ctx: &ProbeContext) -> ProbeResult {
    availability::past_start_date(ctx, FAMILY).await
}

async fn huge_date_range(ctx: &ProbeContext) -> ProbeResult {
    availability::huge_date_range(ctx, FAMILY).await
}

async fn not_allowed_method(ctx: &ProbeContext) -> ProbeResult {
    availability::not_allowed_method(ctx, FAMILY).await
}

async fn timeslot_endpoint_mismatch(ctx: &ProbeContext) -> ProbeResult {
    availability::product_type_mismatch(ctx, FAMILY).await
}

pub fn probes() -> Vec<Probe> {
    vec![
        probe!("[Variants] Checking response format", response_format),
        probe!(
            "[Variants] Checking availability for the next 30 days",
            next_30_days
        ),
        probe!("[Variants] Request without API-Key", missing_api_key),
        probe!(
            "[Variants] Request with incorrect API-Key",
            incorrect_api_key
        ),
        probe!(
            "[Variants] Testing missing argument errors",
            missing_argument_error
        ),
        probe!(
            "[Variants] Testing availability for non existing product",
            non_existing_product
        ),
        probe!(
            "[Variants] Checking incorrect date format",
            incorrect_date_format
        ),
        probe!("[Variants] Checking incorrect range error", end_before_start),
        probe!("[Variants] Checking past start date", past_start_date),
        probe!("[Variants] Checking huge date range", huge_date_range),
        probe!(
            "[Variants] Testing methods that are not allowed",
            not_allowed_method
        ),
        probe!(
            "[Variants] Testing timeslot endpoint on non-timeslot product",
            timeslot_endpoint_mismatch
        ),
    ]
}
