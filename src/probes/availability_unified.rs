//! v2 `/availability` family: unified availability keyed by ISO datetime.

use crate::engine::ProbeContext;
use crate::probes::availability::{self, AvailabilityFamily};
use crate::probes::{probe, Probe, ProbeResult};

const FAMILY: AvailabilityFamily = AvailabilityFamily::Unified;

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

async fn pricing_present(ctx: &ProbeContext) -> ProbeResult {
    availability::pricing_present(ctx).await
}

pub fn probes() -> Vec<Probe> {
    vec![
        probe!("Checking response format", response_format),
        probe!("Checking availability for the next 30 days", next_30_days),
        probe!("Request without API-Key", missing_api_key),
        probe!("Request with incorrect API-Key", incorrect_api_key),
        probe!("Testing missing argument errors", missing_argument_error),
        probe!(
            "Testing availability for non existing product",
            non_existing_product
        ),
        probe!("Checking incorrect date format", incorrect_date_format),
        probe!("Checking incorrect range error", end_before_start),
        probe!("Checking past start date", past_start_date),
        probe!("Checking huge date range", huge_date_range),
        probe!(
            "Testing methods that are not allowed",
            not_allowed_method
        ),
        probe!(
            "Testing optional price attribute in availability",
            pricing_present
        ),
    ]
}
