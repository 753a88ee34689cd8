//! Shared probe bodies for the availability endpoint families. Each family
//! module wires these up with its own titles and endpoint name.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::domain::{DaySlot, Severity, TestResult};
use crate::engine::catalog::get_product;
use crate::engine::client::{call, ApiResponse, API_KEY_HEADER};
use crate::engine::decode::{
    decode_api_error, decode_availability_v2, decode_daily_availability, decode_daily_variants,
    decode_timeslots,
};
use crate::engine::errors::{check_api_error, ExpectedError};
use crate::engine::{ProbeContext, ProbeError};
use crate::probes::ProbeResult;

/// A rolling window holding more distinct variant ids than this is
/// suspicious but not necessarily wrong, so it only warns.
pub const MAX_UNIQUE_VARIANTS_PER_WINDOW: usize = 20;
pub const VARIANT_WINDOW_DAYS: usize = 7;

pub const FORBIDDEN_BODY: &str = "Forbidden - Missing or incorrect API key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityFamily {
    Dates,
    Variants,
    Timeslots,
    Unified,
}

impl AvailabilityFamily {
    pub fn endpoint(&self) -> &'static str {
        match self {
            AvailabilityFamily::Dates => "dates",
            AvailabilityFamily::Variants => "variants",
            AvailabilityFamily::Timeslots => "timeslots",
            AvailabilityFamily::Unified => "availability",
        }
    }

    fn decode(
        &self,
        raw: &ApiResponse,
        value: Option<&Value>,
    ) -> Result<Vec<DaySlot>, ProbeError> {
        match self {
            AvailabilityFamily::Dates => Ok(decode_daily_availability(raw, value)?
                .iter()
                .map(|day| DaySlot {
                    date: day.date,
                    timeslot: None,
                    available_tickets: day.max_tickets,
                    variants: Vec::new(),
                })
                .collect()),
            AvailabilityFamily::Variants => Ok(decode_daily_variants(raw, value)?
                .iter()
                .map(DaySlot::from_daily_variants)
                .collect()),
            AvailabilityFamily::Timeslots => Ok(decode_timeslots(raw, value)?
                .iter()
                .map(DaySlot::from_timeslot)
                .collect()),
            AvailabilityFamily::Unified => decode_availability_v2(raw, value),
        }
    }
}

fn date_params(start: chrono::NaiveDate, end: chrono::NaiveDate) -> [(&'static str, String); 2] {
    [
        ("start", start.format("%Y-%m-%d").to_string()),
        ("end", end.format("%Y-%m-%d").to_string()),
    ]
}

async fn fetch_days(
    ctx: &ProbeContext,
    family: AvailabilityFamily,
    days_ahead: i64,
) -> Result<(Vec<DaySlot>, ApiResponse), ProbeError> {
    let start = Utc::now().date_naive();
    let end = start + Duration::days(days_ahead);
    let url = ctx.product_url(family.endpoint());
    let (raw, decoded) = call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::GET,
        &date_params(start, end),
        None,
        None,
    )
    .await?;
    let days = family.decode(&raw, decoded.as_ref())?;
    Ok((days, raw))
}

/// Checking response format.
pub async fn response_format(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    fetch_days(ctx, family, 0).await?;
    Ok(TestResult::ok())
}

/// Checking for any availability in the next 30 days.
pub async fn next_30_days(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    let (days, raw) = fetch_days(ctx, family, 30).await?;
    ensure_open_tickets(&days, &raw)?;
    Ok(TestResult::ok())
}

fn ensure_open_tickets(days: &[DaySlot], raw: &ApiResponse) -> Result<(), ProbeError> {
    let total: i64 = days.iter().map(|day| day.available_tickets).sum();
    if total <= 0 {
        return Err(ProbeError::assertion_with(
            "There is no availability for next 30 days",
            raw.capture(),
        ));
    }
    Ok(())
}

/// Availability plus the variant identity invariants: a variant name must
/// always resolve to the same id, and the number of distinct ids per
/// rolling window should stay reasonable.
pub async fn next_30_days_with_variants(
    ctx: &ProbeContext,
    family: AvailabilityFamily,
) -> ProbeResult {
    let (days, raw) = fetch_days(ctx, family, 30).await?;
    ensure_open_tickets(&days, &raw)?;
    check_variant_identity(&days, &raw)
}

/// A name that resolves to two different ids is a hard failure; an
/// implausibly large id churn per window is only flagged.
fn check_variant_identity(days: &[DaySlot], raw: &ApiResponse) -> ProbeResult {
    let mut name_to_id: HashMap<&str, &str> = HashMap::new();
    let mut window_ids: HashSet<&str> = HashSet::new();
    let mut window_len = 0usize;
    for day in days {
        window_len += 1;
        for variant in &day.variants {
            match name_to_id.get(variant.name.as_str()) {
                Some(known) if *known != variant.id => {
                    return Err(ProbeError::assertion_with(
                        format!("Variant {} should always have the same ID.", variant.name),
                        raw.capture(),
                    ));
                }
                Some(_) => {}
                None => {
                    name_to_id.insert(&variant.name, &variant.id);
                }
            }
            window_ids.insert(&variant.id);
        }
        if window_len == VARIANT_WINDOW_DAYS {
            window_len = 0;
            if window_ids.len() > MAX_UNIQUE_VARIANTS_PER_WINDOW {
                return Ok(TestResult::warning(format!(
                    "More than {MAX_UNIQUE_VARIANTS_PER_WINDOW} unique variants were found in a \
                     timespan of {VARIANT_WINDOW_DAYS} days. Make sure that this is not an error. \
                     Variants should not be unique for each day."
                )));
            }
            window_ids.clear();
        }
    }
    Ok(TestResult::ok())
}

/// A product offering exactly one timeslot per day at a constant time
/// should probably be modeled as a non-timeslot product.
pub async fn single_timeslot_heuristic(ctx: &ProbeContext) -> ProbeResult {
    let start = Utc::now().date_naive();
    let end = start + Duration::days(30);
    let url = ctx.product_url("timeslots");
    let (raw, decoded) = call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::GET,
        &date_params(start, end),
        None,
        None,
    )
    .await?;
    let timeslots = decode_timeslots(&raw, decoded.as_ref())?;

    let dates: Vec<_> = timeslots.iter().map(|t| t.date).collect();
    let unique_dates: HashSet<_> = dates.iter().collect();
    if unique_dates.len() == dates.len() && !timeslots.is_empty() {
        let unique_times: HashSet<String> = timeslots
            .iter()
            .map(|t| format!("{}-{}", t.start, t.end))
            .collect();
        if unique_times.len() == 1 {
            return Ok(TestResult::warning(
                "If a product contains only a single timeslot at the same time every day, \
                 then please implement it as a non-timesloted product",
            )
            .with_response(raw.capture()));
        }
    }
    Ok(TestResult::ok())
}

/// The same date+start+end must never appear twice.
pub async fn duplicate_timeslots(ctx: &ProbeContext) -> ProbeResult {
    let start = Utc::now().date_naive();
    let end = start + Duration::days(30);
    let url = ctx.product_url("timeslots");
    let (raw, decoded) = call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::GET,
        &date_params(start, end),
        None,
        None,
    )
    .await?;
    let timeslots = decode_timeslots(&raw, decoded.as_ref())?;

    let unique: HashSet<String> = timeslots
        .iter()
        .map(|t| format!("{}-{}-{}", t.date, t.start, t.end))
        .collect();
    if unique.len() != timeslots.len() {
        return Err(ProbeError::assertion_with(
            "Timeslots cannot be duplicated",
            raw.capture(),
        ));
    }
    Ok(TestResult::ok())
}

async fn expect_forbidden(
    ctx: &ProbeContext,
    family: AvailabilityFamily,
    headers: Vec<(String, String)>,
) -> ProbeResult {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let url = ctx.product_url(family.endpoint());
    let (raw, _) = call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::GET,
        &date_params(tomorrow, tomorrow),
        None,
        Some(&headers),
    )
    .await?;
    check_forbidden(&raw)
}

pub fn check_forbidden(raw: &ApiResponse) -> ProbeResult {
    if raw.status != 403 {
        return Err(ProbeError::protocol_with(
            format!(
                "Incorrect status code \"{}\" when calling the API without the API-Key. \
                 Expected status code: \"403\".",
                raw.status
            ),
            raw.capture(),
        ));
    }
    if raw.body != FORBIDDEN_BODY {
        return Ok(TestResult::warning(format!(
            "Incorrect text message \"{}\". Expected message: \"{FORBIDDEN_BODY}\".",
            raw.body
        ))
        .with_response(raw.capture()));
    }
    Ok(TestResult::ok())
}

/// Request without API-Key.
pub async fn missing_api_key(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    expect_forbidden(ctx, family, Vec::new()).await
}

/// Request with incorrect API-Key.
pub async fn incorrect_api_key(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    expect_forbidden(
        ctx,
        family,
        vec![(
            API_KEY_HEADER.to_string(),
            "NON-EXISTING-API-KEY".to_string(),
        )],
    )
    .await
}

async fn expect_error_for_params(
    ctx: &ProbeContext,
    url: &str,
    params: &[(&str, String)],
    expected: &ExpectedError,
) -> ProbeResult {
    let (raw, decoded) = call(
        &ctx.client,
        url,
        &ctx.api_key,
        Method::GET,
        params,
        None,
        None,
    )
    .await?;
    let api_error = decode_api_error(&raw, decoded.as_ref())?;
    check_api_error(&raw, &api_error, expected)
}

fn merge_warnings(results: Vec<TestResult>) -> ProbeResult {
    let warnings: Vec<String> = results
        .iter()
        .filter(|r| r.severity == Severity::Warning)
        .filter_map(|r| r.message.clone())
        .collect();
    if warnings.is_empty() {
        Ok(TestResult::ok())
    } else {
        Ok(TestResult::warning(warnings.join("\n ")))
    }
}

/// Testing missing argument errors: drop `end`, then `start`, then both.
pub async fn missing_argument_error(
    ctx: &ProbeContext,
    family: AvailabilityFamily,
) -> ProbeResult {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let url = ctx.product_url(family.endpoint());
    let mut results = Vec::new();

    let cases: [(&str, Vec<(&str, String)>); 3] = [
        (
            "end",
            vec![("start", tomorrow.format("%Y-%m-%d").to_string())],
        ),
        (
            "start",
            vec![("end", tomorrow.format("%Y-%m-%d").to_string())],
        ),
        ("start", Vec::new()),
    ];
    for (missing, params) in cases {
        let expected = ExpectedError::new(
            1000,
            "Missing argument",
            format!("Required argument \"{missing}\" was not found"),
        );
        results.push(expect_error_for_params(ctx, &url, &params, &expected).await?);
    }
    merge_warnings(results)
}

/// Testing availability for non existing product.
pub async fn non_existing_product(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let url = ctx.product_url_for("NON-EXISTING-PRODUCT-ID", family.endpoint());
    let expected = ExpectedError::new(
        1001,
        "Missing product",
        "Product with ID NON-EXISTING-PRODUCT-ID doesn't exist",
    );
    expect_error_for_params(ctx, &url, &date_params(tomorrow, tomorrow), &expected).await
}

/// Checking incorrect date format, argument by argument.
pub async fn incorrect_date_format(
    ctx: &ProbeContext,
    family: AvailabilityFamily,
) -> ProbeResult {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let bad = tomorrow.format("%d-%m-%Y").to_string();
    let good = tomorrow.format("%Y-%m-%d").to_string();
    let url = ctx.product_url(family.endpoint());
    let expected = ExpectedError::new(
        2000,
        ctx.version.malformed_date_label(),
        format!("Incorrect date format {bad}, please use the YYYY-MM-DD format"),
    );

    let mut results = Vec::new();
    for params in [
        [("start", bad.clone()), ("end", good.clone())],
        [("start", good.clone()), ("end", bad.clone())],
    ] {
        results.push(expect_error_for_params(ctx, &url, &params, &expected).await?);
    }
    merge_warnings(results)
}

/// Checking incorrect range error.
pub async fn end_before_start(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let next_week = tomorrow + Duration::days(7);
    let url = ctx.product_url(family.endpoint());
    let expected = ExpectedError::new(
        2001,
        "Incorrect date range",
        "The end date cannot be earlier than start date",
    );
    expect_error_for_params(ctx, &url, &date_params(next_week, tomorrow), &expected).await
}

/// Checking availability with start date from the past. The v1 families
/// demand the 2009 rejection; the unified family only checks that no past
/// date leaks into a successful response.
pub async fn past_start_date(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    let today = Utc::now().date_naive();
    let yesterday = today - Duration::days(1);
    let url = ctx.product_url(family.endpoint());
    let params = date_params(yesterday, today);

    if family != AvailabilityFamily::Unified {
        let expected = ExpectedError::new(2009, "Incorrect date", "Cannot use the past date");
        return expect_error_for_params(ctx, &url, &params, &expected).await;
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
    let Some(object) = decoded.as_ref().and_then(Value::as_object) else {
        return Ok(TestResult::ok());
    };
    let prefix = yesterday.format("%Y-%m-%d").to_string();
    if object.keys().any(|key| key.starts_with(&prefix)) {
        return Err(ProbeError::assertion_with(
            format!("Returned availability for date in the past: {prefix}"),
            raw.capture(),
        ));
    }
    Ok(TestResult::ok())
}

/// Checking availability with huge date range. v1 requires the 2009
/// rejection; the unified contract leaves the behavior open, so the probe
/// only verifies the call does not break the transport contract.
pub async fn huge_date_range(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    let today = Utc::now().date_naive();
    let far = today + Duration::days(365 * 10);
    let url = ctx.product_url(family.endpoint());
    let params = date_params(today, far);

    if family != AvailabilityFamily::Unified {
        let expected = ExpectedError::new(2009, "Incorrect date", "Maximum date range is");
        return expect_error_for_params(ctx, &url, &params, &expected).await;
    }

    call(
        &ctx.client,
        &url,
        &ctx.api_key,
        Method::GET,
        &params,
        None,
        None,
    )
    .await?;
    Ok(TestResult::ok())
}

/// Testing methods that are not allowed on the GET-only routes.
pub async fn not_allowed_method(ctx: &ProbeContext, family: AvailabilityFamily) -> ProbeResult {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let url = ctx.product_url(family.endpoint());
    for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
        debug!(%method, %url, "probing disallowed method");
        let (raw, _) = call(
            &ctx.client,
            &url,
            &ctx.api_key,
            method.clone(),
            &date_params(tomorrow, tomorrow),
            None,
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

/// Requesting timeslot availability for a non-timeslot product must fail
/// with 1002; the reverse mismatch must fail with 1003.
pub async fn product_type_mismatch(
    ctx: &ProbeContext,
    family: AvailabilityFamily,
) -> ProbeResult {
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let (endpoint, expected) = match family {
        // The product under test is not timesloted, so the timeslot
        // endpoint must reject it.
        AvailabilityFamily::Variants => (
            "timeslots",
            ExpectedError::new(
                1002,
                "Timeslot product expected",
                format!(
                    "Requested timeslot availability for non timeslot product ID {}",
                    ctx.product_id
                ),
            ),
        ),
        AvailabilityFamily::Timeslots => (
            "variants",
            ExpectedError::new(
                1003,
                "Non-timeslot product expected",
                format!(
                    "Requested non timeslot availability for timeslot product ID {}",
                    ctx.product_id
                ),
            ),
        ),
        _ => return Ok(TestResult::ok()),
    };
    let url = ctx.product_url(endpoint);
    expect_error_for_params(ctx, &url, &date_params(tomorrow, tomorrow), &expected).await
}

/// When the catalog declares `provides_pricing`, every variant in the
/// availability response must carry a price.
pub async fn pricing_present(ctx: &ProbeContext) -> ProbeResult {
    let (_, product) = get_product(ctx).await?;
    if !product.provides_pricing {
        return Ok(TestResult::warning(
            "Skipping the test because the product does not provide pricing.",
        ));
    }

    let (days, raw) = fetch_days(ctx, AvailabilityFamily::Unified, 1).await?;
    for day in &days {
        for variant in &day.variants {
            if variant.price.is_none() {
                return Err(ProbeError::assertion_with(
                    format!(
                        "Product {} provides pricing but the availability does not include \
                         the price attribute for every variant.",
                        ctx.product_id
                    ),
                    raw.capture(),
                ));
            }
        }
    }
    Ok(TestResult::ok())
}
