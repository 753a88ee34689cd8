//! Endpoint business logic for the mock supplier, v1 and v2.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Map, Value};

use crate::domain::ProtocolVersion;
use crate::mock::availability::{availability_for, hash_number, timeslot_end, GeneratedDay, TIMESLOTS};
use crate::mock::http::{HttpRequest, HttpResponse};
use crate::mock::repo::{MockProduct, Repository};
use crate::mock::token::{BookingToken, ReservationToken};

pub const FORBIDDEN_BODY: &str = "Forbidden - Missing or incorrect API key";
const MAX_RANGE_MONTHS: u32 = 6;
const RESERVATION_HOLD_MINUTES: i64 = 30;
const BARCODE_DIGITS: usize = 10;

#[derive(Debug)]
struct BadRequest {
    error_code: i64,
    error: &'static str,
    message: String,
}

impl BadRequest {
    fn new(error_code: i64, error: &'static str, message: impl Into<String>) -> Self {
        BadRequest {
            error_code,
            error,
            message: message.into(),
        }
    }

    fn response(&self) -> HttpResponse {
        HttpResponse::json(
            400,
            &json!({
                "error_code": self.error_code,
                "error": self.error,
                "message": self.message,
            }),
        )
    }
}

type RouteResult = Result<HttpResponse, BadRequest>;

pub struct Router {
    repo: Repository,
    api_key: String,
}

impl Router {
    pub fn new(api_key: impl Into<String>) -> Self {
        Router {
            repo: Repository::default(),
            api_key: api_key.into(),
        }
    }

    pub fn handle(&self, req: &HttpRequest) -> HttpResponse {
        let path = req.path.trim_matches('/').to_string();
        let segments: Vec<&str> = path.split('/').collect();
        let version = match segments.first() {
            Some(&"v1") => ProtocolVersion::V1,
            Some(&"v2") => ProtocolVersion::V2,
            _ => return HttpResponse::text(404, "Not Found"),
        };

        // Method gate, then auth gate, then the route body; business-rule
        // errors become the 400 contract shape.
        let rest: &[&str] = &segments[1..];
        let (allowed_method, route) = match *rest {
            ["products"] => ("GET", Route::Catalog),
            ["products", id, "reservation"] => ("POST", Route::Reservation(id)),
            ["products", id, endpoint @ ("dates" | "variants" | "timeslots")]
                if version == ProtocolVersion::V1 =>
            {
                ("GET", Route::AvailabilityV1(id, endpoint))
            }
            ["products", id, "availability"] if version == ProtocolVersion::V2 => {
                ("GET", Route::AvailabilityV2(id))
            }
            ["booking"] => ("POST", Route::Booking),
            ["booking", id] => ("DELETE", Route::Cancel(id)),
            _ => return HttpResponse::text(404, "Not Found"),
        };

        if req.method != allowed_method {
            return HttpResponse::text(
                405,
                format!(
                    "Method Not Allowed - Incorrect method was used ({})",
                    req.method
                ),
            );
        }
        if req.header("API-Key") != Some(self.api_key.as_str()) {
            return HttpResponse::text(403, FORBIDDEN_BODY);
        }

        let outcome = match route {
            Route::Catalog => self.catalog(version, req),
            Route::AvailabilityV1(id, endpoint) => self.availability_v1(id, endpoint, req),
            Route::AvailabilityV2(id) => self.availability_v2(id, req),
            Route::Reservation(id) => self.reservation(version, id, req),
            Route::Booking => self.booking(version, req),
            Route::Cancel(id) => self.cancel(id),
        };
        outcome.unwrap_or_else(|err| err.response())
    }

    fn catalog(&self, version: ProtocolVersion, req: &HttpRequest) -> RouteResult {
        let filter = req
            .query
            .get("use_timeslots")
            .map(|value| value.eq_ignore_ascii_case("true"));
        let products: Vec<Value> = self
            .repo
            .products()
            .iter()
            .filter(|p| filter.is_none_or(|wanted| p.use_timeslots == wanted))
            .map(|p| p.to_json(version))
            .collect();
        Ok(HttpResponse::json(200, &Value::Array(products)))
    }

    fn find_product(&self, product_id: &str) -> Result<&'static MockProduct, BadRequest> {
        self.repo.find(product_id).ok_or_else(|| {
            BadRequest::new(
                1001,
                "Missing product",
                format!("Product with ID {product_id} doesn't exist"),
            )
        })
    }

    fn availability_v1(&self, product_id: &str, endpoint: &str, req: &HttpRequest) -> RouteResult {
        let version = ProtocolVersion::V1;
        let (start, end) = validated_range(req, version)?;
        let product = self.find_product(product_id)?;

        match endpoint {
            "dates" => {
                let days: Vec<Value> = iter_days(start, end)
                    .map(|day| {
                        let generated = availability_for(day);
                        json!({
                            "date": day.format("%Y-%m-%d").to_string(),
                            "max_tickets": aggregate(product, &generated),
                        })
                    })
                    .collect();
                Ok(HttpResponse::json(200, &Value::Array(days)))
            }
            "variants" => {
                if product.use_timeslots {
                    return Err(BadRequest::new(
                        1003,
                        "Non-timeslot product expected",
                        format!(
                            "Requested non timeslot availability for timeslot product ID {product_id}"
                        ),
                    ));
                }
                let days: Vec<Value> = iter_days(start, end)
                    .map(|day| {
                        let generated = availability_for(day);
                        json!({
                            "date": day.format("%Y-%m-%d").to_string(),
                            "max_tickets": aggregate(product, &generated),
                            "variants": variants_v1(&generated),
                        })
                    })
                    .collect();
                Ok(HttpResponse::json(200, &Value::Array(days)))
            }
            "timeslots" => {
                if !product.use_timeslots {
                    return Err(BadRequest::new(
                        1002,
                        "Timeslot product expected",
                        format!(
                            "Requested timeslot availability for non timeslot product ID {product_id}"
                        ),
                    ));
                }
                let mut slots = Vec::new();
                for day in iter_days(start, end) {
                    let generated = availability_for(day);
                    for slot_start in TIMESLOTS {
                        slots.push(json!({
                            "date": day.format("%Y-%m-%d").to_string(),
                            "start": slot_start,
                            "end": timeslot_end(slot_start),
                            "max_tickets": aggregate(product, &generated),
                            "variants": variants_v1(&generated),
                        }));
                    }
                }
                Ok(HttpResponse::json(200, &Value::Array(slots)))
            }
            _ => Ok(HttpResponse::text(404, "Not Found")),
        }
    }

    fn availability_v2(&self, product_id: &str, req: &HttpRequest) -> RouteResult {
        let version = ProtocolVersion::V2;
        let (start, end) = validated_range(req, version)?;
        let product = self.find_product(product_id)?;

        let mut entries = Map::new();
        for day in iter_days(start, end) {
            let generated = availability_for(day);
            let times: &[&str] = if product.use_timeslots {
                &TIMESLOTS
            } else {
                &["00:00"]
            };
            for time in times {
                let key = format!("{}T{time}", day.format("%Y-%m-%d"));
                entries.insert(
                    key,
                    json!({
                        "available_tickets": aggregate(product, &generated),
                        "variants": variants_v2(product, &generated),
                    }),
                );
            }
        }
        Ok(HttpResponse::json(200, &Value::Object(entries)))
    }

    fn reservation(&self, version: ProtocolVersion, product_id: &str, req: &HttpRequest) -> RouteResult {
        let body = req.json().unwrap_or_else(|| json!({}));
        let product = self.find_product(product_id)?;
        let slot = reservation_slot(version, &body)?;
        let today = Utc::now().date_naive();
        if slot.date() < today {
            return Err(BadRequest::new(
                2009,
                "Incorrect date",
                "Cannot use the past date",
            ));
        }
        if slot.date() > end_of_range(today) {
            return Err(BadRequest::new(
                2009,
                "Incorrect date",
                format!(
                    "This date is too far ahead in the future. You can book max {MAX_RANGE_MONTHS} months ahead."
                ),
            ));
        }

        let tickets = body
            .get("tickets")
            .and_then(Value::as_array)
            .filter(|tickets| !tickets.is_empty())
            .ok_or_else(|| missing_argument("tickets"))?;
        if body
            .get("customer")
            .and_then(Value::as_object)
            .filter(|customer| !customer.is_empty())
            .is_none()
        {
            return Err(missing_argument("customer"));
        }

        let generated = availability_for(slot.date());
        let mut quantities = std::collections::BTreeMap::new();
        for ticket in tickets {
            let variant_id = ticket
                .get("variant_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let quantity = ticket.get("quantity").and_then(Value::as_i64).unwrap_or(0);
            let available = generated
                .variants
                .iter()
                .find(|v| v.id == variant_id)
                .map(|v| v.tickets)
                .unwrap_or(0);
            if quantity > available {
                return Err(BadRequest::new(
                    3000,
                    "Availability error",
                    format!(
                        "Quantity ({quantity}) is not available anymore for a given variant (id: {variant_id})"
                    ),
                ));
            }
            quantities.insert(variant_id, quantity);
        }

        let expires_at = Utc::now() + Duration::minutes(RESERVATION_HOLD_MINUTES);
        let token = ReservationToken {
            expires_at,
            quantities: quantities.clone(),
            product_id: product.id.to_string(),
            slot,
        };

        let mut response = json!({
            "reservation_id": token.encode(),
            "expires_at": expires_at.to_rfc3339(),
        });
        if version == ProtocolVersion::V2 && product.provides_pricing() {
            let mut unit_price = Map::new();
            for variant_id in quantities.keys() {
                unit_price.insert(variant_id.clone(), price_for(product, variant_id));
            }
            response["unit_price"] = Value::Object(unit_price);
        }
        Ok(HttpResponse::json(200, &response))
    }

    fn booking(&self, version: ProtocolVersion, req: &HttpRequest) -> RouteResult {
        let body = req.json().unwrap_or_else(|| json!({}));
        let reservation_id = body
            .get("reservation_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_argument("reservation_id"))?;

        let token = ReservationToken::decode(reservation_id).map_err(|_| {
            BadRequest::new(
                3002,
                "Incorrect reservation ID",
                "Given reservation ID is incorrect",
            )
        })?;
        let now = Utc::now();
        if now > token.expires_at {
            let minutes_ago =
                ((now - token.expires_at).num_seconds() as f64 / 60.0).round() as i64;
            return Err(BadRequest::new(
                3001,
                "Reservation expired",
                format!("Your reservation has expired {minutes_ago} minutes ago"),
            ));
        }
        let product = self.repo.find(&token.product_id).ok_or_else(|| {
            BadRequest::new(
                3002,
                "Incorrect reservation ID",
                "Given reservation ID is incorrect",
            )
        })?;

        let mut tickets = Map::new();
        for (variant_id, quantity) in &token.quantities {
            let codes: Vec<Value> = (0..*quantity)
                .map(|i| {
                    let code =
                        hash_number(&format!("{reservation_id}{variant_id}{i}"), BARCODE_DIGITS)
                            .to_string();
                    if product.ticket_format == "PDF" {
                        json!(BASE64.encode(code))
                    } else {
                        json!(code)
                    }
                })
                .collect();
            tickets.insert(variant_id.clone(), Value::Array(codes));
        }

        let booking_token = BookingToken {
            slot: token.slot,
            product_id: product.id.to_string(),
            issued_at: now,
        };
        let scope_field = match version {
            ProtocolVersion::V1 => "barcode_position",
            ProtocolVersion::V2 => "barcode_scope",
        };
        Ok(HttpResponse::json(
            200,
            &json!({
                "booking_id": booking_token.encode(),
                "barcode_format": product.ticket_format,
                scope_field: "ticket",
                "tickets": tickets,
            }),
        ))
    }

    fn cancel(&self, booking_id: &str) -> RouteResult {
        let token = BookingToken::decode(booking_id).map_err(|_| missing_booking(booking_id))?;
        let product = self
            .repo
            .find(&token.product_id)
            .ok_or_else(|| missing_booking(booking_id))?;

        if !product.is_refundable {
            return Err(BadRequest::new(
                3004,
                "Cancellation not possible",
                "The booking cannot be cancelled, the product does not allow cancellations",
            ));
        }
        if self.repo.is_cancelled(booking_id) {
            return Err(BadRequest::new(
                3003,
                "Already cancelled",
                format!("The booking with ID {booking_id} was already cancelled"),
            ));
        }

        let now = Utc::now().naive_utc();
        if token.slot < now {
            return Err(BadRequest::new(
                2009,
                "Incorrect date",
                "Cannot use the past date",
            ));
        }
        let hours_in_advance = ((token.slot - now).num_seconds() as f64 / 3600.0).round() as i64;
        if product.cutoff_time != 0 && product.cutoff_time > hours_in_advance {
            return Err(BadRequest::new(
                2009,
                "Incorrect date",
                format!(
                    "The booking can only be cancelled {} hours in advance",
                    product.cutoff_time
                ),
            ));
        }

        self.repo.mark_cancelled(booking_id);
        Ok(HttpResponse::no_content())
    }
}

enum Route<'a> {
    Catalog,
    AvailabilityV1(&'a str, &'a str),
    AvailabilityV2(&'a str),
    Reservation(&'a str),
    Booking,
    Cancel(&'a str),
}

fn missing_argument(name: &str) -> BadRequest {
    BadRequest::new(
        1000,
        "Missing argument",
        format!("Required argument \"{name}\" was not found"),
    )
}

fn missing_booking(booking_id: &str) -> BadRequest {
    BadRequest::new(
        1004,
        "Missing booking",
        format!("Booking with ID {booking_id} doesn't exist"),
    )
}

fn get_date_param(
    req: &HttpRequest,
    name: &str,
    version: ProtocolVersion,
) -> Result<NaiveDate, BadRequest> {
    let raw = req
        .query
        .get(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| missing_argument(name))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        BadRequest::new(
            2000,
            version.malformed_date_label(),
            format!("Incorrect date format {raw}, please use the YYYY-MM-DD format"),
        )
    })
}

fn end_of_range(start: NaiveDate) -> NaiveDate {
    start
        .checked_add_months(Months::new(MAX_RANGE_MONTHS))
        .unwrap_or(start)
}

fn validated_range(
    req: &HttpRequest,
    version: ProtocolVersion,
) -> Result<(NaiveDate, NaiveDate), BadRequest> {
    let start = get_date_param(req, "start", version)?;
    let end = get_date_param(req, "end", version)?;
    if start > end {
        return Err(BadRequest::new(
            2001,
            "Incorrect date range",
            "The end date cannot be earlier than start date",
        ));
    }
    if start < Utc::now().date_naive() {
        return Err(BadRequest::new(
            2009,
            "Incorrect date",
            "Cannot use the past date",
        ));
    }
    if end > end_of_range(start) {
        return Err(BadRequest::new(
            2009,
            "Incorrect date",
            format!("Maximum date range is {MAX_RANGE_MONTHS} months"),
        ));
    }
    Ok((start, end))
}

fn reservation_slot(version: ProtocolVersion, body: &Value) -> Result<NaiveDateTime, BadRequest> {
    match version {
        ProtocolVersion::V1 => {
            let raw = body
                .get("date")
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| missing_argument("date"))?;
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                BadRequest::new(
                    2000,
                    version.malformed_date_label(),
                    format!("Incorrect date format {raw}, please use the YYYY-MM-DD format"),
                )
            })?;
            let time = body
                .get("timeslot")
                .and_then(Value::as_str)
                .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
                .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight"));
            Ok(date.and_time(time))
        }
        ProtocolVersion::V2 => {
            let raw = body
                .get("datetime")
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| missing_argument("datetime"))?;
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M").map_err(|_| {
                BadRequest::new(
                    2000,
                    version.malformed_date_label(),
                    format!("Incorrect date format {raw}, please use the YYYY-MM-DDTHH:MM format"),
                )
            })
        }
    }
}

fn iter_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

fn aggregate(product: &MockProduct, generated: &GeneratedDay) -> i64 {
    if product.aggregate_as_sum {
        generated.max_tickets
    } else {
        generated
            .variants
            .iter()
            .map(|v| v.tickets)
            .max()
            .unwrap_or(0)
    }
}

fn variants_v1(generated: &GeneratedDay) -> Vec<Value> {
    generated
        .variants
        .iter()
        .map(|v| {
            json!({
                "id": v.id,
                "name": v.name,
                "max_tickets": v.tickets,
            })
        })
        .collect()
}

fn variants_v2(product: &MockProduct, generated: &GeneratedDay) -> Vec<Value> {
    generated
        .variants
        .iter()
        .map(|v| {
            let mut variant = json!({
                "id": v.id,
                "name": v.name,
                "available_tickets": v.tickets,
            });
            if product.provides_pricing() {
                variant["price"] = price_for(product, &v.id);
            }
            variant
        })
        .collect()
}

fn price_for(product: &MockProduct, variant_id: &str) -> Value {
    let index: i64 = variant_id.parse().unwrap_or(1);
    json!({
        "currency": product.currency.unwrap_or("EUR"),
        "amount": format!("{}.00", 5 + index * 5),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};
    use std::collections::HashMap;

    fn request(
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        api_key: Option<&str>,
        body: Option<Value>,
    ) -> HttpRequest {
        let mut headers = HashMap::new();
        if let Some(key) = api_key {
            headers.insert("api-key".to_string(), key.to_string());
        }
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            headers,
            body: body.map(|v| v.to_string().into_bytes()).unwrap_or_default(),
        }
    }

    fn router() -> Router {
        Router::new("secret")
    }

    fn body_json(response: &HttpResponse) -> Value {
        serde_json::from_str(&response.body).expect("json body")
    }

    /// First upcoming non-Sunday day (tomorrow onwards) with open tickets
    /// on every variant.
    fn bookable_date() -> NaiveDate {
        let mut day = Utc::now().date_naive() + Duration::days(1);
        loop {
            let generated = availability_for(day);
            if day.weekday() != Weekday::Sun
                && generated.variants.iter().all(|v| v.tickets >= 1)
                && !generated.variants.is_empty()
            {
                return day;
            }
            day += Duration::days(1);
        }
    }

    fn reserve(router: &Router, product_id: &str, date: NaiveDate) -> Value {
        let payload = json!({
            "datetime": format!("{}T00:00", date.format("%Y-%m-%d")),
            "tickets": [{"variant_id": "1", "quantity": 1}],
            "customer": {"first_name": "Jon", "last_name": "Snow"},
        });
        let response = router.handle(&request(
            "POST",
            &format!("/v2/products/{product_id}/reservation"),
            &[],
            Some("secret"),
            Some(payload),
        ));
        assert_eq!(response.status, 200, "{}", response.body);
        body_json(&response)
    }

    fn book(router: &Router, reservation_id: &str) -> Value {
        let response = router.handle(&request(
            "POST",
            "/v2/booking",
            &[],
            Some("secret"),
            Some(json!({"reservation_id": reservation_id})),
        ));
        assert_eq!(response.status, 200, "{}", response.body);
        body_json(&response)
    }

    #[test]
    fn missing_api_key_gets_exact_403_body() {
        let response = router().handle(&request("GET", "/v1/products", &[], None, None));
        assert_eq!(response.status, 403);
        assert_eq!(response.body, FORBIDDEN_BODY);
    }

    #[test]
    fn wrong_api_key_gets_exact_403_body() {
        let response = router().handle(&request("GET", "/v1/products", &[], Some("nope"), None));
        assert_eq!(response.status, 403);
        assert_eq!(response.body, FORBIDDEN_BODY);
    }

    #[test]
    fn disallowed_methods_get_405_on_every_route() {
        let router = router();
        let cases = [
            ("POST", "/v1/products"),
            ("DELETE", "/v1/products/A500-FX/variants"),
            ("PUT", "/v2/products/A500-FX/availability"),
            ("GET", "/v2/products/A500-FX/reservation"),
            ("PATCH", "/v2/booking"),
            ("POST", "/v2/booking/some-id"),
        ];
        for (method, path) in cases {
            let response = router.handle(&request(method, path, &[], Some("secret"), None));
            assert_eq!(response.status, 405, "{method} {path}");
            assert!(
                response.body.contains(method),
                "405 body names the method: {}",
                response.body
            );
        }
    }

    #[test]
    fn catalog_filter_matches_use_timeslots() {
        let router = router();
        let response = router.handle(&request(
            "GET",
            "/v2/products",
            &[("use_timeslots", "true")],
            Some("secret"),
            None,
        ));
        let products = body_json(&response);
        let products = products.as_array().expect("array");
        assert!(!products.is_empty());
        assert!(products.iter().all(|p| p["use_timeslots"] == json!(true)));
    }

    #[test]
    fn availability_rejects_bad_inputs_with_contract_errors() {
        let router = router();
        let today = Utc::now().date_naive();
        let tomorrow = (today + Duration::days(1)).format("%Y-%m-%d").to_string();
        let yesterday = (today - Duration::days(1)).format("%Y-%m-%d").to_string();
        let far = (today + Duration::days(365)).format("%Y-%m-%d").to_string();

        let cases: Vec<(Vec<(&str, &str)>, i64)> = vec![
            (vec![("start", tomorrow.as_str())], 1000),
            (vec![("end", tomorrow.as_str())], 1000),
            (
                vec![("start", "10-08-2026"), ("end", tomorrow.as_str())],
                2000,
            ),
            (vec![("start", far.as_str()), ("end", tomorrow.as_str())], 2001),
            (
                vec![("start", yesterday.as_str()), ("end", tomorrow.as_str())],
                2009,
            ),
            (vec![("start", tomorrow.as_str()), ("end", far.as_str())], 2009),
        ];
        for (params, expected_code) in cases {
            let response = router.handle(&request(
                "GET",
                "/v1/products/A500-FX/variants",
                &params,
                Some("secret"),
                None,
            ));
            assert_eq!(response.status, 400, "{params:?}");
            assert_eq!(
                body_json(&response)["error_code"],
                json!(expected_code),
                "{params:?}"
            );
        }
    }

    #[test]
    fn product_type_mismatches_use_1002_and_1003() {
        let router = router();
        let tomorrow = (Utc::now().date_naive() + Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        let params = [("start", tomorrow.as_str()), ("end", tomorrow.as_str())];

        let response = router.handle(&request(
            "GET",
            "/v1/products/A500-FX/timeslots",
            &params,
            Some("secret"),
            None,
        ));
        assert_eq!(body_json(&response)["error_code"], json!(1002));

        let response = router.handle(&request(
            "GET",
            "/v1/products/A300-FX/variants",
            &params,
            Some("secret"),
            None,
        ));
        assert_eq!(body_json(&response)["error_code"], json!(1003));
    }

    #[test]
    fn unknown_product_is_1001() {
        let router = router();
        let tomorrow = (Utc::now().date_naive() + Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        let response = router.handle(&request(
            "GET",
            "/v1/products/NON-EXISTING-PRODUCT-ID/dates",
            &[("start", tomorrow.as_str()), ("end", tomorrow.as_str())],
            Some("secret"),
            None,
        ));
        let body = body_json(&response);
        assert_eq!(body["error_code"], json!(1001));
        assert_eq!(
            body["message"],
            json!("Product with ID NON-EXISTING-PRODUCT-ID doesn't exist")
        );
    }

    #[test]
    fn reservation_reports_missing_arguments_in_order() {
        let router = router();
        let date = bookable_date();

        let response = router.handle(&request(
            "POST",
            "/v2/products/A500-FX/reservation",
            &[],
            Some("secret"),
            Some(json!({})),
        ));
        let body = body_json(&response);
        assert_eq!(body["error_code"], json!(1000));
        assert_eq!(
            body["message"],
            json!("Required argument \"datetime\" was not found")
        );

        let response = router.handle(&request(
            "POST",
            "/v2/products/A500-FX/reservation",
            &[],
            Some("secret"),
            Some(json!({"datetime": format!("{}T00:00", date.format("%Y-%m-%d"))})),
        ));
        assert_eq!(
            body_json(&response)["message"],
            json!("Required argument \"tickets\" was not found")
        );

        let response = router.handle(&request(
            "POST",
            "/v2/products/A500-FX/reservation",
            &[],
            Some("secret"),
            Some(json!({
                "datetime": format!("{}T00:00", date.format("%Y-%m-%d")),
                "tickets": [{"variant_id": "1", "quantity": 1}],
            })),
        ));
        assert_eq!(
            body_json(&response)["message"],
            json!("Required argument \"customer\" was not found")
        );
    }

    #[test]
    fn reservation_holds_for_thirty_minutes() {
        let router = router();
        let body = reserve(&router, "A500-FX", bookable_date());
        let expires_at = chrono::DateTime::parse_from_rfc3339(
            body["expires_at"].as_str().expect("expires_at"),
        )
        .expect("rfc3339");
        let held_for = expires_at.with_timezone(&Utc) - Utc::now();
        assert!(held_for > Duration::minutes(25));
        let token =
            ReservationToken::decode(body["reservation_id"].as_str().expect("id")).expect("token");
        assert_eq!(token.product_id, "A500-FX");
    }

    #[test]
    fn priced_product_reservation_echoes_unit_prices() {
        let router = router();
        let date = bookable_date();
        let payload = json!({
            "datetime": format!("{}T17:30", date.format("%Y-%m-%d")),
            "tickets": [{"variant_id": "1", "quantity": 1}],
            "customer": {"first_name": "Jon"},
        });
        let response = router.handle(&request(
            "POST",
            "/v2/products/A400-FX/reservation",
            &[],
            Some("secret"),
            Some(payload),
        ));
        assert_eq!(response.status, 200, "{}", response.body);
        let body = body_json(&response);
        assert_eq!(body["unit_price"]["1"]["currency"], json!("USD"));
        assert!(body["unit_price"]["1"]["amount"].as_str().is_some());
    }

    #[test]
    fn overbooking_a_variant_is_3000() {
        let router = router();
        let date = bookable_date();
        let payload = json!({
            "datetime": format!("{}T00:00", date.format("%Y-%m-%d")),
            "tickets": [{"variant_id": "1", "quantity": 10_000}],
            "customer": {"first_name": "Jon"},
        });
        let response = router.handle(&request(
            "POST",
            "/v2/products/A500-FX/reservation",
            &[],
            Some("secret"),
            Some(payload),
        ));
        assert_eq!(body_json(&response)["error_code"], json!(3000));
    }

    #[test]
    fn booking_with_garbage_reservation_id_is_3002() {
        let router = router();
        let response = router.handle(&request(
            "POST",
            "/v2/booking",
            &[],
            Some("secret"),
            Some(json!({"reservation_id": "Tk9OLUVYSVNUSU5HLUlECg!!"})),
        ));
        let body = body_json(&response);
        assert_eq!(body["error_code"], json!(3002));
        assert_eq!(body["message"], json!("Given reservation ID is incorrect"));
    }

    #[test]
    fn booking_an_expired_reservation_is_3001() {
        let router = router();
        let stale = ReservationToken {
            expires_at: Utc::now() - Duration::minutes(42),
            quantities: std::collections::BTreeMap::from([("1".to_string(), 1)]),
            product_id: "A500-FX".to_string(),
            slot: bookable_date().and_hms_opt(0, 0, 0).expect("midnight"),
        };
        let response = router.handle(&request(
            "POST",
            "/v2/booking",
            &[],
            Some("secret"),
            Some(json!({"reservation_id": stale.encode()})),
        ));
        let body = body_json(&response);
        assert_eq!(body["error_code"], json!(3001));
        assert!(
            body["message"]
                .as_str()
                .expect("message")
                .starts_with("Your reservation has expired"),
            "{body}"
        );
    }

    #[test]
    fn booking_issues_one_code_per_reserved_ticket() {
        let router = router();
        let reservation = reserve(&router, "A500-FX", bookable_date());
        let booking = book(&router, reservation["reservation_id"].as_str().expect("id"));
        assert_eq!(booking["barcode_format"], json!("CODE128"));
        assert_eq!(booking["barcode_scope"], json!("ticket"));
        assert_eq!(
            booking["tickets"]["1"].as_array().map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn pdf_product_issues_base64_ticket_codes() {
        let router = router();
        let reservation = reserve(&router, "A550-FX", bookable_date());
        let booking = book(&router, reservation["reservation_id"].as_str().expect("id"));
        assert_eq!(booking["barcode_format"], json!("PDF"));
        let code = booking["tickets"]["1"][0].as_str().expect("code");
        let decoded = BASE64.decode(code).expect("base64 code");
        assert_eq!(BASE64.encode(decoded), code);
    }

    #[test]
    fn cancellation_state_machine_end_to_end() {
        let router = router();
        let reservation = reserve(&router, "A500-FX", bookable_date());
        let booking = book(&router, reservation["reservation_id"].as_str().expect("id"));
        let booking_id = booking["booking_id"].as_str().expect("booking id");

        // first cancellation succeeds with 204
        let response = router.handle(&request(
            "DELETE",
            &format!("/v2/booking/{booking_id}"),
            &[],
            Some("secret"),
            None,
        ));
        assert_eq!(response.status, 204, "{}", response.body);

        // second cancellation of the same booking is 3003
        let response = router.handle(&request(
            "DELETE",
            &format!("/v2/booking/{booking_id}"),
            &[],
            Some("secret"),
            None,
        ));
        let body = body_json(&response);
        assert_eq!(body["error_code"], json!(3003));

        // cancelling an id that was never booked is 1004
        let response = router.handle(&request(
            "DELETE",
            "/v2/booking/I-DO-NOT-EXIST",
            &[],
            Some("secret"),
            None,
        ));
        assert_eq!(body_json(&response)["error_code"], json!(1004));
    }

    #[test]
    fn cancelling_a_non_refundable_booking_is_3004() {
        let router = router();
        let date = bookable_date();
        let payload = json!({
            "datetime": format!("{}T00:00", date.format("%Y-%m-%d")),
            "tickets": [{"variant_id": "1", "quantity": 1}],
            "customer": {"first_name": "Jon"},
        });
        let response = router.handle(&request(
            "POST",
            "/v2/products/A600-FX/reservation",
            &[],
            Some("secret"),
            Some(payload),
        ));
        assert_eq!(response.status, 200, "{}", response.body);
        let reservation = body_json(&response);
        let booking = book(&router, reservation["reservation_id"].as_str().expect("id"));
        let booking_id = booking["booking_id"].as_str().expect("booking id");

        let response = router.handle(&request(
            "DELETE",
            &format!("/v2/booking/{booking_id}"),
            &[],
            Some("secret"),
            None,
        ));
        assert_eq!(body_json(&response)["error_code"], json!(3004));
    }

    #[test]
    fn cancellation_inside_the_cutoff_window_is_2009() {
        let router = router();
        // A550-FX has a 10 hour cutoff; a booking for today at 00:00 is
        // either past or within the window, both of which map to 2009.
        let stale_slot = Utc::now().date_naive().and_hms_opt(0, 0, 0).expect("midnight");
        let token = BookingToken {
            slot: stale_slot,
            product_id: "A550-FX".to_string(),
            issued_at: Utc::now(),
        };
        let response = router.handle(&request(
            "DELETE",
            &format!("/v2/booking/{}", token.encode()),
            &[],
            Some("secret"),
            None,
        ));
        let body = body_json(&response);
        assert_eq!(body["error_code"], json!(2009));
    }

    #[test]
    fn v2_availability_is_keyed_by_datetime() {
        let router = router();
        let date = bookable_date();
        let date_str = date.format("%Y-%m-%d").to_string();
        let response = router.handle(&request(
            "GET",
            "/v2/products/A300-FX/availability",
            &[("start", date_str.as_str()), ("end", date_str.as_str())],
            Some("secret"),
            None,
        ));
        assert_eq!(response.status, 200);
        let body = body_json(&response);
        let object = body.as_object().expect("object");
        assert!(object.contains_key(&format!("{date_str}T17:30")));
        assert!(object.contains_key(&format!("{date_str}T19:30")));
    }
}
