use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use crate::domain::ExchangeCapture;
use crate::engine::ProbeError;

/// Header carrying the supplier API key on every authenticated call.
pub const API_KEY_HEADER: &str = "API-Key";

/// Raw side of one HTTP exchange, kept around for diagnostics. The decoded
/// JSON body travels separately so callers can decide how to interpret
/// error-class responses.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub payload: Option<String>,
}

impl ApiResponse {
    pub fn capture(&self) -> ExchangeCapture {
        ExchangeCapture {
            url: self.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            payload: self.payload.clone(),
            body: self.body.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn build_headers(input: &[(String, String)]) -> Result<HeaderMap, ProbeError> {
    let mut headers = HeaderMap::new();
    for (key, value) in input {
        if key.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| ProbeError::Transport(format!("Invalid header name `{key}`: {err}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            ProbeError::Transport(format!("Invalid header value for `{key}`: {err}"))
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Issues a single call against the supplier and classifies the outcome.
///
/// Statuses 200/201/400 must carry a JSON body; 204 and the error statuses
/// 403/405/500 are returned with no decoded value. Anything else is
/// off-contract and aborts the probe. Passing `header_override` replaces
/// the default header set entirely, which is how the auth probes drop or
/// corrupt the API key.
pub async fn call(
    client: &Client,
    url: &str,
    api_key: &str,
    method: Method,
    params: &[(&str, String)],
    json_payload: Option<&Value>,
    header_override: Option<&[(String, String)]>,
) -> Result<(ApiResponse, Option<Value>), ProbeError> {
    let default_headers = [(API_KEY_HEADER.to_string(), api_key.to_string())];
    let headers = build_headers(header_override.unwrap_or(&default_headers))?;

    debug!(%url, method = %method, "calling supplier endpoint");

    let mut request = client
        .request(method, url)
        .headers(headers)
        .query(params);

    let payload_text = match json_payload {
        Some(value) => {
            let text = value.to_string();
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(text.clone());
            Some(text)
        }
        None => None,
    };

    let response = request.send().await.map_err(|err| {
        if err.is_connect() || err.is_timeout() {
            ProbeError::Transport(format!(
                "Connection error occurred while testing endpoint {url}. Check if your server is available."
            ))
        } else {
            ProbeError::Transport(format!("HTTP error occurred while testing endpoint {url}: {err}"))
        }
    })?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let mut headers_out = Vec::new();
    for (name, value) in response.headers() {
        headers_out.push((
            name.to_string(),
            value.to_str().unwrap_or("<binary>").to_string(),
        ));
    }

    let body = response.text().await.map_err(|err| {
        ProbeError::Transport(format!("Failed to read response from {url}: {err}"))
    })?;

    let raw = ApiResponse {
        url: final_url,
        status,
        headers: headers_out,
        body,
        payload: payload_text,
    };

    let decoded = match status {
        200 | 201 | 400 => match serde_json::from_str::<Value>(&raw.body) {
            Ok(value) => Some(value),
            Err(_) => {
                return Err(ProbeError::protocol_with(
                    format!("Response from the {url} was not in a JSON format"),
                    raw.capture(),
                ));
            }
        },
        204 | 403 | 405 | 500 => None,
        other => {
            return Err(ProbeError::protocol_with(
                format!("Unexpected status code {other} from {url}"),
                raw.capture(),
            ));
        }
    };

    Ok((raw, decoded))
}
