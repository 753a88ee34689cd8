pub mod catalog;
pub mod client;
pub mod decode;
pub mod errors;
pub mod slot;

use thiserror::Error;

use crate::domain::{ExchangeCapture, ProtocolVersion};
use crate::engine::slot::SlotCache;

/// Everything a probe needs to talk to the supplier under test. Shared
/// read-only across a run, except the slot cache which is written at most
/// once and then only read.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub client: reqwest::Client,
    pub api_url: String,
    pub api_key: String,
    pub product_id: String,
    pub version: ProtocolVersion,
    pub timeslots: bool,
    pub slot_cache: SlotCache,
}

impl ProbeContext {
    /// `{base}/{vN}/{path}`
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{path}",
            self.api_url.trim_end_matches('/'),
            self.version.path_prefix()
        )
    }

    /// `{base}/{vN}/products/{product}/{endpoint}`
    pub fn product_url(&self, endpoint: &str) -> String {
        self.url(&format!("products/{}/{endpoint}", self.product_id))
    }

    /// Same endpoint, different product id (for the not-found probes).
    pub fn product_url_for(&self, product_id: &str, endpoint: &str) -> String {
        self.url(&format!("products/{product_id}/{endpoint}"))
    }
}

/// Everything that can knock out a single probe. The harness converts each
/// variant into a failed `TestResult`; nothing escapes a probe boundary.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The remote was unreachable or the connection broke mid-call.
    #[error("{0}")]
    Transport(String),

    /// The supplier answered but broke the wire contract (wrong status,
    /// wrong error code, undecodable body).
    #[error("{message}")]
    Protocol {
        message: String,
        response: Option<ExchangeCapture>,
    },

    /// A business invariant did not hold (expiry too short, ticket counts
    /// off, no usable availability).
    #[error("{message}")]
    Assertion {
        message: String,
        response: Option<ExchangeCapture>,
    },
}

impl ProbeError {
    pub fn protocol(message: impl Into<String>) -> Self {
        ProbeError::Protocol {
            message: message.into(),
            response: None,
        }
    }

    pub fn protocol_with(message: impl Into<String>, response: ExchangeCapture) -> Self {
        ProbeError::Protocol {
            message: message.into(),
            response: Some(response),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        ProbeError::Assertion {
            message: message.into(),
            response: None,
        }
    }

    pub fn assertion_with(message: impl Into<String>, response: ExchangeCapture) -> Self {
        ProbeError::Assertion {
            message: message.into(),
            response: Some(response),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ProbeError::Transport(_))
    }

    pub fn take_response(self) -> (String, Option<ExchangeCapture>) {
        match self {
            ProbeError::Transport(message) => (message, None),
            ProbeError::Protocol { message, response }
            | ProbeError::Assertion { message, response } => (message, response),
        }
    }
}
