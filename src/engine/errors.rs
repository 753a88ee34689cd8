use crate::domain::{ApiError, TestResult};
use crate::engine::client::ApiResponse;
use crate::engine::ProbeError;

/// What the contract says a failure scenario must look like. The message is
/// only ever prefix-matched; suppliers may append dynamic values.
#[derive(Debug, Clone)]
pub struct ExpectedError {
    pub error_code: i64,
    pub error: &'static str,
    pub message: String,
}

impl ExpectedError {
    pub fn new(error_code: i64, error: &'static str, message: impl Into<String>) -> Self {
        ExpectedError {
            error_code,
            error,
            message: message.into(),
        }
    }
}

/// Compares an observed error body against the expected one. A wrong code
/// or wrong label is a hard violation; a message that merely doesn't start
/// with the expected prefix is a warning, since exact wording is
/// implementation-defined.
pub fn check_api_error(
    raw: &ApiResponse,
    api_error: &ApiError,
    expected: &ExpectedError,
) -> Result<TestResult, ProbeError> {
    if api_error.error_code != expected.error_code {
        return Err(ProbeError::protocol_with(
            format!(
                "Incorrect error_code ({}). Expected value: {}",
                api_error.error_code, expected.error_code
            ),
            raw.capture(),
        ));
    }
    if api_error.error != expected.error {
        return Err(ProbeError::protocol_with(
            format!(
                "Incorrect error text ({}). Expected text: {}",
                api_error.error, expected.error
            ),
            raw.capture(),
        ));
    }
    if !api_error.message.starts_with(&expected.message) {
        return Ok(TestResult::warning(format!(
            "Incorrect message text \"{}\". Expected text should start with: \"{}\"",
            api_error.message, expected.message
        )));
    }
    Ok(TestResult::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> ApiResponse {
        ApiResponse {
            url: "http://localhost/v1/products/A500-FX/variants".to_string(),
            status: 400,
            headers: Vec::new(),
            body: String::new(),
            payload: None,
        }
    }

    fn observed(code: i64, error: &str, message: &str) -> ApiError {
        ApiError {
            error_code: code,
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn matching_error_passes() {
        let expected = ExpectedError::new(2009, "Incorrect date", "Cannot use the past date");
        let result = check_api_error(
            &raw(),
            &observed(2009, "Incorrect date", "Cannot use the past date (2020-01-01)"),
            &expected,
        )
        .expect("check");
        assert!(result.is_ok());
    }

    #[test]
    fn wrong_code_is_a_hard_failure() {
        let expected = ExpectedError::new(2009, "Incorrect date", "Cannot use the past date");
        let err = check_api_error(
            &raw(),
            &observed(2001, "Incorrect date", "Cannot use the past date"),
            &expected,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Incorrect error_code (2001)"), "{err}");
    }

    #[test]
    fn wrong_label_is_a_hard_failure() {
        let expected = ExpectedError::new(2009, "Incorrect date", "Cannot use the past date");
        assert!(check_api_error(
            &raw(),
            &observed(2009, "Bad date", "Cannot use the past date"),
            &expected,
        )
        .is_err());
    }

    #[test]
    fn message_prefix_mismatch_is_only_a_warning() {
        let expected = ExpectedError::new(2009, "Incorrect date", "Cannot use the past date");
        let result = check_api_error(
            &raw(),
            &observed(2009, "Incorrect date", "Dates in the past are not allowed"),
            &expected,
        )
        .expect("check");
        assert!(result.is_warning());
    }
}
