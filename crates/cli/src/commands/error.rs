//! Structured error output for failed commands.

use backdrop_core::Error;
use serde::Serialize;

/// Printed on stdout when a command fails, so scripts can match on `code`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
    pub code: &'static str,
    pub message: String,
}

impl From<&Error> for ErrorOutput {
    fn from(err: &Error) -> Self {
        Self { code: err.code(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_output_carries_code() {
        let output = ErrorOutput::from(&Error::StoreUnavailable("persistent storage is disabled".into()));
        assert_eq!(output.code, "STORE_UNAVAILABLE");
        assert!(output.message.contains("disabled"));
    }
}
