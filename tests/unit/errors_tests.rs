/*!
 * Tests for error classification and conversion
 */

use ambisent::errors::{AppError, ProviderError};

/// HTTP statuses map to the matching variants
#[test]
fn test_fromStatus_shouldClassifyByStatus() {
    assert!(matches!(ProviderError::from_status(401, "bad key"), ProviderError::AuthenticationError(_)));
    assert!(matches!(ProviderError::from_status(403, "denied"), ProviderError::AuthenticationError(_)));
    assert!(matches!(ProviderError::from_status(429, "slow down"), ProviderError::RateLimitExceeded(_)));
    assert!(matches!(
        ProviderError::from_status(503, "overloaded"),
        ProviderError::ServerError { status_code: 503, .. }
    ));
    assert!(matches!(
        ProviderError::from_status(404, "no such model"),
        ProviderError::ApiError { status_code: 404, .. }
    ));
}

/// Only failures that can clear up by themselves are transient
#[test]
fn test_isTransient_shouldOnlyAcceptRecoverableFailures() {
    assert!(ProviderError::Timeout(90).is_transient());
    assert!(ProviderError::ConnectionError("reset".to_string()).is_transient());
    assert!(ProviderError::from_status(429, "").is_transient());
    assert!(ProviderError::from_status(500, "").is_transient());

    assert!(!ProviderError::from_status(400, "").is_transient());
    assert!(!ProviderError::from_status(401, "").is_transient());
    assert!(!ProviderError::EmptyResponse.is_transient());
    assert!(!ProviderError::ParseError("eof".to_string()).is_transient());
}

/// Messages carry the details callers log
#[test]
fn test_display_shouldIncludeDetails() {
    assert_eq!(ProviderError::Timeout(90).to_string(), "Request timed out after 90 seconds");
    assert_eq!(
        ProviderError::from_status(503, "overloaded").to_string(),
        "Server error: 503 - overloaded"
    );
    let app: AppError = ProviderError::EmptyResponse.into();
    assert_eq!(app.to_string(), "Provider error: API returned an empty response");
}

/// IO failures become file errors
#[test]
fn test_fromIoError_shouldBecomeFileError() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(AppError::from(io), AppError::File(message) if message.contains("gone")));
}
