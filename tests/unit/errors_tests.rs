/*!
 * Tests for the error taxonomy
 */

use tabtrans::errors::{ApiError, PipelineError};

#[test]
fn test_is_transient_withConnectionError_shouldBeTrue() {
    let error = ApiError::ConnectionError("reset by peer".to_string());
    assert!(error.is_transient());
}

#[test]
fn test_is_transient_withRateLimitAndServerErrors_shouldBeTrue() {
    for status_code in [429, 500, 503] {
        let error = ApiError::ApiRejection {
            status_code,
            message: "busy".to_string(),
        };
        assert!(error.is_transient(), "status {} should be transient", status_code);
    }
}

#[test]
fn test_is_transient_withClientErrors_shouldBeFalse() {
    let rejected = ApiError::ApiRejection {
        status_code: 400,
        message: "bad request".to_string(),
    };
    assert!(!rejected.is_transient());

    let auth = ApiError::AuthenticationError("invalid key".to_string());
    assert!(!auth.is_transient());

    let parse = ApiError::ParseError("unexpected token".to_string());
    assert!(!parse.is_transient());
}

#[test]
fn test_oversized_request_display_shouldNameRequestAndLimits() {
    let error = PipelineError::OversizedRequest {
        custom_id: "row-12".to_string(),
        estimated_tokens: 1200,
        limit: 950,
    };

    let message = error.to_string();
    assert!(message.contains("row-12"));
    assert!(message.contains("1200"));
    assert!(message.contains("950"));
}

#[test]
fn test_incomplete_translation_display_shouldListMissingIds() {
    let error = PipelineError::IncompleteTranslation {
        missing_ids: vec![3, 8, 21],
    };

    let message = error.to_string();
    assert!(message.contains("3 row ids missing"));
    assert!(message.contains("21"));
}
