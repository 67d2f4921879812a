/// Unit tests for engine error types and error macros.

use crate::error::{Error, Result};

#[test]
fn test_error_display() {
    assert_eq!(
        Error::BackendError("boom".to_string()).to_string(),
        "Backend error: boom"
    );
    assert_eq!(Error::OutOfMemory.to_string(), "Out of GPU memory");
    assert_eq!(
        Error::InvalidResource("bad blueprint".to_string()).to_string(),
        "Invalid resource: bad blueprint"
    );
    assert_eq!(
        Error::InitializationFailed("no device".to_string()).to_string(),
        "Initialization failed: no device"
    );
}

#[test]
fn test_engine_err_produces_backend_error() {
    let err = crate::engine_err!("nebula::test", "code {}", 42);
    match err {
        Error::BackendError(msg) => assert_eq!(msg, "code 42"),
        other => panic!("expected BackendError, got {:?}", other),
    }
}

fn failing_operation() -> Result<u32> {
    crate::engine_bail!("nebula::test", "always fails");
}

fn invalid_blueprint() -> Result<u32> {
    crate::engine_bail_invalid!("nebula::test", "two dynamic blocks");
}

#[test]
fn test_engine_bail_returns_early() {
    match failing_operation() {
        Err(Error::BackendError(msg)) => assert_eq!(msg, "always fails"),
        other => panic!("expected BackendError, got {:?}", other),
    }
}

#[test]
fn test_engine_bail_invalid_returns_invalid_resource() {
    match invalid_blueprint() {
        Err(Error::InvalidResource(msg)) => assert_eq!(msg, "two dynamic blocks"),
        other => panic!("expected InvalidResource, got {:?}", other),
    }
}
