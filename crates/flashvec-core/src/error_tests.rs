//! Tests for `error` module

use super::error::*;

#[test]
fn test_error_codes() {
    assert_eq!(Error::Load("x".into()).code(), "FLASH-001");
    assert_eq!(
        Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).code(),
        "FLASH-002"
    );
    assert_eq!(Error::GraphCorrupt("x".into()).code(), "FLASH-003");
    assert_eq!(Error::Usage("x".into()).code(), "FLASH-004");
    assert_eq!(Error::Config("x".into()).code(), "FLASH-005");
    assert_eq!(Error::Tensor("x".into()).code(), "FLASH-006");
}

#[test]
fn test_error_messages_carry_code() {
    let err = Error::Usage("L must be >= k".into());
    let msg = err.to_string();
    assert!(msg.contains("FLASH-004"));
    assert!(msg.contains("L must be >= k"));
}

#[test]
fn test_recoverability() {
    assert!(!Error::GraphCorrupt("bad degree".into()).is_recoverable());
    assert!(!Error::Load("missing file".into()).is_recoverable());
    assert!(Error::Usage("k > L".into()).is_recoverable());
    assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_recoverable());
}

#[test]
fn test_io_error_conversion() {
    fn read() -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"))?;
        Ok(())
    }
    let err = read().unwrap_err();
    assert_eq!(err.code(), "FLASH-002");
}
