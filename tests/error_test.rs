//! Tests for error types

use mlwrapper::{Error, ExperimentId};

#[test]
fn test_not_running_error() {
    let error = Error::NotRunning;
    let error_str = format!("{error}");
    assert!(error_str.contains("before the run was started"));
    assert!(error_str.contains("start()"));
}

#[test]
fn test_already_running_error() {
    let error_str = format!("{}", Error::AlreadyRunning);
    assert!(error_str.contains("Run already active"));
}

#[test]
fn test_experiment_exists_error() {
    let error = Error::ExperimentExists("mnist".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("already exists"));
    assert!(error_str.contains("mnist"));
}

#[test]
fn test_experiment_not_found_error() {
    let error = Error::ExperimentNotFound(ExperimentId::new(7));
    assert_eq!(format!("{error}"), "Experiment with id 7 does not exist");
}

#[test]
fn test_invalid_image_shape_error() {
    let error = Error::InvalidImageShape("rank 3".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid image shape"));
    assert!(error_str.contains("rank 3"));
    assert!(error_str.contains("channel_first"));
}

#[test]
fn test_unsupported_image_type_error() {
    let error = Error::UnsupportedImageType("alloc::vec::Vec<u8>".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("not implemented for type"));
    assert!(error_str.contains("Vec<u8>"));
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("file not found".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_corrupt_record_error() {
    let error = Error::CorruptRecord("length checksum mismatch".to_string());
    assert!(format!("{error}").contains("Corrupt event record"));
}

#[test]
fn test_invalid_config_error() {
    let error = Error::InvalidConfig("log_level \"loud\"".to_string());
    assert!(format!("{error}").contains("Invalid configuration"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    assert_eq!(format!("{error}"), "custom error message");
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_error_debug() {
    let error = Error::NotRunning;
    assert!(format!("{error:?}").contains("NotRunning"));
}

#[test]
fn test_result_type_alias() {
    fn returns_result() -> mlwrapper::Result<i32> {
        Ok(42)
    }
    assert_eq!(returns_result().unwrap(), 42);
}
