use std::io::Write;

use dispatch::AppConfig;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_toml_file() {
    let mut file = NamedTempFile::new().expect("创建临时文件失败");
    write!(
        file,
        r#"
[dispatcher]
symmetric_success_decay = true
completed_archive_limit = 20

[messaging]
max_retries = 5
retry_backoff_ms = 500
history_limit = 200

[session]
audit_trail_limit = 10
history_limit = 5
"#
    )
    .unwrap();

    let config = AppConfig::load(file.path().to_str()).expect("加载配置失败");
    assert!(config.dispatcher.symmetric_success_decay);
    assert_eq!(config.dispatcher.completed_archive_limit, 20);
    assert_eq!(config.messaging.max_retries, 5);
    assert_eq!(config.messaging.retry_backoff_ms, 500);
    assert_eq!(config.session.audit_trail_limit, 10);
}

#[test]
fn test_load_missing_file_is_an_error() {
    let result = AppConfig::load(Some("/nonexistent/dispatch.toml"));
    assert!(result.is_err());
}

#[test]
fn test_invalid_file_values_are_rejected() {
    let mut file = NamedTempFile::new().expect("创建临时文件失败");
    write!(
        file,
        r#"
[dispatcher]
symmetric_success_decay = false
completed_archive_limit = 50

[messaging]
max_retries = 3
retry_backoff_ms = 0
history_limit = 1000

[session]
audit_trail_limit = 50
history_limit = 100
"#
    )
    .unwrap();

    assert!(AppConfig::load(file.path().to_str()).is_err());
}
