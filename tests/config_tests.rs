//! Layered configuration loading and validation

use std::io::Write;

use statemachine::config::{
    ConfigLoader, ConfigurationError, QueueBackend, ServiceConfig, Verbosity,
};

fn toml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

#[test]
fn test_defaults_require_events_queue() {
    let config = ServiceConfig::default();
    assert!(config.store.is_in_memory());
    assert_eq!(config.queues.backend, QueueBackend::Pgmq);
    assert!(config.queues.dlq().is_none());

    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingRequiredField { .. }));
}

#[test]
fn test_full_file_is_loaded() {
    let file = toml_file(
        r#"
release = "2024.06"

[store]
endpoint = "redis://cache:6379"
timeout_ms = 750
event_ttl_seconds = 3600

[queues]
endpoint = "postgres://queues/statemachine"
events_queue = "fsm_events"
dlq = "fsm_dlq"
poll_interval_ms = 250

[grpc]
bind_address = "127.0.0.1:9000"
enable_reflection = true

[logging]
verbosity = "trace"
json = true
"#,
    );

    let config = ConfigLoader::new()
        .with_env_prefix("STATEMACHINE_IT_FULL_FILE")
        .with_file(file.path())
        .load_and_validate()
        .unwrap();

    assert_eq!(config.release, "2024.06");
    assert_eq!(config.store.endpoint, "redis://cache:6379");
    assert_eq!(config.store.event_ttl().as_secs(), 3600);
    assert_eq!(config.store.outcome_ttl().as_secs(), 0);
    assert_eq!(config.queues.dlq(), Some("fsm_dlq"));
    assert_eq!(config.queues.poll_interval().as_millis(), 250);
    assert_eq!(config.grpc.socket_addr().unwrap().port(), 9000);
    assert!(config.grpc.enable_reflection);
    assert_eq!(config.logging.verbosity, Verbosity::Trace);
    assert!(config.logging.json);
}

#[test]
fn test_environment_overrides_file() {
    let file = toml_file(
        r#"
[queues]
events_queue = "from_file"
batch_size = 5
"#,
    );

    std::env::set_var("STATEMACHINE_IT_ENV__QUEUES__EVENTS_QUEUE", "from_env");
    std::env::set_var("STATEMACHINE_IT_ENV__STORE__MAX_RETRIES", "7");

    let config = ConfigLoader::new()
        .with_env_prefix("STATEMACHINE_IT_ENV")
        .with_file(file.path())
        .load()
        .unwrap();

    std::env::remove_var("STATEMACHINE_IT_ENV__QUEUES__EVENTS_QUEUE");
    std::env::remove_var("STATEMACHINE_IT_ENV__STORE__MAX_RETRIES");

    assert_eq!(config.queues.events_queue, "from_env");
    assert_eq!(config.queues.batch_size, 5);
    assert_eq!(config.store.max_retries, 7);
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = toml_file(
        r#"
[queues]
endpoint = "postgres://queues/statemachine"
events_queue = "fsm_events"

[grpc]
bind_address = "not-an-address"
"#,
    );

    let err = ConfigLoader::new()
        .with_env_prefix("STATEMACHINE_IT_INVALID")
        .with_file(file.path())
        .load_and_validate()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn test_tls_requires_directory() {
    let mut config = ServiceConfig::default();
    config.queues.backend = QueueBackend::InMemory;
    config.queues.events_queue = "fsm_events".to_string();
    config.grpc.tls.enabled = true;
    assert!(config.validate().is_err());

    config.grpc.tls.directory = "/etc/statemachine/tls".to_string();
    assert!(config.validate().is_ok());
    assert_eq!(
        config.grpc.tls.path("ca.pem").to_str(),
        Some("/etc/statemachine/tls/ca.pem")
    );
}

#[test]
fn test_in_memory_queues_are_opt_in() {
    let file = toml_file(
        r#"
[queues]
events_queue = "fsm_events"
"#,
    );
    let loader = ConfigLoader::new()
        .with_env_prefix("STATEMACHINE_IT_QUEUE_BACKEND")
        .with_file(file.path());
    let err = loader.load_and_validate().unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingRequiredField { .. }));

    let file = toml_file(
        r#"
[queues]
backend = "in_memory"
events_queue = "fsm_events"
"#,
    );
    let config = ConfigLoader::new()
        .with_env_prefix("STATEMACHINE_IT_QUEUE_BACKEND")
        .with_file(file.path())
        .load_and_validate()
        .unwrap();
    assert_eq!(config.queues.backend, QueueBackend::InMemory);
}

#[test]
fn test_verbosity_parsing() {
    assert_eq!("verbose".parse::<Verbosity>().unwrap(), Verbosity::Verbose);
    assert_eq!("DEBUG".parse::<Verbosity>().unwrap(), Verbosity::Verbose);
    assert_eq!("normal".parse::<Verbosity>().unwrap(), Verbosity::Normal);
    assert!("loud".parse::<Verbosity>().is_err());
    assert_eq!(Verbosity::Trace.filter_directive(), "trace");
}
