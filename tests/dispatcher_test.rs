use docstore_bridge::backend::database::SqliteStore;
use docstore_bridge::backend::{Backend, Connection};
use docstore_bridge::config::AppConfig;
use docstore_bridge::error::ErrorKind;
use docstore_bridge::models::{FieldValue, Record};
use docstore_bridge::parser::Filter;
use docstore_bridge::{BackendConfig, BackendKind, Dispatcher};
use std::sync::Arc;

#[tokio::test]
async fn test_lazy_connection() {
    let dispatcher = Dispatcher::from_config(BackendConfig::memory_sqlite());
    assert!(!dispatcher.is_connected());

    let records = dispatcher
        .select("app", "users", &Filter::all(), &Default::default())
        .await
        .unwrap();
    assert!(records.is_empty());
    assert!(dispatcher.is_connected());
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let dispatcher = Dispatcher::from_config(BackendConfig::memory_sqlite());
    dispatcher
        .create("app", "users", &Record::new().with("name", "a"), false)
        .await
        .unwrap();

    // A second dial would open a new, empty in-memory database
    let connection = dispatcher.ensure_connected().await.unwrap();
    assert_eq!(connection.kind(), BackendKind::Sqlite);
    assert_eq!(
        dispatcher.count("app", "users", &Filter::all()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_injected_connection() {
    let config = BackendConfig::memory_sqlite();
    let store = SqliteStore::connect(&config).await.unwrap();
    let dispatcher = Dispatcher::from_connection(config, Connection::new(Arc::new(store)));
    assert!(dispatcher.is_connected());

    dispatcher.health_check().await.unwrap();
    let id = dispatcher
        .create("app", "items", &Record::new().with("n", 1), false)
        .await
        .unwrap();
    let found = dispatcher
        .read_one("app", "items", &dispatcher.create_id_filter(&id), true)
        .await
        .unwrap();
    assert_eq!(found, Some(Record::new().with("n", 1)));
}

#[tokio::test]
async fn test_invalid_url_is_a_configuration_error() {
    let dispatcher = Dispatcher::from_config(BackendConfig::postgres("mysql://db/x".to_string()));
    let err = dispatcher
        .count("app", "users", &Filter::all())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!dispatcher.is_connected());
}

#[tokio::test]
async fn test_unreachable_backend_is_unavailable() {
    let config = BackendConfig::postgres("postgres://nobody@127.0.0.1:1/none".to_string())
        .with_connect_timeout_ms(500);
    let dispatcher = Dispatcher::from_config(config);

    let err = dispatcher.ensure_connected().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(!dispatcher.is_connected());

    // Failures are not cached; the next call dials again
    let err = dispatcher.health_check().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
}

#[test]
fn test_unknown_backend_kind_fails_fast() {
    let mut config = AppConfig::default_config();
    config.backend.kind = "cassandra".to_string();
    let err = config.to_backend_config().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_errors_pass_through_unchanged() {
    let dispatcher = Dispatcher::from_config(AppConfig::default_config().to_backend_config().unwrap());

    let err = dispatcher
        .append_to_list("app", "users", &Filter::all(), "tags", &FieldValue::from("x"))
        .await
        .unwrap_err();
    assert!(err.is_capability_not_supported());

    let err = dispatcher
        .fetch_by_id("app", "users", "not-an-id", false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
