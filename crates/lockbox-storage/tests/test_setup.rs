use lockbox_core::{
    logging::{custom_logger_level, LogLevel},
    storage::SecureStore,
    StoreError,
};
use lockbox_storage::testing::{base64url, setup, setup_store, TestConfig};

#[tokio::test]
async fn provisioned_test_store_supports_a_full_lifecycle() {
    let config = TestConfig::from_env().expect("test config");
    setup(&config);
    let installed = custom_logger_level();
    assert_eq!(
        installed,
        config.enable_trace_logging.then_some(LogLevel::Trace)
    );

    // Only the first call does anything.
    setup(&TestConfig {
        enable_trace_logging: !config.enable_trace_logging,
        ..config.clone()
    });
    assert_eq!(custom_logger_level(), installed);

    let store = setup_store(&config).await.expect("setup store");
    let name = base64url("did:example:123#key-1");
    store
        .insert("did", &name, b"{\"verkey\":\"abc\"}")
        .await
        .expect("insert");
    let entry = store
        .fetch("did", &name)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(entry.value, b"{\"verkey\":\"abc\"}");

    store.close().await.expect("close");
    assert_eq!(
        store.close().await.expect_err("second close"),
        StoreError::HandleAlreadyClosed
    );

    // Recreating always starts empty, whatever the backend.
    let again = setup_store(&config).await.expect("setup store again");
    assert_eq!(again.count("did").await.expect("count"), 0);
    again.close().await.expect("close");
}
