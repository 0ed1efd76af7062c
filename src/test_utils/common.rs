use std::time::Duration;

use crate::MetadataStore;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    // the crate logs through `tracing`, so the capture side must be a
    // tracing subscriber, not a `log` backend
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Bounded wait used wherever a test asserts on eventually-consistent
/// propagation (watch delivery is asynchronous relative to the write).
pub(crate) const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `store.get(key)` until it returns `expected` or the propagation
/// timeout elapses.
pub(crate) async fn await_value(
    store: &MetadataStore,
    key: &str,
    expected: Option<&str>,
) {
    let deadline = tokio::time::Instant::now() + PROPAGATION_TIMEOUT;
    loop {
        let current = store.get(key).await.expect("get should succeed");
        if current.as_deref() == expected {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "value of {:?} did not converge to {:?} in time, last seen {:?}",
                key, expected, current
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
