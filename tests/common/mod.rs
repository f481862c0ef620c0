use std::sync::Once;

static START: Once = Once::new();

/// Installs a `RUST_LOG`-filtered subscriber once per test binary.
pub fn init_test_logger() {
    START.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
