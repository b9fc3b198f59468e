use camino::Utf8PathBuf;
use std::sync::Once;
use tempfile::TempDir;

static LOGGING_INIT: Once = Once::new();

/// Initializes the tracing subscriber for tests.
///
/// This function is wrapped in a `Once` block to ensure that the global
/// subscriber is set exactly one time, even when tests are run in parallel.
pub fn setup_test_logging() {
    LOGGING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok(); // Another test harness may have installed one already.
    });
}

/// A fresh temporary directory together with its UTF-8 path.
///
/// Panics if the system temp directory is not valid UTF-8, which only
/// happens on misconfigured test machines.
pub fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .expect("Temp dir path is not valid UTF-8");
    (dir, path)
}
