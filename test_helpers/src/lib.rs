//! Small, shared test utilities: tracing init for tests that want to see log output, and
//! (behind `future_timeout`) a future-timeout assertion helper.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing-subscriber` once per test binary, honoring `RUST_LOG` (`.env` is
/// loaded first so a local `.env` can set it without exporting it into the shell).
/// Safe to call from every test; only the first call takes effect.
pub fn maybe_start_logging() {
    TRACING_INIT.call_once(|| {
        let _ = dotenvy::dotenv();
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// A `tempfile::TempDir` rooted under the OS temp dir, removed on drop. Thin wrapper so
/// callers depend on `test_helpers` rather than `tempfile` directly.
pub fn tmp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

#[cfg(feature = "future_timeout")]
mod timeout {
    use std::future::Future;
    use std::time::Duration;

    /// Default bound for [`FutureTimeout::with_timeout`]; generous enough to never trip
    /// on a healthy CI runner, tight enough to fail a genuinely hung test quickly.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    #[async_trait::async_trait]
    pub trait FutureTimeout: Future + Sized {
        async fn with_timeout(self, duration: Duration) -> Self::Output
        where
            Self: Send,
        {
            tokio::time::timeout(duration, self)
                .await
                .expect("future did not complete within timeout")
        }

        async fn with_timeout_panic_message(self, message: &str, duration: Duration) -> Self::Output
        where
            Self: Send,
        {
            tokio::time::timeout(duration, self)
                .await
                .unwrap_or_else(|_| panic!("{message}"))
        }
    }

    impl<F: Future + Send> FutureTimeout for F {}
}

#[cfg(feature = "future_timeout")]
pub use timeout::{FutureTimeout, DEFAULT_TIMEOUT};
