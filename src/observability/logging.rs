//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(log_level: &str) {
    let fallback = format!("resilience_layer={level},tower_http={level}", level = log_level);
    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(e) = result {
        // A subscriber is already installed (tests, embedding hosts).
        tracing::debug!(error = %e, "Tracing subscriber already initialized");
    }
}

#[cfg(test)]
pub(crate) mod capture {
    use std::io;
    use std::sync::{Arc, Mutex, PoisonError};

    use tracing::subscriber::DefaultGuard;

    /// Events formatted by a thread-local subscriber, kept until dropped.
    pub(crate) struct CapturedLogs {
        buf: Arc<Mutex<Vec<u8>>>,
        _guard: DefaultGuard,
    }

    impl CapturedLogs {
        pub(crate) fn contents(&self) -> String {
            let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    #[derive(Clone)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Capture every event on the current thread, all levels.
    pub(crate) fn capture() -> CapturedLogs {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let writer = SharedBuf(buf.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        CapturedLogs {
            buf,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}
