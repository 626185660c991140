/// Logger Capability Module
///
/// The connection handle reports everything through a `Logger` instead of
/// writing to a global sink. Callers inject their own implementation; when
/// they don't, each handle gets its own `TracingLogger`.
use tracing::{debug, error, info, warn};

/// Logging capability injected into a connection handle.
///
/// Only `info` is required. The other levels default to no-ops so a minimal
/// logger can be a single method.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, _message: &str) {}

    fn error(&self, _message: &str) {}

    fn debug(&self, _message: &str) {}
}

/// Default logger forwarding each level to the `tracing` macro of the same name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        TracingLogger
    }
}

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "dbhandle", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "dbhandle", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "dbhandle", "{}", message);
    }

    fn debug(&self, message: &str) {
        debug!(target: "dbhandle", "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InfoOnly(Mutex<Vec<String>>);

    impl Logger for InfoOnly {
        fn info(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_tracing_logger_forwards_levels() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let logger = TracingLogger::new();
            logger.info("hello info");
            logger.warn("hello warn");
            logger.error("hello error");
            logger.debug("hello debug");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("INFO dbhandle: hello info"));
        assert!(output.contains("WARN dbhandle: hello warn"));
        assert!(output.contains("ERROR dbhandle: hello error"));
        assert!(output.contains("DEBUG dbhandle: hello debug"));
    }

    #[test]
    fn test_optional_levels_default_to_noop() {
        let logger = InfoOnly(Mutex::new(Vec::new()));
        logger.warn("dropped");
        logger.error("dropped");
        logger.debug("dropped");
        logger.info("kept");

        assert_eq!(*logger.0.lock().unwrap(), vec!["kept".to_string()]);
    }
}
