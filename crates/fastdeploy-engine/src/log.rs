//! Debug-log sink for purge decisions and other best-effort diagnostics.
//!
//! Not required for correctness; the sink exists so the surrounding build
//! tool can surface purge decisions and tests can assert on them.

/// Sink for debug-level diagnostics.
pub trait DeployLog: Send + Sync {
    fn debug(&self, message: &str);
}

/// Discards everything. The default.
#[derive(Debug, Default)]
pub struct NoopLog;

impl DeployLog for NoopLog {
    fn debug(&self, _message: &str) {}
}

/// Prints each message to stderr, prefixed for grep-ability.
#[derive(Debug, Default)]
pub struct StderrLog;

impl DeployLog for StderrLog {
    fn debug(&self, message: &str) {
        eprintln!("fastdeploy: {message}");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::DeployLog;

    /// Records every message so tests can assert on purge decisions.
    #[derive(Debug, Default)]
    pub struct RecordingLog {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingLog {
        pub fn messages(&self) -> Vec<String> {
            self.messages
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.messages().iter().any(|m| m.contains(needle))
        }
    }

    impl DeployLog for RecordingLog {
        fn debug(&self, message: &str) {
            self.messages
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(message.to_owned());
        }
    }
}
