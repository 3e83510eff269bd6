//! Explicit telemetry handle
//!
//! Evaluators and aggregators own a [`Telemetry`] handle instead of writing
//! to process-global state directly, so independent runs compose and tests
//! can assert on what was emitted. The default sink forwards to the `log`
//! facade; everything stays synchronous.

use std::sync::Arc;

use crate::error::Error;
use crate::evaluation::timer::{Stage, StageClock};

/// Sink for the pipeline's observable events.
pub trait Telemetry: Send + Sync {
    /// One evaluation finished; `clock` holds the per-stage breakdown.
    fn stage_breakdown(&self, clock: &StageClock);

    /// A snapshot repeat is about to be processed.
    fn repeat_started(&self, index: usize, tag: &str);

    /// A snapshot repeat failed and is being skipped. Always called exactly
    /// once per failed repeat; no failure is silently swallowed.
    fn repeat_failed(&self, index: usize, tag: &str, error: &Error);

    /// Free-form aggregate summary line.
    fn summary(&self, message: &str);
}

/// Default sink: forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn stage_breakdown(&self, clock: &StageClock) {
        log::info!(
            "Total test time: {} <= std_test_time: {}, seek_test_time: {}, \
             proj_test_time: {}, model_test_time: {}",
            clock.total_secs(),
            clock.secs(Stage::Standardize),
            clock.secs(Stage::Seek),
            clock.secs(Stage::Project),
            clock.secs(Stage::Predict),
        );
    }

    fn repeat_started(&self, index: usize, tag: &str) {
        log::info!("***{index}_th repeat, {tag}");
    }

    fn repeat_failed(&self, index: usize, tag: &str, error: &Error) {
        log::error!("repeat {index} failed for {tag}: {error}");
    }

    fn summary(&self, message: &str) {
        log::debug!("{message}");
    }
}

/// Shared default handle.
pub fn log_telemetry() -> Arc<dyn Telemetry> {
    Arc::new(LogTelemetry)
}

#[cfg(test)]
pub(crate) mod capture {
    //! In-memory sink for asserting on emitted events in tests.

    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct CaptureTelemetry {
        pub events: Mutex<Vec<String>>,
    }

    impl CaptureTelemetry {
        pub fn lines(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, line: String) {
            self.events.lock().unwrap().push(line);
        }
    }

    impl Telemetry for CaptureTelemetry {
        fn stage_breakdown(&self, clock: &StageClock) {
            self.push(format!("breakdown total={}", clock.total_secs()));
        }

        fn repeat_started(&self, index: usize, tag: &str) {
            self.push(format!("started {index} {tag}"));
        }

        fn repeat_failed(&self, index: usize, tag: &str, error: &Error) {
            self.push(format!("failed {index} {tag}: {error}"));
        }

        fn summary(&self, message: &str) {
            self.push(format!("summary {message}"));
        }
    }
}
