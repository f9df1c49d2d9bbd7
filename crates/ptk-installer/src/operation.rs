//! Scoped operations: single-flight guard plus ordered log bracketing.
//!
//! Every user-visible operation runs through [`OperationRunner::run`], which
//!
//! 1. claims the busy flag (a concurrent call fails with `Busy`),
//! 2. emits `---` and `<verb> starting...`,
//! 3. runs the body, which may emit its own step lines,
//! 4. emits `<verb> succeeded!` or `<verb> failed!\n<error>`,
//! 5. releases the busy flag, even on error.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::driver::DriverStatus;
use crate::error::InstallerError;

/// Presentation hint for a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Plain step line
    Info,
    /// Operation separator
    Accent,
    Positive,
    Negative,
    Warning,
    /// Advice the user should not miss
    Emphasis,
}

/// One line of the operation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub tone: Tone,
    pub message: String,
}

impl LogLine {
    pub fn new(tone: Tone, message: impl Into<String>) -> Self {
        Self {
            tone,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives log lines in emission order.
pub trait LogSink: Send + Sync {
    fn emit(&self, line: LogLine);
}

/// Forwards lines into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
    tx: mpsc::UnboundedSender<LogLine>,
}

impl ChannelLogSink {
    pub fn new(tx: mpsc::UnboundedSender<LogLine>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl LogSink for ChannelLogSink {
    fn emit(&self, line: LogLine) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.tx.send(line);
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<LogLine>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn lines(&self) -> Vec<LogLine> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| l.message).collect()
    }
}

impl LogSink for MemoryLogSink {
    fn emit(&self, line: LogLine) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

/// Handle given to operation bodies for emitting step lines.
///
/// Each line is mirrored to `tracing`.
#[derive(Clone)]
pub struct Progress {
    sink: Arc<dyn LogSink>,
}

impl Progress {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn line(&self, tone: Tone, message: impl Into<String>) {
        let line = LogLine::new(tone, message);
        match tone {
            Tone::Negative => tracing::error!(message = %line.message, "operation log"),
            Tone::Warning => tracing::warn!(message = %line.message, "operation log"),
            _ => tracing::info!(message = %line.message, "operation log"),
        }
        self.sink.emit(line);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.line(Tone::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.line(Tone::Warning, message);
    }

    pub fn emphasis(&self, message: impl Into<String>) {
        self.line(Tone::Emphasis, message);
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// Observable engine state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineState {
    /// An operation is in flight
    pub busy: bool,
    /// Last validated driver status
    pub driver_status: Option<DriverStatus>,
}

/// Runs operations one at a time with log bracketing.
pub struct OperationRunner {
    busy: AtomicBool,
    sink: Arc<dyn LogSink>,
    state: Arc<watch::Sender<EngineState>>,
}

impl OperationRunner {
    pub fn new(sink: Arc<dyn LogSink>, state: Arc<watch::Sender<EngineState>>) -> Self {
        Self {
            busy: AtomicBool::new(false),
            sink,
            state,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Progress handle on this runner's sink.
    pub fn progress(&self) -> Progress {
        Progress::new(Arc::clone(&self.sink))
    }

    fn claim(&self) -> Result<BusyGuard<'_>, InstallerError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| InstallerError::Busy)?;
        self.state.send_modify(|s| s.busy = true);
        Ok(BusyGuard { runner: self })
    }

    /// Run `body` as the single in-flight operation.
    ///
    /// # Errors
    ///
    /// `Busy` if another operation holds the guard; otherwise whatever
    /// `body` returns. A `Busy` rejection emits no log lines.
    pub async fn run<T, F, Fut>(&self, verb: &str, body: F) -> Result<T, InstallerError>
    where
        F: FnOnce(Progress) -> Fut,
        Fut: Future<Output = Result<T, InstallerError>>,
    {
        let _guard = match self.claim() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(verb, "Rejected concurrent operation");
                return Err(e);
            }
        };

        let progress = self.progress();
        progress.line(Tone::Accent, "---");
        progress.info(format!("{} starting...", verb));

        match body(progress.clone()).await {
            Ok(value) => {
                progress.line(Tone::Positive, format!("{} succeeded!", verb));
                Ok(value)
            }
            Err(e) => {
                let tone = if e.is_warning() { Tone::Warning } else { Tone::Negative };
                progress.line(tone, format!("{} failed!\n{}", verb, e));
                Err(e)
            }
        }
    }
}

struct BusyGuard<'a> {
    runner: &'a OperationRunner,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.runner.busy.store(false, Ordering::Release);
        self.runner.state.send_modify(|s| s.busy = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> (OperationRunner, Arc<MemoryLogSink>, watch::Receiver<EngineState>) {
        let sink = Arc::new(MemoryLogSink::new());
        let (tx, rx) = watch::channel(EngineState::default());
        let runner = OperationRunner::new(sink.clone(), Arc::new(tx));
        (runner, sink, rx)
    }

    #[tokio::test]
    async fn test_success_bracketing() {
        let (runner, sink, _rx) = runner();

        let value = runner
            .run("Test operation", |progress| async move {
                progress.info("step one");
                progress.warning("step two");
                Ok(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(
            sink.messages(),
            vec![
                "---",
                "Test operation starting...",
                "step one",
                "step two",
                "Test operation succeeded!",
            ]
        );
        let tones: Vec<Tone> = sink.lines().iter().map(|l| l.tone).collect();
        assert_eq!(
            tones,
            vec![Tone::Accent, Tone::Info, Tone::Info, Tone::Warning, Tone::Positive]
        );
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_failure_bracketing_releases_guard() {
        let (runner, sink, rx) = runner();

        let err = runner
            .run("Broken", |_| async {
                Err::<(), _>(InstallerError::InvalidState("files are missing".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, InstallerError::InvalidState(_)));
        let last = sink.lines().pop().unwrap();
        assert_eq!(last.tone, Tone::Negative);
        assert_eq!(last.message, format!("Broken failed!\n{}", err));
        assert!(!runner.is_busy());
        assert!(!rx.borrow().busy);
    }

    #[tokio::test]
    async fn test_idempotent_failure_is_a_warning() {
        let (runner, sink, _rx) = runner();

        for error in [InstallerError::NotInstalled, InstallerError::AlreadyInstalled] {
            let expected = format!("Redo failed!\n{}", error);
            let err = runner
                .run("Redo", |_| async move { Err::<(), _>(error) })
                .await
                .unwrap_err();

            assert!(err.is_warning());
            let last = sink.lines().pop().unwrap();
            assert_eq!(last.tone, Tone::Warning);
            assert_eq!(last.message, expected);
        }
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_concurrent_call_is_busy() {
        let (runner, sink, rx) = runner();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = runner.run("First", |_| async move {
            let _ = release_rx.await;
            Ok(())
        });
        tokio::pin!(first);

        // Drive the first operation until it parks on the oneshot.
        assert!(futures_util::poll!(first.as_mut()).is_pending());
        assert!(runner.is_busy());
        assert!(rx.borrow().busy);

        let second = runner.run("Second", |_| async { Ok(()) }).await;
        assert!(matches!(second, Err(InstallerError::Busy)));

        release_tx.send(()).unwrap();
        first.await.unwrap();

        assert!(!runner.is_busy());
        assert!(!sink.messages().iter().any(|m| m.contains("Second")));

        // The flag is free again.
        runner.run("Third", |_| async { Ok(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelLogSink::channel();
        let progress = Progress::new(Arc::new(sink));
        for i in 0..50 {
            progress.info(format!("line {}", i));
        }
        drop(progress);

        let mut received = Vec::new();
        while let Some(line) = rx.recv().await {
            received.push(line.message);
        }
        let expected: Vec<String> = (0..50).map(|i| format!("line {}", i)).collect();
        assert_eq!(received, expected);
    }
}
