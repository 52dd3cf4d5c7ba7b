//! Progress events and the cancellation handle passed into a scan.

use super::session::ScanPhase;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One progress update: `current` of `total` units done in `phase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Phase producing the update.
    pub phase: ScanPhase,
    /// Units finished so far.
    pub current: usize,
    /// Units in the phase.
    pub total: usize,
    /// Human-readable status line.
    pub message: String,
}

/// Sending half of the progress channel. Reporting never blocks and never fails the scan.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Reporter paired with the receiver that observes its events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Reporter that discards every event.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Publish an event; dropped receivers are ignored.
    pub fn report(&self, phase: ScanPhase, current: usize, total: usize, message: impl Into<String>) {
        let Some(sender) = &self.sender else {
            return;
        };
        let event = ProgressEvent {
            phase,
            current,
            total,
            message: message.into(),
        };
        if sender.send(event).is_err() {
            tracing::trace!("Progress receiver dropped");
        }
    }
}

/// Caller-side controls for a running scan.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    /// Checked before each item; cancel it to stop at the next boundary.
    pub cancel: CancellationToken,
    /// Destination for progress events.
    pub progress: ProgressReporter,
}

impl ScanControl {
    /// Controls from an existing token and reporter.
    pub fn new(cancel: CancellationToken, progress: ProgressReporter) -> Self {
        Self { cancel, progress }
    }

    /// Whether a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_delivers_events_in_order() {
        let (reporter, mut receiver) = ProgressReporter::channel();
        reporter.report(ScanPhase::Discovering, 0, 2, "Scanning");
        reporter.report(ScanPhase::Analyzing, 1, 2, "a.txt");
        drop(reporter);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.phase, ScanPhase::Discovering);
        assert_eq!(first.message, "Scanning");
        let second = receiver.recv().await.unwrap();
        assert_eq!((second.current, second.total), (1, 2));
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (reporter, receiver) = ProgressReporter::channel();
        drop(receiver);
        reporter.report(ScanPhase::Indexing, 1, 1, "done");
        ProgressReporter::silent().report(ScanPhase::Indexing, 1, 1, "done");
    }

    #[test]
    fn control_reflects_token() {
        let control = ScanControl::default();
        assert!(!control.is_cancelled());
        control.cancel.cancel();
        assert!(control.is_cancelled());
    }
}
