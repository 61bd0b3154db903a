//! Progress reporting for a compression run.
//!
//! A codec reports `(phase, percent)` milestones through a
//! [`ProgressReporter`]. The reporter belongs to exactly one run: it tags
//! every message with the run's generation, drops values that would move
//! progress backwards, and goes silent once the run is cancelled.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use crate::codec::CodecOutput;
use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Analyzing,
    OptimizingImages,
    CompressingContent,
    PreparingResult,
}

impl Phase {
    /// Phase a simulated run is in at `percent`.
    pub fn for_percent(percent: f32) -> Phase {
        if percent < 25.0 {
            Phase::Analyzing
        } else if percent < 60.0 {
            Phase::OptimizingImages
        } else if percent < 90.0 {
            Phase::CompressingContent
        } else {
            Phase::PreparingResult
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Analyzing => "Analyzing document",
            Phase::OptimizingImages => "Optimizing images",
            Phase::CompressingContent => "Compressing content",
            Phase::PreparingResult => "Preparing result",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    pub percent: f32,
    pub phase: Phase,
}

impl ProgressState {
    pub const START: ProgressState = ProgressState {
        percent: 0.0,
        phase: Phase::Analyzing,
    };

    pub const DONE: ProgressState = ProgressState {
        percent: 100.0,
        phase: Phase::PreparingResult,
    };

    pub fn new(phase: Phase, percent: f32) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0),
            phase,
        }
    }

    pub fn is_done(&self) -> bool {
        *self == Self::DONE
    }

    /// True when `next` does not move backwards in percent or phase.
    pub fn admits(&self, next: &ProgressState) -> bool {
        next.percent >= self.percent && next.phase >= self.phase
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::START
    }
}

/// Message from a running codec task to its session.
#[derive(Debug)]
pub(crate) struct RunMessage {
    pub generation: u64,
    pub kind: RunMessageKind,
}

#[derive(Debug)]
pub(crate) enum RunMessageKind {
    Progress(ProgressState),
    Finished(Result<CodecOutput, CodecError>),
}

/// Handle a codec uses to report progress and to notice cancellation.
#[derive(Clone)]
pub struct ProgressReporter {
    generation: u64,
    tx: Option<mpsc::UnboundedSender<RunMessage>>,
    cancel: Option<watch::Receiver<bool>>,
    last: Arc<Mutex<ProgressState>>,
}

impl ProgressReporter {
    pub(crate) fn new(
        generation: u64,
        tx: mpsc::UnboundedSender<RunMessage>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            generation,
            tx: Some(tx),
            cancel: Some(cancel),
            last: Arc::new(Mutex::new(ProgressState::START)),
        }
    }

    /// A reporter with no observer that is never cancelled. Used when a
    /// codec is driven directly rather than through a session.
    pub fn detached() -> Self {
        Self {
            generation: 0,
            tx: None,
            cancel: None,
            last: Arc::new(Mutex::new(ProgressState::START)),
        }
    }

    /// Reports a milestone. Returns `false` once the run is cancelled or
    /// nobody is listening any more.
    pub fn report(&self, phase: Phase, percent: f32) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let next = ProgressState::new(phase, percent);
        {
            let mut last = match self.last.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !last.admits(&next) {
                return true;
            }
            *last = next;
        }
        match &self.tx {
            Some(tx) => tx
                .send(RunMessage {
                    generation: self.generation,
                    kind: RunMessageKind::Progress(next),
                })
                .is_ok(),
            None => true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.cancel {
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
            None => false,
        }
    }

    /// Resolves once the run is cancelled or its session is gone.
    /// Never resolves for a detached reporter.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancel else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        // wait_for returns Err when the sender is dropped, which also ends the run
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn last(&self) -> ProgressState {
        match self.last.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn finish(&self, result: Result<CodecOutput, CodecError>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(RunMessage {
                generation: self.generation,
                kind: RunMessageKind::Finished(result),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> (
        ProgressReporter,
        mpsc::UnboundedReceiver<RunMessage>,
        watch::Sender<bool>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (ProgressReporter::new(7, tx, cancel_rx), rx, cancel_tx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RunMessage>) -> Vec<ProgressState> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            assert_eq!(msg.generation, 7);
            if let RunMessageKind::Progress(p) = msg.kind {
                out.push(p);
            }
        }
        out
    }

    #[test]
    fn drops_backwards_values() {
        let (r, mut rx, _cancel) = reporter();
        assert!(r.report(Phase::Analyzing, 10.0));
        assert!(r.report(Phase::OptimizingImages, 40.0));
        assert!(r.report(Phase::OptimizingImages, 30.0));
        assert!(r.report(Phase::Analyzing, 50.0));
        assert!(r.report(Phase::CompressingContent, 180.0));

        let seen = drain(&mut rx);
        assert_eq!(
            seen,
            vec![
                ProgressState::new(Phase::Analyzing, 10.0),
                ProgressState::new(Phase::OptimizingImages, 40.0),
                ProgressState::new(Phase::CompressingContent, 100.0),
            ]
        );
    }

    #[test]
    fn silent_after_cancel() {
        let (r, mut rx, cancel) = reporter();
        assert!(r.report(Phase::Analyzing, 5.0));
        cancel.send(true).unwrap();
        assert!(r.is_cancelled());
        assert!(!r.report(Phase::Analyzing, 6.0));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn session_gone_counts_as_cancelled() {
        let (r, rx, cancel) = reporter();
        drop(rx);
        drop(cancel);
        assert!(r.is_cancelled());
        assert!(!r.report(Phase::Analyzing, 1.0));
    }

    #[test]
    fn detached_never_cancels() {
        let r = ProgressReporter::detached();
        assert!(r.report(Phase::PreparingResult, 100.0));
        assert!(!r.is_cancelled());
        assert!(r.last().is_done());
    }

    #[test]
    fn phase_thresholds() {
        assert_eq!(Phase::for_percent(0.0), Phase::Analyzing);
        assert_eq!(Phase::for_percent(25.0), Phase::OptimizingImages);
        assert_eq!(Phase::for_percent(89.9), Phase::CompressingContent);
        assert_eq!(Phase::for_percent(100.0), Phase::PreparingResult);
    }
}
