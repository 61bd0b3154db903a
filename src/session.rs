//! The compression session: one document's way from selection to a
//! downloadable result.
//!
//! ```text
//! Idle --select--> Selected --choose_level--> Configuring --start--> Compressing
//!                                                                     |
//!                      Idle <--(codec error)--------------------------+
//!                                                                     v
//!                                                                 Completed
//! ```
//! `reset` returns to `Idle` from anywhere. A running compression executes on
//! a tokio task; the session learns about it only through
//! [`CompressionSession::next_event`], and discards anything that belongs to
//! a run it has since reset or replaced.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::codec::{CodecOutput, PdfCodecPort};
use crate::error::{CodecError, SessionError, ValidationError};
use crate::payload::{PayloadHandle, PayloadStore};
use crate::policy::{self, CompressionLevel};
use crate::progress::{ProgressReporter, ProgressState, RunMessage, RunMessageKind};
use crate::validator::{self, Document, FileCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Selected,
    Configuring,
    Compressing,
    Completed,
}

/// Figures describing a finished compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStats {
    pub original_size: u64,
    pub compressed_size: u64,
    pub page_count: u32,
    /// `round((1 - compressed / original) * 100)`; negative if the file grew.
    pub reduction_percent: i64,
}

/// What observers see while a run is active. A run ends with exactly one
/// of `Completed` or `Failed`, always after its last `Progress`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Progress(ProgressState),
    Completed(ResultStats),
    Failed(CodecError),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Progress(_))
    }
}

/// The completed output. Owns the payload handle; dropping the artifact
/// revokes it.
#[derive(Debug)]
pub struct ResultArtifact {
    pub stats: ResultStats,
    pub file_name: String,
    payload: PayloadHandle,
}

impl ResultArtifact {
    pub fn payload(&self) -> &PayloadHandle {
        &self.payload
    }

    pub fn release(self) {
        self.payload.release();
    }
}

/// Bytes ready to be saved under `file_name`.
#[derive(Clone)]
pub struct Download {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Bookkeeping for the run in flight. Dropping it signals cancellation and
/// closes the channel, so a late result has nowhere to go.
struct ActiveRun {
    generation: u64,
    rx: mpsc::UnboundedReceiver<RunMessage>,
    cancel: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

pub struct CompressionSession {
    codec: Arc<dyn PdfCodecPort>,
    store: PayloadStore,
    state: SessionState,
    document: Option<Document>,
    level: Option<CompressionLevel>,
    progress: ProgressState,
    result: Option<ResultArtifact>,
    generation: u64,
    run: Option<ActiveRun>,
    pending: VecDeque<SessionEvent>,
}

impl CompressionSession {
    pub fn new(codec: Arc<dyn PdfCodecPort>) -> Self {
        Self::with_store(codec, PayloadStore::new())
    }

    /// A session whose payloads live in `store`.
    pub fn with_store(codec: Arc<dyn PdfCodecPort>, store: PayloadStore) -> Self {
        Self {
            codec,
            store,
            state: SessionState::Idle,
            document: None,
            level: None,
            progress: ProgressState::START,
            result: None,
            generation: 0,
            run: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn level(&self) -> Option<CompressionLevel> {
        self.level
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn result(&self) -> Option<&ResultArtifact> {
        self.result.as_ref()
    }

    /// Identifies the current run; bumped on every start and reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> &PayloadStore {
        &self.store
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            debug!("session: {:?} -> {:?}", self.state, to);
            self.state = to;
        }
    }

    fn release_result(&mut self) {
        if let Some(artifact) = self.result.take() {
            artifact.release();
        }
    }

    /// Takes a new file. On rejection nothing changes; on success whatever
    /// the session held before is discarded first.
    pub fn select(&mut self, candidate: FileCandidate) -> Result<(), ValidationError> {
        let document = validator::validate(candidate)?;
        self.reset();
        info!(
            "selected {:?} ({} bytes)",
            document.name(),
            document.byte_size()
        );
        self.document = Some(document);
        self.transition(SessionState::Selected);
        Ok(())
    }

    /// [`select`](Self::select) for a multi-file pick: only the first file
    /// counts, and an empty pick does nothing.
    pub fn select_first(
        &mut self,
        candidates: Vec<FileCandidate>,
    ) -> Option<Result<(), ValidationError>> {
        if candidates.len() > 1 {
            debug!("{} files selected, only the first is considered", candidates.len());
        }
        let first = candidates.into_iter().next()?;
        Some(self.select(first))
    }

    /// Picks the level for the next run. From `Completed` this drops the
    /// previous result so the same document can be compressed again.
    pub fn choose_level(&mut self, level: CompressionLevel) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => Err(SessionError::NotReady("no document selected")),
            SessionState::Compressing => Err(SessionError::AlreadyInProgress),
            SessionState::Selected | SessionState::Configuring | SessionState::Completed => {
                self.release_result();
                self.level = Some(level);
                self.transition(SessionState::Configuring);
                Ok(())
            }
        }
    }

    /// Launches the codec on a task of the current tokio runtime; without
    /// one this is `NoRuntime` and nothing changes.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Compressing {
            return Err(SessionError::AlreadyInProgress);
        }
        let Some(document) = self.document.clone() else {
            return Err(SessionError::NotReady("no document selected"));
        };
        let Some(level) = self.level else {
            return Err(SessionError::NotReady("no compression level chosen"));
        };
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        self.release_result();
        self.generation += 1;
        self.progress = ProgressState::START;
        self.pending.clear();
        self.pending.push_back(SessionEvent::Progress(ProgressState::START));

        let params = policy::parameters_for(level);
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let reporter = ProgressReporter::new(self.generation, tx, cancel_rx);
        let codec = Arc::clone(&self.codec);

        info!(
            "compressing {:?} at level {} with the {} codec (run {})",
            document.name(),
            level,
            codec.kind(),
            self.generation
        );
        let task = runtime.spawn(async move {
            let result = codec.compress(&document, params, &reporter).await;
            reporter.finish(result);
        });

        self.run = Some(ActiveRun {
            generation: self.generation,
            rx,
            cancel,
            _task: task,
        });
        self.transition(SessionState::Compressing);
        Ok(())
    }

    /// Next event of the active run, or `None` when nothing is running and
    /// nothing is queued.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let run = self.run.as_mut()?;
            let run_generation = run.generation;
            let Some(message) = run.rx.recv().await else {
                return Some(self.fail(CodecError::Internal(
                    "codec task ended without a result".to_string(),
                )));
            };

            if message.generation != self.generation || run_generation != self.generation {
                debug!(
                    "discarding message from stale run {} (current {})",
                    message.generation, self.generation
                );
                continue;
            }

            match message.kind {
                RunMessageKind::Progress(next) => {
                    if self.progress.admits(&next) && next != self.progress {
                        self.progress = next;
                        return Some(SessionEvent::Progress(next));
                    }
                }
                RunMessageKind::Finished(Ok(output)) => self.complete(output),
                RunMessageKind::Finished(Err(e)) => return Some(self.fail(e)),
            }
        }
    }

    /// Drives the active run to its terminal event, handing every event to
    /// `observer` on the way.
    pub async fn run_to_end<F>(&mut self, mut observer: F) -> Option<SessionEvent>
    where
        F: FnMut(&SessionEvent),
    {
        while let Some(event) = self.next_event().await {
            observer(&event);
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    /// Queues the terminal progress event (if the codec stopped short of
    /// it) and then `Completed`.
    fn complete(&mut self, output: CodecOutput) {
        self.run = None;
        let Some((original_size, file_name)) = self
            .document
            .as_ref()
            .map(|d| (d.byte_size(), d.download_name()))
        else {
            return;
        };

        let compressed_size = output.payload.len() as u64;
        let stats = ResultStats {
            original_size,
            compressed_size,
            page_count: output.page_count,
            reduction_percent: policy::reduction_percent(original_size, compressed_size),
        };
        self.release_result();
        self.result = Some(ResultArtifact {
            stats: stats.clone(),
            file_name,
            payload: self.store.create(output.payload),
        });

        if !self.progress.is_done() {
            self.progress = ProgressState::DONE;
            self.pending.push_back(SessionEvent::Progress(ProgressState::DONE));
        }
        info!(
            "compressed {} -> {} bytes ({}% smaller), {} pages",
            stats.original_size, stats.compressed_size, stats.reduction_percent, stats.page_count
        );
        self.pending.push_back(SessionEvent::Completed(stats));
        self.transition(SessionState::Completed);
    }

    /// A failed run leaves nothing behind: no document, no progress, no
    /// artifact.
    fn fail(&mut self, e: CodecError) -> SessionEvent {
        error!("compression failed: {}", e);
        self.reset();
        SessionEvent::Failed(e)
    }

    /// Drops everything and returns to `Idle`. Safe to call in any state and
    /// any number of times; a run in flight is cancelled and its eventual
    /// result ignored.
    pub fn reset(&mut self) {
        if let Some(run) = self.run.take() {
            debug!("cancelling run {}", run.generation);
        }
        self.generation += 1;
        self.pending.clear();
        self.release_result();
        self.document = None;
        self.level = None;
        self.progress = ProgressState::START;
        self.transition(SessionState::Idle);
    }

    /// The compressed bytes under their download name.
    pub fn download(&self) -> Result<Download, SessionError> {
        let artifact = match (&self.state, &self.result) {
            (SessionState::Completed, Some(artifact)) => artifact,
            _ => return Err(SessionError::NotReady("no compressed file available")),
        };
        let bytes = artifact
            .payload
            .bytes()
            .ok_or(SessionError::NotReady("compressed file was released"))?;
        Ok(Download {
            file_name: artifact.file_name.clone(),
            bytes,
        })
    }
}

impl Drop for CompressionSession {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for CompressionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionSession")
            .field("state", &self.state)
            .field("codec", &self.codec.kind())
            .field("document", &self.document.as_ref().map(|d| d.name()))
            .field("level", &self.level)
            .field("progress", &self.progress)
            .field("generation", &self.generation)
            .finish()
    }
}
