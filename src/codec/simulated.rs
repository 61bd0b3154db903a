//! Stand-in codec: output size follows the policy ratio, content is filler.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::{CodecKind, CodecOutput, PdfCodecPort};
use crate::config::Simulated;
use crate::error::CodecError;
use crate::policy::{expected_compressed_size, CodecParameters};
use crate::progress::{Phase, ProgressReporter};
use crate::validator::Document;

const PLACEHOLDER_HEADER: &[u8] = b"%PDF-1.7\n% simulated output\n";
pub const MAX_PAGES: u32 = 50;

#[derive(Debug, Clone)]
pub struct SimulatedCodec {
    tick: Duration,
    step_percent: f32,
    page_count: Option<u32>,
}

impl SimulatedCodec {
    pub fn new(tick: Duration, step_percent: f32) -> Self {
        Self {
            tick,
            step_percent: step_percent.clamp(1.0, 100.0),
            page_count: None,
        }
    }

    pub fn from_config(cfg: &Simulated) -> Self {
        Self::new(Duration::from_millis(cfg.tick_ms), cfg.step_percent as f32)
    }

    /// Reports `pages` instead of a random page count.
    pub fn with_page_count(mut self, pages: u32) -> Self {
        self.page_count = Some(pages);
        self
    }

    fn page_count(&self) -> u32 {
        self.page_count
            .unwrap_or_else(|| rand::rng().random_range(1..=MAX_PAGES))
    }

    /// Ticks progress up to 100. Returns early, without error, on cancel.
    async fn tick_progress(&self, progress: &ProgressReporter) {
        let mut percent = 0.0_f32;
        loop {
            percent = (percent + self.step_percent).min(100.0);
            tokio::select! {
                _ = progress.cancelled() => {
                    log::debug!("simulated run cancelled at {:.0}%", percent);
                    return;
                }
                _ = tokio::time::sleep(self.tick) => {}
            }
            let phase = if percent >= 100.0 {
                Phase::PreparingResult
            } else {
                Phase::for_percent(percent)
            };
            if !progress.report(phase, percent) || percent >= 100.0 {
                return;
            }
        }
    }
}

impl Default for SimulatedCodec {
    fn default() -> Self {
        Self::from_config(&Simulated::default())
    }
}

/// Filler of exactly `size` bytes that at least starts like a PDF.
fn placeholder_payload(size: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(size);
    payload.extend_from_slice(&PLACEHOLDER_HEADER[..PLACEHOLDER_HEADER.len().min(size)]);
    payload.resize(size, b' ');
    payload
}

#[async_trait]
impl PdfCodecPort for SimulatedCodec {
    async fn compress(
        &self,
        document: &Document,
        params: CodecParameters,
        progress: &ProgressReporter,
    ) -> Result<CodecOutput, CodecError> {
        self.tick_progress(progress).await;

        let target = expected_compressed_size(document.byte_size(), params.level);
        Ok(CodecOutput {
            payload: placeholder_payload(target as usize),
            page_count: self.page_count(),
        })
    }

    fn kind(&self) -> CodecKind {
        CodecKind::Simulated
    }
}
