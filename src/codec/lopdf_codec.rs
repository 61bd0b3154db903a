//! The real codec: loads the PDF with lopdf, re-encodes its images and
//! writes it back out.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lopdf::{Document as PdfDocument, Object, ObjectId};
use rayon::prelude::*;

use super::images::{self, ImageOutcome, ImageSettings};
use super::{CodecKind, CodecOutput, PdfCodecPort};
use crate::error::CodecError;
use crate::policy::CodecParameters;
use crate::progress::{Phase, ProgressReporter};
use crate::validator::Document;

/// US Letter height, used for pages that carry no MediaBox.
const DEFAULT_PAGE_SIDE: f32 = 792.0;
const POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCodec;

impl LopdfCodec {
    pub fn new() -> Self {
        LopdfCodec
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Longest side of a page's MediaBox, following inheritance up the page tree.
fn page_side(doc: &PdfDocument, page_id: ObjectId) -> Option<f32> {
    let mut current = Some(page_id);
    for _ in 0..32 {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(mut media_box) = dict.get(b"MediaBox") {
            if let Object::Reference(id) = media_box {
                media_box = doc.get_object(*id).ok()?;
            }
            let coords: Vec<f32> = media_box.as_array().ok()?.iter().filter_map(number).collect();
            if coords.len() != 4 {
                return None;
            }
            let width = (coords[2] - coords[0]).abs();
            let height = (coords[3] - coords[1]).abs();
            return Some(width.max(height));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Pixel budget for the longest image side so that an image spanning the
/// largest page does not exceed `dpi`.
pub fn max_pixel_side(doc: &PdfDocument, dpi: u32) -> u32 {
    let side = doc
        .get_pages()
        .values()
        .map(|id| page_side(doc, *id).unwrap_or(DEFAULT_PAGE_SIDE))
        .fold(0.0_f32, f32::max);
    let side = if side > 0.0 { side } else { DEFAULT_PAGE_SIDE };
    (side / POINTS_PER_INCH * dpi as f32).ceil().max(1.0) as u32
}

/// Compresses `input` synchronously. This is the whole pipeline; the
/// async port just moves it onto a blocking thread.
pub fn compress_bytes(
    input: &[u8],
    params: CodecParameters,
    progress: &ProgressReporter,
) -> Result<CodecOutput, CodecError> {
    progress.report(Phase::Analyzing, 2.0);
    let mut doc =
        PdfDocument::load_mem(input).map_err(|e| CodecError::LoadFailed(e.to_string()))?;

    if doc.is_encrypted() {
        log::info!("PDF is encrypted, trying the empty password");
        if let Err(e) = doc.decrypt(b"") {
            log::warn!("failed to decrypt with empty password: {:?}", e);
        }
    }

    let page_count = doc.get_pages().len() as u32;
    let settings = ImageSettings {
        quality: params.jpeg_quality(),
        max_dim: params.target_dpi.map(|dpi| max_pixel_side(&doc, dpi)),
    };
    log::debug!(
        "loaded {} pages, level {} -> {:?}",
        page_count,
        params.level,
        settings
    );
    progress.report(Phase::Analyzing, 15.0);

    let jobs = images::collect_jobs(&mut doc);
    progress.report(Phase::OptimizingImages, 20.0);

    let total = jobs.len().max(1);
    let done = AtomicUsize::new(0);
    let outcomes: Vec<_> = jobs
        .par_iter()
        .map(|job| {
            let outcome = if progress.is_cancelled() {
                Ok(ImageOutcome::Kept("run cancelled".to_string()))
            } else {
                images::reencode(job, settings)
            };
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            progress.report(
                Phase::OptimizingImages,
                20.0 + 50.0 * n as f32 / total as f32,
            );
            outcome
        })
        .collect();

    let mut replaced = 0usize;
    for (job, outcome) in jobs.iter().zip(outcomes) {
        match outcome {
            Ok(ImageOutcome::Replaced {
                image,
                smask,
                actions,
            }) => {
                log::debug!("image {}: {}", job.id.0, actions);
                images::apply(&mut doc, job, image, smask);
                replaced += 1;
            }
            Ok(ImageOutcome::Kept(reason)) => {
                log::debug!("image {} kept: {}", job.id.0, reason);
            }
            Err(e) => {
                log::warn!("failed to process image {}: {:#}", job.id.0, e);
            }
        }
    }
    log::info!("re-encoded {} of {} images", replaced, jobs.len());

    progress.report(Phase::CompressingContent, 75.0);
    doc.compress();
    progress.report(Phase::CompressingContent, 90.0);

    let mut buffer = Vec::with_capacity(input.len());
    doc.save_to(&mut buffer)
        .map_err(|e| CodecError::Internal(format!("failed to save PDF: {}", e)))?;
    progress.report(Phase::PreparingResult, 100.0);

    Ok(CodecOutput {
        payload: buffer,
        page_count,
    })
}

#[async_trait]
impl PdfCodecPort for LopdfCodec {
    async fn compress(
        &self,
        document: &Document,
        params: CodecParameters,
        progress: &ProgressReporter,
    ) -> Result<CodecOutput, CodecError> {
        let content = document.shared_content();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || compress_bytes(&content, params, &progress))
            .await
            .map_err(|e| CodecError::Internal(format!("codec task failed: {}", e)))?
    }

    fn kind(&self) -> CodecKind {
        CodecKind::Lopdf
    }
}
