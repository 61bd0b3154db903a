//! The PDF codec port and its two implementations.

pub mod images;
pub mod lopdf_codec;
pub mod simulated;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::policy::CodecParameters;
use crate::progress::ProgressReporter;
use crate::validator::Document;

pub use self::lopdf_codec::LopdfCodec;
pub use self::simulated::SimulatedCodec;

/// What a finished codec run hands back.
#[derive(Clone, PartialEq, Eq)]
pub struct CodecOutput {
    pub payload: Vec<u8>,
    pub page_count: u32,
}

impl fmt::Debug for CodecOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecOutput")
            .field("payload_len", &self.payload.len())
            .field("page_count", &self.page_count)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Rewrites the document with lopdf + image.
    Lopdf,
    /// Fabricates policy-sized output without reading the document.
    Simulated,
}

impl Default for CodecKind {
    fn default() -> Self {
        CodecKind::Lopdf
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Lopdf => f.write_str("lopdf"),
            CodecKind::Simulated => f.write_str("simulated"),
        }
    }
}

/// Turns a document into a smaller one.
///
/// `compress` is the only suspension point of a compression run. It reports
/// milestones through `progress` and should stop reporting once
/// `progress.is_cancelled()`; whatever it returns after that is discarded.
#[async_trait]
pub trait PdfCodecPort: Send + Sync {
    async fn compress(
        &self,
        document: &Document,
        params: CodecParameters,
        progress: &ProgressReporter,
    ) -> Result<CodecOutput, CodecError>;

    fn kind(&self) -> CodecKind;
}

/// Builds the codec named by `kind`.
pub fn build(kind: CodecKind, simulated: &crate::config::Simulated) -> Arc<dyn PdfCodecPort> {
    match kind {
        CodecKind::Lopdf => Arc::new(LopdfCodec::new()),
        CodecKind::Simulated => {
            log::warn!("using the SIMULATED codec: output is placeholder data, not a real PDF");
            Arc::new(SimulatedCodec::from_config(simulated))
        }
    }
}
