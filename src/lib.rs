//! Browser-oriented PDF compression: validate a file, pick a level, run a
//! codec with progress, hand back a downloadable result.

pub mod codec;
pub mod config;
pub mod error;
pub mod notification;
pub mod payload;
pub mod policy;
pub mod progress;
pub mod report;
pub mod session;
pub mod validator;
pub mod wasm;

pub use codec::{CodecKind, CodecOutput, LopdfCodec, PdfCodecPort, SimulatedCodec};
pub use config::Config;
pub use error::{CodecError, Error, SessionError, ValidationError};
pub use payload::{PayloadHandle, PayloadStore};
pub use policy::{CodecParameters, CompressionLevel};
pub use progress::{Phase, ProgressReporter, ProgressState};
pub use session::{
    CompressionSession, Download, ResultArtifact, ResultStats, SessionEvent, SessionState,
};
pub use validator::{Document, FileCandidate};
