//! Browser entry points. Everything runs in memory; no filesystem access.

use wasm_bindgen::prelude::*;

use crate::codec::lopdf_codec;
use crate::policy::{self, CompressionLevel};
use crate::progress::ProgressReporter;

fn parse_level(level: &str) -> Result<CompressionLevel, JsError> {
    level.parse::<CompressionLevel>().map_err(|e| JsError::new(&e))
}

/// Compresses `input` at `level` ("low", "medium" or "high") with the
/// real codec and returns the new PDF bytes.
#[wasm_bindgen]
pub fn compress_pdf(input: &[u8], level: &str) -> Result<Vec<u8>, JsError> {
    let params = policy::parameters_for(parse_level(level)?);
    let output = lopdf_codec::compress_bytes(input, params, &ProgressReporter::detached())
        .map_err(|e| JsError::new(&e.to_string()))?;
    Ok(output.payload)
}

/// Size the policy expects for a file of `original_size` bytes.
#[wasm_bindgen]
pub fn expected_compressed_size(original_size: f64, level: &str) -> Result<f64, JsError> {
    let level = parse_level(level)?;
    Ok(policy::expected_compressed_size(original_size.max(0.0) as u64, level) as f64)
}
