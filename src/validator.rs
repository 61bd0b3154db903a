//! Entry gate: turns a user-supplied file into an accepted [`Document`].

use std::path::Path;
use std::sync::Arc;

use crate::error::ValidationError;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Hard ceiling on accepted input, 50 MiB.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// A file as presented by the user, before any checks.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub name: String,
    /// Declared media type, e.g. `application/pdf`.
    pub media_type: String,
    pub content: Vec<u8>,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            content,
        }
    }

    /// Reads a file from disk and declares its media type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        Ok(Self::new(name, media_type_for_path(path), content))
    }

    pub fn byte_size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Media type a file picker would declare for `path`.
pub fn media_type_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => PDF_MEDIA_TYPE,
        _ => "application/octet-stream",
    }
}

/// An accepted input file. Immutable; the content is shared, not copied,
/// when the document is handed to a codec.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    byte_size: u64,
    content: Arc<[u8]>,
}

impl Document {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn shared_content(&self) -> Arc<[u8]> {
        Arc::clone(&self.content)
    }

    /// Name offered for the compressed download.
    pub fn download_name(&self) -> String {
        format!("compressed_{}", self.name)
    }
}

pub fn validate(candidate: FileCandidate) -> Result<Document, ValidationError> {
    if candidate.media_type != PDF_MEDIA_TYPE {
        return Err(ValidationError::WrongType {
            media_type: candidate.media_type,
        });
    }

    let size = candidate.byte_size();
    if size > MAX_FILE_SIZE {
        return Err(ValidationError::TooLarge {
            size,
            limit: MAX_FILE_SIZE,
        });
    }

    Ok(Document {
        name: candidate.name,
        byte_size: size,
        content: candidate.content.into(),
    })
}

/// Validates the first file of a multi-file selection; the rest are ignored.
/// An empty selection is a no-op and yields `None`.
pub fn validate_selection(
    mut candidates: Vec<FileCandidate>,
) -> Option<Result<Document, ValidationError>> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() > 1 {
        log::debug!(
            "{} files selected, only {:?} is considered",
            candidates.len(),
            candidates[0].name
        );
    }
    Some(validate(candidates.swap_remove(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str, len: usize) -> FileCandidate {
        FileCandidate::new(name, PDF_MEDIA_TYPE, vec![0u8; len])
    }

    #[test]
    fn rejects_non_pdf_media_type() {
        let c = FileCandidate::new("notes.txt", "text/plain", b"hello".to_vec());
        assert_eq!(
            validate(c).unwrap_err(),
            ValidationError::WrongType {
                media_type: "text/plain".into()
            }
        );

        // a .pdf name does not help when the declared type is wrong
        let c = FileCandidate::new("scan.pdf", "image/png", vec![0u8; 4]);
        assert!(matches!(validate(c), Err(ValidationError::WrongType { .. })));
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        let at_limit = validate(pdf("a.pdf", MAX_FILE_SIZE as usize)).unwrap();
        assert_eq!(at_limit.byte_size(), 52_428_800);

        let err = validate(pdf("b.pdf", MAX_FILE_SIZE as usize + 1)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                size: 52_428_801,
                limit: 52_428_800
            }
        );
    }

    #[test]
    fn only_first_of_selection_counts() {
        let picked = validate_selection(vec![
            pdf("first.pdf", 10),
            FileCandidate::new("second.png", "image/png", vec![1, 2, 3]),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(picked.name(), "first.pdf");

        let rejected = validate_selection(vec![
            FileCandidate::new("first.png", "image/png", vec![1]),
            pdf("second.pdf", 10),
        ])
        .unwrap();
        assert!(matches!(rejected, Err(ValidationError::WrongType { .. })));

        assert!(validate_selection(Vec::new()).is_none());
    }

    #[test]
    fn media_type_follows_extension() {
        assert_eq!(media_type_for_path(Path::new("x/Report.PDF")), PDF_MEDIA_TYPE);
        assert_eq!(
            media_type_for_path(Path::new("x/report.docx")),
            "application/octet-stream"
        );
        assert_eq!(media_type_for_path(Path::new("noext")), "application/octet-stream");
    }
}
