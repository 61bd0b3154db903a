#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{Dictionary, Document as PdfDocument, Object, Stream};
use pdf_squeeze::validator::PDF_MEDIA_TYPE;
use pdf_squeeze::{
    CodecError, CodecKind, CodecOutput, CodecParameters, Document, FileCandidate, PdfCodecPort,
    Phase, ProgressReporter, SessionEvent, SimulatedCodec,
};
use tokio::sync::Semaphore;

pub fn pdf_candidate(name: &str, content: Vec<u8>) -> FileCandidate {
    FileCandidate::new(name, PDF_MEDIA_TYPE, content)
}

pub fn fast_simulated() -> Arc<dyn PdfCodecPort> {
    Arc::new(SimulatedCodec::new(Duration::ZERO, 10.0).with_page_count(7))
}

fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x9e37_79b9_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// A PDF of `pages` square pages of `side` points. The first page shows a
/// `px` x `px` noise image stored as Flate-compressed RGB.
pub fn pdf_with_image(pages: u32, side: i64, px: u32) -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&noise((px * px * 3) as usize))
        .unwrap();
    let image = Stream::new(
        Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(px as i64)),
            ("Height", Object::Integer(px as i64)),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("Filter", Object::Name(b"FlateDecode".to_vec())),
        ]),
        encoder.finish().unwrap(),
    );
    let image_id = doc.add_object(image);

    let mut kids = Vec::new();
    for i in 0..pages {
        let mut page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(side),
                    Object::Integer(side),
                ]),
            ),
        ]);
        if i == 0 {
            let draw = format!("q {side} 0 0 {side} 0 0 cm /Im1 Do Q");
            let content_id = doc.add_object(Stream::new(Dictionary::new(), draw.into_bytes()));
            let xobjects = Dictionary::from_iter(vec![("Im1", Object::Reference(image_id))]);
            page.set(
                "Resources",
                Dictionary::from_iter(vec![("XObject", Object::Dictionary(xobjects))]),
            );
            page.set("Contents", Object::Reference(content_id));
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(pages as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Reports two milestones, then blocks until the test hands out a permit.
/// Each call returns `run-<n>` so results can be told apart.
pub struct GatedCodec {
    pub gate: Semaphore,
    pub returned: Semaphore,
    calls: AtomicUsize,
}

impl GatedCodec {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            returned: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn open(&self, runs: usize) {
        self.gate.add_permits(runs);
    }

    /// Waits until `runs` calls have returned.
    pub async fn wait_returned(&self, runs: u32) {
        self.returned.acquire_many(runs).await.unwrap().forget();
        // let the spawned task push its result into the (closed) channel
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[async_trait]
impl PdfCodecPort for GatedCodec {
    async fn compress(
        &self,
        _document: &Document,
        _params: CodecParameters,
        progress: &ProgressReporter,
    ) -> Result<CodecOutput, CodecError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        progress.report(Phase::Analyzing, 10.0);
        progress.report(Phase::OptimizingImages, 40.0);
        self.gate.acquire().await.unwrap().forget();
        progress.report(Phase::CompressingContent, 80.0);
        self.returned.add_permits(1);
        Ok(CodecOutput {
            payload: format!("run-{}", n).into_bytes(),
            page_count: n as u32,
        })
    }

    fn kind(&self) -> CodecKind {
        CodecKind::Simulated
    }
}

/// Reports a little progress and then fails.
pub struct FailingCodec;

#[async_trait]
impl PdfCodecPort for FailingCodec {
    async fn compress(
        &self,
        _document: &Document,
        _params: CodecParameters,
        progress: &ProgressReporter,
    ) -> Result<CodecOutput, CodecError> {
        progress.report(Phase::Analyzing, 30.0);
        Err(CodecError::Internal("disk on fire".to_string()))
    }

    fn kind(&self) -> CodecKind {
        CodecKind::Simulated
    }
}

/// Checks the ordering contract of one run's events.
pub fn assert_well_ordered(events: &[SessionEvent]) {
    let terminal: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminal, vec![events.len() - 1], "exactly one terminal event, last");

    let mut last = -1.0_f32;
    let mut last_phase = Phase::Analyzing;
    for e in events {
        if let SessionEvent::Progress(p) = e {
            assert!(p.percent >= 0.0 && p.percent <= 100.0);
            assert!(p.percent >= last, "percent went backwards: {:?}", events);
            assert!(p.phase >= last_phase);
            last = p.percent;
            last_phase = p.phase;
        }
    }
}
