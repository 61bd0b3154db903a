//! Image XObject re-encoding.
//!
//! Images are detached from the document as [`ImageJob`]s so they can be
//! re-encoded in parallel, then written back with [`apply`].

use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView};
use lopdf::{Document, Object, ObjectId, Stream};

/// How images should come out of the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Longest allowed pixel side; `None` keeps dimensions.
    pub max_dim: Option<u32>,
}

/// One image stream (and its soft mask), copied out of the document.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub id: ObjectId,
    pub image: Stream,
    pub smask: Option<(ObjectId, Stream)>,
}

impl ImageJob {
    fn encoded_len(&self) -> usize {
        self.image.content.len() + self.smask.as_ref().map_or(0, |(_, s)| s.content.len())
    }
}

#[derive(Debug)]
pub enum ImageOutcome {
    Replaced {
        image: Stream,
        smask: Option<Stream>,
        actions: String,
    },
    Kept(String),
}

fn name_of(obj: Option<&Object>) -> Option<&[u8]> {
    match obj {
        Some(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

fn is_image(stream: &Stream) -> bool {
    name_of(stream.dict.get(b"Subtype").ok()) == Some(b"Image".as_slice())
}

fn smask_of(stream: &Stream) -> Option<ObjectId> {
    match stream.dict.get(b"SMask") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    }
}

/// Replaces an indirect `Filter`/`DecodeParms` value, or indirect array
/// members, with the objects they point at.
fn resolve_indirect(doc: &Document, value: &Object) -> Option<Object> {
    match value {
        Object::Reference(id) => Some(doc.objects.get(id).cloned().unwrap_or(Object::Null)),
        Object::Array(items) => {
            let mut changed = false;
            let resolved: Vec<Object> = items
                .iter()
                .map(|item| match item {
                    Object::Reference(id) => match doc.objects.get(id) {
                        Some(obj) => {
                            changed = true;
                            obj.clone()
                        }
                        None => item.clone(),
                    },
                    other => other.clone(),
                })
                .collect();
            changed.then_some(Object::Array(resolved))
        }
        _ => None,
    }
}

/// Collects every image stream of `doc`. Soft masks travel with the image
/// that owns them and are not returned as jobs of their own.
pub fn collect_jobs(doc: &mut Document) -> Vec<ImageJob> {
    let image_ids: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter_map(|(id, obj)| match obj {
            Object::Stream(stream) if is_image(stream) => Some(*id),
            _ => None,
        })
        .collect();

    for id in &image_ids {
        let updates: Vec<(&'static str, Object)> = {
            let snapshot: &Document = doc;
            match snapshot.objects.get(id) {
                Some(Object::Stream(stream)) => ["Filter", "DecodeParms"]
                    .into_iter()
                    .filter_map(|key| {
                        let value = stream.dict.get(key.as_bytes()).ok()?;
                        resolve_indirect(snapshot, value).map(|v| (key, v))
                    })
                    .collect(),
                _ => continue,
            }
        };
        if let Some(Object::Stream(stream)) = doc.objects.get_mut(id) {
            for (key, value) in updates {
                stream.dict.set(key, value);
            }
        }
    }

    let masks: HashSet<ObjectId> = image_ids
        .iter()
        .filter_map(|id| match doc.objects.get(id) {
            Some(Object::Stream(stream)) => smask_of(stream),
            _ => None,
        })
        .collect();

    image_ids
        .into_iter()
        .filter(|id| !masks.contains(id))
        .filter_map(|id| {
            let image = match doc.objects.get(&id) {
                Some(Object::Stream(s)) => s.clone(),
                _ => return None,
            };
            let smask = smask_of(&image).and_then(|sid| match doc.objects.get(&sid) {
                Some(Object::Stream(s)) => Some((sid, s.clone())),
                _ => None,
            });
            Some(ImageJob { id, image, smask })
        })
        .collect()
}

/// Writes a re-encoded image back into `doc`.
pub fn apply(doc: &mut Document, job: &ImageJob, image: Stream, smask: Option<Stream>) {
    doc.objects.insert(job.id, Object::Stream(image));
    if let (Some((sid, _)), Some(mask)) = (&job.smask, smask) {
        doc.objects.insert(*sid, Object::Stream(mask));
    }
}

fn is_dct(stream: &Stream) -> bool {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"DCTDecode",
        Ok(Object::Array(arr)) => arr
            .iter()
            .any(|o| matches!(o, Object::Name(name) if name == b"DCTDecode")),
        _ => false,
    }
}

/// Decoded samples of a stream. Unfiltered streams are returned as is;
/// zlib data lopdf refuses is inflated with flate2 directly.
fn inflate(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    match stream.decompressed_content() {
        Ok(content) => Ok(content),
        Err(e) => {
            if name_of(stream.dict.get(b"Filter").ok()) == Some(b"FlateDecode".as_slice()) {
                let mut decoder = flate2::read::ZlibDecoder::new(&stream.content[..]);
                let mut buffer = Vec::new();
                decoder
                    .read_to_end(&mut buffer)
                    .context("zlib fallback failed")?;
                Ok(buffer)
            } else {
                Err(anyhow!("cannot decode stream: {:?}", e))
            }
        }
    }
}

fn dimensions(stream: &Stream) -> (u32, u32) {
    let get = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .and_then(|o| o.as_i64())
            .unwrap_or(0)
            .max(0) as u32
    };
    (get(b"Width"), get(b"Height"))
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let [c, m, y, k] = [cmyk[0], cmyk[1], cmyk[2], cmyk[3]].map(|v| v as f32 / 255.0);
            [
                ((1.0 - c) * (1.0 - k) * 255.0) as u8,
                ((1.0 - m) * (1.0 - k) * 255.0) as u8,
                ((1.0 - y) * (1.0 - k) * 255.0) as u8,
            ]
        })
        .collect()
}

/// Reasons an image is left alone before any decoding is attempted.
fn unsupported(stream: &Stream) -> Option<&'static str> {
    if matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return Some("stencil mask");
    }
    if let Ok(Object::Array(cs)) = stream.dict.get(b"ColorSpace") {
        if name_of(cs.first()) == Some(b"Indexed".as_slice()) {
            return Some("indexed colour");
        }
    }
    match stream.dict.get(b"BitsPerComponent").and_then(|o| o.as_i64()) {
        Ok(bpc) if bpc != 8 && !is_dct(stream) => Some("not 8 bits per component"),
        _ => None,
    }
}

fn decode_image(stream: &Stream) -> Result<DynamicImage> {
    let (width, height) = dimensions(stream);
    let content = if is_dct(stream) {
        // lopdf does not decode DCT; the raw bytes are a JPEG file
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())
    } else {
        inflate(stream)?
    };

    let pixels = width as usize * height as usize;
    let components = match name_of(stream.dict.get(b"ColorSpace").ok()) {
        Some(b"DeviceGray") => 1,
        Some(b"DeviceRGB") => 3,
        Some(b"DeviceCMYK") => 4,
        Some(_) => 3,
        None if content.len() == pixels => 1,
        None if content.len() == pixels * 4 => 4,
        None => 3,
    };

    let img = match components {
        1 => image::GrayImage::from_raw(width, height, content.clone())
            .map(DynamicImage::ImageLuma8)
            .or_else(|| image::load_from_memory(&content).ok())
            .ok_or_else(|| anyhow!("undecodable gray image"))?,
        3 => image::RgbImage::from_raw(width, height, content.clone())
            .map(DynamicImage::ImageRgb8)
            .or_else(|| image::load_from_memory(&content).ok())
            .ok_or_else(|| anyhow!("undecodable RGB image"))?,
        _ => match image::load_from_memory(&content) {
            Ok(img) => img,
            Err(_) => image::RgbImage::from_raw(width, height, cmyk_to_rgb(&content))
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| anyhow!("undecodable CMYK image"))?,
        },
    };
    Ok(img)
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(rgb, width, height, ExtendedColorType::Rgb8)
        .context("JPEG encoding failed")?;
    Ok(buffer)
}

fn deflate(samples: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(samples)?;
    Ok(encoder.finish()?)
}

fn rewrite(
    mut stream: Stream,
    content: Vec<u8>,
    filter: &str,
    color_space: &str,
    w: u32,
    h: u32,
) -> Stream {
    let dict = &mut stream.dict;
    dict.set("Length", Object::Integer(content.len() as i64));
    dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    dict.set("Width", Object::Integer(w as i64));
    dict.set("Height", Object::Integer(h as i64));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.remove(b"DecodeParms");
    dict.remove(b"Decode");
    stream.content = content;
    stream
}

/// Re-encodes one image per `settings`. The result is only `Replaced` when
/// it is smaller than what the document holds now.
pub fn reencode(job: &ImageJob, settings: ImageSettings) -> Result<ImageOutcome> {
    if let Some(reason) = unsupported(&job.image) {
        return Ok(ImageOutcome::Kept(reason.to_string()));
    }

    let mut actions = Vec::new();
    if is_dct(&job.image) {
        actions.push("was JPEG".to_string());
    }
    let mut img = decode_image(&job.image)?;
    let (width, height) = img.dimensions();

    let mut masked = false;
    if let Some((_, mask_stream)) = &job.smask {
        let (mw, mh) = dimensions(mask_stream);
        if (mw, mh) == (width, height) {
            let samples = inflate(mask_stream).context("failed to decode soft mask")?;
            let mask = image::GrayImage::from_raw(mw, mh, samples)
                .ok_or_else(|| anyhow!("soft mask size mismatch"))?;
            let mut rgba = img.to_rgba8();
            for (x, y, pixel) in rgba.enumerate_pixels_mut() {
                pixel[3] = mask.get_pixel(x, y)[0];
            }
            img = DynamicImage::ImageRgba8(rgba);
            masked = true;
            actions.push("applied SMask".to_string());
        }
    }

    let img = match settings.max_dim {
        Some(max) if width > max || height > max => {
            let resized = img.resize(max, max, FilterType::Lanczos3);
            actions.push(format!(
                "resize {}x{} -> {}x{}",
                width,
                height,
                resized.width(),
                resized.height()
            ));
            resized
        }
        _ => img,
    };
    let (w, h) = img.dimensions();

    let (image, smask) = if masked {
        let rgba = img.to_rgba8();
        let mut rgb = Vec::with_capacity((w * h * 3) as usize);
        let mut alpha = Vec::with_capacity((w * h) as usize);
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel[3]);
        }
        actions.push(format!("JPEG(q={}) + Flate alpha", settings.quality));
        let color = encode_jpeg(&rgb, w, h, settings.quality)?;
        let alpha = deflate(&alpha)?;
        let mask_stream = job.smask.as_ref().map(|(_, s)| s.clone());
        (
            rewrite(job.image.clone(), color, "DCTDecode", "DeviceRGB", w, h),
            mask_stream.map(|s| rewrite(s, alpha, "FlateDecode", "DeviceGray", w, h)),
        )
    } else {
        actions.push(format!("JPEG(q={})", settings.quality));
        let rgb = img.to_rgb8();
        let color = encode_jpeg(rgb.as_raw(), w, h, settings.quality)?;
        (
            rewrite(job.image.clone(), color, "DCTDecode", "DeviceRGB", w, h),
            None,
        )
    };

    let new_len = image.content.len() + smask.as_ref().map_or(0, |s| s.content.len());
    if new_len >= job.encoded_len() {
        return Ok(ImageOutcome::Kept(format!(
            "re-encoded size {} is not below {}",
            new_len,
            job.encoded_len()
        )));
    }

    Ok(ImageOutcome::Replaced {
        image,
        smask,
        actions: actions.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Dictionary;

    fn noise_rgb(w: u32, h: u32) -> Vec<u8> {
        let mut state = 0x2545_f491_u32;
        (0..w * h * 3)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect()
    }

    fn flate_image(w: u32, h: u32) -> Stream {
        let dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(w as i64)),
            ("Height", Object::Integer(h as i64)),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("Filter", Object::Name(b"FlateDecode".to_vec())),
        ]);
        Stream::new(dict, deflate(&noise_rgb(w, h)).unwrap())
    }

    #[test]
    fn downscales_to_max_dim() {
        let job = ImageJob {
            id: (5, 0),
            image: flate_image(300, 150),
            smask: None,
        };
        let outcome = reencode(
            &job,
            ImageSettings {
                quality: 30,
                max_dim: Some(100),
            },
        )
        .unwrap();
        match outcome {
            ImageOutcome::Replaced { image, smask, actions } => {
                assert_eq!(dimensions(&image), (100, 50));
                assert!(is_dct(&image));
                assert!(smask.is_none());
                assert!(actions.contains("resize 300x150 -> 100x50"));
            }
            ImageOutcome::Kept(reason) => panic!("image kept: {}", reason),
        }
    }

    #[test]
    fn raw_samples_without_filter_decode() {
        let w = 8;
        let h = 4;
        let mut stream = flate_image(w, h);
        stream.dict.remove(b"Filter");
        stream.content = noise_rgb(w, h);
        let img = decode_image(&stream).unwrap();
        assert_eq!(img.dimensions(), (8, 4));
    }

    #[test]
    fn stencil_masks_are_kept() {
        let mut stream = flate_image(4, 4);
        stream.dict.set("ImageMask", Object::Boolean(true));
        let job = ImageJob {
            id: (1, 0),
            image: stream,
            smask: None,
        };
        let outcome = reencode(&job, ImageSettings { quality: 50, max_dim: None }).unwrap();
        assert!(matches!(outcome, ImageOutcome::Kept(_)));
    }

    #[test]
    fn cmyk_conversion() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), vec![255, 255, 255]);
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 255]), vec![0, 0, 0]);
        assert_eq!(cmyk_to_rgb(&[255, 0, 0, 0, 9]), vec![0, 255, 255]);
    }
}
