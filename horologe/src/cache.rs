use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use image::{ImageError, ImageReader};
use thiserror::Error;
use tiny_skia::{IntSize, Pixmap};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("file not found")]
    NotFound,
    #[error("out of memory")]
    NoMemory,
    #[error("read error")]
    ReadError,
    #[error("unsupported or corrupt image")]
    FormatError,
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => DecodeError::NotFound,
            io::ErrorKind::OutOfMemory => DecodeError::NoMemory,
            _ => DecodeError::ReadError,
        }
    }
}

impl From<ImageError> for DecodeError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(e) => e.into(),
            ImageError::Limits(_) => DecodeError::NoMemory,
            _ => DecodeError::FormatError,
        }
    }
}

/// Decoded backgrounds keyed by the exact path string they were loaded from.
///
/// Entries are never evicted; they live until `clear`. Failed decodes are not
/// remembered, so the next lookup tries the file again.
#[derive(Default)]
pub struct ImageCache {
    entries: HashMap<String, Rc<Pixmap>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_decode(&mut self, path: &str) -> Result<Rc<Pixmap>, DecodeError> {
        if let Some(image) = self.entries.get(path) {
            return Ok(Rc::clone(image));
        }
        let image = Rc::new(decode(path)?);
        tracing::debug!(path, width = image.width(), height = image.height(), "decoded background");
        self.entries.insert(path.to_owned(), Rc::clone(&image));
        Ok(image)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn remove(&mut self, path: &str) -> Option<Rc<Pixmap>> {
        self.entries.remove(path)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn decode(path: &str) -> Result<Pixmap, DecodeError> {
    // Format comes from the file's magic bytes; the extension is only a fallback.
    let rgba = ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgba8();
    let (w, h) = rgba.dimensions();
    let size = IntSize::from_wh(w, h).ok_or(DecodeError::FormatError)?;
    let mut data = rgba.into_raw();
    // tiny-skia stores premultiplied RGBA
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0xff { continue; }
        px[0] = (px[0] as u32 * a / 255) as u8;
        px[1] = (px[1] as u32 * a / 255) as u8;
        px[2] = (px[2] as u32 * a / 255) as u8;
    }
    Pixmap::from_vec(data, size).ok_or(DecodeError::NoMemory)
}
