//! Upload validation: size limits, extension checks, magic-byte sniffing.

use crate::defaults::{AUDIO_ALLOWED_EXTENSIONS, AUDIO_MAX_SIZE_BYTES, DOCUMENT_MAX_SIZE_BYTES};
use crate::error::{Error, Result};
use crate::models::FileKind;

/// Media type detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Wav,
    Mp3,
    Pdf,
    Png,
    Jpeg,
    Tiff,
}

/// Sniff the media type from leading magic bytes.
pub fn sniff(data: &[u8]) -> Option<MediaKind> {
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
        return Some(MediaKind::Wav);
    }
    if data.len() >= 3 && &data[0..3] == b"ID3" {
        return Some(MediaKind::Mp3);
    }
    // Raw MPEG audio frame sync: 11 set bits.
    if data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0 {
        return Some(MediaKind::Mp3);
    }
    if data.len() >= 4 && &data[0..4] == b"%PDF" {
        return Some(MediaKind::Pdf);
    }
    if data.len() >= 8 && data[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some(MediaKind::Png);
    }
    if data.len() >= 3 && data[0..3] == [0xFF, 0xD8, 0xFF] {
        return Some(MediaKind::Jpeg);
    }
    if data.len() >= 4 && (&data[0..4] == b"II*\0" || &data[0..4] == b"MM\0*") {
        return Some(MediaKind::Tiff);
    }
    None
}

fn extension(filename: &str) -> String {
    filename.rsplit('.').next().unwrap_or("").to_lowercase()
}

/// Validate an audio upload: non-empty, within 25 MiB, wav/mp3 extension,
/// magic bytes agreeing with an audio container.
pub fn validate_audio(filename: &str, data: &[u8]) -> Result<MediaKind> {
    if data.is_empty() {
        return Err(Error::InvalidMedia("empty upload".to_string()));
    }
    if data.len() as u64 > AUDIO_MAX_SIZE_BYTES {
        return Err(Error::InvalidMedia(format!(
            "audio exceeds maximum size of {} bytes",
            AUDIO_MAX_SIZE_BYTES
        )));
    }
    let ext = extension(filename);
    if !AUDIO_ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::InvalidMedia(format!(
            "extension .{} not allowed, expected one of {:?}",
            ext, AUDIO_ALLOWED_EXTENSIONS
        )));
    }
    match sniff(data) {
        Some(kind @ (MediaKind::Wav | MediaKind::Mp3)) => Ok(kind),
        _ => Err(Error::InvalidMedia(
            "content does not look like WAV or MP3 audio".to_string(),
        )),
    }
}

/// Validate a document upload: non-empty, within 10 MiB, PDF or image magic.
pub fn validate_document(filename: &str, data: &[u8]) -> Result<FileKind> {
    if data.is_empty() {
        return Err(Error::InvalidMedia("empty upload".to_string()));
    }
    if data.len() as u64 > DOCUMENT_MAX_SIZE_BYTES {
        return Err(Error::InvalidMedia(format!(
            "document exceeds maximum size of {} bytes",
            DOCUMENT_MAX_SIZE_BYTES
        )));
    }
    match sniff(data) {
        Some(MediaKind::Pdf) => Ok(FileKind::Pdf),
        Some(MediaKind::Png | MediaKind::Jpeg | MediaKind::Tiff) => Ok(FileKind::Image),
        _ => Err(Error::InvalidMedia(format!(
            "'{}' is not a recognizable PDF or image",
            filename
        ))),
    }
}

/// MIME type for a sniffed media kind.
pub fn mime_for(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Wav => "audio/wav",
        MediaKind::Mp3 => "audio/mpeg",
        MediaKind::Pdf => "application/pdf",
        MediaKind::Png => "image/png",
        MediaKind::Jpeg => "image/jpeg",
        MediaKind::Tiff => "image/tiff",
    }
}
