//! Minimal PCM16 RIFF/WAVE decoding for diarization feature extraction.

use consulta_core::{Error, Result};

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Samples in [-1, 1], channels averaged.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Slice samples for a time window, clamped to the buffer.
    pub fn window(&self, t_start: f64, t_end: f64) -> &[f32] {
        let start = ((t_start * self.sample_rate as f64) as usize).min(self.samples.len());
        let end = ((t_end * self.sample_rate as f64) as usize).min(self.samples.len());
        &self.samples[start..end.max(start)]
    }
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Decode a PCM16 WAV file. Stereo input is averaged to mono.
pub fn decode_wav(data: &[u8]) -> Result<AudioBuffer> {
    if data.len() < 44 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(Error::InvalidMedia("not a RIFF/WAVE file".to_string()));
    }

    let mut channels: u16 = 0;
    let mut sample_rate: u32 = 0;
    let mut bits_per_sample: u16 = 0;
    let mut pcm_data: Option<&[u8]> = None;

    // Walk chunks after the 12-byte RIFF header.
    let mut offset = 12usize;
    while offset + 8 <= data.len() {
        let chunk_id = &data[offset..offset + 4];
        let chunk_size = read_u32(data, offset + 4)
            .ok_or_else(|| Error::InvalidMedia("truncated WAV chunk".to_string()))?
            as usize;
        let body_start = offset + 8;
        let body_end = (body_start + chunk_size).min(data.len());

        match chunk_id {
            b"fmt " => {
                let format = read_u16(data, body_start).unwrap_or(0);
                if format != 1 {
                    return Err(Error::InvalidMedia(format!(
                        "unsupported WAV format code {}",
                        format
                    )));
                }
                channels = read_u16(data, body_start + 2).unwrap_or(0);
                sample_rate = read_u32(data, body_start + 4).unwrap_or(0);
                bits_per_sample = read_u16(data, body_start + 14).unwrap_or(0);
            }
            b"data" => {
                pcm_data = Some(&data[body_start..body_end]);
            }
            _ => {}
        }
        // Chunks are word-aligned.
        offset = body_start + chunk_size + (chunk_size & 1);
    }

    let pcm = pcm_data.ok_or_else(|| Error::InvalidMedia("WAV has no data chunk".to_string()))?;
    if channels == 0 || sample_rate == 0 {
        return Err(Error::InvalidMedia("WAV has no fmt chunk".to_string()));
    }
    if bits_per_sample != 16 {
        return Err(Error::InvalidMedia(format!(
            "only PCM16 supported, got {} bits",
            bits_per_sample
        )));
    }

    let frame_bytes = 2 * channels as usize;
    let frames = pcm.len() / frame_bytes;
    let mut samples = Vec::with_capacity(frames);
    for frame in 0..frames {
        let mut acc = 0f32;
        for ch in 0..channels as usize {
            let at = frame * frame_bytes + ch * 2;
            let value = i16::from_le_bytes([pcm[at], pcm[at + 1]]);
            acc += value as f32 / i16::MAX as f32;
        }
        samples.push(acc / channels as f32);
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
    })
}

/// Build a PCM16 mono WAV byte buffer, for tests and fixtures.
pub fn encode_wav_mono(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = samples.len() * 2;
    let mut out = Vec::with_capacity(44 + data_len);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
