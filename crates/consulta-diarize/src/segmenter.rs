//! Transcript segmentation (when ASR segments are unavailable) and merging
//! of too-short segments.

use once_cell::sync::Lazy;
use regex::Regex;

use consulta_core::SpeakerSegment;

/// Approximate speaking rate used to synthesize timestamps for text-only
/// segmentation.
const SECONDS_PER_WORD: f64 = 0.6;

/// Minimum characters for a synthesized segment.
const MIN_SEGMENT_CHARS: usize = 10;

static SENTENCE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("static pattern must compile"));

/// Split a transcript into utterance-sized chunks on sentence boundaries.
pub fn split_transcript(transcript: &str) -> Vec<String> {
    if transcript.trim().is_empty() {
        return Vec::new();
    }
    let chunks: Vec<String> = SENTENCE_SPLIT
        .split(transcript)
        .map(|s| s.trim().to_string())
        .filter(|s| s.chars().count() > MIN_SEGMENT_CHARS)
        .collect();
    if chunks.is_empty() {
        vec![transcript.trim().to_string()]
    } else {
        chunks
    }
}

/// Synthesize timestamps for text-only chunks at ~0.6 s per word.
pub fn synthesize_timing(chunks: &[String]) -> Vec<(String, f64, f64)> {
    let mut cursor = 0f64;
    chunks
        .iter()
        .map(|text| {
            let words = text.split_whitespace().count().max(1);
            let duration = words as f64 * SECONDS_PER_WORD;
            let start = cursor;
            cursor += duration;
            (text.clone(), start, cursor)
        })
        .collect()
}

/// Merge segments shorter than `min_segment_s` into a same-role neighbor:
/// the previous one when roles match, otherwise the following one. Segments
/// with no same-role neighbor stay as they are.
pub fn merge_short_segments(segments: Vec<SpeakerSegment>, min_segment_s: f64) -> Vec<SpeakerSegment> {
    if segments.len() < 2 {
        return segments;
    }

    let mut merged: Vec<SpeakerSegment> = Vec::with_capacity(segments.len());
    let mut pending: Option<SpeakerSegment> = None;

    for segment in segments {
        // A short head segment waits for the next same-role neighbor.
        if let Some(short) = pending.take() {
            if short.speaker == segment.speaker {
                merged.push(join(short, segment));
                continue;
            }
            merged.push(short);
        }

        if segment.duration() >= min_segment_s {
            merged.push(segment);
            continue;
        }

        let prev_same_role = merged
            .last()
            .map(|prev| prev.speaker == segment.speaker)
            .unwrap_or(false);
        if prev_same_role {
            if let Some(prev) = merged.pop() {
                merged.push(join(prev, segment));
            }
        } else {
            pending = Some(segment);
        }
    }
    if let Some(short) = pending {
        merged.push(short);
    }
    merged
}

fn join(a: SpeakerSegment, b: SpeakerSegment) -> SpeakerSegment {
    let dur_a = a.duration().max(1e-9);
    let dur_b = b.duration().max(1e-9);
    SpeakerSegment {
        speaker: a.speaker,
        text: format!("{} {}", a.text, b.text),
        t_start: a.t_start,
        t_end: b.t_end,
        confidence: (a.confidence * dur_a + b.confidence * dur_b) / (dur_a + dur_b),
        word_count: a.word_count + b.word_count,
    }
}
