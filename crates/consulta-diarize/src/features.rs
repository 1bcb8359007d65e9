//! Per-segment audio feature extraction for speaker discrimination.
//!
//! Six features per segment: pitch mean/std/range (autocorrelation F0 in the
//! 50–400 Hz voice band), RMS energy, spectral centroid, zero-crossing rate.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Feature vector length.
pub const FEATURE_DIM: usize = 6;

const FRAME_LEN: usize = 1024;
const HOP_LEN: usize = 512;
const PITCH_MIN_HZ: f32 = 50.0;
const PITCH_MAX_HZ: f32 = 400.0;

/// Default pitch statistics for unvoiced segments, matching typical speech.
const DEFAULT_PITCH_MEAN: f64 = 150.0;
const DEFAULT_PITCH_STD: f64 = 20.0;

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / len as f32).cos())
        .collect()
}

/// Estimate F0 of one frame by normalized autocorrelation; None if unvoiced.
fn frame_pitch(frame: &[f32], sr: u32) -> Option<f32> {
    let min_lag = (sr as f32 / PITCH_MAX_HZ) as usize;
    let max_lag = ((sr as f32 / PITCH_MIN_HZ) as usize).min(frame.len().saturating_sub(1));
    if min_lag == 0 || max_lag <= min_lag {
        return None;
    }

    let energy: f32 = frame.iter().map(|s| s * s).sum();
    if energy < 1e-6 {
        return None;
    }

    let mut best_lag = 0usize;
    let mut best_corr = 0f32;
    for lag in min_lag..=max_lag {
        let mut corr = 0f32;
        for i in 0..frame.len() - lag {
            corr += frame[i] * frame[i + lag];
        }
        let corr = corr / energy;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_corr > 0.3 && best_lag > 0 {
        Some(sr as f32 / best_lag as f32)
    } else {
        None
    }
}

/// Spectral centroid of one Hann-windowed frame, in Hz.
fn frame_centroid(frame: &[f32], sr: u32, planner: &mut FftPlanner<f32>) -> f32 {
    let n = frame.len();
    let fft = planner.plan_fft_forward(n);
    let window = hann_window(n);
    let mut buf: Vec<Complex<f32>> = frame
        .iter()
        .zip(window.iter())
        .map(|(s, w)| Complex::new(s * w, 0.0))
        .collect();
    fft.process(&mut buf);

    let bins = n / 2 + 1;
    let mut weighted = 0f32;
    let mut total = 0f32;
    for (k, value) in buf.iter().take(bins).enumerate() {
        let magnitude = value.norm();
        let freq = k as f32 * sr as f32 / n as f32;
        weighted += freq * magnitude;
        total += magnitude;
    }
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

/// Extract the 6-feature vector for one audio segment.
///
/// Segments shorter than 100 ms yield a zero vector (no evidence).
pub fn extract_features(samples: &[f32], sr: u32) -> [f64; FEATURE_DIM] {
    if samples.len() < (sr as usize) / 10 {
        return [0.0; FEATURE_DIM];
    }

    let mut planner = FftPlanner::new();
    let mut pitches: Vec<f32> = Vec::new();
    let mut centroids: Vec<f32> = Vec::new();
    let mut zcr_total = 0usize;

    let mut offset = 0;
    while offset + FRAME_LEN <= samples.len() {
        let frame = &samples[offset..offset + FRAME_LEN];
        if let Some(f0) = frame_pitch(frame, sr) {
            pitches.push(f0);
        }
        centroids.push(frame_centroid(frame, sr, &mut planner));
        offset += HOP_LEN;
    }
    if centroids.is_empty() {
        // Single short frame covering the whole segment.
        centroids.push(frame_centroid(samples, sr, &mut planner));
        if let Some(f0) = frame_pitch(samples, sr) {
            pitches.push(f0);
        }
    }

    for pair in samples.windows(2) {
        if (pair[0] >= 0.0) != (pair[1] >= 0.0) {
            zcr_total += 1;
        }
    }
    let zcr = zcr_total as f64 / samples.len() as f64;

    let rms = (samples.iter().map(|s| (*s as f64) * (*s as f64)).sum::<f64>()
        / samples.len() as f64)
        .sqrt();

    let (pitch_mean, pitch_std, pitch_range) = if pitches.is_empty() {
        (DEFAULT_PITCH_MEAN, DEFAULT_PITCH_STD, 0.0)
    } else {
        let mean = pitches.iter().map(|p| *p as f64).sum::<f64>() / pitches.len() as f64;
        let var = pitches
            .iter()
            .map(|p| (*p as f64 - mean).powi(2))
            .sum::<f64>()
            / pitches.len() as f64;
        let min = pitches.iter().cloned().fold(f32::INFINITY, f32::min) as f64;
        let max = pitches.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
        (mean, var.sqrt(), max - min)
    };

    let centroid_mean =
        centroids.iter().map(|c| *c as f64).sum::<f64>() / centroids.len() as f64;

    [pitch_mean, pitch_std, rms, centroid_mean, zcr, pitch_range]
}

/// Z-normalize feature rows across the recording, per column.
pub fn znormalize(rows: &mut [[f64; FEATURE_DIM]]) {
    if rows.len() < 2 {
        return;
    }
    for col in 0..FEATURE_DIM {
        let mean = rows.iter().map(|r| r[col]).sum::<f64>() / rows.len() as f64;
        let var =
            rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / rows.len() as f64;
        let std = var.sqrt();
        if std > 1e-12 {
            for row in rows.iter_mut() {
                row[col] = (row[col] - mean) / std;
            }
        } else {
            for row in rows.iter_mut() {
                row[col] = 0.0;
            }
        }
    }
}
