//! # consulta-diarize
//!
//! Hybrid audio+text speaker diarization for two-party clinical
//! conversations (health promoter vs. patient).
//!
//! When raw WAV audio and ASR segments are available, each segment gets a
//! 6-feature audio vector; segments are clustered into two speakers with a
//! deterministic k-means, the cluster-to-role mapping is resolved against
//! text evidence, and audio and text scores are combined 0.3/0.7. Without
//! audio, classification is text-only with capped confidence.

pub mod classify;
pub mod features;
pub mod kmeans;
pub mod patterns;
pub mod segmenter;
pub mod stats;
pub mod wav;

use tracing::{debug, info, warn};

use consulta_core::defaults::{
    DIARIZATION_AUDIO_WEIGHT, DIARIZATION_KMEANS_SEED, DIARIZATION_TEXT_WEIGHT,
    SPEAKER_MIN_SEGMENT_SECS,
};
use consulta_core::{AsrSegment, Result, Speaker, SpeakerSegment, SpeakerStats};

pub use wav::{decode_wav, encode_wav_mono, AudioBuffer};

/// Tunables for the diarization pipeline.
#[derive(Debug, Clone)]
pub struct DiarizationConfig {
    pub min_segment_s: f64,
    pub audio_weight: f64,
    pub text_weight: f64,
    pub kmeans_seed: u64,
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            min_segment_s: SPEAKER_MIN_SEGMENT_SECS,
            audio_weight: DIARIZATION_AUDIO_WEIGHT,
            text_weight: DIARIZATION_TEXT_WEIGHT,
            kmeans_seed: DIARIZATION_KMEANS_SEED,
        }
    }
}

/// Full diarization output.
#[derive(Debug, Clone)]
pub struct DiarizationOutput {
    pub segments: Vec<SpeakerSegment>,
    pub stats: SpeakerStats,
}

/// Speaker diarization engine.
#[derive(Debug, Clone, Default)]
pub struct Diarizer {
    config: DiarizationConfig,
}

impl Diarizer {
    pub fn new(config: DiarizationConfig) -> Self {
        Self { config }
    }

    /// Diarize a conversation from its transcript, optional ASR segments,
    /// and optional raw audio bytes.
    pub fn diarize(
        &self,
        transcript: &str,
        asr_segments: &[AsrSegment],
        audio: Option<&[u8]>,
    ) -> Result<DiarizationOutput> {
        let audio_buffer = audio.and_then(|bytes| match wav::decode_wav(bytes) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                debug!(error = %e, "Audio not decodable as PCM WAV, falling back to text-only");
                None
            }
        });

        let segments = if !asr_segments.is_empty() {
            match &audio_buffer {
                Some(buffer) => self.diarize_hybrid(asr_segments, buffer),
                None => self.diarize_segments_text_only(asr_segments),
            }
        } else {
            self.diarize_transcript_only(transcript)
        };

        let segments = if segments.is_empty() {
            // Tolerate very short or undecodable conversations with a single
            // unattributed segment instead of rejecting.
            warn!("No usable segments, emitting single unknown segment");
            vec![SpeakerSegment {
                speaker: Speaker::Unknown,
                text: transcript.trim().to_string(),
                t_start: 0.0,
                t_end: transcript.split_whitespace().count().max(1) as f64 * 0.6,
                confidence: 0.1,
                word_count: transcript.split_whitespace().count(),
            }]
        } else {
            segmenter::merge_short_segments(segments, self.config.min_segment_s)
        };

        let stats = stats::compute_stats(&segments);
        info!(
            segment_count = segments.len(),
            speaker_changes = stats.speaker_changes,
            promotor_time_s = stats.promotor_time_s,
            patient_time_s = stats.patient_time_s,
            "Diarization completed"
        );

        Ok(DiarizationOutput { segments, stats })
    }

    /// Audio + text path: cluster per-segment audio features, resolve the
    /// cluster-to-role mapping against text, combine both scores.
    fn diarize_hybrid(
        &self,
        asr_segments: &[AsrSegment],
        audio: &AudioBuffer,
    ) -> Vec<SpeakerSegment> {
        let mut feature_rows: Vec<[f64; features::FEATURE_DIM]> = asr_segments
            .iter()
            .map(|seg| features::extract_features(audio.window(seg.t_start, seg.t_end), audio.sample_rate))
            .collect();
        features::znormalize(&mut feature_rows);

        let clusters = kmeans::cluster2(&feature_rows, self.config.kmeans_seed);
        let text_scores: Vec<f64> = asr_segments
            .iter()
            .map(|seg| classify::text_score(&seg.text))
            .collect();
        let cluster0_role = classify::resolve_cluster_role(&clusters, &text_scores);

        asr_segments
            .iter()
            .zip(clusters.iter())
            .zip(text_scores.iter())
            .filter(|((seg, _), _)| !seg.text.trim().is_empty())
            .map(|((seg, cluster), text_score)| {
                let audio_score = if *cluster == 0 {
                    cluster0_role
                } else {
                    -cluster0_role
                };
                let (speaker, confidence) = classify::classify_hybrid(
                    audio_score,
                    *text_score,
                    &seg.text,
                    self.config.audio_weight,
                    self.config.text_weight,
                );
                SpeakerSegment {
                    speaker,
                    text: seg.text.trim().to_string(),
                    t_start: seg.t_start,
                    t_end: seg.t_end,
                    confidence,
                    word_count: seg.text.split_whitespace().count(),
                }
            })
            .collect()
    }

    /// ASR segments present but no decodable audio.
    fn diarize_segments_text_only(&self, asr_segments: &[AsrSegment]) -> Vec<SpeakerSegment> {
        asr_segments
            .iter()
            .filter(|seg| !seg.text.trim().is_empty())
            .map(|seg| {
                let (speaker, confidence) = classify::classify_text_only(&seg.text);
                SpeakerSegment {
                    speaker,
                    text: seg.text.trim().to_string(),
                    t_start: seg.t_start,
                    t_end: seg.t_end,
                    confidence,
                    word_count: seg.text.split_whitespace().count(),
                }
            })
            .collect()
    }

    /// Neither audio nor ASR segments: split the transcript heuristically
    /// and synthesize timing.
    fn diarize_transcript_only(&self, transcript: &str) -> Vec<SpeakerSegment> {
        let chunks = segmenter::split_transcript(transcript);
        segmenter::synthesize_timing(&chunks)
            .into_iter()
            .map(|(text, t_start, t_end)| {
                let (speaker, confidence) = classify::classify_text_only(&text);
                let word_count = text.split_whitespace().count();
                SpeakerSegment {
                    speaker,
                    text,
                    t_start,
                    t_end,
                    confidence,
                    word_count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asr(t_start: f64, t_end: f64, text: &str) -> AsrSegment {
        AsrSegment {
            t_start,
            t_end,
            text: text.to_string(),
        }
    }

    fn consultation_segments() -> Vec<AsrSegment> {
        vec![
            asr(0.0, 3.0, "Buenos días, ¿cómo se siente hoy?"),
            asr(3.0, 7.0, "Me duele la cabeza desde hace tres días, doctor"),
            asr(7.0, 10.0, "¿Desde cuándo tiene ese dolor? Vamos a revisar"),
            asr(10.0, 12.0, "No puedo dormir por el dolor"),
        ]
    }

    /// Two alternating synthetic voices: low pitch for segments 0/2, high
    /// for 1/3.
    fn consultation_audio() -> Vec<u8> {
        let sr = 16_000u32;
        let mut samples = Vec::new();
        let tone = |freq: f32, secs: f32| -> Vec<f32> {
            let n = (sr as f32 * secs) as usize;
            (0..n)
                .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin() * 0.4)
                .collect()
        };
        samples.extend(tone(110.0, 3.0));
        samples.extend(tone(250.0, 4.0));
        samples.extend(tone(110.0, 3.0));
        samples.extend(tone(250.0, 2.0));
        encode_wav_mono(&samples, sr)
    }

    #[test]
    fn test_text_only_diarization_finds_both_roles() {
        let diarizer = Diarizer::default();
        let output = diarizer
            .diarize(
                "Buenos días, ¿cómo se siente? Me duele la cabeza desde hace tres días doctor. \
                 Vamos a revisar su presión. No puedo dormir por las noches.",
                &[],
                None,
            )
            .unwrap();

        let promotor = output
            .segments
            .iter()
            .filter(|s| s.speaker == Speaker::Promotor)
            .count();
        let patient = output
            .segments
            .iter()
            .filter(|s| s.speaker == Speaker::Patient)
            .count();
        assert!(promotor >= 1, "expected a promoter segment");
        assert!(patient >= 1, "expected a patient segment");
    }

    #[test]
    fn test_text_only_confidence_capped() {
        let diarizer = Diarizer::default();
        let output = diarizer
            .diarize("Buenos días doctor. Me duele la cabeza mucho.", &[], None)
            .unwrap();
        for segment in &output.segments {
            assert!(segment.confidence <= classify::TEXT_ONLY_CONFIDENCE_CAP + 1e-9);
        }
    }

    #[test]
    fn test_segments_ordered_and_non_overlapping() {
        let diarizer = Diarizer::default();
        let output = diarizer
            .diarize("texto", &consultation_segments(), Some(&consultation_audio()))
            .unwrap();
        assert!(!output.segments.is_empty());
        for pair in output.segments.windows(2) {
            assert!(pair[0].t_start <= pair[1].t_start);
            assert!(pair[0].t_end <= pair[1].t_start + 1e-9);
        }
        for segment in &output.segments {
            assert!(segment.t_end > segment.t_start);
            assert!(!segment.text.is_empty());
        }
    }

    #[test]
    fn test_hybrid_diarization_detects_both_roles() {
        let diarizer = Diarizer::default();
        let output = diarizer
            .diarize("texto", &consultation_segments(), Some(&consultation_audio()))
            .unwrap();

        let roles: Vec<Speaker> = output.segments.iter().map(|s| s.speaker).collect();
        assert!(roles.contains(&Speaker::Promotor));
        assert!(roles.contains(&Speaker::Patient));
        assert_eq!(output.stats.total_speakers, 2);
    }

    #[test]
    fn test_hybrid_is_deterministic() {
        let diarizer = Diarizer::default();
        let audio = consultation_audio();
        let a = diarizer
            .diarize("texto", &consultation_segments(), Some(&audio))
            .unwrap();
        let b = diarizer
            .diarize("texto", &consultation_segments(), Some(&audio))
            .unwrap();
        assert_eq!(a.segments, b.segments);
    }

    #[test]
    fn test_undecodable_audio_falls_back_to_text() {
        let diarizer = Diarizer::default();
        let output = diarizer
            .diarize(
                "texto",
                &consultation_segments(),
                Some(b"ID3 definitely not wav data"),
            )
            .unwrap();
        assert!(!output.segments.is_empty());
        for segment in &output.segments {
            assert!(segment.confidence <= classify::TEXT_ONLY_CONFIDENCE_CAP + 1e-9);
        }
    }

    #[test]
    fn test_empty_transcript_yields_single_unknown() {
        let diarizer = Diarizer::default();
        let output = diarizer.diarize("", &[], None).unwrap();
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].speaker, Speaker::Unknown);
        assert!(output.segments[0].confidence <= 0.1 + 1e-9);
    }

    #[test]
    fn test_stats_cover_at_most_duration() {
        let diarizer = Diarizer::default();
        let output = diarizer
            .diarize("texto", &consultation_segments(), Some(&consultation_audio()))
            .unwrap();
        let attributed = output.stats.promotor_time_s
            + output.stats.patient_time_s
            + output.stats.unknown_time_s;
        assert!(attributed <= output.stats.total_duration_s + 1e-6);
    }

    #[test]
    fn test_short_segments_merged() {
        let diarizer = Diarizer::default();
        let segments = vec![
            asr(0.0, 3.0, "Buenos días, ¿cómo se siente usted?"),
            asr(3.0, 3.4, "vamos a revisar"),
            asr(3.4, 7.0, "Me duele la cabeza desde hace días doctor"),
        ];
        let output = diarizer.diarize("texto", &segments, None).unwrap();
        // The 0.4 s promoter fragment merges into its neighbor.
        assert!(output.segments.len() <= 2);
    }
}
