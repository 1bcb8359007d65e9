//! Aggregate speaker participation statistics.

use consulta_core::{Speaker, SpeakerSegment, SpeakerStats};

/// Derive per-speaker totals, change count, and average segment length.
pub fn compute_stats(segments: &[SpeakerSegment]) -> SpeakerStats {
    if segments.is_empty() {
        return SpeakerStats::default();
    }

    let mut promotor_time_s = 0f64;
    let mut patient_time_s = 0f64;
    let mut unknown_time_s = 0f64;

    for segment in segments {
        let duration = segment.duration();
        match segment.speaker {
            Speaker::Promotor => promotor_time_s += duration,
            Speaker::Patient => patient_time_s += duration,
            Speaker::Unknown | Speaker::Multiple => unknown_time_s += duration,
        }
    }

    let total_duration_s = segments
        .iter()
        .map(|s| s.t_end)
        .fold(0f64, f64::max);

    let mut speaker_changes = 0usize;
    for pair in segments.windows(2) {
        if pair[0].speaker != pair[1].speaker {
            speaker_changes += 1;
        }
    }

    let avg_segment_s =
        segments.iter().map(SpeakerSegment::duration).sum::<f64>() / segments.len() as f64;

    let mut roles: Vec<Speaker> = segments
        .iter()
        .map(|s| s.speaker)
        .filter(|s| !matches!(s, Speaker::Unknown | Speaker::Multiple))
        .collect();
    roles.sort_by_key(|s| *s as u8);
    roles.dedup();

    SpeakerStats {
        total_speakers: roles.len(),
        promotor_time_s,
        patient_time_s,
        unknown_time_s,
        total_duration_s,
        speaker_changes,
        avg_segment_s,
    }
}
