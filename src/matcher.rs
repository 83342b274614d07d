//! Offset-histogram matching: for each candidate song, find the largest
//! cluster of consistent `db_anchor_time - query_anchor_time` offsets and
//! score it.
//!
//! A genuine match produces a dense cluster of equal offsets; random
//! coincidences spread roughly uniformly. Quantization absorbs sub-frame
//! timing drift; the adaptive gate keeps highly periodic signals (drum
//! loops, sustained tones) from passing on a flat histogram.

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::store::SongId;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub song_id: SongId,
    pub confidence: f64,
    pub matching_hashes: usize,
    pub aligned_count: usize,
    pub alignment_strength: f64,
    pub time_offset_frames: i64,
}

/// Rank every candidate song by the offset-histogram algorithm, returning
/// only those that clear both the adaptive alignment gate and
/// `config.confidence_threshold`, sorted by descending confidence.
pub fn find_matches(
    raw_matches: &HashMap<SongId, Vec<(u32, u32)>>,
    total_query_hashes: usize,
    config: &EngineConfig,
) -> Vec<MatchCandidate> {
    let mut candidates: Vec<MatchCandidate> = raw_matches
        .iter()
        .filter(|(_, bucket)| bucket.len() >= config.min_matching_hashes)
        .filter_map(|(&song_id, bucket)| analyze_bucket(song_id, bucket, total_query_hashes, config))
        .filter(|c| c.confidence >= config.confidence_threshold)
        .collect();

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.aligned_count.cmp(&a.aligned_count))
            .then_with(|| a.song_id.cmp(&b.song_id))
    });

    candidates
}

/// Convenience wrapper returning just the top candidate, if any.
pub fn best_match(
    raw_matches: &HashMap<SongId, Vec<(u32, u32)>>,
    total_query_hashes: usize,
    config: &EngineConfig,
) -> Option<MatchCandidate> {
    find_matches(raw_matches, total_query_hashes, config).into_iter().next()
}

fn analyze_bucket(
    song_id: SongId,
    bucket: &[(u32, u32)],
    total_query_hashes: usize,
    config: &EngineConfig,
) -> Option<MatchCandidate> {
    let tolerance = config.time_alignment_tolerance.max(1);
    let raw_offsets: Vec<i64> = bucket.iter().map(|&(db_t, q_t)| db_t as i64 - q_t as i64).collect();

    let mut histogram: HashMap<i64, usize> = HashMap::new();
    for &offset in &raw_offsets {
        let quantized = (offset as f64 / tolerance as f64).round() as i64;
        *histogram.entry(quantized).or_insert(0) += 1;
    }

    let (&best_quantized, &aligned_count) = histogram.iter().max_by(|a, b| {
        a.1.cmp(b.1).then_with(|| b.0.cmp(a.0))
    })?;

    let bucket_len = bucket.len();
    let unique_raw: std::collections::HashSet<i64> = raw_offsets.iter().copied().collect();
    let unique_ratio = unique_raw.len() as f64 / bucket_len as f64;
    let gate_threshold = if unique_ratio < 0.3 { 0.05 } else { 0.3 };
    let alignment_strength = aligned_count as f64 / bucket_len as f64;

    if alignment_strength < gate_threshold {
        return None;
    }

    let coverage = (bucket_len as f64 / total_query_hashes.max(1) as f64).min(1.0);
    let raw_strength = (((aligned_count as f64) + 1.0).ln() / 20f64.ln()).min(1.0);
    let unique_bonus = if bucket_len > total_query_hashes {
        (total_query_hashes as f64 / bucket_len as f64).min(1.0)
    } else {
        1.0
    };

    let confidence = 0.4 * alignment_strength + 0.3 * raw_strength + 0.2 * coverage + 0.1 * unique_bonus;
    let confidence = confidence.clamp(0.0, 1.0);

    Some(MatchCandidate {
        song_id,
        confidence,
        matching_hashes: bucket_len,
        aligned_count,
        alignment_strength,
        time_offset_frames: best_quantized * tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EngineConfig {
        let mut c = EngineConfig::default();
        c.confidence_threshold = 0.05;
        c
    }

    #[test]
    fn empty_matches_yield_no_candidates() {
        let raw = HashMap::new();
        assert!(find_matches(&raw, 10, &cfg()).is_empty());
    }

    #[test]
    fn below_min_matching_hashes_is_dropped() {
        let mut raw = HashMap::new();
        raw.insert(1u64, vec![(10, 0), (11, 1)]); // only 2, default min is 3
        assert!(find_matches(&raw, 10, &cfg()).is_empty());
    }

    #[test]
    fn consistent_offset_cluster_produces_high_confidence() {
        let mut raw = HashMap::new();
        // query and db share the same 100-frame alignment everywhere.
        let bucket: Vec<(u32, u32)> = (0..30).map(|i| (100 + i, i)).collect();
        raw.insert(1u64, bucket);
        let matches = find_matches(&raw, 30, &cfg());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].song_id, 1);
        assert_eq!(matches[0].time_offset_frames, 100);
        assert!(matches[0].confidence >= 0.5);
    }

    #[test]
    fn scattered_offsets_fail_the_alignment_gate() {
        let mut raw = HashMap::new();
        let bucket: Vec<(u32, u32)> = (0..30).map(|i| (i * 97 % 500, i)).collect();
        raw.insert(1u64, bucket);
        let matches = find_matches(&raw, 30, &cfg());
        assert!(matches.is_empty());
    }

    #[test]
    fn tie_break_prefers_lower_song_id() {
        let mut raw = HashMap::new();
        let bucket: Vec<(u32, u32)> = (0..30).map(|i| (100 + i, i)).collect();
        raw.insert(5u64, bucket.clone());
        raw.insert(2u64, bucket);
        let matches = find_matches(&raw, 30, &cfg());
        assert_eq!(matches[0].song_id, 2);
    }
}
