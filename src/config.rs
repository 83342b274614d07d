//! Engine configuration.
//!
//! A single `EngineConfig` value is constructed at startup and passed by
//! reference into the orchestrator; there is no implicit process-wide state. Every
//! tunable named in the interface surface (`engine.*`, `store.*`) has a
//! field here with the recommended default.

use std::path::PathBuf;

/// Engine version stamped into the store header. Bump when any field below
/// changes in a way that makes existing fingerprints non-portable.
pub const ENGINE_VERSION: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Canonical sample rate all audio is normalized to before fingerprinting.
    pub sample_rate: u32,
    /// FFT window size in samples.
    pub n_fft: usize,
    /// Hop size between STFT frames in samples.
    pub hop: usize,
    /// Amplitude floor below which a bin is never considered a peak.
    pub min_peak_amplitude: f32,
    /// Minimum bin separation between two local maxima within a band.
    pub peak_neighborhood: usize,
    /// Frequency bands (Hz, low..high) peaks are picked from independently.
    pub bands: Vec<(f32, f32)>,
    /// Max number of target peaks paired with a single anchor.
    pub fan_value: usize,
    /// Minimum time delta (frames) between anchor and target peak.
    pub delta_min: u32,
    /// Maximum time delta (frames) between anchor and target peak.
    pub delta_max: u32,
    /// Hard cap on fingerprints retained per ingested track.
    pub max_fingerprints_per_track: usize,
    /// Query audio longer than this (seconds) is truncated at the tail.
    pub max_query_seconds: f32,
    /// Minimum postings a candidate song needs to survive the coarse filter.
    pub min_matching_hashes: usize,
    /// Quantization bucket width (frames) for the offset histogram.
    pub time_alignment_tolerance: i64,
    /// Minimum confidence for `identify` to report a match.
    pub confidence_threshold: f64,
    /// Path to the sqlite-backed metadata + postings store.
    pub store_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 22_050,
            n_fft: 2048,
            hop: 512,
            min_peak_amplitude: 0.001,
            peak_neighborhood: 5,
            bands: vec![(300.0, 500.0), (500.0, 1000.0), (1000.0, 1500.0), (1500.0, 2000.0)],
            fan_value: 5,
            delta_min: 1,
            delta_max: 200,
            max_fingerprints_per_track: 10_000,
            max_query_seconds: 30.0,
            min_matching_hashes: 3,
            time_alignment_tolerance: 5,
            confidence_threshold: 0.05,
            store_path: PathBuf::from("sivana_fingerprints.sqlite"),
        }
    }
}

impl EngineConfig {
    /// Overlay recognized `engine.*` / `store.*` environment variables on top
    /// of the defaults. Unset or unparsable variables fall back silently to
    /// the existing value.
    pub fn from_env() -> Self {
        let mut cfg = EngineConfig::default();

        if let Some(v) = env_u32("engine.sample_rate") {
            cfg.sample_rate = v;
        }
        if let Some(v) = env_usize("engine.n_fft") {
            cfg.n_fft = v;
        }
        if let Some(v) = env_usize("engine.hop") {
            cfg.hop = v;
        }
        if let Some(v) = env_f32("engine.min_peak_amplitude") {
            cfg.min_peak_amplitude = v;
        }
        if let Some(v) = env_usize("engine.fan_value") {
            cfg.fan_value = v;
        }
        if let Some(v) = env_u32("engine.delta_min") {
            cfg.delta_min = v;
        }
        if let Some(v) = env_u32("engine.delta_max") {
            cfg.delta_max = v;
        }
        if let Some(v) = env_f32("engine.max_query_seconds") {
            cfg.max_query_seconds = v;
        }
        if let Some(v) = env_usize("engine.max_fingerprints_per_track") {
            cfg.max_fingerprints_per_track = v;
        }
        if let Some(v) = env_usize("engine.min_matching_hashes") {
            cfg.min_matching_hashes = v;
        }
        if let Some(v) = env_i64("engine.time_alignment_tolerance") {
            cfg.time_alignment_tolerance = v;
        }
        if let Some(v) = env_f64("engine.confidence_threshold") {
            cfg.confidence_threshold = v;
        }
        if let Ok(v) = std::env::var("store.metadata_path") {
            cfg.store_path = PathBuf::from(v);
        } else if let Ok(v) = std::env::var("store.index_path") {
            cfg.store_path = PathBuf::from(v);
        }

        cfg
    }

    /// Fingerprint bit-width header stamped into the store, used to detect
    /// parameter drift between runs (see `store::Store::open`).
    pub fn schema_fingerprint(&self) -> String {
        format!(
            "v{}:sr={}:nfft={}:hop={}:fan={}:dmin={}:dmax={}:bands={}",
            ENGINE_VERSION,
            self.sample_rate,
            self.n_fft,
            self.hop,
            self.fan_value,
            self.delta_min,
            self.delta_max,
            self.bands.len()
        )
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_f32(key: &str) -> Option<f32> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok()?.parse().ok()
}
