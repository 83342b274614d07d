//! Public façade: `ingest`, `identify`, `list`, `get`, `remove`, `stats`.
//!
//! `Engine` owns the lifetime of the postings index and metadata store. It
//! holds a single `EngineConfig` passed in at construction, with no implicit
//! process-wide state and no singleton.

use std::path::Path;

use log::{info, warn};

use crate::audio_loader;
use crate::config::EngineConfig;
use crate::error::{CapacityWarning, EngineError, Result};
use crate::hashing::{self, Fingerprint};
use crate::matcher::{self, MatchCandidate};
use crate::peaks;
use crate::resample;
use crate::spectrogram;
use crate::store::{NewSong, SongId, SongRecord, Store, StoreStats};

#[derive(Debug, Clone)]
pub struct IngestMeta {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MatchResult {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub confidence: f64,
    pub matching_hashes: usize,
    pub alignment_strength: f64,
    pub time_offset_seconds: f64,
    pub warnings: Vec<CapacityWarning>,
}

/// Result of a successful ingest: the assigned id plus any non-fatal
/// capacity events hit along the way (query truncation never applies here;
/// this is the fingerprint-cap case).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IngestOutcome {
    pub song_id: SongId,
    pub warnings: Vec<CapacityWarning>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub total_songs: u64,
    pub total_fingerprints: u64,
    pub total_duration_hours: f64,
    pub index_size_bytes: Option<u64>,
}

pub struct Engine {
    config: EngineConfig,
    store: Store,
}

impl Engine {
    /// Open (and create if absent) the backing store at `config.store_path`,
    /// verifying schema compatibility.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = Store::open(&config.store_path, &config)?;
        Ok(Engine { config, store })
    }

    /// In-memory engine, primarily for tests and short-lived processes.
    pub fn open_in_memory(config: EngineConfig) -> Result<Self> {
        let store = Store::open_in_memory(&config)?;
        Ok(Engine { config, store })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Full pipeline: spectrogram → peaks → hashes. Never errors on short
    /// audio; an input shorter than one FFT window simply yields no hashes,
    /// which callers interpret according to their own semantics (ingest
    /// treats it as `NoFingerprints`, identify treats it as no match).
    fn fingerprint(&self, samples: &[f32]) -> Vec<Fingerprint> {
        let spec = spectrogram::create_spectrogram(samples, self.config.n_fft, self.config.hop);
        if spec.is_empty() {
            return Vec::new();
        }

        let peaks = peaks::find_peaks(
            &spec,
            &self.config.bands,
            self.config.n_fft,
            self.config.sample_rate,
            self.config.min_peak_amplitude,
            self.config.peak_neighborhood,
        );

        hashing::create_hashes(
            &peaks,
            self.config.delta_min,
            self.config.delta_max,
            self.config.fan_value,
            self.config.max_fingerprints_per_track,
        )
    }

    fn normalize(&self, samples: &[f32], src_rate: u32, channels: usize) -> Result<(Vec<f32>, Vec<CapacityWarning>)> {
        resample::normalize(samples, src_rate, channels, self.config.sample_rate, self.config.max_query_seconds)
    }

    /// Ingest raw PCM: `Received → Resampled → Spectrogrammed → Peaked →
    /// Hashed → Indexed`. Any failure before the final store write leaves
    /// the stores untouched.
    pub fn ingest_samples(
        &self,
        samples: &[f32],
        src_rate: u32,
        channels: usize,
        meta: IngestMeta,
        file_path: &str,
        file_size_bytes: Option<u64>,
    ) -> Result<IngestOutcome> {
        let (normalized, mut warnings) = self.normalize(samples, src_rate, channels)?;
        let duration_seconds = normalized.len() as f64 / self.config.sample_rate as f64;

        let hashes = self.fingerprint(&normalized);
        if hashes.is_empty() {
            return Err(EngineError::NoFingerprints);
        }
        if hashes.len() >= self.config.max_fingerprints_per_track {
            warn!(
                "song '{}' truncated to max_fingerprints_per_track={} during ingest",
                meta.title, self.config.max_fingerprints_per_track
            );
            warnings.push(CapacityWarning::FingerprintCapReached { limit: self.config.max_fingerprints_per_track });
        }

        let new_song = NewSong {
            title: meta.title,
            artist: meta.artist,
            album: meta.album,
            file_path: file_path.to_string(),
            duration_seconds,
            file_size_bytes,
        };

        let song_id = self.store.add_song(&new_song, &hashes)?;
        info!("ingested song_id={song_id} with {} fingerprints", hashes.len());
        Ok(IngestOutcome { song_id, warnings })
    }

    /// Decode `path` with the bundled symphonia loader, then ingest.
    pub fn ingest_file(&self, path: &Path, meta: IngestMeta) -> Result<IngestOutcome> {
        let decoded = audio_loader::load_audio_file(path)?;
        let file_size = std::fs::metadata(path).ok().map(|m| m.len());
        let file_path = path.to_string_lossy().into_owned();
        self.ingest_samples(&decoded.samples, decoded.sample_rate, decoded.channels, meta, &file_path, file_size)
    }

    /// Identify raw PCM against the index. Returns `Ok(None)` for "no
    /// match": an empty fingerprint (e.g. audio shorter than one FFT
    /// window) is a legitimate no-match outcome, not an error.
    pub fn identify_samples(&self, samples: &[f32], src_rate: u32, channels: usize) -> Result<Option<MatchResult>> {
        let (normalized, warnings) = self.normalize(samples, src_rate, channels)?;
        let hashes = self.fingerprint(&normalized);
        if hashes.is_empty() {
            return Ok(None);
        }

        let raw_matches = self.store.search(&hashes)?;
        let best = matcher::best_match(&raw_matches, hashes.len(), &self.config);

        match best {
            Some(candidate) => Ok(Some(self.to_match_result(candidate, warnings)?)),
            None => Ok(None),
        }
    }

    pub fn identify_file(&self, path: &Path) -> Result<Option<MatchResult>> {
        let decoded = audio_loader::load_audio_file(path)?;
        self.identify_samples(&decoded.samples, decoded.sample_rate, decoded.channels)
    }

    fn to_match_result(&self, candidate: MatchCandidate, warnings: Vec<CapacityWarning>) -> Result<MatchResult> {
        let song = self
            .store
            .get_song(candidate.song_id)?
            .ok_or(EngineError::NotFound(candidate.song_id))?;

        let seconds_per_frame = self.config.hop as f64 / self.config.sample_rate as f64;

        Ok(MatchResult {
            song_id: song.song_id,
            title: song.title,
            artist: song.artist,
            album: song.album,
            confidence: candidate.confidence,
            matching_hashes: candidate.matching_hashes,
            alignment_strength: candidate.alignment_strength,
            time_offset_seconds: candidate.time_offset_frames as f64 * seconds_per_frame,
            warnings,
        })
    }

    pub fn list(&self, limit: u32, offset: u32, search: Option<&str>) -> Result<Vec<SongRecord>> {
        self.store.list(limit, offset, search)
    }

    pub fn get(&self, song_id: SongId) -> Result<SongRecord> {
        self.store.get_song(song_id)?.ok_or(EngineError::NotFound(song_id))
    }

    pub fn remove(&self, song_id: SongId) -> Result<()> {
        self.store.remove_song(song_id)
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let StoreStats { total_songs, total_fingerprints, total_duration_hours, index_size_bytes } =
            self.store.stats()?;
        Ok(EngineStats { total_songs, total_fingerprints, total_duration_hours, index_size_bytes })
    }

    /// Periodic maintenance: physically delete postings whose song has been
    /// removed. Safe to run concurrently with reads.
    pub fn compact(&self) -> Result<u64> {
        self.store.compact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, seconds: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
        let n = (seconds * sample_rate as f32) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn engine() -> Engine {
        Engine::open_in_memory(EngineConfig::default()).unwrap()
    }

    #[test]
    fn pure_tone_self_identity() {
        let eng = engine();
        let sr = eng.config().sample_rate;
        let audio = sine(440.0, 10.0, sr, 0.5);
        let meta = IngestMeta { title: "A440".into(), artist: "Test".into(), album: None };
        eng.ingest_samples(&audio, sr, 1, meta, "a440.wav", None).unwrap();

        let result = eng.identify_samples(&audio, sr, 1).unwrap().unwrap();
        assert_eq!(result.title, "A440");
        assert!(result.confidence >= 0.8, "confidence was {}", result.confidence);
    }

    #[test]
    fn negative_match_returns_none() {
        let eng = engine();
        let sr = eng.config().sample_rate;
        let a440 = sine(440.0, 10.0, sr, 0.5);
        let meta = IngestMeta { title: "A440".into(), artist: "Test".into(), album: None };
        eng.ingest_samples(&a440, sr, 1, meta, "a440.wav", None).unwrap();

        let square: Vec<f32> = (0..(sr as usize * 10))
            .map(|i| if (i / 11) % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let result = eng.identify_samples(&square, sr, 1).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn duplicate_ingest_rejected() {
        let eng = engine();
        let sr = eng.config().sample_rate;
        let audio = sine(440.0, 5.0, sr, 0.5);
        let meta = |t: &str| IngestMeta { title: t.into(), artist: "Test".into(), album: None };
        eng.ingest_samples(&audio, sr, 1, meta("A"), "same_path.wav", None).unwrap();
        let second = eng.ingest_samples(&audio, sr, 1, meta("B"), "same_path.wav", None);
        assert!(matches!(second, Err(EngineError::DuplicatePath(_))));
    }

    #[test]
    fn remove_then_identify_never_returns_removed_song() {
        let eng = engine();
        let sr = eng.config().sample_rate;
        let a = sine(440.0, 8.0, sr, 0.5);
        let b = sine(660.0, 8.0, sr, 0.5);
        let id_a = eng
            .ingest_samples(&a, sr, 1, IngestMeta { title: "A".into(), artist: "x".into(), album: None }, "a.wav", None)
            .unwrap()
            .song_id;
        eng.ingest_samples(&b, sr, 1, IngestMeta { title: "B".into(), artist: "x".into(), album: None }, "b.wav", None)
            .unwrap();

        eng.remove(id_a).unwrap();
        assert!(matches!(eng.get(id_a), Err(EngineError::NotFound(_))));

        let result = eng.identify_samples(&a, sr, 1).unwrap();
        assert!(result.map_or(true, |m| m.song_id != id_a));
    }

    #[test]
    fn too_short_audio_is_no_fingerprints_on_ingest_and_no_match_on_identify() {
        let eng = engine();
        let sr = eng.config().sample_rate;
        let tiny = vec![0.1f32; 100];
        let err = eng.ingest_samples(&tiny, sr, 1, IngestMeta { title: "x".into(), artist: "y".into(), album: None }, "tiny.wav", None);
        assert!(matches!(err, Err(EngineError::NoFingerprints)));

        let result = eng.identify_samples(&tiny, sr, 1).unwrap();
        assert!(result.is_none());
    }
}
