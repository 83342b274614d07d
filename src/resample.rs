//! Resample/normalize arbitrary PCM into mono audio at the engine's
//! canonical sample rate.
//!
//! Intentionally lossless beyond resampling: no filtering, no AGC, no
//! dynamic range processing. Fingerprinting determinism depends on this
//! stage doing nothing clever.

use log::warn;

use crate::error::{CapacityWarning, EngineError, Result};

/// Average interleaved multi-channel samples down to mono.
pub fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono `f32` audio from `src_rate` to `dst_rate` using rubato's
/// FFT-based fixed-input resampler. Returns `samples` unchanged if the
/// rates already match.
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Err(EngineError::EmptyInput);
    }
    if src_rate == dst_rate {
        return Ok(samples.to_vec());
    }

    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let ratio = dst_rate as f64 / src_rate as f64;

    let mut resampler = FftFixedIn::<f32>::new(src_rate as usize, dst_rate as usize, chunk_size, 2, 1)
        .map_err(|e| EngineError::Resample(e.to_string()))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio).ceil() as usize + chunk_size);

    let mut pos = 0;
    while pos + chunk_size <= samples.len() {
        let chunk = vec![samples[pos..pos + chunk_size].to_vec()];
        let out = resampler
            .process(&chunk, None)
            .map_err(|e| EngineError::Resample(e.to_string()))?;
        if let Some(ch) = out.first() {
            output.extend_from_slice(ch);
        }
        pos += chunk_size;
    }

    if pos < samples.len() {
        let remaining = samples.len() - pos;
        let mut padded = samples[pos..].to_vec();
        padded.resize(chunk_size, 0.0);
        let out = resampler
            .process(&[padded], None)
            .map_err(|e| EngineError::Resample(e.to_string()))?;
        if let Some(ch) = out.first() {
            let take = ((remaining as f64) * ratio).round() as usize;
            let take = take.min(ch.len());
            output.extend_from_slice(&ch[..take]);
        }
    }

    let target_len = ((samples.len() as f64) * ratio).round() as usize;
    if output.len() > target_len {
        output.truncate(target_len);
    }

    Ok(output)
}

/// Full normalization pipeline: mono-down, resample to `dst_rate`, then
/// truncate the tail if the result exceeds `max_seconds`. Truncation is
/// logged and reported back as a [`CapacityWarning`]; the call still
/// succeeds.
pub fn normalize(
    samples: &[f32],
    src_rate: u32,
    channels: usize,
    dst_rate: u32,
    max_seconds: f32,
) -> Result<(Vec<f32>, Vec<CapacityWarning>)> {
    if samples.is_empty() {
        return Err(EngineError::EmptyInput);
    }
    let mono = to_mono(samples, channels);
    let mut resampled = resample(&mono, src_rate, dst_rate)?;
    let mut warnings = Vec::new();

    let max_samples = (max_seconds * dst_rate as f32) as usize;
    if max_samples > 0 && resampled.len() > max_samples {
        warn!(
            "truncating query from {:.1}s to max_query_seconds={max_seconds}s",
            resampled.len() as f32 / dst_rate as f32
        );
        resampled.truncate(max_samples);
        warnings.push(CapacityWarning::QueryTruncated { truncated_seconds: max_seconds });
    }

    Ok((resampled, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_averages_channels() {
        let stereo = vec![1.0, -1.0, 0.5, 0.5];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn mono_passthrough_when_already_mono() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(to_mono(&samples, 1), samples);
    }

    #[test]
    fn empty_input_errors() {
        let result = normalize(&[], 44_100, 1, 22_050, 30.0);
        assert!(matches!(result, Err(EngineError::EmptyInput)));
    }

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![0.0f32; 4096];
        let out = resample(&samples, 22_050, 22_050).unwrap();
        assert_eq!(out.len(), samples.len());
    }

    #[test]
    fn truncates_to_max_query_seconds() {
        let samples = vec![0.0f32; 22_050 * 40];
        let (out, warnings) = normalize(&samples, 22_050, 1, 22_050, 30.0).unwrap();
        assert_eq!(out.len(), 22_050 * 30);
        assert_eq!(warnings, vec![CapacityWarning::QueryTruncated { truncated_seconds: 30.0 }]);
    }

    #[test]
    fn no_warning_when_under_max_query_seconds() {
        let samples = vec![0.0f32; 22_050 * 10];
        let (_, warnings) = normalize(&samples, 22_050, 1, 22_050, 30.0).unwrap();
        assert!(warnings.is_empty());
    }
}
