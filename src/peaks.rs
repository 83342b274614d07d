//! Per-band, per-frame constellation peak extraction.
//!
//! For each band and time frame we keep at most one peak: the strongest
//! local maximum in that band, ties broken toward the lower frequency bin.
//! This is what makes the resulting constellation map sparse: a strong
//! peak in one band dominates its neighbors, while a separate band still
//! captures spectrally orthogonal content.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    pub freq_bin: u16,
    pub time_frame: u32,
    pub amplitude: f32,
}

/// Convert a `(low_hz, high_hz)` band into an inclusive-low/exclusive-high
/// bin range for a spectrogram computed with `n_fft` at `sample_rate`.
pub fn band_to_bin_range(low_hz: f32, high_hz: f32, n_fft: usize, sample_rate: u32) -> (usize, usize) {
    let bin_hz = sample_rate as f32 / n_fft as f32;
    let num_bins = n_fft / 2 + 1;
    let low_bin = ((low_hz / bin_hz).floor() as usize).min(num_bins);
    let high_bin = ((high_hz / bin_hz).ceil() as usize).min(num_bins);
    (low_bin, high_bin.max(low_bin))
}

/// Find every local maximum within `band` (a sub-slice of one spectrogram
/// frame) that clears `min_amplitude`, at least `neighborhood` bins apart
/// from any stronger neighbor. Returns `(index_within_band, amplitude)`.
fn local_maxima(band: &[f32], min_amplitude: f32, neighborhood: usize) -> Vec<(usize, f32)> {
    let mut candidates = Vec::new();
    for i in 0..band.len() {
        let amplitude = band[i];
        if amplitude < min_amplitude {
            continue;
        }
        let start = i.saturating_sub(neighborhood);
        let end = (i + neighborhood + 1).min(band.len());
        let is_max = (start..end).all(|j| j == i || band[j] < amplitude || (band[j] == amplitude && j > i));
        if is_max {
            candidates.push((i, amplitude));
        }
    }
    candidates
}

/// Extract the constellation map from a magnitude spectrogram, one peak per
/// `(band, frame)`, merged and sorted by `(time_frame asc, amplitude desc)`.
pub fn find_peaks(
    spectrogram: &[Vec<f32>],
    bands: &[(f32, f32)],
    n_fft: usize,
    sample_rate: u32,
    min_amplitude: f32,
    neighborhood: usize,
) -> Vec<SpectralPeak> {
    if spectrogram.is_empty() {
        return Vec::new();
    }

    let band_ranges: Vec<(usize, usize)> = bands
        .iter()
        .map(|&(lo, hi)| band_to_bin_range(lo, hi, n_fft, sample_rate))
        .collect();

    let mut peaks = Vec::new();

    for (t_idx, frame) in spectrogram.iter().enumerate() {
        for &(low_bin, high_bin) in &band_ranges {
            if low_bin >= high_bin || high_bin > frame.len() {
                continue;
            }
            let band_slice = &frame[low_bin..high_bin];
            let candidates = local_maxima(band_slice, min_amplitude, neighborhood);
            if candidates.is_empty() {
                continue;
            }

            let best = candidates
                .iter()
                .copied()
                .fold(None::<(usize, f32)>, |best, (idx, amp)| match best {
                    None => Some((idx, amp)),
                    Some((best_idx, best_amp)) => {
                        if amp > best_amp || (amp == best_amp && idx < best_idx) {
                            Some((idx, amp))
                        } else {
                            Some((best_idx, best_amp))
                        }
                    }
                })
                .unwrap();

            peaks.push(SpectralPeak {
                freq_bin: (best.0 + low_bin) as u16,
                time_frame: t_idx as u32,
                amplitude: best.1,
            });
        }
    }

    peaks.sort_by(|a, b| {
        a.time_frame
            .cmp(&b.time_frame)
            .then_with(|| b.amplitude.partial_cmp(&a.amplitude).unwrap_or(std::cmp::Ordering::Equal))
    });

    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_BANDS: [(f32, f32); 4] = [(300.0, 500.0), (500.0, 1000.0), (1000.0, 1500.0), (1500.0, 2000.0)];

    #[test]
    fn empty_spectrogram_yields_no_peaks() {
        let peaks = find_peaks(&[], &DEFAULT_BANDS, 2048, 22_050, 0.001, 5);
        assert!(peaks.is_empty());
    }

    #[test]
    fn below_floor_yields_no_peaks() {
        let frame = vec![0.0001f32; 1025];
        let peaks = find_peaks(&[frame], &DEFAULT_BANDS, 2048, 22_050, 0.001, 5);
        assert!(peaks.is_empty());
    }

    #[test]
    fn at_most_one_peak_per_band_per_frame() {
        let mut frame = vec![0.0f32; 1025];
        // 300-500Hz band at n_fft=2048, sr=22050 -> bins ~28-47; set two strong bins there.
        frame[30] = 1.0;
        frame[35] = 0.9;
        let peaks = find_peaks(&[frame], &DEFAULT_BANDS, 2048, 22_050, 0.001, 5);
        let in_low_band: Vec<_> = peaks.iter().filter(|p| (28..47).contains(&(p.freq_bin as usize))).collect();
        assert_eq!(in_low_band.len(), 1);
        assert_eq!(in_low_band[0].freq_bin, 30);
    }

    #[test]
    fn tie_break_prefers_lowest_frequency_bin() {
        let mut frame = vec![0.0f32; 1025];
        frame[30] = 0.5;
        frame[32] = 0.5;
        let peaks = find_peaks(&[frame], &DEFAULT_BANDS, 2048, 22_050, 0.001, 1);
        let in_low_band: Vec<_> = peaks.iter().filter(|p| (28..47).contains(&(p.freq_bin as usize))).collect();
        assert_eq!(in_low_band.len(), 1);
        assert_eq!(in_low_band[0].freq_bin, 30);
    }

    #[test]
    fn peaks_sorted_by_time_then_descending_amplitude() {
        let mut frame0 = vec![0.0f32; 1025];
        frame0[30] = 0.5;
        frame0[60] = 0.9;
        let peaks = find_peaks(&[frame0], &DEFAULT_BANDS, 2048, 22_050, 0.001, 1);
        for w in peaks.windows(2) {
            assert!(w[0].time_frame < w[1].time_frame || w[0].amplitude >= w[1].amplitude);
        }
    }
}
