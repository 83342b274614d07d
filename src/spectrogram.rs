//! Windowed STFT producing a linear-magnitude time-frequency matrix.
//!
//! The matrix holds `|STFT|`, not dB: the peak picker needs a positive
//! scale with a meaningful absolute floor. Frames that would read past
//! end-of-signal are dropped; there is no zero-padded tail frame.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

fn hann_window(window_size: usize) -> Vec<f32> {
    let mut window = Vec::with_capacity(window_size);
    if window_size == 0 {
        return window;
    }
    if window_size == 1 {
        window.push(1.0);
        return window;
    }
    for i in 0..window_size {
        window.push(0.5 * (1.0 - (2.0 * PI * i as f32 / (window_size - 1) as f32).cos()));
    }
    window
}

/// Magnitude spectrogram: `matrix[t][f]` for `f` in `[0, n_fft/2]`.
pub fn create_spectrogram(samples: &[f32], n_fft: usize, hop: usize) -> Vec<Vec<f32>> {
    if samples.len() < n_fft {
        return Vec::new();
    }

    let num_frames = (samples.len() - n_fft) / hop + 1;
    if num_frames == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window_values = hann_window(n_fft);
    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n_fft];
    let mut spectrogram: Vec<Vec<f32>> = Vec::with_capacity(num_frames);

    let num_bins = n_fft / 2 + 1;
    for i in 0..num_frames {
        let start = i * hop;
        let chunk = &samples[start..start + n_fft];

        for (j, sample) in chunk.iter().enumerate() {
            buffer[j] = Complex::new(*sample * window_values[j], 0.0);
        }

        fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer[..num_bins].iter().map(|c| c.norm()).collect();
        spectrogram.push(magnitudes);
    }

    spectrogram
}
