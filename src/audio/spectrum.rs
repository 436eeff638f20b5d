use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::bands::{AudioBands, BandSource};
use super::decode::AudioClip;

pub const FFT_SIZE: usize = 2048;
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// Decibel window mapped onto 0-255, matching a browser analyser node.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Slack, in frames, when mapping a timestamp back to a frame index.
const FRAME_EPSILON: f64 = 1e-6;

/// Byte spectra sampled at a fixed frame rate.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    pub fps: u32,
    pub frames: Vec<Vec<u8>>,
}

impl Spectrogram {
    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.fps.max(1) as f64
    }

    /// Most recent snapshot at or before `time`. `None` past the end.
    pub fn snapshot(&self, time: f64) -> Option<&[u8]> {
        if time < 0.0 {
            return self.frames.first().map(Vec::as_slice);
        }
        // `i / fps` must land on frame `i` even when the product rounds down.
        let idx = (time * self.fps as f64 + FRAME_EPSILON).floor() as usize;
        self.frames.get(idx).map(Vec::as_slice)
    }
}

/// Decode-once analysis: per-frame FFTs in parallel, then a sequential
/// temporal smoothing pass and decibel mapping.
pub fn analyze(clip: &AudioClip, fps: u32, smoothing: f32) -> Spectrogram {
    let fps = fps.max(1);
    let total_frames = (clip.duration() * fps as f64).ceil() as usize;
    let smoothing = smoothing.clamp(0.0, 0.99);

    log::info!("Spectrum pass: {} frames @ {}fps", total_frames, fps);
    let raw = raw_magnitudes(&clip.samples, clip.sample_rate, fps, total_frames);

    log::info!("Smoothing pass (time constant {:.2})", smoothing);
    let mut frames = Vec::with_capacity(raw.len());
    let mut smoothed = vec![0.0f32; BIN_COUNT];
    for mags in &raw {
        for (s, &m) in smoothed.iter_mut().zip(mags) {
            *s = smoothing * *s + (1.0 - smoothing) * m;
        }
        frames.push(smoothed.iter().map(|&m| to_byte(m)).collect());
    }

    Spectrogram { fps, frames }
}

fn raw_magnitudes(samples: &[f32], sample_rate: u32, fps: u32, total_frames: usize) -> Vec<Vec<f32>> {
    let samples_per_frame = sample_rate as f64 / fps as f64;
    let hann = hann_window(FFT_SIZE);

    (0..total_frames)
        .into_par_iter()
        .map(|frame_idx| {
            // Window ends at the frame time: the analyser only ever sees the past.
            let end = ((frame_idx as f64 * samples_per_frame) as usize).min(samples.len());
            let start = end.saturating_sub(FFT_SIZE);

            let mut buffer = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
            let offset = FFT_SIZE - (end - start);
            for (i, &s) in samples[start..end].iter().enumerate() {
                buffer[offset + i] = Complex::new(s * hann[offset + i], 0.0);
            }

            let mut planner = FftPlanner::<f32>::new();
            let fft = planner.plan_fft_forward(FFT_SIZE);
            fft.process(&mut buffer);

            buffer[..BIN_COUNT]
                .iter()
                .map(|c| c.norm() / FFT_SIZE as f32)
                .collect()
        })
        .collect()
}

fn to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 255.0;
    scaled.clamp(0.0, 255.0) as u8
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Band source reading the precomputed spectrogram. Past the end of the
/// track it reports silence, which simply stops beat detection.
pub struct SpectrogramSource {
    spectrogram: Spectrogram,
}

impl SpectrogramSource {
    pub fn new(spectrogram: Spectrogram) -> Self {
        Self { spectrogram }
    }

    pub fn duration(&self) -> f64 {
        self.spectrogram.duration()
    }
}

impl BandSource for SpectrogramSource {
    fn sample(&mut self, time: f64) -> AudioBands {
        self.spectrogram
            .snapshot(time)
            .map(AudioBands::from_spectrum)
            .unwrap_or_default()
    }
}
