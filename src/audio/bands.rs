use std::ops::Range;

/// Tuned bin ranges for a 1024-bin byte spectrum (2048-point FFT).
const SUB_BASS_BINS: Range<usize> = 0..3;
const BASS_BINS: Range<usize> = 2..7;
const SNARE_BINS: Range<usize> = 40..90;
const HAT_BINS: Range<usize> = 200..400;

/// Maximum value a spectrum bin can hold.
const MAX_MAGNITUDE: f32 = 255.0;

/// Coarse per-tick energy bands, each normalized to 0.0-1.0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AudioBands {
    pub sub_bass: f32,
    pub bass: f32,
    pub snare: f32,
    pub hat: f32,
}

impl AudioBands {
    /// Reduce a byte frequency spectrum to named bands.
    pub fn from_spectrum(spectrum: &[u8]) -> Self {
        Self {
            sub_bass: band_mean(spectrum, SUB_BASS_BINS),
            bass: band_mean(spectrum, BASS_BINS),
            snare: band_mean(spectrum, SNARE_BINS),
            hat: band_mean(spectrum, HAT_BINS),
        }
    }
}

fn band_mean(spectrum: &[u8], range: Range<usize>) -> f32 {
    let end = range.end.min(spectrum.len());
    if range.start >= end {
        return 0.0;
    }
    let bins = &spectrum[range.start..end];
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    sum as f32 / bins.len() as f32 / MAX_MAGNITUDE
}

/// Anything that can hand the engine the current band energies.
///
/// Implementations must answer immediately from whatever analysis is already
/// available; the tick loop never waits on audio.
pub trait BandSource {
    fn sample(&mut self, time: f64) -> AudioBands;
}

/// Deterministic stand-in used when no audio is attached.
#[derive(Clone, Debug)]
pub struct SyntheticClock {
    pub bpm: f32,
}

impl Default for SyntheticClock {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl SyntheticClock {
    #[cfg(test)]
    pub fn new(bpm: f32) -> Self {
        Self { bpm: bpm.max(1.0) }
    }

    pub fn bands_at(&self, time: f64) -> AudioBands {
        let beat_len = 60.0 / self.bpm as f64;
        let beats = time.max(0.0) / beat_len;
        let beat_index = beats.floor() as u64;
        let phase = (beats - beats.floor()) as f32;

        // Triangular kick: full at the downbeat, gone after a quarter beat.
        let kick = (1.0 - phase * 4.0).max(0.0);
        // Snare pulse on beats 2 and 4.
        let snare = if beat_index % 2 == 1 && phase < 0.1 { 0.9 } else { 0.05 };
        // Hat: hashed noise, stable for a given sixteenth.
        let sixteenth = (beats * 4.0).floor() as u64;
        let hat = 0.2 + 0.3 * hash_unit(sixteenth);

        AudioBands {
            sub_bass: kick * 0.8,
            bass: kick,
            snare,
            hat,
        }
    }
}

impl BandSource for SyntheticClock {
    fn sample(&mut self, time: f64) -> AudioBands {
        self.bands_at(time)
    }
}

fn hash_unit(n: u64) -> f32 {
    let mut x = n.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 31;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 29;
    (x >> 40) as f32 / (1u64 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_average_their_bin_ranges() {
        let mut spectrum = vec![0u8; 1024];
        for b in &mut spectrum[2..7] {
            *b = 255;
        }
        for b in &mut spectrum[40..90] {
            *b = 51;
        }
        let bands = AudioBands::from_spectrum(&spectrum);
        assert!((bands.bass - 1.0).abs() < 1e-6);
        // sub-bass [0,3) overlaps bass at bin 2 only
        assert!((bands.sub_bass - 1.0 / 3.0).abs() < 1e-6);
        assert!((bands.snare - 0.2).abs() < 1e-6);
        assert_eq!(bands.hat, 0.0);
    }

    #[test]
    fn short_spectrum_truncates_ranges() {
        let spectrum = vec![255u8; 50];
        let bands = AudioBands::from_spectrum(&spectrum);
        assert!((bands.snare - 1.0).abs() < 1e-6);
        assert_eq!(bands.hat, 0.0);
        assert_eq!(AudioBands::from_spectrum(&[]), AudioBands::default());
    }

    #[test]
    fn synthetic_clock_is_deterministic_and_kicks_on_the_beat() {
        let clock = SyntheticClock::default();
        assert_eq!(clock.bands_at(1.23), clock.bands_at(1.23));
        assert!(clock.bands_at(0.0).bass > 0.99);
        assert!(clock.bands_at(0.25).bass < 0.01);
        // 120 BPM: beat 1 starts at 0.5s and carries the snare
        assert!(clock.bands_at(0.51).snare > 0.5);
        assert!(clock.bands_at(1.01).snare < 0.5);
    }

    #[test]
    fn synthetic_bands_stay_in_unit_range() {
        let clock = SyntheticClock::new(137.0);
        for i in 0..1000 {
            let b = clock.bands_at(i as f64 * 0.017);
            for v in [b.sub_bass, b.bass, b.snare, b.hat] {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
