use crate::audio::bands::AudioBands;

pub const KICK_THRESHOLD: f32 = 0.6;
pub const SNARE_THRESHOLD: f32 = 0.45;
/// 250 ms caps kicks at 240 BPM.
pub const KICK_DEBOUNCE: f64 = 0.25;
pub const SNARE_DEBOUNCE: f64 = 0.18;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorConfig {
    pub kick_threshold: f32,
    pub snare_threshold: f32,
    pub kick_debounce: f64,
    pub snare_debounce: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kick_threshold: KICK_THRESHOLD,
            snare_threshold: SNARE_THRESHOLD,
            kick_debounce: KICK_DEBOUNCE,
            snare_debounce: SNARE_DEBOUNCE,
        }
    }
}

/// Counters owned by one detector instance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BeatState {
    pub last_beat_time: Option<f64>,
    pub last_snare_time: Option<f64>,
    /// Position in the bar, 0..=3.
    pub beat_counter: u8,
    /// Completed bars; never wraps.
    pub bar_counter: u64,
    pub beats_since_stutter: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KickEvent {
    pub beat: u8,
    pub bar: u64,
    /// Set when this kick completed a bar that lands on a 4-bar boundary.
    pub phrase_boundary: bool,
    pub strength: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnareEvent {
    pub strength: f32,
}

/// What fired on one tick. Kick and snare are independent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Onsets {
    pub kick: Option<KickEvent>,
    pub snare: Option<SnareEvent>,
}

#[derive(Clone, Debug, Default)]
pub struct BeatDetector {
    config: DetectorConfig,
    state: BeatState,
}

impl BeatDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: BeatState::default(),
        }
    }

    pub fn state(&self) -> &BeatState {
        &self.state
    }

    pub fn reset_stutter_count(&mut self) {
        self.state.beats_since_stutter = 0;
    }

    pub fn process(&mut self, now: f64, bands: &AudioBands) -> Onsets {
        let mut onsets = Onsets::default();
        let cfg = self.config;
        let s = &mut self.state;

        if bands.bass > cfg.kick_threshold && elapsed(s.last_beat_time, now) > cfg.kick_debounce {
            s.last_beat_time = Some(now);
            s.beat_counter = (s.beat_counter + 1) % 4;
            let mut phrase_boundary = false;
            if s.beat_counter == 0 {
                s.bar_counter += 1;
                phrase_boundary = s.bar_counter % 4 == 0;
            }
            s.beats_since_stutter = s.beats_since_stutter.saturating_add(1);
            onsets.kick = Some(KickEvent {
                beat: s.beat_counter,
                bar: s.bar_counter,
                phrase_boundary,
                strength: bands.bass,
            });
        }

        if bands.snare > cfg.snare_threshold && elapsed(s.last_snare_time, now) > cfg.snare_debounce {
            s.last_snare_time = Some(now);
            onsets.snare = Some(SnareEvent { strength: bands.snare });
        }

        onsets
    }
}

fn elapsed(last: Option<f64>, now: f64) -> f64 {
    last.map_or(f64::INFINITY, |t| now - t)
}
