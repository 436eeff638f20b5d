use rand::Rng;
use serde::Deserialize;
use std::fmt;

/// Interval used when density is 0: stuttering is effectively off.
pub const DISABLED_INTERVAL: u32 = 9999;
/// Burst length in seconds.
pub const BURST_DURATION: f64 = 0.4;
/// Time between pose swaps inside a burst.
pub const BURST_HIT_INTERVAL: f64 = 0.06;
/// Snare energy needed to open a burst.
pub const STUTTER_THRESHOLD: f32 = 0.6;

/// Concrete glitch look used while a burst is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlitchStyle {
    Shiver,
    Jump,
    Smash,
    Slice,
}

impl GlitchStyle {
    pub const ALL: [GlitchStyle; 4] = [GlitchStyle::Shiver, GlitchStyle::Jump, GlitchStyle::Smash, GlitchStyle::Slice];

    pub fn name(self) -> &'static str {
        match self {
            GlitchStyle::Shiver => "shiver",
            GlitchStyle::Jump => "jump",
            GlitchStyle::Smash => "smash",
            GlitchStyle::Slice => "slice",
        }
    }
}

impl fmt::Display for GlitchStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User preference; `Auto` draws a style per burst.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StutterStyle {
    #[default]
    Auto,
    Shiver,
    Jump,
    Smash,
    Slice,
}

impl StutterStyle {
    pub fn resolve<R: Rng + ?Sized>(self, rng: &mut R) -> GlitchStyle {
        match self {
            StutterStyle::Auto => GlitchStyle::ALL[rng.gen_range(0..GlitchStyle::ALL.len())],
            StutterStyle::Shiver => GlitchStyle::Shiver,
            StutterStyle::Jump => GlitchStyle::Jump,
            StutterStyle::Smash => GlitchStyle::Smash,
            StutterStyle::Slice => GlitchStyle::Slice,
        }
    }
}

/// Beats required between bursts for a 0-100 density knob.
pub fn interval_beats(density: u8) -> u32 {
    if density == 0 {
        return DISABLED_INTERVAL;
    }
    let d = density.min(100) as f32 / 100.0;
    ((32.0 - d * 30.0).round() as u32).max(2)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Burst {
    pub style: GlitchStyle,
    pub until: f64,
    next_hit: f64,
}

/// NORMAL / BURST state machine.
#[derive(Clone, Debug)]
pub struct StutterMachine {
    density: u8,
    style: StutterStyle,
    burst: Option<Burst>,
}

impl StutterMachine {
    pub fn new(density: u8, style: StutterStyle) -> Self {
        Self {
            density: density.min(100),
            style,
            burst: None,
        }
    }

    pub fn interval(&self) -> u32 {
        interval_beats(self.density)
    }

    pub fn is_active(&self) -> bool {
        self.burst.is_some()
    }

    /// Drop an expired burst. Returns true on the BURST -> NORMAL edge.
    pub fn expire(&mut self, now: f64) -> bool {
        match self.burst {
            Some(b) if now > b.until => {
                self.burst = None;
                true
            }
            _ => false,
        }
    }

    /// Try to open a burst on a snare event.
    pub fn try_trigger<R: Rng + ?Sized>(
        &mut self,
        now: f64,
        snare: f32,
        beats_since_stutter: u32,
        rng: &mut R,
    ) -> Option<GlitchStyle> {
        if self.burst.is_some() || snare <= STUTTER_THRESHOLD || beats_since_stutter < self.interval() {
            return None;
        }
        let style = self.style.resolve(rng);
        self.burst = Some(Burst {
            style,
            until: now + BURST_DURATION,
            next_hit: now,
        });
        Some(style)
    }

    /// Style to hit with if a burst hit is due at `now`.
    pub fn due_hit(&mut self, now: f64) -> Option<GlitchStyle> {
        let burst = self.burst.as_mut()?;
        if now < burst.next_hit {
            return None;
        }
        // Catch up without replaying every missed hit after a long frame.
        while burst.next_hit <= now {
            burst.next_hit += BURST_HIT_INTERVAL;
        }
        Some(burst.style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn interval_endpoints() {
        assert!(interval_beats(0) >= 9000);
        assert_eq!(interval_beats(100), 2);
        assert_eq!(interval_beats(50), 17);
        assert_eq!(interval_beats(255), 2);
    }

    #[test]
    fn interval_is_non_increasing_in_density() {
        let mut prev = interval_beats(0);
        for d in 1..=100u8 {
            let cur = interval_beats(d);
            assert!(cur <= prev, "density {d}: {cur} > {prev}");
            prev = cur;
        }
    }

    #[test]
    fn triggers_only_once_the_interval_is_reached() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut m = StutterMachine::new(50, StutterStyle::Slice);
        assert_eq!(m.try_trigger(0.0, 0.9, 16, &mut rng), None);
        assert_eq!(m.try_trigger(0.0, 0.5, 17, &mut rng), None);
        assert_eq!(m.try_trigger(0.0, 0.9, 17, &mut rng), Some(GlitchStyle::Slice));
        // already bursting
        assert_eq!(m.try_trigger(0.1, 0.9, 40, &mut rng), None);
    }

    #[test]
    fn burst_expires_after_its_window() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut m = StutterMachine::new(100, StutterStyle::Jump);
        m.try_trigger(1.0, 1.0, 2, &mut rng);
        assert!(!m.expire(1.4));
        assert!(m.is_active());
        assert!(m.expire(1.41));
        assert!(!m.is_active());
        assert!(!m.expire(2.0));
    }

    #[test]
    fn hits_are_spaced_by_the_hit_interval() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut m = StutterMachine::new(100, StutterStyle::Smash);
        m.try_trigger(0.0, 1.0, 2, &mut rng);
        let mut hits = 0;
        let mut t = 0.0;
        while t <= BURST_DURATION {
            if m.due_hit(t).is_some() {
                hits += 1;
            }
            t += 0.01;
        }
        // 0.00, 0.06, ... 0.36
        assert_eq!(hits, 7);
    }

    #[test]
    fn auto_style_draws_every_glitch() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(StutterStyle::Auto.resolve(&mut rng));
        }
        assert_eq!(seen.len(), 4);
    }
}
