//! Per-track note emission rules

use crate::config::{BassConfig, Config, ThresholdConfig, TimingConfig, TrackToggles};
use crate::features::FeatureSet;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Instrument tracks, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Track {
    Bass,
    Snare,
    HiHat,
    Crash,
    Toms,
}

impl Track {
    pub const ALL: [Track; 5] = [
        Track::Bass,
        Track::Snare,
        Track::HiHat,
        Track::Crash,
        Track::Toms,
    ];

    /// Position of the track in the MIDI file
    pub fn index(&self) -> usize {
        match self {
            Track::Bass => 0,
            Track::Snare => 1,
            Track::HiHat => 2,
            Track::Crash => 3,
            Track::Toms => 4,
        }
    }

    /// Note carried by the silent placeholder event
    pub fn rest_note(&self) -> u8 {
        match self {
            Track::Bass => 48,  // C3
            Track::Snare => 38, // acoustic snare
            Track::HiHat => 46, // open hi-hat
            Track::Crash => 49, // crash cymbal 1
            Track::Toms => 41,  // low floor tom
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Track::Bass => "bass",
            Track::Snare => "snare",
            Track::HiHat => "hi-hat",
            Track::Crash => "crash",
            Track::Toms => "toms",
        }
    }

    pub fn is_enabled(&self, toggles: &TrackToggles) -> bool {
        match self {
            Track::Bass => toggles.bass,
            Track::Snare => toggles.snare,
            Track::HiHat => toggles.hi_hat,
            Track::Crash => toggles.crash,
            Track::Toms => toggles.toms,
        }
    }
}

pub const SNARE_NOTE: u8 = 38;
pub const HI_HAT_NOTE: u8 = 46;
pub const CRASH_NOTE: u8 = 49;
pub const TOM_HIGH: u8 = 45;
pub const TOM_MID: u8 = 43;
pub const TOM_LOW: u8 = 41;
pub const FIXED_VELOCITY: u8 = 64;

/// One frame's worth of output on a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteEvent {
    /// Note-on immediately followed, `duration` ticks later, by its note-off
    Note { key: u8, velocity: u8, duration: u32 },
    /// Zero-velocity note-off that only advances the track's time cursor
    Rest { key: u8, duration: u32 },
}

impl NoteEvent {
    pub fn key(&self) -> u8 {
        match self {
            NoteEvent::Note { key, .. } | NoteEvent::Rest { key, .. } => *key,
        }
    }

    pub fn duration(&self) -> u32 {
        match self {
            NoteEvent::Note { duration, .. } | NoteEvent::Rest { duration, .. } => *duration,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, NoteEvent::Note { .. })
    }
}

/// Length of one video frame in ticks
pub fn frame_ticks(timing: &TimingConfig) -> u32 {
    timing.frame_ticks_exact().round() as u32
}

/// Bass line with its memory of the last chosen note
#[derive(Debug, Clone, Default)]
pub struct BassRule {
    pub previous_note: Option<u8>,
}

impl BassRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate<R: Rng>(
        &mut self,
        index: usize,
        config: &BassConfig,
        frame_ticks: u32,
        rng: &mut R,
    ) -> NoteEvent {
        if index % config.trigger_every != 0 {
            return NoteEvent::Rest {
                key: Track::Bass.rest_note(),
                duration: frame_ticks,
            };
        }

        // A note is drawn on every trigger, repeat frames included.
        let drawn = config
            .scale
            .choose(rng)
            .copied()
            .unwrap_or(Track::Bass.rest_note());
        let key = if index % config.repeat_every == 0 {
            self.previous_note.unwrap_or(drawn)
        } else {
            drawn
        };
        self.previous_note = Some(key);

        let [lo, hi] = config.duration_jitter;
        let factor = rng.gen_range(lo..=hi);
        let duration = (frame_ticks as f64 * factor) as u32;

        let [vmin, vmax] = config.velocity_range;
        let velocity = rng.gen_range(vmin..=vmax);

        NoteEvent::Note {
            key,
            velocity,
            duration,
        }
    }
}

/// Evaluates all five track rules for a frame
#[derive(Debug, Clone)]
pub struct RuleEngine {
    thresholds: ThresholdConfig,
    bass_config: BassConfig,
    frame_ticks: u32,
    bass: BassRule,
}

impl RuleEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            bass_config: config.bass.clone(),
            frame_ticks: frame_ticks(&config.timing),
            bass: BassRule::new(),
        }
    }

    pub fn frame_ticks(&self) -> u32 {
        self.frame_ticks
    }

    /// Decide the event for `track` at frame `index`
    pub fn evaluate<R: Rng>(
        &mut self,
        track: Track,
        index: usize,
        features: &FeatureSet,
        rng: &mut R,
    ) -> NoteEvent {
        let t = &self.thresholds;
        let hit = match track {
            Track::Bass => {
                return self
                    .bass
                    .evaluate(index, &self.bass_config, self.frame_ticks, rng)
            }
            Track::Snare => (features.orange_area_percent > t.snare_orange_percent)
                .then_some(SNARE_NOTE),
            Track::HiHat => (features.dark_pixel_percent < t.hi_hat_dark_percent)
                .then_some(HI_HAT_NOTE),
            Track::Crash => (index % self.bass_config.trigger_every == 0).then_some(CRASH_NOTE),
            Track::Toms => {
                if features.orange_column_coverage > t.toms_column_coverage {
                    features.orange_row_centroid.map(|c| tom_for_centroid(c, t))
                } else {
                    None
                }
            }
        };

        match hit {
            Some(key) => NoteEvent::Note {
                key,
                velocity: FIXED_VELOCITY,
                duration: self.frame_ticks,
            },
            None => NoteEvent::Rest {
                key: track.rest_note(),
                duration: self.frame_ticks,
            },
        }
    }
}

/// Map the vertical centroid of the orange mask to a tom
pub fn tom_for_centroid(centroid: f64, thresholds: &ThresholdConfig) -> u8 {
    if centroid < thresholds.toms_high_below {
        TOM_HIGH
    } else if centroid < thresholds.toms_mid_below {
        TOM_MID
    } else {
        TOM_LOW
    }
}
