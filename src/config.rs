//! Configuration system for the video-to-MIDI generator

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub tracks: TrackToggles,
    pub thresholds: ThresholdConfig,
    pub timing: TimingConfig,
    pub bass: BassConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            tracks: TrackToggles::default(),
            thresholds: ThresholdConfig::default(),
            timing: TimingConfig::default(),
            bass: BassConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Per-track enable flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackToggles {
    pub bass: bool,
    pub snare: bool,
    pub hi_hat: bool,
    pub crash: bool,
    pub toms: bool,
}

impl Default for TrackToggles {
    fn default() -> Self {
        Self {
            bass: true,
            snare: true,
            hi_hat: true,
            crash: true,
            toms: true,
        }
    }
}

/// Pixel classification and trigger thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Inclusive lower HSV bound of the orange band (hue 0-179, sat/val 0-255)
    pub orange_hsv_lower: [u8; 3],
    /// Inclusive upper HSV bound of the orange band
    pub orange_hsv_upper: [u8; 3],
    /// A pixel is dark when every channel is strictly below this value
    pub dark_channel_max: u8,
    pub snare_orange_percent: f64,
    pub hi_hat_dark_percent: f64,
    pub toms_column_coverage: f64,
    pub toms_high_below: f64,
    pub toms_mid_below: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            orange_hsv_lower: [15, 40, 20],
            orange_hsv_upper: [50, 255, 255],
            dark_channel_max: 50,
            snare_orange_percent: 5.0,
            hi_hat_dark_percent: 40.0,
            toms_column_coverage: 0.3,
            toms_high_below: 0.33,
            toms_mid_below: 0.66,
        }
    }
}

/// Tick resolution and the tempo/frame-rate assumptions behind frame length
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub ticks_per_beat: u16,
    pub bpm: f64,
    /// Assumed input frame rate; the source's real rate is not used
    pub frames_per_second: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: 480,
            bpm: 120.0,
            frames_per_second: 24.0,
        }
    }
}

impl TimingConfig {
    /// Unrounded length of one frame in ticks
    pub fn frame_ticks_exact(&self) -> f64 {
        self.ticks_per_beat as f64 * self.bpm / 60.0 / self.frames_per_second
    }

    /// Microseconds per beat
    pub fn tempo_uspq(&self) -> f64 {
        60_000_000.0 / self.bpm
    }
}

/// Largest delta time a MIDI event can carry
pub const MAX_DELTA_TICKS: u32 = 0x0FFF_FFFF;
/// Largest value of a tempo meta event
pub const MAX_TEMPO: u32 = 0x00FF_FFFF;

/// Bass line generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BassConfig {
    /// C minor pentatonic
    pub scale: Vec<u8>,
    pub trigger_every: usize,
    pub repeat_every: usize,
    pub duration_jitter: [f64; 2],
    pub velocity_range: [u8; 2],
}

impl Default for BassConfig {
    fn default() -> Self {
        Self {
            scale: vec![48, 51, 53, 55, 58],
            trigger_every: 6,
            repeat_every: 24,
            duration_jitter: [0.8, 1.2],
            velocity_range: [60, 100],
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_path: PathBuf,
    pub channel: u8,
    /// Emit a tempo meta event at the start of the first track
    pub write_tempo: bool,
    pub report_path: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output.mid"),
            channel: 9,
            write_tempo: false,
            report_path: None,
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let timing = &config.timing;
    if timing.ticks_per_beat == 0 || timing.ticks_per_beat > 0x7FFF {
        anyhow::bail!("ticks_per_beat must be in 1..=32767");
    }
    if !(timing.bpm > 0.0) {
        anyhow::bail!("bpm must be positive");
    }
    if !(timing.frames_per_second > 0.0) {
        anyhow::bail!("frames_per_second must be positive");
    }
    if config.export.write_tempo && timing.tempo_uspq().round() > MAX_TEMPO as f64 {
        anyhow::bail!(
            "bpm {} is too slow for a MIDI tempo event (at most {} us per beat)",
            timing.bpm,
            MAX_TEMPO
        );
    }

    let bass = &config.bass;
    if bass.scale.is_empty() {
        anyhow::bail!("bass scale must contain at least one note");
    }
    if let Some(note) = bass.scale.iter().find(|&&n| n > 127) {
        anyhow::bail!("bass scale note {} is outside 0..=127", note);
    }
    if bass.trigger_every == 0 || bass.repeat_every == 0 {
        anyhow::bail!("bass trigger_every and repeat_every must be non-zero");
    }
    if bass.duration_jitter[0] > bass.duration_jitter[1] || bass.duration_jitter[0] < 0.0 {
        anyhow::bail!("bass duration_jitter must be a non-negative [min, max] range");
    }
    if bass.velocity_range[0] > bass.velocity_range[1] || bass.velocity_range[1] > 127 {
        anyhow::bail!("bass velocity_range must be an ordered range within 0..=127");
    }
    let longest_event = timing.frame_ticks_exact().round() * bass.duration_jitter[1].max(1.0);
    if longest_event > MAX_DELTA_TICKS as f64 {
        anyhow::bail!(
            "one frame spans {:.0} ticks, more than a MIDI delta time can hold ({})",
            longest_event,
            MAX_DELTA_TICKS
        );
    }

    let t = &config.thresholds;
    for i in 0..3 {
        if t.orange_hsv_lower[i] > t.orange_hsv_upper[i] {
            anyhow::bail!("orange_hsv_lower must not exceed orange_hsv_upper");
        }
    }
    if t.toms_high_below > t.toms_mid_below {
        anyhow::bail!("toms_high_below must be <= toms_mid_below");
    }

    if config.export.channel > 15 {
        anyhow::bail!("channel must be in 0..=15");
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "tracks": { "toms": false }, "timing": { "bpm": 90.0 } }"#)
                .unwrap();
        assert!(!config.tracks.toms);
        assert!(config.tracks.bass);
        assert_eq!(config.timing.ticks_per_beat, 480);
        assert_eq!(config.timing.bpm, 90.0);
        assert_eq!(config.bass.scale, vec![48, 51, 53, 55, 58]);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut config = Config::default();
        config.bass.velocity_range = [100, 60];
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.export.channel = 16;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.bass.trigger_every = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.timing.frames_per_second = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_frame_longer_than_delta_time() {
        let mut config = Config::default();
        config.timing.frames_per_second = 1e-6;
        assert!(validate_config(&config).is_err());

        // 0x0FFF_FFFF / 1.2 is about 223.7M ticks; the jitter bound must be counted
        let mut config = Config::default();
        config.timing.frames_per_second = 960.0 / 250_000_000.0;
        assert!(validate_config(&config).is_err());
        config.bass.duration_jitter = [0.8, 1.0];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_tempo_out_of_range_only_when_written() {
        let mut config = Config::default();
        config.timing.bpm = 2.0;
        config.timing.frames_per_second = 1.0;
        assert!(validate_config(&config).is_ok());

        config.export.write_tempo = true;
        assert!(validate_config(&config).is_err());

        config.timing.bpm = 4.0;
        assert!(validate_config(&config).is_ok());
    }
}
