//! Run configuration and the auto-scale governor.
//!
//! The whole pipeline is parameterized by one immutable [`CoreConfig`]
//! value built up front and validated before anything allocates.
//! After the last event, the auto-scale governor derives the video
//! frame rate and the decay window from the observed data span, so a
//! week of logs plays back in roughly the same wall time as a day.

use std::path::PathBuf;

use crate::error::{Result, TplotError};
use crate::hilbert::{HilbertOrder, ORDER_DEFAULT};
use crate::video;

/// Default bin duration: one minute.
pub const BIN_SECONDS_DEFAULT: u32 = 60;

/// Default decay window: three hours.
pub const DECAY_SECONDS_DEFAULT: u32 = 3 * 60 * 60;

/// Default output frame width.
pub const VIZ_WIDTH_DEFAULT: u32 = 3440;

/// Default output frame height.
pub const VIZ_HEIGHT_DEFAULT: u32 = 1440;

/// Default target video length in seconds.
pub const TARGET_DURATION_DEFAULT: u32 = 300;

/// Default video frame rate (replaced when auto-scaling is on).
pub const VIDEO_FPS_DEFAULT: u32 = 3;

/// Pipeline configuration.
///
/// Construct with [`Default`], adjust fields, then let
/// [`CoreConfig::validate`] reject anything out of range.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Time bin duration in seconds
    pub bin_seconds: u32,
    /// Hilbert curve order
    pub order: HilbertOrder,
    /// Decay window in seconds (auto-scaled unless disabled)
    pub decay_seconds: u32,
    /// Output frame width in pixels
    pub viz_width: u32,
    /// Output frame height in pixels
    pub viz_height: u32,
    /// Desired video length, 10..=3600 seconds
    pub target_video_duration: u32,
    /// Derive FPS and decay from the observed data span
    pub auto_scale: bool,
    /// Render the bin timestamp strip below each frame
    pub show_timestamp: bool,
    /// CIDR mapping file; missing or unreadable falls back to direct
    /// Hilbert mapping with a warning
    pub cidr_map_path: Option<PathBuf>,
    /// Directory for frames and the video
    pub output_dir: PathBuf,
    /// Frame filename prefix
    pub output_prefix: String,
    /// Run the external encoder after the last frame
    pub generate_video: bool,
    /// Video frame rate, 1..=120
    pub video_fps: u32,
    /// Video codec, validated against the encoder whitelist
    pub video_codec: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bin_seconds: BIN_SECONDS_DEFAULT,
            order: HilbertOrder::new(ORDER_DEFAULT).expect("default order is valid"),
            decay_seconds: DECAY_SECONDS_DEFAULT,
            viz_width: VIZ_WIDTH_DEFAULT,
            viz_height: VIZ_HEIGHT_DEFAULT,
            target_video_duration: TARGET_DURATION_DEFAULT,
            auto_scale: true,
            show_timestamp: false,
            cidr_map_path: None,
            output_dir: PathBuf::from("plots"),
            output_prefix: String::from("frame"),
            generate_video: true,
            video_fps: VIDEO_FPS_DEFAULT,
            video_codec: String::from("libx264"),
        }
    }
}

impl CoreConfig {
    /// Check every numeric range and the codec whitelist.
    pub fn validate(&self) -> Result<()> {
        if self.bin_seconds == 0 {
            return Err(TplotError::InvalidConfig("bin period must be positive".into()));
        }
        if self.decay_seconds == 0 {
            return Err(TplotError::InvalidConfig("decay window must be positive".into()));
        }
        if self.viz_width == 0 || self.viz_height == 0 {
            return Err(TplotError::InvalidConfig(format!(
                "output resolution {}x{} is not drawable",
                self.viz_width, self.viz_height
            )));
        }
        if !(10..=3600).contains(&self.target_video_duration) {
            return Err(TplotError::InvalidConfig(format!(
                "video duration {} out of range 10-3600",
                self.target_video_duration
            )));
        }
        if !(1..=120).contains(&self.video_fps) {
            return Err(TplotError::InvalidConfig(format!(
                "framerate {} out of range 1-120",
                self.video_fps
            )));
        }
        if self.generate_video && !video::is_valid_codec(&self.video_codec) {
            return Err(TplotError::InvalidConfig(format!(
                "codec '{}' is not in the allowed set",
                self.video_codec
            )));
        }
        if self.output_prefix.is_empty() {
            return Err(TplotError::InvalidConfig("output prefix must not be empty".into()));
        }
        Ok(())
    }
}

/// Parse a duration like `1m`, `90s`, `2h`, or a bare second count.
/// Suffixes are case-insensitive; the value must be positive.
pub fn parse_duration(text: &str) -> Result<u32> {
    let text = text.trim();
    let invalid = || TplotError::InvalidConfig(format!("invalid duration '{}'", text));

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, suffix) = text.split_at(split);

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }

    let multiplier: u64 = match suffix {
        "" | "s" | "S" => 1,
        "m" | "M" => 60,
        "h" | "H" => 3600,
        _ => return Err(invalid()),
    };

    u32::try_from(value * multiplier).map_err(|_| invalid())
}

/// Format a second count compactly: `3600` becomes `1h`, `300`
/// becomes `5m`, `90` stays `90s`.
pub fn format_duration(seconds: u32) -> String {
    if seconds % 3600 == 0 {
        format!("{}h", seconds / 3600)
    } else if seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Parameters derived from the observed data span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoScale {
    /// Video frame rate, 1..=120
    pub fps: u32,
    /// Decay window in seconds, at least one hour
    pub decay_seconds: u32,
}

impl AutoScale {
    /// Derive playback parameters from the first and last event times.
    ///
    /// Baseline: one day of data plays at 3 FPS with a 3 hour decay
    /// window, both scaling linearly with the span. Returns `None`
    /// when the span is empty.
    pub fn derive(first_timestamp: i64, last_timestamp: i64) -> Option<Self> {
        if first_timestamp <= 0 || last_timestamp <= first_timestamp {
            return None;
        }

        let span_days = (last_timestamp - first_timestamp) as f64 / 86_400.0;

        let fps = ((span_days * 3.0 + 0.5) as u32).clamp(1, 120);
        let decay_seconds = ((span_days * 3.0 * 3600.0) as u32).max(3600);

        Some(Self { fps, decay_seconds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_suffixes() {
        assert_eq!(parse_duration("1m").unwrap(), 60);
        assert_eq!(parse_duration("5M").unwrap(), 300);
        assert_eq!(parse_duration("30s").unwrap(), 30);
        assert_eq!(parse_duration("60").unwrap(), 60);
        assert_eq!(parse_duration("2h").unwrap(), 7200);
        assert_eq!(parse_duration("2H").unwrap(), 7200);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-5m").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("10mm").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(60), "1m");
        assert_eq!(format_duration(300), "5m");
        assert_eq!(format_duration(3600), "1h");
        assert_eq!(format_duration(7200), "2h");
        assert_eq!(format_duration(90), "90s");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = CoreConfig::default();
        config.video_fps = 0;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.target_video_duration = 5;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.video_codec = String::from("rm -rf /");
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.viz_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auto_scale_baseline_one_day() {
        let scaled = AutoScale::derive(1_700_000_000, 1_700_000_000 + 86_400).unwrap();
        assert_eq!(scaled.fps, 3);
        assert_eq!(scaled.decay_seconds, 3 * 3600);
    }

    #[test]
    fn test_auto_scale_scales_linearly() {
        let week = AutoScale::derive(1_700_000_000, 1_700_000_000 + 7 * 86_400).unwrap();
        assert_eq!(week.fps, 21);
        assert_eq!(week.decay_seconds, 21 * 3600);
    }

    #[test]
    fn test_auto_scale_clamps() {
        // Two months of data pins the frame rate at the ceiling.
        let long = AutoScale::derive(1_700_000_000, 1_700_000_000 + 60 * 86_400).unwrap();
        assert_eq!(long.fps, 120);

        // A few minutes of data floors both values.
        let short = AutoScale::derive(1_700_000_000, 1_700_000_000 + 300).unwrap();
        assert_eq!(short.fps, 1);
        assert_eq!(short.decay_seconds, 3600);
    }

    #[test]
    fn test_auto_scale_empty_span() {
        assert!(AutoScale::derive(0, 100).is_none());
        assert!(AutoScale::derive(1_700_000_000, 1_700_000_000).is_none());
        assert!(AutoScale::derive(1_700_000_000, 1_600_000_000).is_none());
    }
}
