//! Error types for the video-to-MIDI generator

use std::fmt;

/// Custom error type for video-to-MIDI generation
#[derive(Debug, Clone)]
pub enum VideoMidiError {
    /// E001: Input video missing or unreadable
    InputUnavailable(String),
    /// E002: Decoder could not open the video
    DecoderOpenFailed(String),
    /// E003: Stream ended in the middle of a frame or could not be read
    MalformedStream(String),
    /// E004: Frame with zero width or height
    DegenerateFrame(u32, u32),
    /// E005: Configuration validation failed
    ConfigValidationFailed(String),
    /// E006: MIDI serialization error
    MidiExportError(String),
    /// E007: Output file could not be written
    OutputWriteError(String),
    /// E008: Report export error
    ReportExportError(String),
}

impl fmt::Display for VideoMidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoMidiError::InputUnavailable(msg) => {
                write!(f, "E001: Input video unavailable - {}", msg)
            }
            VideoMidiError::DecoderOpenFailed(msg) => {
                write!(f, "E002: Could not open video - {}", msg)
            }
            VideoMidiError::MalformedStream(msg) => {
                write!(f, "E003: Malformed video stream - {}", msg)
            }
            VideoMidiError::DegenerateFrame(width, height) => {
                write!(f, "E004: Degenerate frame dimensions {}x{}", width, height)
            }
            VideoMidiError::ConfigValidationFailed(msg) => {
                write!(f, "E005: Configuration validation failed - {}", msg)
            }
            VideoMidiError::MidiExportError(msg) => {
                write!(f, "E006: MIDI export error - {}", msg)
            }
            VideoMidiError::OutputWriteError(msg) => {
                write!(f, "E007: Output write error - {}", msg)
            }
            VideoMidiError::ReportExportError(msg) => {
                write!(f, "E008: Report export error - {}", msg)
            }
        }
    }
}

impl std::error::Error for VideoMidiError {}

impl From<std::io::Error> for VideoMidiError {
    fn from(err: std::io::Error) -> Self {
        VideoMidiError::OutputWriteError(format!("File I/O error: {}", err))
    }
}

impl From<serde_json::Error> for VideoMidiError {
    fn from(err: serde_json::Error) -> Self {
        VideoMidiError::ReportExportError(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for VideoMidiError {
    fn from(err: anyhow::Error) -> Self {
        VideoMidiError::ConfigValidationFailed(format!("{}", err))
    }
}

/// Result type alias for video-to-MIDI operations
pub type Result<T> = std::result::Result<T, VideoMidiError>;
