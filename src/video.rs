//! Video frame sources
//!
//! Frames are decoded to packed RGB and exposed one at a time through
//! [`FrameSource`]. The stream is sequential, finite and cannot be restarted.

use crate::error::{Result as VideoMidiResult, VideoMidiError};
use ndarray::Array3;
use serde::Deserialize;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

/// A decoded video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based position in the stream
    pub index: usize,
    /// RGB pixels, shape `(height, width, 3)`
    pub pixels: Array3<u8>,
}

impl Frame {
    /// Build a frame from packed `rgb24` bytes
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>, index: usize) -> VideoMidiResult<Self> {
        let shape = (height as usize, width as usize, 3);
        let pixels = Array3::from_shape_vec(shape, data).map_err(|e| {
            VideoMidiError::MalformedStream(format!(
                "frame {} does not match {}x{}: {}",
                index, width, height, e
            ))
        })?;
        Ok(Frame { index, pixels })
    }

    /// Frame of a single solid color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Self {
        let pixels = Array3::from_shape_fn((height as usize, width as usize, 3), |(_, _, c)| rgb[c]);
        Frame { index, pixels }
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }
}

/// Sequential, finite source of frames
pub trait FrameSource {
    /// `(width, height)` of every frame produced
    fn dimensions(&self) -> (u32, u32);

    /// Frame rate reported by the container, when known
    fn source_fps(&self) -> Option<f64>;

    /// Next frame, or `None` once the stream is exhausted
    fn next_frame(&mut self) -> VideoMidiResult<Option<Frame>>;
}

/// In-memory frame source for synthetic input
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameSource {
    frames: VecDeque<Frame>,
    width: u32,
    height: u32,
    fps: Option<f64>,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width() as u32, f.height() as u32))
            .unwrap_or((0, 0));
        Self {
            frames: frames.into(),
            width,
            height,
            fps: None,
        }
    }

    /// `count` identical solid-color frames
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| Frame::filled(width, height, rgb, i))
                .collect(),
        )
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }
}

impl FrameSource for MemoryFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn source_fps(&self) -> Option<f64> {
        self.fps
    }

    fn next_frame(&mut self) -> VideoMidiResult<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// Stream properties reported by `ffprobe`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
}

/// Frame source backed by an `ffmpeg` child process emitting `rgb24` rawvideo
pub struct FfmpegFrameSource {
    path: PathBuf,
    info: VideoInfo,
    child: Child,
    stdout: ChildStdout,
    next_index: usize,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Probe and open the first video stream of `path`
    pub fn open<P: AsRef<Path>>(path: P) -> VideoMidiResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe_video(&path)?;
        if info.width == 0 || info.height == 0 {
            return Err(VideoMidiError::DegenerateFrame(info.width, info.height));
        }

        let mut child = Command::new("ffmpeg")
            .args(decoder_args(&path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                VideoMidiError::DecoderOpenFailed(format!("could not start ffmpeg: {}", e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            VideoMidiError::DecoderOpenFailed("ffmpeg stdout unavailable".to_string())
        })?;

        log::debug!(
            "Opened {} ({}x{}, fps {:?})",
            path.display(),
            info.width,
            info.height,
            info.fps
        );

        Ok(Self {
            path,
            info,
            child,
            stdout,
            next_index: 0,
            finished: false,
        })
    }

    fn finish(&mut self) -> VideoMidiResult<()> {
        self.finished = true;
        let status = self.child.wait().map_err(|e| {
            VideoMidiError::MalformedStream(format!("waiting for ffmpeg: {}", e))
        })?;
        match exit_error(status.success(), &status.to_string(), self.next_index, &self.path) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn source_fps(&self) -> Option<f64> {
        self.info.fps
    }

    fn next_frame(&mut self) -> VideoMidiResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let (width, height) = (self.info.width, self.info.height);
        match read_frame(&mut self.stdout, width, height, self.next_index) {
            Ok(Some(frame)) => {
                self.next_index += 1;
                Ok(Some(frame))
            }
            Ok(None) => {
                self.finish()?;
                Ok(None)
            }
            Err(err) => {
                self.finished = true;
                let _ = self.child.kill();
                let _ = self.child.wait();
                Err(err)
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// `ffmpeg` arguments decoding the first video stream of `path` to `rgb24` on stdout.
/// Autorotation stays off so frames keep the coded size reported by `ffprobe`.
fn decoder_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(
        ["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .iter()
            .map(OsString::from),
    );
    args
}

/// Read one `width` x `height` rgb24 frame. A clean end of stream at a frame
/// boundary yields `None`; a partial frame is a truncated stream.
fn read_frame<R: Read>(
    reader: &mut R,
    width: u32,
    height: u32,
    index: usize,
) -> VideoMidiResult<Option<Frame>> {
    let mut buf = vec![0u8; width as usize * height as usize * 3];
    let filled = read_full(reader, &mut buf)
        .map_err(|e| VideoMidiError::MalformedStream(format!("reading frame: {}", e)))?;

    if filled == 0 {
        return Ok(None);
    }
    if filled < buf.len() {
        return Err(VideoMidiError::MalformedStream(format!(
            "truncated frame {} ({} of {} bytes)",
            index,
            filled,
            buf.len()
        )));
    }
    Frame::from_rgb(width, height, buf, index).map(Some)
}

/// Classify the decoder's exit once its output is exhausted
fn exit_error(
    success: bool,
    status: &str,
    frames_read: usize,
    path: &Path,
) -> Option<VideoMidiError> {
    if success {
        return None;
    }
    let msg = format!("ffmpeg exited with {} for {}", status, path.display());
    Some(if frames_read == 0 {
        VideoMidiError::DecoderOpenFailed(msg)
    } else {
        VideoMidiError::MalformedStream(msg)
    })
}

/// Read until `buf` is full or the reader is exhausted, returning bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Query the first video stream's dimensions and frame rate with `ffprobe`
pub fn probe_video<P: AsRef<Path>>(path: P) -> VideoMidiResult<VideoInfo> {
    let path = path.as_ref();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| VideoMidiError::DecoderOpenFailed(format!("could not start ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(VideoMidiError::DecoderOpenFailed(format!(
            "ffprobe rejected {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
        .map_err(|msg| VideoMidiError::DecoderOpenFailed(format!("{}: {}", path.display(), msg)))
}

fn parse_probe_output(json: &[u8]) -> std::result::Result<VideoInfo, String> {
    let probe: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| format!("unreadable probe output: {}", e))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream found".to_string())?;

    Ok(VideoInfo {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        fps: stream.r_frame_rate.as_deref().and_then(parse_frame_rate),
    })
}

/// Parse an ffmpeg rational such as `30000/1001`
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Check that the input exists and can be opened for reading
pub fn validate_video_file<P: AsRef<Path>>(path: P) -> VideoMidiResult<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(VideoMidiError::InputUnavailable(
            "no video file selected".to_string(),
        ));
    }
    let metadata = std::fs::metadata(path).map_err(|e| {
        VideoMidiError::InputUnavailable(format!("{}: {}", path.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(VideoMidiError::InputUnavailable(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    std::fs::File::open(path)
        .map_err(|e| VideoMidiError::InputUnavailable(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_frame_shape() {
        let frame = Frame::filled(4, 3, [10, 20, 30], 7);
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.pixel_count(), 12);
        assert_eq!(frame.pixels[[2, 3, 2]], 30);
        assert_eq!(frame.index, 7);
    }

    #[test]
    fn test_from_rgb_rejects_wrong_length() {
        let result = Frame::from_rgb(2, 2, vec![0u8; 11], 0);
        assert!(matches!(result, Err(VideoMidiError::MalformedStream(_))));
    }

    #[test]
    fn test_from_rgb_row_major_layout() {
        // 2x1 frame: red then blue
        let frame = Frame::from_rgb(2, 1, vec![255, 0, 0, 0, 0, 255], 0).unwrap();
        assert_eq!(frame.pixels[[0, 0, 0]], 255);
        assert_eq!(frame.pixels[[0, 1, 2]], 255);
        assert_eq!(frame.pixels[[0, 1, 0]], 0);
    }

    #[test]
    fn test_memory_source_is_exhaustible() {
        let mut source = MemoryFrameSource::solid(8, 8, [0, 0, 0], 2);
        assert_eq!(source.dimensions(), (8, 8));
        assert_eq!(source.next_frame().unwrap().unwrap().index, 0);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 1);
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("24/1"), Some(24.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("n/a"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{"streams":[{"width":640,"height":360,"r_frame_rate":"25/1"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(
            info,
            VideoInfo {
                width: 640,
                height: 360,
                fps: Some(25.0)
            }
        );

        assert!(parse_probe_output(br#"{"streams":[]}"#).is_err());
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_read_full_reports_partial_reads() {
        let data = [1u8, 2, 3];
        let mut buf = [0u8; 5];
        let n = read_full(&mut &data[..], &mut buf).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_read_frame_clean_end_of_stream() {
        let data: [u8; 0] = [];
        let frame = read_frame(&mut &data[..], 2, 2, 0).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn test_read_frame_partial_frame_is_truncated() {
        // one full 2x2 frame followed by half of the next
        let data = vec![7u8; 12 + 6];
        let mut reader = &data[..];
        let first = read_frame(&mut reader, 2, 2, 0).unwrap().unwrap();
        assert_eq!(first.index, 0);
        let result = read_frame(&mut reader, 2, 2, 1);
        assert!(matches!(result, Err(VideoMidiError::MalformedStream(_))));
    }

    #[test]
    fn test_read_frame_sequence_keeps_layout() {
        // 3 frames of 3x2, each filled with its own value
        let data: Vec<u8> = (0..3u8).flat_map(|v| vec![v; 18]).collect();
        let mut reader = &data[..];
        for expected in 0..3usize {
            let frame = read_frame(&mut reader, 3, 2, expected).unwrap().unwrap();
            assert_eq!(frame.index, expected);
            assert_eq!((frame.width(), frame.height()), (3, 2));
            assert!(frame.pixels.iter().all(|&p| p as usize == expected));
        }
        assert!(read_frame(&mut reader, 3, 2, 3).unwrap().is_none());
    }

    #[test]
    fn test_exit_status_classification() {
        let path = Path::new("clip.mp4");
        assert!(exit_error(true, "exit status: 0", 0, path).is_none());
        assert!(matches!(
            exit_error(false, "exit status: 1", 0, path),
            Some(VideoMidiError::DecoderOpenFailed(_))
        ));
        assert!(matches!(
            exit_error(false, "exit status: 1", 12, path),
            Some(VideoMidiError::MalformedStream(_))
        ));
    }

    #[test]
    fn test_decoder_keeps_coded_orientation() {
        let args = decoder_args(Path::new("portrait.mp4"));
        let pos = |flag: &str| args.iter().position(|a| a == flag);
        let noautorotate = pos("-noautorotate").unwrap();
        let input = pos("-i").unwrap();
        assert!(noautorotate < input);
        assert_eq!(args[input + 1], OsString::from("portrait.mp4"));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn test_validate_missing_file() {
        let result = validate_video_file("/definitely/not/here.mp4");
        assert!(matches!(result, Err(VideoMidiError::InputUnavailable(_))));
        assert!(validate_video_file("").is_err());
    }
}
