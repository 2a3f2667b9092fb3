//! Video-to-MIDI generator
//!
//! Scans video frames with simple color and darkness heuristics and emits a
//! five-track percussion-and-bass MIDI file timed to the frame sequence.

pub mod config;
pub mod error;
pub mod features;
pub mod midi;
pub mod report;
pub mod rules;
pub mod video;

pub use config::Config;
pub use error::{Result as VideoMidiResult, VideoMidiError};
pub use features::FeatureSet;
pub use midi::MidiAssembler;
pub use report::GenerationReport;
pub use rules::{NoteEvent, RuleEngine, Track};
pub use video::{FfmpegFrameSource, Frame, FrameSource, MemoryFrameSource};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Receives the running frame count while a video is processed
pub trait ProgressObserver {
    fn on_frame(&mut self, frames_processed: usize);
}

impl<F: FnMut(usize)> ProgressObserver for F {
    fn on_frame(&mut self, frames_processed: usize) {
        self(frames_processed)
    }
}

/// Observer that ignores progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_frame(&mut self, _frames_processed: usize) {}
}

/// Result of running the rules over a frame stream
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub assembler: MidiAssembler,
    pub frames_processed: usize,
    pub frame_ticks: u32,
}

/// Main processing pipeline for video-to-MIDI generation
pub struct VideoToMidi {
    config: Config,
    seed: Option<u64>,
}

impl VideoToMidi {
    /// Create a new processor with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config, seed: None }
    }

    /// Fix the random seed used by the bass line
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process every frame of `source` in order
    pub fn run<S, R, O>(
        &self,
        source: &mut S,
        rng: &mut R,
        observer: &mut O,
    ) -> VideoMidiResult<GenerationRun>
    where
        S: FrameSource + ?Sized,
        R: Rng,
        O: ProgressObserver + ?Sized,
    {
        config::validate_config(&self.config)?;

        let toggles = self.config.tracks;
        let needs_features = toggles.snare || toggles.hi_hat || toggles.toms;
        let mut engine = RuleEngine::new(&self.config);
        let mut assembler = MidiAssembler::new();
        let mut frames_processed = 0;
        let (width, height) = source.dimensions();

        while let Some(frame) = source.next_frame()? {
            if frame.pixel_count() == 0 {
                return Err(VideoMidiError::DegenerateFrame(
                    frame.width() as u32,
                    frame.height() as u32,
                ));
            }
            if (frame.width(), frame.height()) != (width as usize, height as usize) {
                return Err(VideoMidiError::MalformedStream(format!(
                    "frame {} is {}x{}, stream is {}x{}",
                    frame.index,
                    frame.width(),
                    frame.height(),
                    width,
                    height
                )));
            }

            let index = frames_processed;
            let features = if needs_features {
                FeatureSet::extract(&frame, &self.config.thresholds)
            } else {
                FeatureSet::default()
            };
            log::trace!("frame {}: {:?}", index, features);

            for track in Track::ALL {
                if track.is_enabled(&toggles) {
                    let event = engine.evaluate(track, index, &features, rng);
                    assembler.push(track, event);
                }
            }

            frames_processed += 1;
            observer.on_frame(frames_processed);
        }

        Ok(GenerationRun {
            assembler,
            frames_processed,
            frame_ticks: engine.frame_ticks(),
        })
    }

    /// Run `source` and write the MIDI file to `output`
    pub fn generate_from_source<S, O>(
        &self,
        source: &mut S,
        output: &Path,
        observer: &mut O,
    ) -> VideoMidiResult<GenerationReport>
    where
        S: FrameSource + ?Sized,
        O: ProgressObserver + ?Sized,
    {
        let report = self.write_midi(source, output, observer)?;
        self.export_report(&report)?;
        Ok(report)
    }

    /// Decode `input` and write the MIDI file to `output`
    pub fn generate<P, Q, O>(
        &self,
        input: P,
        output: Q,
        observer: &mut O,
    ) -> VideoMidiResult<GenerationReport>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        O: ProgressObserver + ?Sized,
    {
        let input = input.as_ref();
        validate_input(input, &self.config)?;

        log::info!("Generating MIDI from {}", input.display());
        let mut source = FfmpegFrameSource::open(input)?;
        let mut report = self.write_midi(&mut source, output.as_ref(), observer)?;
        report.input = Some(input.to_path_buf());

        self.export_report(&report)?;
        Ok(report)
    }

    fn write_midi<S, O>(
        &self,
        source: &mut S,
        output: &Path,
        observer: &mut O,
    ) -> VideoMidiResult<GenerationReport>
    where
        S: FrameSource + ?Sized,
        O: ProgressObserver + ?Sized,
    {
        let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut rng = StdRng::seed_from_u64(seed);

        let assumed_fps = self.config.timing.frames_per_second;
        if let Some(fps) = source.source_fps() {
            if (fps - assumed_fps).abs() > 0.01 {
                log::warn!(
                    "Source runs at {:.3} fps but timing assumes {} fps; output tempo will drift",
                    fps,
                    assumed_fps
                );
            }
        }

        let run = self.run(source, &mut rng, observer)?;

        let timing = &self.config.timing;
        midi::export_midi(
            &run.assembler,
            output,
            &self.config.export,
            timing.ticks_per_beat,
            timing.bpm,
        )?;

        log::info!(
            "Processed {} frames ({} ticks per frame, seed {})",
            run.frames_processed,
            run.frame_ticks,
            seed
        );

        let mut report = GenerationReport::build(
            &run.assembler,
            &self.config.tracks,
            run.frames_processed,
            run.frame_ticks,
        );
        report.output = Some(output.to_path_buf());
        report.source_fps = source.source_fps();
        report.seed = Some(seed);
        Ok(report)
    }

    fn export_report(&self, report: &GenerationReport) -> VideoMidiResult<()> {
        if let Some(report_path) = &self.config.export.report_path {
            report::export_report(report, report_path)?;
        }
        Ok(())
    }
}

/// Validate configuration and input file
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> VideoMidiResult<()> {
    video::validate_video_file(input_path)?;
    config::validate_config(config)?;
    Ok(())
}
