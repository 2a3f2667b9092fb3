//! Generation summary export

use crate::config::TrackToggles;
use crate::midi::MidiAssembler;
use crate::rules::{NoteEvent, Track};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Summary of one generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub frames_processed: usize,
    pub frame_ticks: u32,
    pub source_fps: Option<f64>,
    pub seed: Option<u64>,
    pub tracks: Vec<TrackSummary>,
}

/// Per-track counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track: Track,
    pub enabled: bool,
    pub events: usize,
    pub notes: usize,
    pub rests: usize,
    pub length_ticks: u64,
    /// Sounding notes by key
    pub note_histogram: BTreeMap<u8, usize>,
}

impl GenerationReport {
    pub fn build(
        assembler: &MidiAssembler,
        toggles: &TrackToggles,
        frames_processed: usize,
        frame_ticks: u32,
    ) -> Self {
        let tracks = Track::ALL
            .iter()
            .map(|&track| summarize(assembler, track, track.is_enabled(toggles)))
            .collect();

        GenerationReport {
            input: None,
            output: None,
            frames_processed,
            frame_ticks,
            source_fps: None,
            seed: None,
            tracks,
        }
    }

    pub fn track(&self, track: Track) -> Option<&TrackSummary> {
        self.tracks.iter().find(|s| s.track == track)
    }
}

fn summarize(assembler: &MidiAssembler, track: Track, enabled: bool) -> TrackSummary {
    let events = assembler.events(track);
    let mut note_histogram = BTreeMap::new();
    for event in events {
        if let NoteEvent::Note { key, .. } = event {
            *note_histogram.entry(*key).or_insert(0usize) += 1;
        }
    }
    let notes = note_histogram.values().sum::<usize>();

    TrackSummary {
        track,
        enabled,
        events: events.len(),
        notes,
        rests: events.len() - notes,
        length_ticks: assembler.track_length_ticks(track),
        note_histogram,
    }
}

/// Write the report as pretty-printed JSON
pub fn export_report(report: &GenerationReport, path: &Path) -> crate::error::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    log::info!("Exported generation report to {}", path.display());
    Ok(())
}
