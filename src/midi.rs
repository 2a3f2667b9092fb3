//! MIDI track assembly and export

use crate::config::{ExportConfig, MAX_DELTA_TICKS, MAX_TEMPO};
use crate::error::{Result as VideoMidiResult, VideoMidiError};
use crate::rules::{NoteEvent, Track};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Per-track event lists in frame order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidiAssembler {
    tracks: [Vec<NoteEvent>; 5],
}

impl MidiAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, track: Track, event: NoteEvent) {
        self.tracks[track.index()].push(event);
    }

    pub fn events(&self, track: Track) -> &[NoteEvent] {
        &self.tracks[track.index()]
    }

    /// Number of frames recorded on `track`
    pub fn frames_on(&self, track: Track) -> usize {
        self.tracks[track.index()].len()
    }

    /// Total ticks spanned by `track`
    pub fn track_length_ticks(&self, track: Track) -> u64 {
        self.events(track).iter().map(|e| e.duration() as u64).sum()
    }

    /// Serialize all five tracks into a Standard MIDI File
    pub fn to_smf_bytes(
        &self,
        export: &ExportConfig,
        ticks_per_beat: u16,
        bpm: f64,
    ) -> VideoMidiResult<Vec<u8>> {
        let channel = u4::from(export.channel);

        let mut tracks = Vec::with_capacity(Track::ALL.len());
        for track in Track::ALL {
            let mut track_events = Vec::new();

            if export.write_tempo && track.index() == 0 {
                let tempo_uspq = (60_000_000.0 / bpm).round();
                if !(tempo_uspq > 0.0 && tempo_uspq <= MAX_TEMPO as f64) {
                    return Err(VideoMidiError::MidiExportError(format!(
                        "tempo of {} bpm does not fit a tempo event",
                        bpm
                    )));
                }
                track_events.push(TrackEvent {
                    delta: u28::from(0),
                    kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo_uspq as u32))),
                });
            }

            for event in self.events(track) {
                append_event(&mut track_events, channel, event)?;
            }

            track_events.push(TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            tracks.push(track_events);
        }

        let smf = Smf {
            header: Header {
                format: Format::Parallel,
                timing: Timing::Metrical(u15::from(ticks_per_beat)),
            },
            tracks,
        };

        let mut bytes = Vec::new();
        smf.write(&mut bytes)
            .map_err(|e| VideoMidiError::MidiExportError(format!("{:?}", e)))?;
        Ok(bytes)
    }
}

fn delta_ticks(ticks: u32) -> VideoMidiResult<u28> {
    if ticks > MAX_DELTA_TICKS {
        return Err(VideoMidiError::MidiExportError(format!(
            "delta of {} ticks exceeds {}",
            ticks, MAX_DELTA_TICKS
        )));
    }
    Ok(u28::from(ticks))
}

fn append_event(
    out: &mut Vec<TrackEvent<'static>>,
    channel: u4,
    event: &NoteEvent,
) -> VideoMidiResult<()> {
    match *event {
        NoteEvent::Note {
            key,
            velocity,
            duration,
        } => {
            out.push(TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::from(key),
                        vel: u7::from(velocity),
                    },
                },
            });
            out.push(TrackEvent {
                delta: delta_ticks(duration)?,
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::from(key),
                        vel: u7::from(velocity),
                    },
                },
            });
        }
        NoteEvent::Rest { key, duration } => {
            out.push(TrackEvent {
                delta: delta_ticks(duration)?,
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::from(key),
                        vel: u7::from(0),
                    },
                },
            });
        }
    }
    Ok(())
}

/// Write the assembled tracks to `path`, replacing any existing file
pub fn export_midi(
    assembler: &MidiAssembler,
    path: &Path,
    export: &ExportConfig,
    ticks_per_beat: u16,
    bpm: f64,
) -> VideoMidiResult<()> {
    let midi_data = assembler.to_smf_bytes(export, ticks_per_beat, bpm)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            VideoMidiError::OutputWriteError(format!("{}: {}", parent.display(), e))
        })?;
    }

    let mut file = File::create(path)
        .map_err(|e| VideoMidiError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
    file.write_all(&midi_data)
        .map_err(|e| VideoMidiError::OutputWriteError(format!("{}: {}", path.display(), e)))?;

    log::info!("Wrote {} bytes of MIDI to {}", midi_data.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Smf<'_> {
        Smf::parse(bytes).unwrap()
    }

    #[test]
    fn test_empty_assembler_writes_five_tracks() {
        let bytes = MidiAssembler::new()
            .to_smf_bytes(&ExportConfig::default(), 480, 120.0)
            .unwrap();
        let smf = parse(&bytes);
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(480)));
        assert_eq!(smf.tracks.len(), 5);
        for track in &smf.tracks {
            assert_eq!(track.len(), 1);
            assert_eq!(track[0].kind, TrackEventKind::Meta(MetaMessage::EndOfTrack));
        }
    }

    #[test]
    fn test_note_and_rest_encoding() {
        let mut asm = MidiAssembler::new();
        asm.push(
            Track::Snare,
            NoteEvent::Note {
                key: 38,
                velocity: 64,
                duration: 40,
            },
        );
        asm.push(Track::Snare, NoteEvent::Rest { key: 38, duration: 40 });

        let bytes = asm
            .to_smf_bytes(&ExportConfig::default(), 480, 120.0)
            .unwrap();
        let smf = parse(&bytes);
        let snare = &smf.tracks[Track::Snare.index()];
        assert_eq!(snare.len(), 4);

        assert_eq!(snare[0].delta, u28::from(0));
        assert_eq!(
            snare[0].kind,
            TrackEventKind::Midi {
                channel: u4::from(9),
                message: MidiMessage::NoteOn {
                    key: u7::from(38),
                    vel: u7::from(64)
                }
            }
        );
        assert_eq!(snare[1].delta, u28::from(40));
        assert!(matches!(
            snare[1].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { .. },
                ..
            }
        ));
        assert_eq!(snare[2].delta, u28::from(40));
        assert_eq!(
            snare[2].kind,
            TrackEventKind::Midi {
                channel: u4::from(9),
                message: MidiMessage::NoteOff {
                    key: u7::from(38),
                    vel: u7::from(0)
                }
            }
        );
    }

    #[test]
    fn test_tempo_meta_only_when_requested() {
        let asm = MidiAssembler::new();
        let has_tempo = |smf: &Smf| {
            smf.tracks.iter().flatten().any(|e| {
                matches!(e.kind, TrackEventKind::Meta(MetaMessage::Tempo(_)))
            })
        };

        let bytes = asm.to_smf_bytes(&ExportConfig::default(), 480, 120.0).unwrap();
        assert!(!has_tempo(&parse(&bytes)));

        let export = ExportConfig {
            write_tempo: true,
            ..ExportConfig::default()
        };
        let bytes = asm.to_smf_bytes(&export, 480, 120.0).unwrap();
        let smf = parse(&bytes);
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::from(500_000)))
        );
    }

    #[test]
    fn test_oversized_values_are_rejected() {
        let mut asm = MidiAssembler::new();
        asm.push(
            Track::Bass,
            NoteEvent::Rest {
                key: 48,
                duration: MAX_DELTA_TICKS + 1,
            },
        );
        let result = asm.to_smf_bytes(&ExportConfig::default(), 480, 120.0);
        assert!(matches!(result, Err(VideoMidiError::MidiExportError(_))));

        let export = ExportConfig {
            write_tempo: true,
            ..ExportConfig::default()
        };
        let result = MidiAssembler::new().to_smf_bytes(&export, 480, 2.0);
        assert!(matches!(result, Err(VideoMidiError::MidiExportError(_))));
    }

    #[test]
    fn test_largest_delta_is_written_intact() {
        let mut asm = MidiAssembler::new();
        asm.push(
            Track::Bass,
            NoteEvent::Rest {
                key: 48,
                duration: MAX_DELTA_TICKS,
            },
        );
        let bytes = asm.to_smf_bytes(&ExportConfig::default(), 480, 120.0).unwrap();
        let smf = parse(&bytes);
        assert_eq!(smf.tracks[0][0].delta.as_int(), MAX_DELTA_TICKS);
    }

    #[test]
    fn test_track_length_ticks() {
        let mut asm = MidiAssembler::new();
        asm.push(Track::Crash, NoteEvent::Rest { key: 49, duration: 40 });
        asm.push(Track::Crash, NoteEvent::Rest { key: 49, duration: 40 });
        assert_eq!(asm.track_length_ticks(Track::Crash), 80);
        assert_eq!(asm.frames_on(Track::Crash), 2);
        assert_eq!(asm.frames_on(Track::Bass), 0);
    }
}
