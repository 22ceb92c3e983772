//! midi.rs
//!
//! Reads a Standard MIDI File back into a flat timeline so we can report what
//! was written: how many notes per channel, which tracks, how long it plays.
//!
//! ### Quick primer on MIDI timing
//! - Timing inside MIDI files is expressed in "ticks", stored as deltas from
//!   the previous event in the same track.
//! - The header gives pulses-per-quarter-note (PPQ); tempo meta events say
//!   how many microseconds one quarter note lasts.
//! - Absolute time for an event is the running sum of its track's deltas,
//!   each converted at the tempo in force when it elapsed.

use std::path::Path;

use anyhow::{Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};

/// A note-on tied to an absolute time in microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timed {
    pub t_us: u64,
    pub channel: u8,
    pub key: u8,
    pub vel: u8,
}

/// Everything we learn from one pass over the file.
pub struct Timeline {
    /// Note-ons from all tracks, ordered by time
    pub notes: Vec<Timed>,
    /// Note-on count per MIDI channel
    pub per_channel: [usize; 16],
    /// Track names in file order
    pub track_names: Vec<String>,
    /// Channels that received a program change
    pub programs: Vec<(u8, u8)>,
    /// Time of the last event of any kind (in µs)
    pub last_t_us: u64,
    /// Pulses per quarter note (from header)
    pub ppq: f64,
    /// First tempo found, or 120 BPM if there is none
    pub initial_us_per_qn: f64,
}

impl Timeline {
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.initial_us_per_qn
    }
}

/// Walk every track, accumulating deltas into absolute microseconds.
pub fn build_timeline(smf: &Smf<'_>) -> Timeline {
    let ppq = match smf.header.timing {
        midly::Timing::Metrical(t) => t.as_int() as f64,
        _ => 480.0, // SMPTE timing never comes out of our writer
    };

    // Default tempo: 500,000 µs per quarter note = 120 BPM
    let mut default_us_per_qn: f64 = 500_000.0;
    'scan: for tr in &smf.tracks {
        for ev in tr {
            if let TrackEventKind::Meta(MetaMessage::Tempo(tp)) = ev.kind {
                default_us_per_qn = tp.as_int() as f64;
                break 'scan;
            }
        }
    }

    let mut notes = Vec::new();
    let mut per_channel = [0usize; 16];
    let mut track_names = Vec::new();
    let mut programs = Vec::new();
    let mut last_t_us = 0u64;

    for tr in &smf.tracks {
        let mut us_per_qn = default_us_per_qn;
        let mut t = 0.0f64;

        for ev in tr {
            t += ev.delta.as_int() as f64 / ppq * us_per_qn;
            let t_us = t.round() as u64;
            last_t_us = last_t_us.max(t_us);

            match ev.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tp)) => us_per_qn = tp.as_int() as f64,
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    track_names.push(String::from_utf8_lossy(name).into_owned());
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        // NoteOn with velocity=0 is a NoteOff
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            per_channel[ch as usize] += 1;
                            notes.push(Timed {
                                t_us,
                                channel: ch,
                                key: key.as_int(),
                                vel: vel.as_int(),
                            });
                        }
                        MidiMessage::ProgramChange { program } => {
                            programs.push((ch, program.as_int()));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    // stable, so simultaneous notes keep track order
    notes.sort_by_key(|n| n.t_us);

    Timeline {
        notes,
        per_channel,
        track_names,
        programs,
        last_t_us,
        ppq,
        initial_us_per_qn: default_us_per_qn,
    }
}

/// Parse a file from disk and build its timeline.
pub fn inspect(path: &Path) -> Result<Timeline> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let smf = Smf::parse(&bytes).with_context(|| format!("parsing {:?}", path))?;
    Ok(build_timeline(&smf))
}

/// Format a microsecond timestamp as MM:SS for logging.
pub fn format_duration(us: u64) -> String {
    let total_secs = us / 1_000_000;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}", mins, secs)
}
