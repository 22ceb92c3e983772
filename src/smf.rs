//! smf.rs
//!
//! Encodes a [`Score`] as a Standard MIDI File, Format 1.
//!
//! - One MIDI track per score track, in registration order.
//! - Each track opens at tick 0 with its name, the tempo, the time signature
//!   and, for melodic tracks, a program change. The first track also carries
//!   the title as a text event.
//! - Note starts and ends (in beats) become absolute ticks, then sorted
//!   on/off events, then deltas.
//! - Files are written to a temp file next to the target and renamed into
//!   place, so a failed write leaves nothing behind.

use std::io::Write;
use std::path::Path;

use log::debug;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24},
};
use tempfile::NamedTempFile;

use crate::error::{Result, ScoreError};
use crate::score::{Meta, Score, Track as ScoreTrack, TrackId};

// Sort rank for events sharing a tick: setup first, then releases, then
// attacks, so a repeated pitch is released before it is struck again.
const RANK_SETUP: u8 = 0;
const RANK_OFF: u8 = 1;
const RANK_ON: u8 = 2;

/// Deltas are 28-bit variable-length quantities. Every event tick is kept at
/// or below this so no delta can overflow.
const MAX_TICK: u32 = 0x0FFF_FFFF;

/// Build an SMF Format 1 file with one MIDI track per score track.
///
/// Fails with a settings error when the meta cannot be encoded, or with a
/// validation error when a note lands past the last encodable tick.
pub fn score_to_smf(score: &Score) -> Result<Smf<'_>> {
    let meta = &score.meta;
    meta.validate()?;
    let header = Header::new(Format::Parallel, Timing::Metrical(u15::new(meta.ticks_per_beat)));
    let mut smf = Smf::new(header);
    for (i, track) in score.tracks().iter().enumerate() {
        let title = (i == 0).then_some(meta.title.as_str());
        smf.tracks.push(build_track(meta, TrackId(i), track, title)?);
    }
    Ok(smf)
}

/// Encode the score in memory, then move it into place in one rename.
/// Either the whole file lands at `path` or nothing does.
pub fn write_smf(score: &Score, path: &Path) -> Result<usize> {
    let smf = score_to_smf(score)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&buf)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!("wrote {} bytes to {}", buf.len(), path.display());
    Ok(buf.len())
}

/// Round a beat position to the nearest tick.
pub fn beats_to_ticks(beats: f64, ticks_per_beat: u16) -> Result<u32> {
    let ticks = (beats * ticks_per_beat as f64).round();
    if ticks.is_finite() && (0.0..=MAX_TICK as f64).contains(&ticks) {
        Ok(ticks as u32)
    } else {
        Err(ScoreError::Ticks(beats))
    }
}

fn build_track<'a>(
    meta: &Meta,
    id: TrackId,
    track: &'a ScoreTrack,
    title: Option<&'a str>,
) -> Result<Track<'a>> {
    let ch = u4::new(track.spec.channel);
    let (num, den) = meta.time_signature;
    let dd = den.trailing_zeros() as u8;

    // (absolute tick, rank, event)
    let mut timed: Vec<(u32, u8, TrackEventKind<'a>)> = Vec::new();
    let mut setup = |kind| timed.push((0, RANK_SETUP, kind));

    setup(TrackEventKind::Meta(MetaMessage::TrackName(track.spec.name.as_bytes())));
    if let Some(title) = title {
        setup(TrackEventKind::Meta(MetaMessage::Text(title.as_bytes())));
    }
    setup(TrackEventKind::Meta(MetaMessage::Tempo(u24::new(meta.us_per_quarter()))));
    setup(TrackEventKind::Meta(MetaMessage::TimeSignature(num, dd, 24, 8)));
    if let Some(program) = track.spec.program {
        setup(TrackEventKind::Midi {
            channel: ch,
            message: MidiMessage::ProgramChange { program: u7::new(program) },
        });
    }

    for note in &track.events {
        debug_assert_eq!(note.track, id);
        let on = beats_to_ticks(note.start, meta.ticks_per_beat)?;
        // a note always lasts at least one tick
        let off = beats_to_ticks(note.end(), meta.ticks_per_beat)?.max(on + 1);
        if off > MAX_TICK {
            return Err(ScoreError::Ticks(note.end()));
        }
        let channel = u4::new(note.channel);
        let key = u7::new(note.pitch);
        timed.push((on, RANK_ON, TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOn { key, vel: u7::new(note.velocity) },
        }));
        timed.push((off, RANK_OFF, TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOff { key, vel: u7::new(0) },
        }));
    }

    // stable: equal (tick, rank) keep placement order
    timed.sort_by_key(|(tick, rank, _)| (*tick, *rank));

    let mut out: Track<'a> = Vec::with_capacity(timed.len() + 1);
    let mut last = 0u32;
    for (tick, _, kind) in timed {
        push(&mut out, tick - last, kind);
        last = tick;
    }
    push(&mut out, 0, TrackEventKind::Meta(MetaMessage::EndOfTrack));
    Ok(out)
}

fn push<'a>(track: &mut Track<'a>, delta: u32, kind: TrackEventKind<'a>) {
    track.push(TrackEvent { delta: delta.into(), kind });
}
