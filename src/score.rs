//! score.rs
//!
//! The in-memory score: global metadata, the registered tracks and the note
//! events placed on them.
//!
//! Times are in beats (quarter notes) as `f64`, measured from the start of the
//! piece. Nothing here knows about ticks; the serializer converts beats to ticks
//! once the score is finished.
//!
//! Tracks are polyphonic. Events on one track may overlap or even coincide
//! exactly (stacked choir passes do this on purpose), so a track is an
//! append-only list rather than a monophonic cursor.

use crate::error::{Result, ScoreError};

/// Index of a registered track, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub usize);

/// One sounding note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub track: TrackId,
    pub channel: u8,
    pub pitch: u8,
    /// Absolute start in beats
    pub start: f64,
    /// Length in beats
    pub duration: f64,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Name, MIDI channel and optional General MIDI program of a track.
/// Tracks without a program (percussion) get no program change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackSpec {
    pub name: String,
    pub channel: u8,
    pub program: Option<u8>,
}

impl TrackSpec {
    pub fn new(name: impl Into<String>, channel: u8, program: Option<u8>) -> Self {
        Self { name: name.into(), channel, program }
    }
}

#[derive(Clone, Debug)]
pub struct Track {
    pub spec: TrackSpec,
    pub events: Vec<NoteEvent>,
}

/// Global settings that apply to the whole piece.
#[derive(Clone, Debug, PartialEq)]
pub struct Meta {
    pub title: String,
    pub bpm: u32,
    /// (numerator, denominator), e.g. (4, 4)
    pub time_signature: (u8, u8),
    pub ticks_per_beat: u16,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            title: "Echoes of Light — Full Cinematic".to_string(),
            bpm: 100,
            time_signature: (4, 4),
            ticks_per_beat: 480,
        }
    }
}

impl Meta {
    pub fn validate(&self) -> Result<()> {
        let (num, den) = self.time_signature;
        if self.bpm == 0 {
            return Err(ScoreError::Settings("tempo must be above 0 bpm".into()));
        }
        // the tempo meta event holds µs per quarter note in 24 bits
        if 60_000_000 / self.bpm > 0xFF_FFFF {
            return Err(ScoreError::Settings(format!(
                "tempo {} bpm does not fit a MIDI tempo event",
                self.bpm
            )));
        }
        // midly stores ticks per beat in 15 bits
        if self.ticks_per_beat == 0 || self.ticks_per_beat > 0x7FFF {
            return Err(ScoreError::Settings(format!(
                "ticks per beat must be in 1..=32767, got {}",
                self.ticks_per_beat
            )));
        }
        if num == 0 || den == 0 || !den.is_power_of_two() {
            return Err(ScoreError::Settings(format!("bad time signature {num}/{den}")));
        }
        Ok(())
    }

    /// Quarter-note beats in one bar: 4.0 for 4/4, 3.0 for 6/8.
    pub fn beats_per_bar(&self) -> f64 {
        let (num, den) = self.time_signature;
        num as f64 * 4.0 / den as f64
    }

    /// Absolute start of a bar, in beats.
    pub fn bar_time(&self, bar: u32) -> f64 {
        bar as f64 * self.beats_per_bar()
    }

    /// Microseconds per quarter note, as the MIDI tempo meta event wants it.
    pub fn us_per_quarter(&self) -> u32 {
        60_000_000 / self.bpm.max(1)
    }
}

#[derive(Clone, Debug)]
pub struct Score {
    pub meta: Meta,
    tracks: Vec<Track>,
}

impl Score {
    pub fn new(meta: Meta) -> Self {
        Self { meta, tracks: Vec::new() }
    }

    /// Register a track. Must happen before anything is placed on it.
    pub fn add_track(&mut self, spec: TrackSpec) -> Result<TrackId> {
        if spec.channel > 15 {
            return Err(ScoreError::Settings(format!(
                "track {} uses channel {} (0..=15)",
                spec.name, spec.channel
            )));
        }
        if let Some(p) = spec.program.filter(|p| *p > 127) {
            return Err(ScoreError::Settings(format!(
                "track {} uses program {p} (0..=127)",
                spec.name
            )));
        }
        self.tracks.push(Track { spec, events: Vec::new() });
        Ok(TrackId(self.tracks.len() - 1))
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Result<&Track> {
        self.tracks.get(id.0).ok_or(ScoreError::UnknownTrack(id.0))
    }

    /// Fail with a configuration error unless `id` is registered.
    pub fn check_track(&self, id: TrackId) -> Result<()> {
        self.track(id).map(|_| ())
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }

    /// End of the last sounding note, in beats.
    pub fn length_beats(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .map(NoteEvent::end)
            .fold(0.0, f64::max)
    }

    /// Block chord: every pitch starts at `start` and lasts `duration`.
    pub fn place_chord(
        &mut self,
        track: TrackId,
        start: f64,
        duration: f64,
        pitches: &[u8],
        velocity: u8,
    ) -> Result<()> {
        check_start(start)?;
        check_duration(duration)?;
        check_velocity(velocity as i32)?;
        for &p in pitches {
            check_pitch(p as i32)?;
        }
        let t = self.track_mut(track)?;
        let channel = t.spec.channel;
        t.events.extend(pitches.iter().map(|&pitch| NoteEvent {
            track,
            channel,
            pitch,
            start,
            duration,
            velocity,
        }));
        Ok(())
    }

    /// Arpeggio: pitch `i` starts at `start + i * step`. Note length is
    /// independent of the step, so notes overlap when `note_duration > step`.
    pub fn place_arpeggio(
        &mut self,
        track: TrackId,
        start: f64,
        note_duration: f64,
        pitches: &[u8],
        velocity: u8,
        step: f64,
    ) -> Result<()> {
        check_start(start)?;
        check_duration(note_duration)?;
        check_velocity(velocity as i32)?;
        if !step.is_finite() || step < 0.0 {
            return Err(ScoreError::Step(step));
        }
        for &p in pitches {
            check_pitch(p as i32)?;
        }
        let t = self.track_mut(track)?;
        let channel = t.spec.channel;
        t.events.extend(pitches.iter().enumerate().map(|(i, &pitch)| NoteEvent {
            track,
            channel,
            pitch,
            start: start + i as f64 * step,
            duration: note_duration,
            velocity,
        }));
        Ok(())
    }

    pub fn place_note(
        &mut self,
        track: TrackId,
        start: f64,
        duration: f64,
        pitch: u8,
        velocity: u8,
    ) -> Result<()> {
        self.place_chord(track, start, duration, &[pitch], velocity)
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut Track> {
        self.tracks.get_mut(id.0).ok_or(ScoreError::UnknownTrack(id.0))
    }
}

pub fn check_velocity(v: i32) -> Result<u8> {
    if (0..=127).contains(&v) {
        Ok(v as u8)
    } else {
        Err(ScoreError::Velocity(v))
    }
}

pub fn check_pitch(p: i32) -> Result<u8> {
    if (0..=127).contains(&p) {
        Ok(p as u8)
    } else {
        Err(ScoreError::Pitch(p))
    }
}

fn check_duration(d: f64) -> Result<()> {
    if d.is_finite() && d > 0.0 {
        Ok(())
    } else {
        Err(ScoreError::Duration(d))
    }
}

fn check_start(s: f64) -> Result<()> {
    if s.is_finite() && s >= 0.0 {
        Ok(())
    } else {
        Err(ScoreError::Start(s))
    }
}
