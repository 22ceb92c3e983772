//! section.rs
//!
//! A data-driven section generator.
//!
//! A [`Section`] is a contiguous bar range, a chord loop and a list of
//! [`Layer`]s. Every bar of the section picks its chord from the loop
//! (`progression[bar % len]`) and asks each layer to place notes:
//!
//! - the **voicing** turns the chord into concrete pitches (degrees plus
//!   semitone offsets, whole-chord stacks, or fixed drum keys),
//! - the **pattern** decides where in the bar they go (block, arpeggio, hits),
//! - the **dynamics** pick a velocity for the bar,
//! - the **gate** decides whether the layer plays in this bar at all.
//!
//! An [`Arrangement`] is the whole piece: the track table plus an ordered
//! list of steps (sections and one-off cues). Rendering validates everything
//! first, so a bad chord name or track reference fails before a single note
//! is placed, and then runs the steps strictly in order.

use log::debug;

use crate::chords::{self, PitchSet};
use crate::error::{Result, ScoreError};
use crate::score::{check_pitch, check_velocity, Meta, Score, TrackId, TrackSpec};

/// One chord tone: `chord[degree] + offset` semitones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub degree: usize,
    pub offset: i8,
}

/// How a chord becomes pitches.
#[derive(Clone, Debug, PartialEq)]
pub enum Voicing {
    /// Whole chord at each offset, in order. `[0, 12]` is the chord followed
    /// by the same chord an octave up.
    Stacked(Vec<i8>),
    /// Selected chord tones, in order.
    Tones(Vec<Tone>),
    /// Literal pitches that ignore the chord (drum keys).
    Fixed(PitchSet),
}

impl Voicing {
    pub fn chord(offset: i8) -> Self {
        Voicing::Stacked(vec![offset])
    }

    pub fn root(offset: i8) -> Self {
        Voicing::tones(&[(0, offset)])
    }

    pub fn tones(tones: &[(usize, i8)]) -> Self {
        Voicing::Tones(tones.iter().map(|&(degree, offset)| Tone { degree, offset }).collect())
    }

    pub fn key(key: u8) -> Self {
        Voicing::Fixed(vec![key])
    }

    /// Resolve against one chord.
    pub fn pitches(&self, chord: &[u8]) -> Result<PitchSet> {
        match self {
            Voicing::Stacked(offsets) => offsets
                .iter()
                .flat_map(|&o| chord.iter().map(move |&n| n as i32 + o as i32))
                .map(check_pitch)
                .collect(),
            Voicing::Tones(tones) => tones
                .iter()
                .map(|t| {
                    let base = chord
                        .get(t.degree)
                        .ok_or(ScoreError::MissingDegree { degree: t.degree, len: chord.len() })?;
                    check_pitch(*base as i32 + t.offset as i32)
                })
                .collect(),
            Voicing::Fixed(keys) => keys.iter().map(|&k| check_pitch(k as i32)).collect(),
        }
    }
}

/// Where in the bar a layer's pitches go. Offsets are beats from the bar line.
#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    /// All pitches together at `at`. `last_bar` shortens the final bar of the
    /// section (room for a reverb tail).
    Block { at: f64, duration: f64, last_bar: Option<f64> },
    /// Pitches one after another from the bar line, `step` apart.
    Arpeggio { note: f64, step: f64 },
    /// All pitches at every listed beat.
    Hits { beats: Vec<f64>, duration: f64 },
}

/// Velocity for a given bar of the section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dynamics {
    Constant(u8),
    /// `base + (bar / every) * step`
    Stepped { base: u8, step: i8, every: u32 },
}

impl Dynamics {
    pub fn at(&self, bar: u32) -> Result<u8> {
        match *self {
            Dynamics::Constant(v) => check_velocity(v as i32),
            Dynamics::Stepped { base, step, every } => {
                let steps = (bar / every.max(1)) as i32;
                check_velocity(base as i32 + steps * step as i32)
            }
        }
    }
}

/// Which bars of the section a layer plays in. Bars are section-relative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Always,
    /// From bar `k` to the end of the section.
    From(u32),
    /// Bars where `bar % period == phase`.
    Every { period: u32, phase: u32 },
    /// Bar `k` only.
    Only(u32),
}

impl Gate {
    pub fn admits(&self, bar: u32) -> bool {
        match *self {
            Gate::Always => true,
            Gate::From(k) => bar >= k,
            Gate::Every { period, phase } => period > 0 && bar % period == phase,
            Gate::Only(k) => bar == k,
        }
    }
}

/// One rule placing notes on one track.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub track: TrackId,
    pub voicing: Voicing,
    pub pattern: Pattern,
    pub dynamics: Dynamics,
    pub gate: Gate,
}

impl Layer {
    pub fn block(track: TrackId, voicing: Voicing, duration: f64, velocity: u8) -> Self {
        Self {
            track,
            voicing,
            pattern: Pattern::Block { at: 0.0, duration, last_bar: None },
            dynamics: Dynamics::Constant(velocity),
            gate: Gate::Always,
        }
    }

    pub fn arpeggio(track: TrackId, voicing: Voicing, note: f64, step: f64, velocity: u8) -> Self {
        Self {
            track,
            voicing,
            pattern: Pattern::Arpeggio { note, step },
            dynamics: Dynamics::Constant(velocity),
            gate: Gate::Always,
        }
    }

    pub fn hits(track: TrackId, key: u8, beats: &[f64], duration: f64, velocity: u8) -> Self {
        Self {
            track,
            voicing: Voicing::key(key),
            pattern: Pattern::Hits { beats: beats.to_vec(), duration },
            dynamics: Dynamics::Constant(velocity),
            gate: Gate::Always,
        }
    }

    pub fn dynamics(mut self, dynamics: Dynamics) -> Self {
        self.dynamics = dynamics;
        self
    }

    /// Move a block to start `at` beats into the bar.
    pub fn at(mut self, beat: f64) -> Self {
        if let Pattern::Block { at, .. } = &mut self.pattern {
            *at = beat;
        }
        self
    }

    /// Shorten the block on the section's final bar.
    pub fn last_bar(mut self, duration: f64) -> Self {
        if let Pattern::Block { last_bar, .. } = &mut self.pattern {
            *last_bar = Some(duration);
        }
        self
    }

    pub fn from_bar(mut self, bar: u32) -> Self {
        self.gate = Gate::From(bar);
        self
    }

    pub fn every(mut self, period: u32, phase: u32) -> Self {
        self.gate = Gate::Every { period, phase };
        self
    }

    pub fn only(mut self, bar: u32) -> Self {
        self.gate = Gate::Only(bar);
        self
    }

    fn offsets(&self) -> Vec<f64> {
        match &self.pattern {
            Pattern::Block { at, .. } => vec![*at],
            Pattern::Arpeggio { .. } => vec![0.0],
            Pattern::Hits { beats, .. } => beats.clone(),
        }
    }

    /// Place this layer's notes for one bar.
    fn render(
        &self,
        score: &mut Score,
        bar_start: f64,
        bar: u32,
        is_last: bool,
        chord: &[u8],
    ) -> Result<()> {
        let pitches = self.voicing.pitches(chord)?;
        let velocity = self.dynamics.at(bar)?;
        match &self.pattern {
            Pattern::Block { at, duration, last_bar } => {
                let duration = match last_bar {
                    Some(d) if is_last => *d,
                    _ => *duration,
                };
                score.place_chord(self.track, bar_start + at, duration, &pitches, velocity)
            }
            Pattern::Arpeggio { note, step } => {
                score.place_arpeggio(self.track, bar_start, *note, &pitches, velocity, *step)
            }
            Pattern::Hits { beats, duration } => {
                for beat in beats {
                    for &pitch in &pitches {
                        score.place_note(self.track, bar_start + beat, *duration, pitch, velocity)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub name: String,
    pub start_bar: u32,
    pub bars: u32,
    /// Chord names, cycled across the section.
    pub progression: Vec<String>,
    pub layers: Vec<Layer>,
}

impl Section {
    pub fn new(name: impl Into<String>, start_bar: u32, bars: u32, progression: &[&str]) -> Self {
        Self {
            name: name.into(),
            start_bar,
            bars,
            progression: progression.iter().map(|s| s.to_string()).collect(),
            layers: Vec::new(),
        }
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// One past the last bar.
    pub fn end_bar(&self) -> u32 {
        self.start_bar + self.bars
    }

    /// Chord for a section-relative bar.
    pub fn chord_at<'a>(&self, chords: &'a [PitchSet], bar: u32) -> &'a PitchSet {
        &chords[bar as usize % chords.len()]
    }

    fn bad(&self, reason: String) -> ScoreError {
        ScoreError::BadBarRange { section: self.name.clone(), reason }
    }

    /// Check the section against the registered tracks and resolve its chords.
    pub fn resolve(&self, score: &Score) -> Result<Vec<PitchSet>> {
        if self.bars == 0 {
            return Err(self.bad("spans no bars".into()));
        }
        if self.progression.is_empty() {
            return Err(ScoreError::EmptyProgression(self.name.clone()));
        }
        let chords = chords::resolve(&self.progression)?;
        let bar_len = score.meta.beats_per_bar();
        for layer in &self.layers {
            score.check_track(layer.track)?;
            // every voicing must resolve against every chord it will meet
            for chord in &chords {
                layer.voicing.pitches(chord)?;
            }
            if let Gate::Every { period: 0, .. } = layer.gate {
                return Err(self.bad("gate period of 0".into()));
            }
            if let Dynamics::Stepped { every: 0, .. } = layer.dynamics {
                return Err(self.bad("dynamics step every 0 bars".into()));
            }
            if let Some(off) = layer.offsets().into_iter().find(|o| !(0.0..bar_len).contains(o)) {
                return Err(self.bad(format!("offset {off} falls outside a {bar_len}-beat bar")));
            }
        }
        Ok(chords)
    }

    /// Run the section bar by bar. `chords` comes from [`Section::resolve`].
    pub fn render(&self, score: &mut Score, chords: &[PitchSet]) -> Result<()> {
        debug!(
            "section {}: bars {}..{} over {}",
            self.name,
            self.start_bar,
            self.end_bar(),
            self.progression.join(" ")
        );
        for bar in 0..self.bars {
            let start = score.meta.bar_time(self.start_bar + bar);
            let chord = self.chord_at(chords, bar);
            let is_last = bar + 1 == self.bars;
            for layer in self.layers.iter().filter(|l| l.gate.admits(bar)) {
                layer.render(score, start, bar, is_last, chord)?;
            }
        }
        Ok(())
    }
}

/// A single placement at an exact bar, outside any section loop.
#[derive(Clone, Debug, PartialEq)]
pub struct Cue {
    pub name: String,
    pub track: TrackId,
    pub bar: u32,
    pub pitches: PitchSet,
    pub duration: f64,
    pub velocity: u8,
}

impl Cue {
    fn render(&self, score: &mut Score) -> Result<()> {
        debug!("cue {} at bar {}", self.name, self.bar);
        let start = score.meta.bar_time(self.bar);
        score.place_chord(self.track, start, self.duration, &self.pitches, self.velocity)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Section(Section),
    Cue(Cue),
}

/// The full piece: tracks plus the ordered steps that fill them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arrangement {
    pub tracks: Vec<TrackSpec>,
    pub steps: Vec<Step>,
}

impl Arrangement {
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.steps.iter().filter_map(|s| match s {
            Step::Section(sec) => Some(sec),
            Step::Cue(_) => None,
        })
    }

    /// Register the tracks, validate every step, then render in order.
    pub fn render(&self, meta: Meta) -> Result<Score> {
        meta.validate()?;
        let mut score = Score::new(meta);
        for spec in &self.tracks {
            score.add_track(spec.clone())?;
        }

        let mut resolved = Vec::with_capacity(self.steps.len());
        let mut last_end = 0;
        for step in &self.steps {
            match step {
                Step::Section(sec) => {
                    if sec.start_bar < last_end {
                        return Err(sec.bad(format!(
                            "starts at bar {} before the previous section ends at {}",
                            sec.start_bar, last_end
                        )));
                    }
                    last_end = sec.end_bar();
                    resolved.push(sec.resolve(&score)?);
                }
                Step::Cue(cue) => {
                    score.check_track(cue.track)?;
                    resolved.push(Vec::new());
                }
            }
        }

        for (step, chords) in self.steps.iter().zip(&resolved) {
            match step {
                Step::Section(sec) => sec.render(&mut score, chords)?,
                Step::Cue(cue) => cue.render(&mut score)?,
            }
        }
        Ok(score)
    }
}
