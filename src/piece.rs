//! piece.rs
//!
//! "Echoes of Light": the track table and the five-part form, written as
//! section records for the generator in `section.rs`.
//!
//! Form (48 bars of 4/4):
//!   0–7    Intro       Dm Bb F C
//!   8–19   Build-up    Dm Bb F C
//!   20–31  Climax      Dm Gm Bb A7, then an A major ring-out cue on bar 32
//!   32–43  Resolution  Dm Bb F C
//!   44–47  Outro       Dm

use crate::chords::{CLIMAX_LOOP, INTRO_LOOP};
use crate::section::{Arrangement, Cue, Dynamics, Layer, Section, Step, Voicing};
use crate::score::{TrackId, TrackSpec};

pub const PIANO: TrackId = TrackId(0);
pub const STRINGS: TrackId = TrackId(1);
pub const BRASS: TrackId = TrackId(2);
pub const CHOIR: TrackId = TrackId(3);
pub const PERCUSSION: TrackId = TrackId(4);
pub const PAD: TrackId = TrackId(5);
pub const VIOLIN_I: TrackId = TrackId(6);
pub const VIOLIN_II: TrackId = TrackId(7);
pub const VIOLA: TrackId = TrackId(8);
pub const CELLO: TrackId = TrackId(9);
pub const BASS: TrackId = TrackId(10);

/// General MIDI channel 10 (0-based 9) plays drums.
pub const DRUM_CHANNEL: u8 = 9;

// General MIDI programs, 0-based
const GM_PIANO: u8 = 0;
const GM_STRINGS: u8 = 48;
const GM_VIOLIN: u8 = 40;
const GM_VIOLA: u8 = 41;
const GM_CELLO: u8 = 42;
const GM_CONTRABASS: u8 = 43;
const GM_FRENCH_HORN: u8 = 60;
const GM_CHOIR_AAHS: u8 = 52;
const GM_WARM_PAD: u8 = 89;

// General MIDI percussion keys
const KICK: u8 = 36;
const HIGH_FLOOR_TOM: u8 = 43;
const LOW_TOM: u8 = 45;
const CRASH: u8 = 49;

/// The five parts in playing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Part {
    Intro,
    BuildUp,
    Climax,
    Resolution,
    Outro,
}

impl Part {
    pub fn name(self) -> &'static str {
        match self {
            Part::Intro => "intro",
            Part::BuildUp => "build-up",
            Part::Climax => "climax",
            Part::Resolution => "resolution",
            Part::Outro => "outro",
        }
    }
}

pub fn tracks() -> Vec<TrackSpec> {
    vec![
        TrackSpec::new("Piano", 0, Some(GM_PIANO)),
        TrackSpec::new("StringsPad", 1, Some(GM_STRINGS)),
        TrackSpec::new("Brass", 2, Some(GM_FRENCH_HORN)),
        TrackSpec::new("Choir", 3, Some(GM_CHOIR_AAHS)),
        TrackSpec::new("Percussion", DRUM_CHANNEL, None),
        TrackSpec::new("SynthPad", 4, Some(GM_WARM_PAD)),
        TrackSpec::new("Violin I", 5, Some(GM_VIOLIN)),
        TrackSpec::new("Violin II", 6, Some(GM_VIOLIN)),
        TrackSpec::new("Viola", 7, Some(GM_VIOLA)),
        TrackSpec::new("Cello", 8, Some(GM_CELLO)),
        // kept off the drum channel
        TrackSpec::new("Bass", 10, Some(GM_CONTRABASS)),
    ]
}

/// Piano arpeggio of the chord plus its upper octave.
fn piano_arp(step: f64, velocity: u8) -> Layer {
    Layer::arpeggio(PIANO, Voicing::Stacked(vec![0, 12]), 0.25, step, velocity)
}

/// Sustained whole-bar chord.
fn sustain(track: TrackId, voicing: Voicing, velocity: u8) -> Layer {
    Layer::block(track, voicing, 4.0, velocity)
}

/// The choir's "ahh" pass. Layered over whatever else the choir sings in the
/// same bars, never replacing it.
fn ahh(offsets: &[i8], velocity: u8) -> Layer {
    sustain(CHOIR, Voicing::Stacked(offsets.to_vec()), velocity)
}

fn intro() -> Section {
    Section::new(Part::Intro.name(), 0, 8, INTRO_LOOP)
        .layer(piano_arp(0.33, 60))
        .layer(sustain(STRINGS, Voicing::chord(0), 50))
        // low drone held over two bars
        .layer(Layer::block(PAD, Voicing::root(-24), 8.0, 40).every(2, 0))
        .layer(ahh(&[12], 50))
}

fn build_up() -> Section {
    Section::new(Part::BuildUp.name(), 8, 12, INTRO_LOOP)
        .layer(piano_arp(0.33, 72))
        .layer(
            sustain(STRINGS, Voicing::chord(0), 60)
                .dynamics(Dynamics::Stepped { base: 60, step: 4, every: 4 }),
        )
        .layer(sustain(BRASS, Voicing::root(-12), 58))
        // soft "ooh" from bar 12
        .layer(sustain(CHOIR, Voicing::chord(12), 55).from_bar(4))
        // taiko pulse from bar 16
        .layer(Layer::hits(PERCUSSION, KICK, &[0.0, 2.0], 0.15, 96).from_bar(8))
        // tom riser closing each four-bar phrase
        .layer(Layer::hits(PERCUSSION, LOW_TOM, &[3.0, 3.5, 3.75], 0.1, 90).every(4, 3))
        .layer(ahh(&[12], 60))
}

fn climax() -> Section {
    // violin line: root, third, fifth, then the fifth above the octave
    let melody: [(usize, i8); 4] = [(0, 24), (1, 24), (2, 24), (0, 31)];
    let harmony = melody.map(|(degree, offset)| (degree, offset - 5));

    Section::new(Part::Climax.name(), 20, 12, CLIMAX_LOOP)
        .layer(piano_arp(0.25, 92))
        .layer(sustain(STRINGS, Voicing::chord(0), 82))
        .layer(Layer::block(BRASS, Voicing::chord(12), 1.0, 104))
        // wide SATB block
        .layer(sustain(CHOIR, Voicing::tones(&[(0, 24), (1, 12), (2, 0), (0, -12)]), 106))
        .layer(Layer::hits(PERCUSSION, KICK, &[0.0, 2.0], 0.15, 120))
        .layer(Layer::hits(PERCUSSION, HIGH_FLOOR_TOM, &[0.0, 2.0], 0.15, 110))
        .layer(Layer::hits(PERCUSSION, CRASH, &[0.0], 0.4, 112))
        .layer(Layer::arpeggio(VIOLIN_I, Voicing::tones(&melody), 0.9, 1.0, 108))
        .layer(Layer::arpeggio(VIOLIN_II, Voicing::tones(&harmony), 0.9, 1.0, 96))
        .layer(sustain(VIOLA, Voicing::tones(&[(1, 7)]), 80))
        .layer(Layer::block(CELLO, Voicing::root(-12), 2.0, 90))
        .layer(Layer::block(CELLO, Voicing::tones(&[(2, -12)]), 2.0, 88).at(2.0))
        .layer(sustain(BASS, Voicing::root(-24), 92))
        .layer(ahh(&[24, 12], 90))
}

/// Big dominant A on the first bar after the climax.
fn ring_out() -> Cue {
    Cue {
        name: "dominant ring-out".into(),
        track: CHOIR,
        bar: 32,
        pitches: vec![93, 85, 76, 57],
        duration: 4.0,
        velocity: 100,
    }
}

fn resolution() -> Section {
    Section::new(Part::Resolution.name(), 32, 12, INTRO_LOOP)
        .layer(Layer::arpeggio(PIANO, Voicing::chord(0), 0.25, 0.33, 66))
        .layer(sustain(STRINGS, Voicing::chord(0), 64))
        // female choir echo
        .layer(sustain(CHOIR, Voicing::root(24), 60))
        .layer(Layer::hits(PERCUSSION, LOW_TOM, &[0.0], 0.12, 64))
        .layer(ahh(&[12], 40))
}

fn outro() -> Section {
    let tail = |track, voicing, velocity| sustain(track, voicing, velocity).last_bar(3.5);
    Section::new(Part::Outro.name(), 44, 4, &["Dm"])
        .layer(tail(PIANO, Voicing::tones(&[(0, 0), (1, 0), (2, 0), (0, 12)]), 52))
        .layer(tail(STRINGS, Voicing::tones(&[(0, -12), (2, -12), (0, 0)]), 48))
        .layer(tail(CHOIR, Voicing::root(12), 44))
        .layer(tail(PAD, Voicing::root(-24), 40))
        .layer(ahh(&[12], 30))
        .layer(Layer::hits(PERCUSSION, CRASH, &[0.0], 0.5, 70).only(0))
}

/// The complete arrangement, in playing order.
pub fn echoes_of_light() -> Arrangement {
    Arrangement {
        tracks: tracks(),
        steps: vec![
            Step::Section(intro()),
            Step::Section(build_up()),
            Step::Section(climax()),
            Step::Cue(ring_out()),
            Step::Section(resolution()),
            Step::Section(outro()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Meta, NoteEvent, Score};

    fn render() -> Score {
        echoes_of_light().render(Meta::default()).unwrap()
    }

    fn events(score: &Score, id: TrackId) -> &[NoteEvent] {
        &score.track(id).unwrap().events
    }

    fn in_bars(ev: &[NoteEvent], from: u32, to: u32) -> Vec<NoteEvent> {
        ev.iter()
            .filter(|e| e.start >= from as f64 * 4.0 && e.start < to as f64 * 4.0)
            .copied()
            .collect()
    }

    #[test]
    fn form_is_contiguous_and_ordered() {
        let arr = echoes_of_light();
        let ranges: Vec<(u32, u32)> = arr.sections().map(|s| (s.start_bar, s.end_bar())).collect();
        assert_eq!(ranges, vec![(0, 8), (8, 20), (20, 32), (32, 44), (44, 48)]);
        let names: Vec<&str> = arr.sections().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["intro", "build-up", "climax", "resolution", "outro"]);
    }

    #[test]
    fn eleven_tracks_with_drums_on_channel_ten() {
        let t = tracks();
        assert_eq!(t.len(), 11);
        assert_eq!(t[PERCUSSION.0].channel, DRUM_CHANNEL);
        assert_eq!(t[PERCUSSION.0].program, None);
        assert!(t.iter().enumerate().all(|(i, s)| i == PERCUSSION.0 || s.channel != DRUM_CHANNEL));
        assert!(t.iter().enumerate().all(|(i, s)| i == PERCUSSION.0 || s.program.is_some()));
    }

    #[test]
    fn first_piano_arpeggio() {
        let score = render();
        let first: Vec<NoteEvent> = events(&score, PIANO).iter().take(6).copied().collect();
        assert_eq!(first.iter().map(|e| e.pitch).collect::<Vec<_>>(), vec![62, 65, 69, 74, 77, 81]);
        for (i, e) in first.iter().enumerate() {
            assert!((e.start - i as f64 * 0.33).abs() < 1e-9);
            assert_eq!(e.duration, 0.25);
            assert_eq!(e.velocity, 60);
        }
        assert_eq!(in_bars(events(&score, PIANO), 0, 1).len(), 6);
    }

    #[test]
    fn every_section_stays_inside_its_bars() {
        let arr = echoes_of_light();
        for sec in arr.sections() {
            // render each section on its own to attribute events to it
            let solo = Arrangement { tracks: tracks(), steps: vec![Step::Section(sec.clone())] };
            let score = solo.render(Meta::default()).unwrap();
            assert!(score.event_count() > 0);
            for track in score.tracks() {
                for e in &track.events {
                    let bar = (e.start / 4.0).floor() as u32;
                    let inside = bar >= sec.start_bar && bar < sec.end_bar();
                    assert!(inside, "{} event at beat {}", sec.name, e.start);
                }
            }
        }
    }

    #[test]
    fn build_up_percussion_gating() {
        let score = render();
        let drums = events(&score, PERCUSSION);
        for rel in 0..12u32 {
            let bar = 8 + rel;
            let kicks = in_bars(drums, bar, bar + 1).iter().filter(|e| e.pitch == KICK).count();
            if rel < 8 {
                assert_eq!(kicks, 0, "bar {bar}");
            } else {
                assert_eq!(kicks, 2, "bar {bar}");
            }
            let toms = in_bars(drums, bar, bar + 1).iter().filter(|e| e.pitch == LOW_TOM).count();
            assert_eq!(toms, if rel % 4 == 3 { 3 } else { 0 }, "bar {bar}");
        }
    }

    #[test]
    fn build_up_strings_crescendo() {
        let score = render();
        let strings = events(&score, STRINGS);
        let vel = |bar: u32| in_bars(strings, bar, bar + 1)[0].velocity;
        assert_eq!((vel(8), vel(11), vel(12), vel(16), vel(19)), (60, 60, 64, 68, 68));
    }

    #[test]
    fn climax_choir_stacks_independent_passes() {
        let score = render();
        let choir = events(&score, CHOIR);
        for bar in 20..32u32 {
            let at_downbeat: Vec<&NoteEvent> =
                choir.iter().filter(|e| e.start == bar as f64 * 4.0).collect();
            // SATB block (4) plus both "ahh" octaves (6)
            assert_eq!(at_downbeat.len(), 10, "bar {bar}");
            assert!(at_downbeat.iter().any(|e| e.velocity == 106));
            assert!(at_downbeat.iter().any(|e| e.velocity == 90));
        }
    }

    #[test]
    fn build_up_choir_doubles_from_bar_twelve() {
        let score = render();
        let choir = events(&score, CHOIR);
        assert_eq!(in_bars(choir, 11, 12).len(), 3);
        let bar12 = in_bars(choir, 12, 13);
        assert_eq!(bar12.len(), 6);
        // same pitches twice, at two velocities
        let mut pitches: Vec<u8> = bar12.iter().map(|e| e.pitch).collect();
        pitches.sort();
        assert_eq!(pitches, vec![74, 74, 77, 77, 81, 81]);
    }

    #[test]
    fn climax_melody_follows_the_chord() {
        let score = render();
        // bar 21 is Gm: G Bb D
        let line: Vec<NoteEvent> = in_bars(events(&score, VIOLIN_I), 21, 22);
        assert_eq!(line.iter().map(|e| e.pitch).collect::<Vec<_>>(), vec![91, 94, 98, 98]);
        assert_eq!(line.iter().map(|e| e.start).collect::<Vec<_>>(), vec![84.0, 85.0, 86.0, 87.0]);
        let harm: Vec<u8> =
            in_bars(events(&score, VIOLIN_II), 21, 22).iter().map(|e| e.pitch).collect();
        assert_eq!(harm, vec![86, 89, 93, 93]);
    }

    #[test]
    fn ring_out_is_a_single_insertion() {
        let score = render();
        let bar32 = in_bars(events(&score, CHOIR), 32, 33);
        let ring: Vec<&NoteEvent> = bar32.iter().filter(|e| e.velocity == 100).collect();
        assert_eq!(ring.iter().map(|e| e.pitch).collect::<Vec<_>>(), vec![93, 85, 76, 57]);
        let bar33 = in_bars(events(&score, CHOIR), 33, 34);
        assert_eq!(bar33.iter().filter(|e| e.velocity == 100).count(), 0);
    }

    #[test]
    fn outro_final_bar_is_shorter() {
        let score = render();
        for track in [PIANO, STRINGS, PAD] {
            let ev = events(&score, track);
            for bar in 44..47u32 {
                assert!(in_bars(ev, bar, bar + 1).iter().all(|e| e.duration == 4.0));
            }
            let last = in_bars(ev, 47, 48);
            assert!(!last.is_empty());
            assert!(last.iter().all(|e| e.duration == 3.5));
        }
        let crashes: Vec<NoteEvent> = in_bars(events(&score, PERCUSSION), 44, 48)
            .into_iter()
            .filter(|e| e.pitch == CRASH)
            .collect();
        assert_eq!(crashes.len(), 1);
        assert_eq!(crashes[0].start, 176.0);
    }

    #[test]
    fn streams_never_step_back_a_bar() {
        // exact ordering inside a bar is left to the serializer
        let score = render();
        for track in score.tracks() {
            let bars: Vec<u32> =
                track.events.iter().map(|e| (e.start / 4.0).floor() as u32).collect();
            assert!(bars.windows(2).all(|w| w[0] <= w[1]), "{} goes backwards", track.spec.name);
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render();
        let b = render();
        for (x, y) in a.tracks().iter().zip(b.tracks()) {
            assert_eq!(x.events, y.events);
        }
        assert_eq!(a.length_beats(), 192.0);
    }
}
