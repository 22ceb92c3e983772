//! chords.rs
//!
//! The harmonic vocabulary of the piece: a handful of D minor triads as MIDI
//! note numbers (60 = middle C), plus the two chord loops the sections cycle.

use crate::error::{Result, ScoreError};

/// Ordered pitches, lowest voice first.
pub type PitchSet = Vec<u8>;

/// D F A
pub const DM: [u8; 3] = [62, 65, 69];
/// Bb D F
pub const BB: [u8; 3] = [70, 74, 77];
/// F A C
pub const F: [u8; 3] = [65, 69, 72];
/// C E G
pub const C: [u8; 3] = [60, 64, 67];
/// G Bb D
pub const GM: [u8; 3] = [67, 70, 74];
/// A C# E, used with dominant function
pub const A7: [u8; 3] = [69, 73, 76];

const LIBRARY: &[(&str, [u8; 3])] = &[
    ("Dm", DM),
    ("Bb", BB),
    ("F", F),
    ("C", C),
    ("Gm", GM),
    ("A7", A7),
];

/// Four-bar loop used by the intro, build-up and resolution.
pub const INTRO_LOOP: &[&str] = &["Dm", "Bb", "F", "C"];

/// Four-bar loop used by the climax.
pub const CLIMAX_LOOP: &[&str] = &["Dm", "Gm", "Bb", "A7"];

/// Look up a chord by name. Names are case-sensitive ("Bb" and "BB" differ
/// in intent, so no folding).
pub fn lookup(name: &str) -> Result<PitchSet> {
    LIBRARY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, notes)| notes.to_vec())
        .ok_or_else(|| ScoreError::UnknownChord(name.to_string()))
}

/// Resolve a whole progression, failing on the first unknown name.
pub fn resolve(names: &[String]) -> Result<Vec<PitchSet>> {
    names.iter().map(|n| lookup(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_known_chords() {
        assert_eq!(lookup("Dm").unwrap(), vec![62, 65, 69]);
        assert_eq!(lookup("A7").unwrap(), vec![69, 73, 76]);
        assert_eq!(LIBRARY.len(), 6);
    }

    #[test]
    fn unknown_chord_fails_fast() {
        let err = lookup("Em").unwrap_err();
        assert!(matches!(err, ScoreError::UnknownChord(ref n) if n == "Em"));
        assert!(lookup("dm").is_err());
    }

    #[test]
    fn loops_resolve() {
        let intro: Vec<String> = INTRO_LOOP.iter().map(|s| s.to_string()).collect();
        let chords = resolve(&intro).unwrap();
        assert_eq!(chords, vec![DM.to_vec(), BB.to_vec(), F.to_vec(), C.to_vec()]);

        let climax: Vec<String> = CLIMAX_LOOP.iter().map(|s| s.to_string()).collect();
        assert_eq!(resolve(&climax).unwrap()[3], A7.to_vec());
    }

    #[test]
    fn resolve_reports_the_bad_name() {
        let names = vec!["Dm".to_string(), "H".to_string()];
        let err = resolve(&names).unwrap_err();
        assert_eq!(format!("{err}"), "unknown chord: H");
    }
}
