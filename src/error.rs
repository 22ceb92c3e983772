/// Broad class of a [`ScoreError`].
///
/// Configuration errors come from the arrangement tables themselves, validation
/// errors from a single placement, serialization errors from writing the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Serialization,
}

#[derive(thiserror::Error, Debug)]
pub enum ScoreError {
    #[error("track {0} is not registered")]
    UnknownTrack(usize),
    #[error("unknown chord: {0}")]
    UnknownChord(String),
    #[error("section {section}: {reason}")]
    BadBarRange { section: String, reason: String },
    #[error("section {0} has an empty progression")]
    EmptyProgression(String),
    #[error("chord has no degree {degree} (only {len} tones)")]
    MissingDegree { degree: usize, len: usize },
    #[error("bad piece settings: {0}")]
    Settings(String),

    #[error("velocity {0} out of range 0..=127")]
    Velocity(i32),
    #[error("pitch {0} out of range 0..=127")]
    Pitch(i32),
    #[error("duration must be positive and finite, got {0}")]
    Duration(f64),
    #[error("start must be non-negative and finite, got {0}")]
    Start(f64),
    #[error("arpeggio step must be non-negative and finite, got {0}")]
    Step(f64),
    #[error("beat {0} is past the last encodable MIDI tick")]
    Ticks(f64),

    #[error("writing midi: {0}")]
    Write(#[from] std::io::Error),
}

impl ScoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoreError::UnknownTrack(_)
            | ScoreError::UnknownChord(_)
            | ScoreError::BadBarRange { .. }
            | ScoreError::EmptyProgression(_)
            | ScoreError::MissingDegree { .. }
            | ScoreError::Settings(_) => ErrorKind::Configuration,
            ScoreError::Velocity(_)
            | ScoreError::Pitch(_)
            | ScoreError::Duration(_)
            | ScoreError::Start(_)
            | ScoreError::Step(_)
            | ScoreError::Ticks(_) => ErrorKind::Validation,
            ScoreError::Write(_) => ErrorKind::Serialization,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoreError>;
