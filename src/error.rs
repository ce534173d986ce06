use thiserror::Error;

pub type Result<T> = std::result::Result<T, SequencerError>;

/// Failures surfaced by MIDI decoding and pattern normalization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequencerError {
    #[error("malformed variable-length quantity at byte {offset}")]
    MalformedVarLen { offset: usize },

    #[error("value {0:#x} does not fit in a variable-length quantity")]
    VarLenOutOfRange(u32),

    #[error("invalid chunk header at byte {offset}: expected '{expected}'")]
    InvalidHeader { offset: usize, expected: &'static str },

    #[error("SMPTE time division ({0:#06x}) is not supported")]
    UnsupportedTimeFormat(u16),

    #[error("unknown MIDI event type {status:#04x} at byte {offset}")]
    UnknownEventType { status: u8, offset: usize },

    #[error("unexpected end of data at byte {offset}")]
    UnexpectedEof { offset: usize },

    #[error("pattern must be an array or an object with a 'pattern', 'beats' or 'notes' array")]
    InvalidPatternShape,

    #[error("invalid bpm {0}: must be a number in (0, 300]")]
    InvalidBpm(String),

    #[error("item {index}: {reason}")]
    InvalidPatternItem { index: usize, reason: String },

    #[error("invalid pattern JSON: {0}")]
    InvalidJson(String),
}

impl SequencerError {
    pub(crate) fn item(index: usize, reason: impl Into<String>) -> Self {
        SequencerError::InvalidPatternItem {
            index,
            reason: reason.into(),
        }
    }
}
