//! Emulator error types

use thiserror::Error;

/// Internal-consistency failures
///
/// Malformed host input is absorbed (bounded, defaulted, or ignored) and
/// never produces an error; these variants only signal that the engine's own
/// invariants were broken.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Cursor outside the grid when a character had to be placed
    #[error("cursor at row {row}, col {col} outside {width}x{height} grid at print time")]
    CursorOutOfBounds {
        row: isize,
        col: isize,
        width: usize,
        height: usize,
    },

    /// Display width classification outside the supported range
    #[error("unsupported display width {width} for {ch:?}")]
    UnknownWidth { ch: char, width: usize },

    /// A trace sink write failed
    #[error("trace sink write failed: {0}")]
    Trace(#[from] std::io::Error),
}
