//! Deterministic terminal grid engine
//!
//! Semantic core of a terminal emulator: a byte of host output goes in, the
//! character grid, cursor, and scroll state update, and any reply bytes for
//! the host come back out. Given the same input sequence the engine always
//! reaches the same screen state, independent of timing, so callers can
//! replay or fork it (for example for remote-shell state prediction).
//!
//! The pieces, leaf first: [`Cell`] (code points plus wide-glyph pairing
//! links), [`Row`] (a fixed run of cells), and [`Emulator`] (the scrollable
//! grid, cursor, control sequence parameter state, and CSI dispatch). The
//! [`parser`] module holds the byte-level decoder that turns the stream into
//! [`Action`] values; everything else — transport, PTY wiring, rendering — is
//! the caller's business.
//!
//! ```
//! use termgrid::Emulator;
//!
//! let mut emu = Emulator::new(80, 24);
//! for &b in b"hello\r\n\x1b[2J".as_slice() {
//!     let reply = emu.input(b, None).unwrap();
//!     assert!(reply.is_empty());
//! }
//! ```

pub mod cell;
pub mod emulator;
pub mod error;
pub mod parser;

pub use cell::{Cell, Row, MAX_CELL_CONTENTS};
pub use emulator::Emulator;
pub use error::EmulatorError;
pub use parser::{Action, Parser};
