//! Escape sequence decoder
//!
//! Byte-level state machine that turns the host output stream into discrete
//! [`Action`] values for the emulator. Covers the ground / escape / CSI states
//! plus UTF-8 assembly; OSC, DCS and APC payloads are outside this engine's
//! contract and are swallowed without interpretation.

/// One decoded terminal action
///
/// The emulator dispatches on these exhaustively; adding a variant forces
/// every dispatch site to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Display a character at the cursor
    Print(char),
    /// Run a C0 control function
    Execute(u8),
    /// Accumulate one parameter byte (digit or `;`)
    Param(u8),
    /// Accumulate one intermediate or private-marker byte
    Collect(u8),
    /// Discard accumulated parameter and dispatch state
    Clear,
    /// Dispatch a completed CSI sequence on its final byte
    CsiDispatch(u8),
    /// Dispatch a completed two-byte escape sequence
    EscDispatch(u8),
    /// Byte recognized but deliberately not interpreted
    Ignore,
}

impl Action {
    /// Diagnostic name of this action kind
    pub fn name(&self) -> &'static str {
        match self {
            Action::Print(_) => "print",
            Action::Execute(_) => "execute",
            Action::Param(_) => "param",
            Action::Collect(_) => "collect",
            Action::Clear => "clear",
            Action::CsiDispatch(_) => "csi_dispatch",
            Action::EscDispatch(_) => "esc_dispatch",
            Action::Ignore => "ignore",
        }
    }

    /// Character payload, if this action carries one
    pub fn payload(&self) -> Option<char> {
        match *self {
            Action::Print(ch) => Some(ch),
            Action::Execute(b)
            | Action::Param(b)
            | Action::Collect(b)
            | Action::CsiDispatch(b)
            | Action::EscDispatch(b) => Some(b as char),
            Action::Clear | Action::Ignore => None,
        }
    }
}

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    /// Inside an OSC/DCS/APC-style string; bytes swallowed until BEL or ST
    StringSwallow,
}

/// Escape sequence decoder
///
/// Feed it one byte at a time; each byte yields zero or more actions.
#[derive(Debug, Clone)]
pub struct Parser {
    state: State,
    /// Pending multi-byte UTF-8 sequence
    utf8_buf: [u8; 4],
    utf8_len: usize,
    utf8_need: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Create a decoder in the ground state
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            utf8_buf: [0; 4],
            utf8_len: 0,
            utf8_need: 0,
        }
    }

    /// Advance the decoder by one byte, returning the actions it produced
    pub fn advance(&mut self, byte: u8) -> Vec<Action> {
        let mut out = Vec::new();

        if self.utf8_need > 0 {
            if (0x80..=0xBF).contains(&byte) {
                self.utf8_buf[self.utf8_len] = byte;
                self.utf8_len += 1;
                if self.utf8_len == self.utf8_need {
                    out.push(Action::Print(self.take_utf8()));
                }
                return out;
            }
            // Truncated sequence: emit a replacement and reprocess the byte.
            self.utf8_need = 0;
            self.utf8_len = 0;
            out.push(Action::Print(char::REPLACEMENT_CHARACTER));
        }

        // String payloads (OSC and friends) swallow everything up to the
        // BEL or ESC-backslash terminator.
        if self.state == State::StringSwallow {
            match byte {
                0x07 => {
                    self.state = State::Ground;
                    out.push(Action::Ignore);
                }
                0x1b => {
                    self.state = State::Escape;
                    out.push(Action::Clear);
                }
                _ => out.push(Action::Ignore),
            }
            return out;
        }

        // ESC and C0 controls act from every state (ECMA-48 anywhere rules).
        match byte {
            0x1b => {
                self.state = State::Escape;
                out.push(Action::Clear);
                return out;
            }
            0x18 | 0x1a => {
                // CAN/SUB abort any sequence in progress
                self.state = State::Ground;
                out.push(Action::Execute(byte));
                return out;
            }
            0x00..=0x17 | 0x19 | 0x1c..=0x1f => {
                out.push(Action::Execute(byte));
                return out;
            }
            0x7f => {
                out.push(Action::Ignore);
                return out;
            }
            _ => {}
        }

        match self.state {
            State::Ground => match byte {
                0x20..=0x7e => out.push(Action::Print(byte as char)),
                _ => self.start_utf8(byte, &mut out),
            },
            State::Escape => match byte {
                b'[' => self.state = State::CsiEntry,
                b']' | b'P' | b'X' | b'^' | b'_' => self.state = State::StringSwallow,
                0x20..=0x2f => out.push(Action::Collect(byte)),
                0x30..=0x7e => {
                    self.state = State::Ground;
                    out.push(Action::EscDispatch(byte));
                }
                _ => {
                    self.state = State::Ground;
                    out.push(Action::Ignore);
                }
            },
            State::CsiEntry | State::CsiParam => match byte {
                b'0'..=b'9' | b';' => {
                    self.state = State::CsiParam;
                    out.push(Action::Param(byte));
                }
                0x3c..=0x3f if self.state == State::CsiEntry => {
                    self.state = State::CsiParam;
                    out.push(Action::Collect(byte));
                }
                0x3a..=0x3f => self.state = State::CsiIgnore,
                0x20..=0x2f => {
                    self.state = State::CsiIntermediate;
                    out.push(Action::Collect(byte));
                }
                0x40..=0x7e => {
                    self.state = State::Ground;
                    out.push(Action::CsiDispatch(byte));
                    out.push(Action::Clear);
                }
                _ => self.state = State::CsiIgnore,
            },
            State::CsiIntermediate => match byte {
                0x20..=0x2f => out.push(Action::Collect(byte)),
                0x40..=0x7e => {
                    self.state = State::Ground;
                    out.push(Action::CsiDispatch(byte));
                    out.push(Action::Clear);
                }
                _ => self.state = State::CsiIgnore,
            },
            State::CsiIgnore => {
                if (0x40..=0x7e).contains(&byte) {
                    self.state = State::Ground;
                }
                out.push(Action::Ignore);
            }
            // Handled by the early return above, before the anywhere rules.
            State::StringSwallow => unreachable!(),
        }

        out
    }

    /// Begin a multi-byte UTF-8 sequence (or reject an invalid lead byte)
    fn start_utf8(&mut self, byte: u8, out: &mut Vec<Action>) {
        let need = match byte {
            0xc2..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf4 => 4,
            _ => {
                out.push(Action::Print(char::REPLACEMENT_CHARACTER));
                return;
            }
        };
        self.utf8_buf[0] = byte;
        self.utf8_len = 1;
        self.utf8_need = need;
    }

    /// Finish the pending UTF-8 sequence
    fn take_utf8(&mut self) -> char {
        let bytes = &self.utf8_buf[..self.utf8_len];
        let ch = std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.utf8_len = 0;
        self.utf8_need = 0;
        ch
    }
}
