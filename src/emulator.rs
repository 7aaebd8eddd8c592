//! Terminal emulator core
//!
//! Owns the character grid and applies decoded actions to it: printing with
//! wide/combining character bookkeeping, cursor and scroll state, control
//! sequence parameter accumulation, and CSI command dispatch. Deterministic:
//! the same action sequence always reaches the same screen state.

use std::collections::VecDeque;
use std::io::Write;

use log::{trace, warn};
use unicode_width::UnicodeWidthChar;

use crate::cell::{Cell, Row};
use crate::error::EmulatorError;
use crate::parser::{Action, Parser};

/// Maximum accumulated parameter bytes
/// (enough for sixteen five-digit parameters plus separators)
const MAX_PARAMS: usize = 100;

/// Maximum accumulated dispatch characters (never should need more than 2)
const MAX_DISPATCH_CHARS: usize = 8;

/// Terminal emulator state
///
/// Feed host output one byte at a time with [`input`](Emulator::input); the
/// grid, cursor, and in-flight control sequence state update in place, and
/// any bytes the terminal wants to send back to the host are returned.
pub struct Emulator {
    /// Escape sequence decoder
    parser: Parser,
    /// Number of columns (fixed for the emulator's lifetime)
    width: usize,
    /// Number of rows (fixed for the emulator's lifetime)
    height: usize,
    /// Cursor column; may transiently equal `width` while a wrap is pending
    cursor_col: isize,
    /// Cursor row; may transiently reach `height` until autoscroll corrects it
    cursor_row: isize,
    /// Column of the most recently placed base glyph (combining mark target)
    combining_col: isize,
    /// Row of the most recently placed base glyph; scrolling can push it
    /// negative, which simply drops subsequent combining marks
    combining_row: isize,
    /// Screen rows, oldest at the front; scrolling recycles whole rows
    rows: VecDeque<Row>,
    /// Raw parameter bytes of the control sequence in flight
    params: String,
    /// Collected intermediate bytes plus, at dispatch time, the final byte
    dispatch_chars: String,
    /// Integers parsed out of `params`
    parsed_params: Vec<i64>,
    /// Bytes to send back to the host, drained by each `input` call
    reply: Vec<u8>,
}

impl Emulator {
    /// Create an emulator with a blank grid (0x0 is valid and inert)
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            parser: Parser::new(),
            width,
            height,
            cursor_col: 0,
            cursor_row: 0,
            combining_col: 0,
            combining_row: 0,
            rows: (0..height).map(|_| Row::new(width)).collect(),
            params: String::new(),
            dispatch_chars: String::new(),
            parsed_params: Vec::new(),
            reply: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cursor_row(&self) -> isize {
        self.cursor_row
    }

    pub fn cursor_col(&self) -> isize {
        self.cursor_col
    }

    /// Get reference to a row
    pub fn row(&self, row: usize) -> &Row {
        &self.rows[row]
    }

    /// Get reference to a cell
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows[row].cell(col)
    }

    // ========== Action dispatch ==========

    /// Feed one byte of host output
    ///
    /// Each byte decodes into zero or more actions, which are applied in
    /// order. Non-print actions are described on `trace_sink` when one is
    /// given. Returns the bytes the terminal wants written back to the host
    /// (for example a device attributes reply).
    pub fn input(
        &mut self,
        byte: u8,
        mut trace_sink: Option<&mut dyn Write>,
    ) -> Result<Vec<u8>, EmulatorError> {
        self.reply.clear();

        for action in self.parser.advance(byte) {
            if let Some(sink) = trace_sink.as_deref_mut() {
                if !matches!(action, Action::Print(_)) {
                    describe_action(sink, &action)?;
                }
            }
            self.apply(action)?;
        }

        Ok(std::mem::take(&mut self.reply))
    }

    /// Apply one decoded action to emulator state
    fn apply(&mut self, action: Action) -> Result<(), EmulatorError> {
        match action {
            Action::Print(ch) => self.print(ch)?,
            Action::Execute(byte) => self.execute(byte),
            Action::Param(byte) => self.param(byte),
            Action::Collect(byte) => self.collect(byte),
            Action::Clear => self.clear(),
            Action::CsiDispatch(byte) => self.csi_dispatch(byte),
            Action::EscDispatch(byte) => {
                trace!("unhandled escape dispatch: 0x{:02x}", byte);
            }
            Action::Ignore => {}
        }
        Ok(())
    }

    // ========== Scroll & cursor ==========

    /// Scroll the grid up by `n` rows
    ///
    /// Discards the top `n` rows, appends fresh blank rows at the bottom, and
    /// moves the cursor and combining anchor up with the content. Negative
    /// amounts (reverse scroll) are not supported and are ignored.
    pub fn scroll(&mut self, n: isize) {
        if n == 0 || self.height == 0 {
            return;
        }
        if n < 0 {
            warn!("reverse scroll by {} rows not supported, ignoring", n);
            return;
        }
        for _ in 0..n {
            self.rows.pop_front();
            self.rows.push_back(Row::new(self.width));
            self.cursor_row -= 1;
            self.combining_row -= 1;
        }
    }

    /// Scroll by exactly the overflow when the cursor has moved below the grid
    fn autoscroll(&mut self) {
        if self.cursor_row >= self.height as isize {
            self.scroll(self.cursor_row - self.height as isize + 1);
        }
    }

    /// Anchor combining marks to the cell under the cursor
    fn new_grapheme(&mut self) {
        self.combining_col = self.cursor_col;
        self.combining_row = self.cursor_row;
    }

    // ========== Character placement ==========

    /// Place one decoded character at the cursor
    fn print(&mut self, ch: char) -> Result<(), EmulatorError> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        // Must be on screen; one column past the right edge is the pending
        // wrap state and is tolerated.
        if self.cursor_row < 0
            || self.cursor_row >= self.height as isize
            || self.cursor_col < 0
            || self.cursor_col > self.width as isize
        {
            return Err(EmulatorError::CursorOutOfBounds {
                row: self.cursor_row,
                col: self.cursor_col,
                width: self.width,
                height: self.height,
            });
        }

        let chwidth = if ch == '\0' { None } else { ch.width() };

        match chwidth {
            Some(w) if w == 1 || w == 2 => {
                if self.cursor_col >= self.width as isize {
                    // wrap
                    self.cursor_col = 0;
                    self.cursor_row += 1;
                }
                self.autoscroll();

                let row = self.cursor_row as usize;
                let col = self.cursor_col as usize;
                self.rows[row].reset_cell(col);
                self.rows[row].cell_mut(col).push_char(ch);
                self.new_grapheme();

                if w == 2 && col + 1 < self.width {
                    self.rows[row].link_wide(col, col + 1);
                }

                // A wide glyph in the last column advances straight into the
                // pending wrap state rather than past it.
                self.cursor_col = (self.cursor_col + w as isize).min(self.width as isize);
            }
            Some(0) => {
                // Combining mark: routed to the last placed base glyph.
                // The anchor starts at (0, 0), so a leading mark lands
                // there; only a scrolled-away anchor drops the mark.
                if self.combining_row >= 0
                    && self.combining_row < self.height as isize
                    && self.combining_col >= 0
                    && (self.combining_col as usize) < self.width
                {
                    let row = self.combining_row as usize;
                    let col = self.combining_col as usize;
                    self.rows[row].cell_mut(col).push_char(ch);
                }
            }
            None => {} // unprintable
            Some(w) => return Err(EmulatorError::UnknownWidth { ch, width: w }),
        }

        Ok(())
    }

    // ========== Control characters ==========

    /// Run a C0 control function
    fn execute(&mut self, byte: u8) {
        match byte {
            0x0a => {
                // LF
                self.cursor_row += 1;
                self.autoscroll();
            }
            0x0d => {
                // CR
                self.cursor_col = 0;
            }
            0x08 => {
                // BS; re-anchoring combining marks here is not what xterm does
                if self.cursor_col > 0 {
                    self.cursor_col -= 1;
                    self.new_grapheme();
                }
            }
            _ => {
                trace!("unhandled control character: 0x{:02x}", byte);
            }
        }
    }

    // ========== Parameter accumulation ==========

    /// Accumulate one parameter byte (digit or `;`)
    fn param(&mut self, byte: u8) {
        debug_assert!(byte == b';' || byte.is_ascii_digit());
        if self.params.len() < MAX_PARAMS {
            self.params.push(byte as char);
        }
    }

    /// Accumulate one intermediate byte
    fn collect(&mut self, byte: u8) {
        if self.dispatch_chars.chars().count() < MAX_DISPATCH_CHARS {
            self.dispatch_chars.push(byte as char);
        }
    }

    /// Drop all accumulated control sequence state
    fn clear(&mut self) {
        self.params.clear();
        self.dispatch_chars.clear();
    }

    /// Split the accumulated parameter text into integers
    ///
    /// Empty or unparsable segments become -1; a trailing separator yields a
    /// trailing -1 segment.
    fn parse_params(&mut self) {
        self.parsed_params.clear();
        for segment in self.params.split(';') {
            self.parsed_params.push(segment.parse().unwrap_or(-1));
        }
    }

    /// Parameter `n` with a default
    ///
    /// Out-of-range indices and values below 1 fall back to the default
    /// (parameters are 1-based counts, and 0 means "use default").
    fn get_param(&self, n: usize, default: i64) -> i64 {
        let val = self.parsed_params.get(n).copied().unwrap_or(default);
        if val < 1 {
            default
        } else {
            val
        }
    }

    // ========== CSI dispatch ==========

    /// Dispatch a completed CSI sequence on its final byte
    fn csi_dispatch(&mut self, final_byte: u8) {
        // The final byte completes the dispatch key.
        self.collect(final_byte);

        match self.dispatch_chars.as_str() {
            "K" => self.csi_el(),
            "J" => self.csi_ed(),
            "A" | "B" | "C" | "D" | "H" => self.csi_cursor_move(),
            "c" => self.csi_da(),
            other => {
                trace!("unhandled CSI dispatch: {:?}", other);
            }
        }
    }

    /// EL - Erase in Line (CSI K)
    /// mode: 0=from cursor, 1=to cursor, 2=entire line
    fn csi_el(&mut self) {
        self.parse_params();
        let mode = self.get_param(0, 0);
        self.erase_in_line(mode);
    }

    /// ED - Erase in Display (CSI J)
    /// mode: 0=from cursor, 1=to cursor, 2=entire screen
    fn csi_ed(&mut self) {
        self.parse_params();
        let mode = self.get_param(0, 0);
        self.erase_in_display(mode);
    }

    fn erase_in_line(&mut self, mode: i64) {
        if self.width == 0 {
            return;
        }
        let Some(row) = self.row_index(self.cursor_row) else {
            return;
        };
        let col = self.cursor_col.clamp(0, self.width as isize) as usize;
        match mode {
            0 => {
                for c in col..self.width {
                    self.rows[row].reset_cell(c);
                }
            }
            1 => {
                for c in 0..=col.min(self.width - 1) {
                    self.rows[row].reset_cell(c);
                }
            }
            2 => self.rows[row].reset_all(),
            _ => {}
        }
    }

    fn erase_in_display(&mut self, mode: i64) {
        let Some(row) = self.row_index(self.cursor_row) else {
            return;
        };
        match mode {
            0 => {
                self.erase_in_line(0);
                for r in (row + 1)..self.height {
                    self.rows[r].reset_all();
                }
            }
            1 => {
                for r in 0..row {
                    self.rows[r].reset_all();
                }
                self.erase_in_line(1);
            }
            2 => {
                for r in 0..self.height {
                    self.rows[r].reset_all();
                }
            }
            _ => {}
        }
    }

    /// CUU/CUD/CUF/CUB/CUP - cursor motion, clamped to the grid
    fn csi_cursor_move(&mut self) {
        self.parse_params();
        if self.width == 0 || self.height == 0 {
            return;
        }
        let last_row = self.height as isize - 1;
        let last_col = self.width as isize - 1;
        let num = self.get_param(0, 1) as isize;

        match self.dispatch_chars.chars().last() {
            Some('A') => self.cursor_row = (self.cursor_row - num).clamp(0, last_row),
            Some('B') => self.cursor_row = (self.cursor_row + num).clamp(0, last_row),
            Some('C') => self.cursor_col = (self.cursor_col + num).clamp(0, last_col),
            Some('D') => self.cursor_col = (self.cursor_col - num).clamp(0, last_col),
            Some('H') => {
                // 1-based row;col
                let row = self.get_param(0, 1) as isize - 1;
                let col = self.get_param(1, 1) as isize - 1;
                self.cursor_row = row.clamp(0, last_row);
                self.cursor_col = col.clamp(0, last_col);
            }
            _ => {}
        }
    }

    /// DA - Device Attributes (CSI c): report a VT220-class terminal
    fn csi_da(&mut self) {
        self.reply.extend_from_slice(b"\x1b[?62c");
    }

    fn row_index(&self, row: isize) -> Option<usize> {
        if row >= 0 && (row as usize) < self.height {
            Some(row as usize)
        } else {
            None
        }
    }

    // ========== Diagnostics ==========

    /// Write a full-screen redraw of the grid to `out`
    ///
    /// Emits home + clear, per-cell positioned output (skipping the contents
    /// of wide-glyph trailing cells), and a final cursor position sequence.
    pub fn debug_printout(&self, out: &mut dyn Write) -> std::io::Result<()> {
        write!(out, "\x1b[H\x1b[2J")?;

        for y in 0..self.height {
            for x in 0..self.width {
                write!(out, "\x1b[{};{}H", y + 1, x + 1)?;
                let cell = self.rows[y].cell(x);
                if cell.is_trailing() {
                    continue;
                }
                for &ch in cell.contents() {
                    write!(out, "{}", ch)?;
                }
            }
        }

        write!(out, "\x1b[{};{}H", self.cursor_row + 1, self.cursor_col + 1)
    }
}

/// Write a one-token, human-readable description of a decoded action
fn describe_action(sink: &mut dyn Write, action: &Action) -> std::io::Result<()> {
    match action.payload() {
        Some(ch) if ch.is_ascii_graphic() => {
            write!(sink, "{}(0x{:02x}={}) ", action.name(), ch as u32, ch)
        }
        Some(ch) => write!(sink, "{}(0x{:02x}) ", action.name(), ch as u32),
        None => write!(sink, "[{}] ", action.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(emu: &mut Emulator, bytes: &[u8]) -> Vec<u8> {
        let mut reply = Vec::new();
        for &b in bytes {
            reply.extend(emu.input(b, None).unwrap());
        }
        reply
    }

    fn contents_str(emu: &Emulator, row: usize, col: usize) -> String {
        emu.cell(row, col).contents().iter().collect()
    }

    #[test]
    fn test_scroll_moves_cursor_and_rows() {
        let mut emu = Emulator::new(10, 5);
        feed(&mut emu, b"top");
        emu.scroll(2);
        assert_eq!(emu.cursor_row(), -2);
        // The old top row is gone; everything is blank again.
        for row in 0..5 {
            for col in 0..10 {
                assert!(emu.cell(row, col).contents().is_empty());
            }
        }
    }

    #[test]
    fn test_scroll_zero_and_negative_are_noops() {
        let mut emu = Emulator::new(10, 5);
        feed(&mut emu, b"x");
        emu.scroll(0);
        emu.scroll(-3);
        assert_eq!(emu.cursor_row(), 0);
        assert_eq!(contents_str(&emu, 0, 0), "x");
    }

    #[test]
    fn test_linefeed_autoscrolls_at_bottom() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"a\r\nb\r\nc");
        // Two line feeds on a two-row grid scroll once.
        assert_eq!(emu.cursor_row(), 1);
        assert_eq!(contents_str(&emu, 0, 0), "b");
        assert_eq!(contents_str(&emu, 1, 0), "c");
    }

    #[test]
    fn test_wrap_at_right_edge() {
        let mut emu = Emulator::new(3, 2);
        feed(&mut emu, b"abcd");
        assert_eq!(contents_str(&emu, 0, 2), "c");
        assert_eq!(contents_str(&emu, 1, 0), "d");
        assert_eq!(emu.cursor_row(), 1);
        assert_eq!(emu.cursor_col(), 1);
    }

    #[test]
    fn test_wide_char_links_cells() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, "漢".as_bytes());
        assert_eq!(contents_str(&emu, 0, 0), "漢");
        assert_eq!(emu.cell(0, 0).spanned_cols(), &[1]);
        assert_eq!(emu.cell(0, 1).leading_col(), Some(0));
        assert_eq!(emu.cursor_col(), 2);
    }

    #[test]
    fn test_wide_char_wraps_from_pending_state() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"abcd");
        assert_eq!(emu.cursor_col(), 4); // pending wrap
        feed(&mut emu, "漢".as_bytes());
        assert_eq!(emu.cursor_row(), 1);
        assert_eq!(contents_str(&emu, 1, 0), "漢");
        assert_eq!(emu.cell(1, 1).leading_col(), Some(0));
    }

    #[test]
    fn test_wide_char_in_last_column_clamps_advance() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"abc");
        feed(&mut emu, "漢".as_bytes());
        // No next column to span, and the advance stops at the pending
        // wrap position instead of overshooting it.
        assert_eq!(contents_str(&emu, 0, 3), "漢");
        assert!(emu.cell(0, 3).spanned_cols().is_empty());
        assert_eq!(emu.cursor_col(), 4);
        feed(&mut emu, b"x");
        assert_eq!(emu.cursor_row(), 1);
        assert_eq!(contents_str(&emu, 1, 0), "x");
        assert_eq!(emu.cursor_col(), 1);
    }

    #[test]
    fn test_overwrite_trailing_half_detaches_pair() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, "漢".as_bytes());
        feed(&mut emu, b"\x1b[1;2Hx"); // overwrite the trailing cell
        assert!(emu.cell(0, 0).spanned_cols().is_empty());
        assert_eq!(contents_str(&emu, 0, 1), "x");
        assert_eq!(emu.cell(0, 1).leading_col(), None);
    }

    #[test]
    fn test_overwrite_leading_half_clears_trailing() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, "漢".as_bytes());
        feed(&mut emu, b"\x1b[1;1Hx"); // overwrite the leading cell
        assert_eq!(contents_str(&emu, 0, 0), "x");
        assert_eq!(emu.cell(0, 1).leading_col(), None);
        assert!(emu.cell(0, 1).contents().is_empty());
    }

    #[test]
    fn test_combining_marks_attach_to_anchor() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"e");
        feed(&mut emu, "\u{0301}".as_bytes()); // combining acute
        assert_eq!(contents_str(&emu, 0, 0), "e\u{0301}");
        assert_eq!(emu.cursor_col(), 1); // combining mark does not move cursor
    }

    #[test]
    fn test_combining_marks_capped_at_sixteen() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"a");
        for _ in 0..20 {
            feed(&mut emu, "\u{0301}".as_bytes());
        }
        assert_eq!(emu.cell(0, 0).contents().len(), 16);
    }

    #[test]
    fn test_leading_combining_mark_lands_at_origin() {
        // The anchor starts at (0, 0), so a mark with no preceding base
        // glyph is appended there.
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, "\u{0301}".as_bytes());
        assert_eq!(contents_str(&emu, 0, 0), "\u{0301}");
    }

    #[test]
    fn test_scrolled_away_anchor_drops_mark() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"a");
        emu.scroll(1);
        feed(&mut emu, "\u{0301}".as_bytes());
        for col in 0..4 {
            assert!(emu.cell(0, col).contents().is_empty());
            assert!(emu.cell(1, col).contents().is_empty());
        }
    }

    #[test]
    fn test_backspace_reanchors() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"ab\x08");
        feed(&mut emu, "\u{0301}".as_bytes());
        // The mark lands on the stepped-onto cell, not the last printed one.
        assert_eq!(contents_str(&emu, 0, 1), "b\u{0301}");
    }

    #[test]
    fn test_zero_size_grid_is_inert() {
        let mut emu = Emulator::new(0, 0);
        let reply = feed(&mut emu, b"hello\n\x1b[2J");
        assert!(reply.is_empty());
    }

    #[test]
    fn test_parse_params_segments() {
        let mut emu = Emulator::new(4, 2);
        emu.params = "1;;3".into();
        emu.parse_params();
        assert_eq!(emu.parsed_params, vec![1, -1, 3]);

        emu.params = String::new();
        emu.parse_params();
        assert_eq!(emu.parsed_params, vec![-1]);

        emu.params = "7;".into();
        emu.parse_params();
        assert_eq!(emu.parsed_params, vec![7, -1]);
    }

    #[test]
    fn test_get_param_defaults() {
        let mut emu = Emulator::new(4, 2);
        emu.params = "0;2;3".into();
        emu.parse_params();
        assert_eq!(emu.get_param(5, 7), 7); // out of range
        assert_eq!(emu.get_param(0, 7), 7); // zero means default
        assert_eq!(emu.get_param(1, 7), 2);
    }

    #[test]
    fn test_param_accumulation_truncated_at_cap() {
        let mut emu = Emulator::new(4, 2);
        for _ in 0..150 {
            emu.param(b'1');
        }
        assert_eq!(emu.params.len(), 100);
        emu.parse_params();
        // A 100-digit segment overflows i64 and defaults, but must not panic.
        assert_eq!(emu.parsed_params, vec![-1]);
    }

    #[test]
    fn test_dispatch_chars_capped() {
        let mut emu = Emulator::new(4, 2);
        for _ in 0..12 {
            emu.collect(b'?');
        }
        assert_eq!(emu.dispatch_chars.chars().count(), 8);
    }

    #[test]
    fn test_device_attributes_reply() {
        let mut emu = Emulator::new(4, 2);
        let reply = feed(&mut emu, b"\x1b[c");
        assert_eq!(reply, b"\x1b[?62c");
    }

    #[test]
    fn test_reply_cleared_between_calls() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, b"\x1b[c");
        let reply = feed(&mut emu, b"x");
        assert!(reply.is_empty());
    }

    #[test]
    fn test_private_sequences_ignored() {
        let mut emu = Emulator::new(4, 2);
        let reply = feed(&mut emu, b"\x1b[?25h\x1b[?25l");
        assert!(reply.is_empty());
        assert_eq!(emu.cursor_row(), 0);
    }

    #[test]
    fn test_trace_sink_describes_actions() {
        let mut emu = Emulator::new(4, 2);
        let mut sink = Vec::new();
        emu.input(b'\n', Some(&mut sink)).unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("execute(0x0a)"));

        // Plain prints are not traced.
        let mut sink = Vec::new();
        emu.input(b'x', Some(&mut sink)).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_debug_printout_skips_trailing_cells() {
        let mut emu = Emulator::new(4, 2);
        feed(&mut emu, "漢x".as_bytes());
        let mut out = Vec::new();
        emu.debug_printout(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("\x1b[H\x1b[2J"));
        assert_eq!(text.matches('漢').count(), 1);
        assert!(text.ends_with("\x1b[1;4H")); // final cursor position
    }
}
