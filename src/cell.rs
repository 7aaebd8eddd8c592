//! Grid cells and rows
//!
//! A cell holds the code points displayed at one screen position plus the
//! links that pair up the two halves of a wide (double-column) glyph.

use smallvec::SmallVec;

/// Maximum code points per cell (base glyph plus combining marks)
pub const MAX_CELL_CONTENTS: usize = 16;

/// One screen position
///
/// Wide-glyph links are stored as column indices within the owning [`Row`];
/// a wide glyph never spans rows, so the links survive scrolling and can
/// never dangle.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    /// Code points: base glyph first, combining marks after
    pub(crate) contents: SmallVec<[char; 4]>,
    /// Column of the leading cell; set only on trailing cells
    pub(crate) overlapping_cell: Option<usize>,
    /// Columns of the trailing cells spanned; non-empty only on leading cells
    pub(crate) overlapped_cells: SmallVec<[usize; 1]>,
}

impl Cell {
    /// Code points stored in this cell
    pub fn contents(&self) -> &[char] {
        &self.contents
    }

    /// Column of the leading cell, if this is the trailing half of a wide glyph
    pub fn leading_col(&self) -> Option<usize> {
        self.overlapping_cell
    }

    /// Columns of the trailing cells this cell spans, if it leads a wide glyph
    pub fn spanned_cols(&self) -> &[usize] {
        &self.overlapped_cells
    }

    /// True if this cell is the non-rendered half of a wide glyph
    #[inline]
    pub fn is_trailing(&self) -> bool {
        self.overlapping_cell.is_some()
    }

    /// Append a code point, silently dropping anything past the cap
    pub(crate) fn push_char(&mut self, ch: char) {
        if self.contents.len() < MAX_CELL_CONTENTS {
            self.contents.push(ch);
        }
    }
}

/// A fixed-length run of cells, one terminal line
#[derive(Debug, Clone)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    /// Create a blank row of `width` cells
    pub fn new(width: usize) -> Self {
        Self {
            cells: vec![Cell::default(); width],
        }
    }

    /// Get reference to cell
    pub fn cell(&self, col: usize) -> &Cell {
        &self.cells[col]
    }

    /// Get mutable reference to cell
    pub(crate) fn cell_mut(&mut self, col: usize) -> &mut Cell {
        &mut self.cells[col]
    }

    /// Number of cells in the row
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    /// Reset one cell, tearing down any wide-glyph pairing it takes part in
    ///
    /// Resetting either half of a wide glyph detaches both halves: a trailing
    /// cell removes itself from its leading cell's span list, and a leading
    /// cell clears the back-link and contents of every cell it spans.
    pub fn reset_cell(&mut self, col: usize) {
        if let Some(lead) = self.cells[col].overlapping_cell.take() {
            // A trailing cell never spans cells of its own.
            debug_assert!(self.cells[col].overlapped_cells.is_empty());
            self.cells[col].contents.clear();
            self.cells[lead].overlapped_cells.retain(|c| *c != col);
        } else {
            self.cells[col].contents.clear();
            let spanned = std::mem::take(&mut self.cells[col].overlapped_cells);
            for trail in spanned {
                self.cells[trail].overlapping_cell = None;
                self.cells[trail].contents.clear();
            }
        }
    }

    /// Pair `trail` as the trailing half of the wide glyph leading at `lead`
    ///
    /// The trailing cell is reset first so it can never end up both leading
    /// and trailing at once.
    pub(crate) fn link_wide(&mut self, lead: usize, trail: usize) {
        self.reset_cell(trail);
        self.cells[trail].overlapping_cell = Some(lead);
        self.cells[lead].overlapped_cells.push(trail);
    }

    /// Reset every cell in the row
    pub(crate) fn reset_all(&mut self) {
        for col in 0..self.cells.len() {
            self.reset_cell(col);
        }
    }
}
