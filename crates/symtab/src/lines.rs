//! Source line tables and step ranges.
//!
//! Entries map the first address of each source line to its line
//! number, kept sorted by address. The pc range of one line is what
//! the control loop steps through silently.

/// One line table entry: `addr` is the first instruction of `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub line: u32,
    pub addr: u64,
}

/// The pc interval of one source line: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub line: u32,
    pub start: u64,
    pub end: u64,
}

/// Line table for one compilation, sorted by address.
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    entries: Vec<LineEntry>,
    /// First address past the covered code; bounds the last line's range.
    code_end: u64,
}

impl LineTable {
    pub fn new(mut entries: Vec<LineEntry>, code_end: u64) -> Self {
        entries.sort_by_key(|e| e.addr);
        Self { entries, code_end }
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    /// The line containing `pc` and its pc range, or `None` when `pc`
    /// is outside the covered code.
    pub fn find_pc_line(&self, pc: u64) -> Option<LineRange> {
        if self.entries.is_empty() || pc >= self.code_end {
            return None;
        }
        let idx = match self.entries.binary_search_by_key(&pc, |e| e.addr) {
            Ok(i) => i,
            Err(0) => return None, // before the first line
            Err(i) => i - 1,
        };
        let entry = self.entries[idx];
        let end = self
            .entries
            .get(idx + 1)
            .map(|e| e.addr)
            .unwrap_or(self.code_end);
        Some(LineRange { line: entry.line, start: entry.addr, end })
    }

    /// First address generated for `line`, for breakpoint placement.
    pub fn line_to_addr(&self, line: u32) -> Option<u64> {
        self.entries
            .iter()
            .filter(|e| e.line == line)
            .map(|e| e.addr)
            .min()
    }
}
