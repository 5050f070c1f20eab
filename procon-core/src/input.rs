//! Serial command channel: error types and incremental line assembly.

use heapless::Vec;

/// Maximum command line length (excluding the terminator).
pub const MAX_LINE_LENGTH: usize = 64;

/// Error type for the serial command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputError {
    /// UART/communication I/O error.
    Io,
    /// Buffer overflow (line too long).
    BufferOverflow,
    /// UART framing error.
    Framing,
    /// Line is not valid UTF-8.
    Encoding,
}

impl core::fmt::Display for InputError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InputError::Io => f.write_str("serial I/O error"),
            InputError::BufferOverflow => f.write_str("line too long"),
            InputError::Framing => f.write_str("serial framing error"),
            InputError::Encoding => f.write_str("line is not valid text"),
        }
    }
}

/// One assembled command line, terminator stripped.
pub type Line = Vec<u8, MAX_LINE_LENGTH>;

/// Assembles newline-terminated lines from arbitrarily split byte chunks.
///
/// A partial line persists across calls until its terminator arrives. If a
/// line exceeds the buffer capacity, the rest of it is discarded so the
/// following line starts clean.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Line,
    discarding: bool,
}

impl LineBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    /// Bytes of the line assembled so far.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Push one byte.
    ///
    /// Returns `Some(Ok(line))` when `byte` completes a line, and
    /// `Some(Err(InputError::BufferOverflow))` when an over-long line ends.
    /// Carriage returns are dropped so CRLF and LF both terminate a line.
    pub fn push(&mut self, byte: u8) -> Option<Result<Line, InputError>> {
        match byte {
            b'\n' => {
                let line = core::mem::take(&mut self.buffer);
                if core::mem::take(&mut self.discarding) {
                    Some(Err(InputError::BufferOverflow))
                } else {
                    Some(Ok(line))
                }
            }
            b'\r' => None,
            _ if self.discarding => None,
            _ => {
                if self.buffer.push(byte).is_err() {
                    self.discarding = true;
                }
                None
            }
        }
    }

    /// Drop any partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(lines: &mut LineBuffer, bytes: &[u8]) -> Option<Result<Line, InputError>> {
        let mut last = None;
        for &b in bytes {
            if let Some(result) = lines.push(b) {
                last = Some(result);
            }
        }
        last
    }

    #[test]
    fn test_partial_line_persists_across_chunks() {
        let mut lines = LineBuffer::new();
        assert!(feed(&mut lines, b"HOLD").is_none());
        assert_eq!(lines.pending(), b"HOLD");
        let line = feed(&mut lines, b" A\n").unwrap().unwrap();
        assert_eq!(&line[..], b"HOLD A");
        assert!(lines.pending().is_empty());
    }

    #[test]
    fn test_crlf_terminates() {
        let mut lines = LineBuffer::new();
        let line = feed(&mut lines, b"PAIR\r\n").unwrap().unwrap();
        assert_eq!(&line[..], b"PAIR");
    }

    #[test]
    fn test_empty_line() {
        let mut lines = LineBuffer::new();
        let line = feed(&mut lines, b"\n").unwrap().unwrap();
        assert!(line.is_empty());
    }

    #[test]
    fn test_overflow_discards_rest_of_line() {
        let mut lines = LineBuffer::new();
        let long = [b'X'; MAX_LINE_LENGTH + 10];
        assert!(feed(&mut lines, &long).is_none());
        assert_eq!(feed(&mut lines, b"\n"), Some(Err(InputError::BufferOverflow)));

        // Next line is unaffected.
        let line = feed(&mut lines, b"UNPAIR\n").unwrap().unwrap();
        assert_eq!(&line[..], b"UNPAIR");
    }

    #[test]
    fn test_line_at_capacity_accepted() {
        let mut lines = LineBuffer::new();
        let exact = [b'#'; MAX_LINE_LENGTH];
        feed(&mut lines, &exact);
        let line = feed(&mut lines, b"\n").unwrap().unwrap();
        assert_eq!(line.len(), MAX_LINE_LENGTH);
    }

    #[test]
    fn test_clear_drops_partial_line() {
        let mut lines = LineBuffer::new();
        feed(&mut lines, b"SLE");
        lines.clear();
        let line = feed(&mut lines, b"EP 1\n").unwrap().unwrap();
        assert_eq!(&line[..], b"EP 1");
    }
}
