/// Line terminator used by a text transport
///
/// Most gateways terminate with a bare newline; the Yacht Devices RAW
/// serial protocol uses CRLF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Lf,
    CrLf,
}

/// Reassembles split reads into complete protocol lines
///
/// Text transports deliver arbitrary chunks; a partial line is buffered
/// until its terminator arrives. Completed lines are trimmed and
/// whitespace-only lines are dropped. Arrival order is preserved.
pub struct LineReader {
    buf: Vec<u8>,
    delimiter: Delimiter,
}

impl LineReader {
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            buf: Vec::new(),
            delimiter,
        }
    }

    /// Append a chunk and return every line completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();

        loop {
            let Some(end) = self.find_terminator() else {
                break;
            };
            let mut raw: Vec<u8> = self.buf.drain(..=end).collect();
            // Drop the terminator itself
            raw.truncate(raw.len() - self.terminator_len());
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        lines
    }

    fn find_terminator(&self) -> Option<usize> {
        match self.delimiter {
            Delimiter::Lf => self.buf.iter().position(|&b| b == b'\n'),
            Delimiter::CrLf => self
                .buf
                .windows(2)
                .position(|w| w == b"\r\n")
                .map(|i| i + 1),
        }
    }

    fn terminator_len(&self) -> usize {
        match self.delimiter {
            Delimiter::Lf => 1,
            Delimiter::CrLf => 2,
        }
    }
}
