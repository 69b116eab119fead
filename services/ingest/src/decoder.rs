//! Incremental gzip → line decoder.
//!
//! Compressed chunks arrive in whatever sizes the network produces. Each
//! chunk is inflated into a pending buffer and every complete
//! newline-terminated line is handed back; a trailing partial line waits for
//! the next chunk or for [`LineDecoder::finish`].
//!
//! A body made of several concatenated gzip members decodes as one stream.

use std::io::{self, Write};
use std::string::FromUtf8Error;

use flate2::write::MultiGzDecoder;

/// One feed line. `Err` carries a line whose bytes are not valid UTF-8.
pub type DecodedLine = Result<String, FromUtf8Error>;

pub struct LineDecoder {
    inflater: MultiGzDecoder<Vec<u8>>,
    bytes_in: u64,
    lines_out: u64,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            inflater: MultiGzDecoder::new(Vec::new()),
            bytes_in: 0,
            lines_out: 0,
        }
    }

    /// Feed one compressed chunk; returns the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> io::Result<Vec<DecodedLine>> {
        self.bytes_in += chunk.len() as u64;
        self.inflater.write_all(chunk)?;
        self.inflater.flush()?;
        Ok(self.take_complete_lines())
    }

    /// End of input: verify the gzip trailer and return the last line, if
    /// it had no terminating newline.
    pub fn finish(mut self) -> io::Result<Vec<DecodedLine>> {
        self.inflater.try_finish()?;
        let mut lines = self.take_complete_lines();

        let rest = std::mem::take(self.inflater.get_mut());
        if !rest.is_empty() {
            lines.push(to_line(&rest));
            self.lines_out += 1;
        }
        Ok(lines)
    }

    /// Compressed bytes consumed so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn lines_out(&self) -> u64 {
        self.lines_out
    }

    fn take_complete_lines(&mut self) -> Vec<DecodedLine> {
        let pending = self.inflater.get_mut();
        let Some(last_newline) = pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = pending.drain(..=last_newline).collect();
        let lines: Vec<DecodedLine> = complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(to_line)
            .collect();
        self.lines_out += lines.len() as u64;
        lines
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn to_line(bytes: &[u8]) -> DecodedLine {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
}
