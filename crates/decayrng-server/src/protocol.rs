//! Wire format.
//!
//! Clients send fixed 3-byte commands, possibly several back to back in one
//! segment. The server answers with newline-terminated decimal text.

use decayrng_core::{EntropyEntry, StatsSnapshot};

/// Length of one command.
pub const STRIDE: usize = 3;

/// Sent once, right after a client is accepted.
pub const GREETING: &[u8] = b"ready\n";

/// A recognized 3-byte command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `req`: pop one entropy entry.
    Request,
    /// `end`: close the connection.
    End,
    /// `sta`: statistics line.
    Stats,
}

impl Command {
    /// Match a full stride. Anything else is a protocol violation.
    pub fn parse(stride: &[u8]) -> Option<Self> {
        match stride {
            b"req" => Some(Self::Request),
            b"end" => Some(Self::End),
            b"sta" => Some(Self::Stats),
            _ => None,
        }
    }

    pub fn as_bytes(self) -> &'static [u8; STRIDE] {
        match self {
            Self::Request => b"req",
            Self::End => b"end",
            Self::Stats => b"sta",
        }
    }
}

/// `<value>:<source_counter>:<available>\n`
pub fn render_entropy(entry: EntropyEntry, available: usize) -> String {
    format!("{}:{}:{}\n", entry.value, entry.source_counter, available)
}

/// `cpm:<last>:<avg>:loop:<min>:<max>:<below>:<above>\n`
pub fn render_stats(snapshot: &StatsSnapshot) -> String {
    format!("{snapshot}\n")
}

/// Splits incoming bytes into strides, carrying an incomplete tail over to
/// the next receive event so a command split across segments still lines up.
#[derive(Debug, Default)]
pub struct StrideReader {
    pending: Vec<u8>,
}

impl StrideReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` and drain every complete stride, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<[u8; STRIDE]> {
        self.pending.extend_from_slice(data);
        let whole = self.pending.len() / STRIDE * STRIDE;
        let strides = self.pending[..whole]
            .chunks_exact(STRIDE)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        self.pending.drain(..whole);
        strides
    }

    /// Bytes held back waiting for the rest of their stride.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_commands() {
        assert_eq!(Command::parse(b"req"), Some(Command::Request));
        assert_eq!(Command::parse(b"end"), Some(Command::End));
        assert_eq!(Command::parse(b"sta"), Some(Command::Stats));
        assert_eq!(Command::parse(b"xyz"), None);
        assert_eq!(Command::parse(b"REQ"), None);
        assert_eq!(Command::parse(b"re"), None);
    }

    #[test]
    fn command_bytes_parse_back() {
        for cmd in [Command::Request, Command::End, Command::Stats] {
            assert_eq!(Command::parse(cmd.as_bytes()), Some(cmd));
        }
    }

    #[test]
    fn entropy_line_format() {
        let entry = EntropyEntry {
            value: 52,
            source_counter: 3_473_460,
        };
        assert_eq!(render_entropy(entry, 1384), "52:3473460:1384\n");
        assert_eq!(render_entropy(EntropyEntry::INVALID, 0), "256:0:0\n");
    }

    #[test]
    fn strides_split_concatenated_commands() {
        let mut r = StrideReader::new();
        let got = r.feed(b"reqstaend");
        assert_eq!(got, vec![*b"req", *b"sta", *b"end"]);
        assert!(r.pending().is_empty());
    }

    #[test]
    fn partial_stride_waits_for_next_segment() {
        let mut r = StrideReader::new();
        assert_eq!(r.feed(b"reqr"), vec![*b"req"]);
        assert_eq!(r.pending(), b"r");
        assert_eq!(r.feed(b"eq"), vec![*b"req"]);
        assert!(r.pending().is_empty());
    }
}
