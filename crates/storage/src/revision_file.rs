//! Text framing used inside proto-rev and revision files: the representation
//! header, the `ENDREP` trailer, and the revision trailer, per spec.md §6.

use fsfs_core::{Error, Rev, Result};
use std::io::{Read, Write};

/// `DELTA <base_rev> <base_off> <base_len>\n` or `DELTA\n` for a self-delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepHeader {
    SelfDelta,
    Delta { base_rev: Rev, base_offset: u64, base_len: u64 },
}

impl RepHeader {
    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        match self {
            RepHeader::SelfDelta => write!(w, "DELTA\n")?,
            RepHeader::Delta { base_rev, base_offset, base_len } => {
                write!(w, "DELTA {} {} {}\n", base_rev.0, base_offset, base_len)?
            }
        }
        Ok(())
    }

    /// Reads one header line, assuming the reader is positioned exactly at
    /// its start. Lines are bounded (no header exceeds a couple hundred
    /// bytes) so we read byte-by-byte rather than requiring `BufRead`.
    pub fn read(r: &mut impl Read) -> Result<Self> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = r.read(&mut byte)?;
            if n == 0 {
                return Err(Error::corrupt("unexpected EOF reading rep header"));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        let text = String::from_utf8(line).map_err(|_| Error::corrupt("rep header is not utf8"))?;
        parse_header_line(&text)
    }
}

fn parse_header_line(line: &str) -> Result<RepHeader> {
    let mut parts = line.split_ascii_whitespace();
    match parts.next() {
        Some("DELTA") => {
            let rest: Vec<&str> = parts.collect();
            if rest.is_empty() {
                Ok(RepHeader::SelfDelta)
            } else if rest.len() == 3 {
                let base_rev = rest[0].parse::<u64>().map_err(|_| Error::corrupt("bad base_rev"))?;
                let base_offset = rest[1].parse::<u64>().map_err(|_| Error::corrupt("bad base_off"))?;
                let base_len = rest[2].parse::<u64>().map_err(|_| Error::corrupt("bad base_len"))?;
                Ok(RepHeader::Delta {
                    base_rev: Rev(base_rev),
                    base_offset,
                    base_len,
                })
            } else {
                Err(Error::corrupt(format!("malformed rep header: {line:?}")))
            }
        }
        _ => Err(Error::corrupt(format!("unrecognized rep header: {line:?}"))),
    }
}

/// Diagnostic trailer written after every literal (non-shared) rep.
pub const ENDREP_TRAILER: &[u8] = b"ENDREP\n";

/// `"<root_offset> <changed_paths_offset>\n"`, the final line of a revision
/// file (spec.md §4.7 step 7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionTrailer {
    pub root_offset: u64,
    pub changed_paths_offset: u64,
}

impl RevisionTrailer {
    pub fn write(&self, w: &mut impl Write) -> Result<()> {
        write!(w, "{} {}\n", self.root_offset, self.changed_paths_offset)?;
        Ok(())
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.trim_end().split_ascii_whitespace();
        let root_offset = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::corrupt("missing root offset in revision trailer"))?;
        let changed_paths_offset = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::corrupt("missing changed-paths offset in revision trailer"))?;
        Ok(RevisionTrailer { root_offset, changed_paths_offset })
    }

    /// Reads the trailer from the last line of a revision file.
    pub fn read_from_end(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|_| Error::corrupt("revision trailer is not utf8"))?;
        let last_line = text
            .trim_end_matches('\n')
            .rsplit('\n')
            .next()
            .ok_or_else(|| Error::corrupt("empty revision file"))?;
        Self::parse(last_line)
    }
}
