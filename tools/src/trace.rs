use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use lea_ftl::{IoKind, IoRecord, MAX_IO_COUNT};

/// Trace parsing failures. All of these are fatal to a replay: a trace that can't
/// be trusted end-to-end isn't worth half-replaying.
#[derive(Debug)]
pub enum TraceError {
    /// the `io count` header never showed up
    MissingHeader,
    /// the declared count and the number of data lines disagree
    CountMismatch { declared: usize, parsed: usize },
    /// the declared count exceeds the harness bound
    TooLarge { declared: usize },
    /// a line that is neither blank nor a parsable record
    BadLine { line: usize, text: String },
    Io(std::io::Error),
}
impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::MissingHeader => write!(f, "no 'io count' header found"),
            TraceError::CountMismatch { declared, parsed } => {
                write!(f, "declared {} IOs but found {}", declared, parsed)
            }
            TraceError::TooLarge { declared } => {
                write!(f, "declared {} IOs, limit is {}", declared, MAX_IO_COUNT)
            }
            TraceError::BadLine { line, text } => write!(f, "unparsable line {}: '{}'", line, text),
            TraceError::Io(e) => write!(f, "trace read failed: {}", e),
        }
    }
}
impl std::error::Error for TraceError {}
impl From<std::io::Error> for TraceError {
    fn from(e: std::io::Error) -> Self { TraceError::Io(e) }
}

/// A fully parsed trace.
#[derive(Debug)]
pub struct TraceFile {
    pub records: Vec<IoRecord>,
}

impl TraceFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<TraceFile, TraceError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Parses the line-oriented trace format: a literal `io count` header, the
    /// declared count on the next non-blank line, then one `<type> <lba> <ppn>`
    /// record per line. Blank lines are ignored throughout; data encountered
    /// before the header is discarded with a warning, matching the tolerance of
    /// the tooling this replaces.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<TraceFile, TraceError> {
        let mut declared: Option<usize> = None;
        let mut expecting_count = false;
        let mut records: Vec<IoRecord> = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if text.starts_with("io count") {
                expecting_count = true;
                continue;
            }
            if expecting_count {
                expecting_count = false;
                let count: usize = text
                    .parse()
                    .map_err(|_| TraceError::BadLine { line: index + 1, text: text.to_string() })?;
                if count > MAX_IO_COUNT {
                    return Err(TraceError::TooLarge { declared: count });
                }
                declared = Some(count);
                records.reserve(count);
                continue;
            }
            if declared.is_none() {
                log::warn!("trace line {} precedes the 'io count' header, ignored", index + 1);
                continue;
            }
            records.push(Self::parse_record(index + 1, text)?);
        }

        match declared {
            None => Err(TraceError::MissingHeader),
            Some(count) if count != records.len() => {
                Err(TraceError::CountMismatch { declared: count, parsed: records.len() })
            }
            Some(_) => Ok(TraceFile { records }),
        }
    }

    fn parse_record(line: usize, text: &str) -> Result<IoRecord, TraceError> {
        let bad = || TraceError::BadLine { line, text: text.to_string() };
        let mut fields = text.split_whitespace();
        let kind = fields
            .next()
            .and_then(|f| f.parse::<u32>().ok())
            .and_then(IoKind::decode)
            .ok_or_else(bad)?;
        let lba = fields.next().and_then(|f| f.parse::<u64>().ok()).ok_or_else(bad)?;
        let ppn = fields.next().and_then(|f| f.parse::<u64>().ok()).ok_or_else(bad)?;
        if fields.next().is_some() {
            return Err(bad());
        }
        Ok(IoRecord { kind, lba, ppn })
    }
}
