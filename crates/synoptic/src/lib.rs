pub mod delta;
pub mod fdr;
pub mod mass;
pub mod modification;
pub mod pipeline;
pub mod psm;
pub mod rank;
pub mod reader;
pub mod reconcile;
pub mod synopsis;

/// Fatal, file-level failures. Anything recoverable at the row level is a
/// [`RowError`] and ends up in the [`MessageCollector`] instead.
#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    /// The first line looked like a header but no required column could be
    /// located in it.
    InvalidHeader(String),
    /// Every line of the input was blank or malformed.
    NoValidRows,
    /// The external abort flag tripped; rows written so far remain valid.
    Aborted,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IO(e) => e.fmt(f),
            Self::Csv(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::InvalidHeader(s) => write!(f, "invalid header line: {}", s),
            Self::NoValidRows => f.write_str("no valid rows in input file"),
            Self::Aborted => f.write_str("processing aborted by external signal"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IO(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e)
    }
}

/// A problem with one input row. The row is dropped and the message is
/// collected; processing of the file continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    MissingColumn(&'static str),
    InvalidNumber(&'static str, String),
    InvalidResidue(char),
    UnknownModification(String),
    MalformedModEntry(String),
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(name) => write!(f, "required column '{}' missing", name),
            Self::InvalidNumber(name, value) => {
                write!(f, "column '{}' is not numeric: '{}'", name, value)
            }
            Self::InvalidResidue(c) => write!(f, "unrecognized residue '{}'", c),
            Self::UnknownModification(name) => {
                write!(f, "modification '{}' not present in the catalog", name)
            }
            Self::MalformedModEntry(entry) => {
                write!(f, "unparsable modification entry '{}'", entry)
            }
        }
    }
}

/// Bounded, deduplicated accumulator for row-level messages. Reported once
/// after a file completes rather than streamed per row.
#[derive(Debug, Default)]
pub struct MessageCollector {
    messages: Vec<String>,
    dropped: usize,
}

impl MessageCollector {
    pub const CAP: usize = 255;

    pub fn push(&mut self, message: String) {
        if self.messages.iter().any(|m| *m == message) {
            return;
        }
        if self.messages.len() < Self::CAP {
            self.messages.push(message);
        } else {
            self.dropped += 1;
        }
    }

    pub fn push_row_error(&mut self, line: usize, err: &RowError) {
        self.push(format!("line {}: {}", line, err));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Number of unique messages discarded after the cap was reached.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn log_all(&self) {
        for message in &self.messages {
            log::warn!("{}", message);
        }
        if self.dropped > 0 {
            log::warn!("{} additional messages suppressed", self.dropped);
        }
    }
}

/// Widening-interval rate limiter for advisory warnings: fires on the 1st,
/// 2nd, 4th, 8th, ... occurrence, up to a hard cap of emitted messages.
#[derive(Debug)]
pub struct Throttle {
    seen: u64,
    next: u64,
    emitted: u32,
    cap: u32,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(25)
    }
}

impl Throttle {
    pub fn new(cap: u32) -> Self {
        Self {
            seen: 0,
            next: 1,
            emitted: 0,
            cap,
        }
    }

    /// Record one occurrence; returns true if a message should be emitted now.
    pub fn tick(&mut self) -> bool {
        self.seen += 1;
        if self.seen == self.next && self.emitted < self.cap {
            self.next *= 2;
            self.emitted += 1;
            true
        } else {
            false
        }
    }

    pub fn occurrences(&self) -> u64 {
        self.seen
    }
}
