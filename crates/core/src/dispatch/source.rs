//! Local record sources.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::delivery::Record;

/// Errors raised while reading records.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read record {index} from {origin}: {source}")]
    Read {
        origin: String,
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// Lazily produced records, in source order.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Record, SourceError>> + Send + 'a>;

/// A finite, ordered, re-readable sequence of records.
pub trait RecordSource: Send + Sync {
    /// Human-readable origin (for logging).
    fn describe(&self) -> String;

    /// Start a fresh pass over the records.
    fn open(&self) -> Result<RecordIter<'_>, SourceError>;
}

/// Reads a file one line per record.
///
/// Each record keeps its trailing newline so the sink receives
/// line-delimited data. A last line without a newline is still a record.
#[derive(Debug, Clone)]
pub struct LineFileSource {
    path: PathBuf,
}

impl LineFileSource {
    /// Source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for LineFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> Result<RecordIter<'_>, SourceError> {
        let file = File::open(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(Box::new(Lines {
            reader: BufReader::new(file),
            origin: self.describe(),
            index: 0,
            done: false,
        }))
    }
}

struct Lines<R> {
    reader: R,
    origin: String,
    index: usize,
    done: bool,
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.index += 1;
                Some(Ok(Record::new(buf)))
            }
            Err(source) => {
                self.done = true;
                Some(Err(SourceError::Read {
                    origin: self.origin.clone(),
                    index: self.index,
                    source,
                }))
            }
        }
    }
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    /// Source over `records`.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Record> for MemorySource {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl RecordSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} records)", self.records.len())
    }

    fn open(&self) -> Result<RecordIter<'_>, SourceError> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}
