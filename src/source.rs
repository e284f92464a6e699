//! Pull-based record input.

use std::error::Error;
use std::io;
use std::io::prelude::*;

use crate::config::SortConfig;

/// Pull-based provider of fixed-size raw records.
///
/// The engine hands in a slot of exactly `record_size` bytes; the source
/// either fills it completely and returns `true`, or returns `false` once
/// exhausted. The engine never rewinds and never pulls again after
/// exhaustion. State ownership, underlying file access and error translation
/// belong to the implementor.
pub trait RecordSource {
    type Error: Error;

    /// Fills `slot` with the next record, or signals exhaustion.
    fn pull(&mut self, slot: &mut [u8]) -> Result<bool, Self::Error>;
}

/// Record source over any [`io::Read`] stream of densely packed records.
pub struct ReaderSource<R> {
    reader: R,
    remaining: u64,
}

impl<R> ReaderSource<R> {
    /// Creates a source delivering at most `total_records` records.
    pub fn new(reader: R, total_records: u64) -> Self {
        ReaderSource {
            reader,
            remaining: total_records,
        }
    }

    /// Creates a source bounded by the dataset shape in the configuration.
    pub fn from_config(reader: R, config: &SortConfig) -> Self {
        Self::new(reader, config.total_records())
    }
}

impl<R: Read> RecordSource for ReaderSource<R> {
    type Error = io::Error;

    fn pull(&mut self, slot: &mut [u8]) -> Result<bool, Self::Error> {
        if self.remaining == 0 {
            return Ok(false);
        }

        self.reader.read_exact(slot)?;
        self.remaining -= 1;
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::{ReaderSource, RecordSource};

    #[test]
    fn test_pulls_until_budget_exhausted() {
        let data: Vec<u8> = (0..16).collect();
        let mut source = ReaderSource::new(io::Cursor::new(data), 3);
        let mut slot = [0u8; 4];

        for expected in [[0, 1, 2, 3], [4, 5, 6, 7], [8, 9, 10, 11]] {
            assert!(source.pull(&mut slot).unwrap());
            assert_eq!(slot, expected);
        }
        assert!(!source.pull(&mut slot).unwrap());
        assert!(!source.pull(&mut slot).unwrap());
    }

    #[test]
    fn test_short_stream_is_an_error() {
        let mut source = ReaderSource::new(io::Cursor::new(vec![0u8; 2]), 1);
        let mut slot = [0u8; 4];

        assert!(source.pull(&mut slot).is_err());
    }
}
