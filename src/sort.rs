//! External sorter.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;
use std::time::Instant;

use log;

use crate::buffer::SortBuffer;
use crate::config::SortConfig;
use crate::merge::merge_runs;
use crate::metrics::SortMetrics;
use crate::page::PageWriter;
use crate::run::generate_runs;
use crate::source::RecordSource;

/// Sorting error.
///
/// The first failure anywhere in generation or merge aborts the whole call;
/// there is no internal retry. Metrics accumulated up to the failure point
/// remain valid, partially written output is the caller's to discard.
#[derive(Debug)]
pub enum SortError<E: Error> {
    /// The buffer cannot hold what the requested operation needs.
    InsufficientMemory { required: usize, available: usize },
    /// Record source failure.
    Source(E),
    /// Run page read failure.
    Read(io::Error),
    /// Page write failure.
    Write(io::Error),
}

impl<E> Error for SortError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::InsufficientMemory { .. } => None,
            SortError::Source(err) => Some(err),
            SortError::Read(err) => Some(err),
            SortError::Write(err) => Some(err),
        }
    }
}

impl<E: Error> Display for SortError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InsufficientMemory { required, available } => write!(
                f,
                "buffer too small: {} bytes available, {} required",
                available, required
            ),
            SortError::Source(err) => write!(f, "record source failed: {}", err),
            SortError::Read(err) => write!(f, "run page read failed: {}", err),
            SortError::Write(err) => write!(f, "page write failed: {}", err),
        }
    }
}

/// Two-phase external merge sorter.
///
/// Phase one pulls records from a [`RecordSource`] into the caller's
/// [`SortBuffer`], sorts them with the injected comparator and emits sorted
/// runs of consecutive pages onto the storage handle. Phase two merges the
/// runs, pass by pass, down to a single run whose starting byte offset is
/// returned. Execution is single-threaded and every storage operation is a
/// blocking call; buffer and storage belong exclusively to the invocation.
pub struct ExternalSorter {
    config: SortConfig,
}

impl ExternalSorter {
    /// Creates a sorter for one configuration.
    pub fn new(config: SortConfig) -> Self {
        ExternalSorter { config }
    }

    /// The sorter's configuration.
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sorts every record of `source` onto `storage` and returns the byte
    /// offset of the final sorted run (0 for an empty source).
    ///
    /// # Arguments
    /// * `source` - Record input, driven until exhaustion
    /// * `storage` - Page-granular scratch and output storage
    /// * `buffer` - Working memory, at least one page; merging uses up to
    ///   `page_count` runs per merge group
    /// * `metrics` - Cost accumulator, usually zeroed by the caller
    /// * `compare` - Strict-weak-ordering comparator over raw records
    pub fn sort<R, S, F>(
        &self,
        source: &mut R,
        storage: &mut S,
        buffer: &mut SortBuffer,
        metrics: &mut SortMetrics,
        compare: F,
    ) -> Result<u64, SortError<R::Error>>
    where
        R: RecordSource,
        S: Read + Write + Seek,
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        self.invoke(source, storage, buffer, metrics, compare, false)
    }

    /// Runs phase one only and returns the byte offset of the last generated
    /// run, performing no merge I/O. Useful for separating generation cost
    /// from merge cost in measurements.
    pub fn generate_runs<R, S, F>(
        &self,
        source: &mut R,
        storage: &mut S,
        buffer: &mut SortBuffer,
        metrics: &mut SortMetrics,
        compare: F,
    ) -> Result<u64, SortError<R::Error>>
    where
        R: RecordSource,
        S: Read + Write + Seek,
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        self.invoke(source, storage, buffer, metrics, compare, true)
    }

    fn invoke<R, S, F>(
        &self,
        source: &mut R,
        storage: &mut S,
        buffer: &mut SortBuffer,
        metrics: &mut SortMetrics,
        compare: F,
        generation_only: bool,
    ) -> Result<u64, SortError<R::Error>>
    where
        R: RecordSource,
        S: Read + Write + Seek,
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        if buffer.page_count() == 0 || buffer.capacity() == 0 {
            return Err(SortError::InsufficientMemory {
                required: self.config.page_size + self.config.record_size(),
                available: buffer.page_count() * self.config.page_size,
            });
        }

        let start = Instant::now();
        let mut writer = PageWriter::new(&self.config);

        let runs = generate_runs(
            &self.config,
            source,
            storage,
            buffer,
            &mut writer,
            &compare,
            metrics,
        )?;
        metrics.run_generation_elapsed = start.elapsed();
        log::debug!(
            "run generation done: {} runs over {} pages",
            runs.len(),
            writer.next_page
        );

        let offset = if generation_only || runs.len() <= 1 {
            runs.last().map(|run| run.offset(&self.config)).unwrap_or(0)
        } else {
            let final_run = merge_runs(
                &self.config,
                storage,
                buffer,
                &mut writer,
                runs,
                &compare,
                metrics,
            )?;
            final_run.offset(&self.config)
        };

        storage.flush().map_err(SortError::Write)?;
        metrics.elapsed = start.elapsed();
        log::debug!("external sort done: final run at byte offset {}", offset);
        Ok(offset)
    }
}
