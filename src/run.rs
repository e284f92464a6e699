//! Run generation (phase one).

use std::cmp::Ordering;
use std::io::prelude::*;

use log;

use crate::buffer::SortBuffer;
use crate::config::SortConfig;
use crate::metrics::SortMetrics;
use crate::page::PageWriter;
use crate::sort::SortError;
use crate::sorter::sort_region;
use crate::source::RecordSource;

/// A sorted run on storage: consecutive pages whose records are globally
/// non-decreasing across the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMeta {
    /// Page index of the run's first page.
    pub first_page: u32,
    /// Number of consecutive pages.
    pub pages: u32,
    /// Total records in the run.
    pub records: u64,
}

impl RunMeta {
    /// Byte offset of the run's first page.
    pub fn offset(&self, config: &SortConfig) -> u64 {
        self.first_page as u64 * config.page_size as u64
    }
}

/// Fills the buffer from the source, sorts it and pages it out, one run per
/// buffer fill, until the source is exhausted.
pub(crate) fn generate_runs<R, S, F>(
    config: &SortConfig,
    source: &mut R,
    storage: &mut S,
    buffer: &mut SortBuffer,
    writer: &mut PageWriter,
    compare: &F,
    metrics: &mut SortMetrics,
) -> Result<Vec<RunMeta>, SortError<R::Error>>
where
    R: RecordSource,
    S: Write + Seek,
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    let capacity = buffer.capacity();
    let mut runs = Vec::new();

    loop {
        let mut filled = 0;
        let mut exhausted = false;
        while filled < buffer.record_capacity() {
            let slot = buffer.slot_of(filled);
            match source.pull(buffer.record_mut(slot)) {
                Ok(true) => filled += 1,
                Ok(false) => {
                    exhausted = true;
                    break;
                }
                Err(err) => return Err(SortError::Source(err)),
            }
        }

        if filled > 0 {
            sort_region(buffer, filled, compare, metrics);

            let first_page = writer.next_page;
            let mut remaining = filled;
            let mut region = 0;
            while remaining > 0 {
                let count = remaining.min(capacity);
                writer
                    .write_image(storage, buffer.page_mut(region), count as u16, metrics)
                    .map_err(SortError::Write)?;
                remaining -= count;
                region += 1;
            }

            let run = RunMeta {
                first_page,
                pages: writer.next_page - first_page,
                records: filled as u64,
            };
            log::debug!(
                "run {} generated: {} records over {} pages starting at page {}",
                runs.len(),
                run.records,
                run.pages,
                run.first_page
            );
            runs.push(run);
            metrics.runs += 1;
        }

        if exhausted {
            return Ok(runs);
        }
    }
}
