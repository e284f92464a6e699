//! Memory-minimized k-way merge (phase two).
//!
//! Every buffer page hosts one run cursor; outgoing records are assembled in
//! the slots vacated by consumed input records, so the whole merge runs in
//! B pages plus a single scratch record. When the runs outnumber the fan-in,
//! they are merged in groups over multiple passes until one run remains.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::error::Error;
use std::io::prelude::*;

use log;

use crate::buffer::{RecordSlot, SortBuffer};
use crate::config::SortConfig;
use crate::metrics::SortMetrics;
use crate::page::{read_page, PageWriter};
use crate::run::RunMeta;
use crate::sort::SortError;

/// One page-resident cursor over a run.
struct MergeCursor {
    run: RunMeta,
    /// Buffer page region holding the cursor's current page.
    region: usize,
    /// Pages of the run loaded so far.
    pages_loaded: u32,
    /// Records in the current page.
    page_records: usize,
    /// Next unconsumed record index within the current page.
    pos: usize,
    done: bool,
}

impl MergeCursor {
    fn head(&self) -> RecordSlot {
        RecordSlot {
            page: self.region,
            index: self.pos,
        }
    }
}

/// Tracks where outgoing records sit inside drained input space.
///
/// `pending` lists the slots holding not-yet-flushed output records in output
/// order; `free` lists drained slots available for reuse. Both hold slot
/// indexes only, so record storage stays at B pages plus the scratch slot.
#[derive(Default)]
struct OutputTracker {
    pending: VecDeque<RecordSlot>,
    free: Vec<RecordSlot>,
}

/// Merges `runs` down to a single run and returns its metadata.
///
/// Expects at least one run; single-run inputs (including singleton pass
/// groups) pass through without any I/O.
pub(crate) fn merge_runs<S, F, E>(
    config: &SortConfig,
    storage: &mut S,
    buffer: &mut SortBuffer,
    writer: &mut PageWriter,
    mut runs: Vec<RunMeta>,
    compare: &F,
    metrics: &mut SortMetrics,
) -> Result<RunMeta, SortError<E>>
where
    S: Read + Write + Seek,
    F: Fn(&[u8], &[u8]) -> Ordering,
    E: Error,
{
    let fan_in = buffer.page_count();
    if runs.len() > 1 && fan_in < 2 {
        return Err(SortError::InsufficientMemory {
            required: 2 * config.page_size + config.record_size(),
            available: fan_in * config.page_size + config.record_size(),
        });
    }

    let mut pass = 0;
    while runs.len() > 1 {
        pass += 1;
        let mut merged = Vec::with_capacity((runs.len() + fan_in - 1) / fan_in);
        for group in runs.chunks(fan_in) {
            if group.len() == 1 {
                // a leftover run joins the next pass where it lies
                merged.push(group[0]);
            } else {
                merged.push(merge_group(storage, buffer, writer, group, compare, metrics)?);
            }
        }
        log::debug!("merge pass {}: {} runs -> {}", pass, runs.len(), merged.len());
        runs = merged;
    }

    debug_assert_eq!(runs.len(), 1);
    Ok(runs.remove(0))
}

/// Merges one group of runs, one cursor per buffer page, into a new run
/// appended at the writer's current position.
fn merge_group<S, F, E>(
    storage: &mut S,
    buffer: &mut SortBuffer,
    writer: &mut PageWriter,
    group: &[RunMeta],
    compare: &F,
    metrics: &mut SortMetrics,
) -> Result<RunMeta, SortError<E>>
where
    S: Read + Write + Seek,
    F: Fn(&[u8], &[u8]) -> Ordering,
    E: Error,
{
    let capacity = buffer.capacity();

    let mut cursors = Vec::with_capacity(group.len());
    for (region, run) in group.iter().enumerate() {
        let header = read_page(storage, run.first_page, buffer.page_mut(region), metrics)
            .map_err(SortError::Read)?;
        cursors.push(MergeCursor {
            run: *run,
            region,
            pages_loaded: 1,
            page_records: header.record_count as usize,
            pos: 0,
            done: false,
        });
    }

    let mut out = OutputTracker::default();
    let first_page = writer.next_page;
    let mut records_out = 0u64;
    let mut active = cursors.len();

    while active > 0 {
        // pick the least head record; ties keep the earliest run in the group
        let mut min = None;
        for (i, cursor) in cursors.iter().enumerate() {
            if cursor.done {
                continue;
            }
            min = match min {
                None => Some(i),
                Some(best) => {
                    metrics.comparisons += 1;
                    let head = buffer.record(cursor.head());
                    let best_head = buffer.record(cursors[best].head());
                    if compare(head, best_head) == Ordering::Less {
                        Some(i)
                    } else {
                        Some(best)
                    }
                }
            };
        }
        let winner = match min {
            Some(winner) => winner,
            None => break,
        };

        // consume the head through the scratch slot into vacated space
        let src = cursors[winner].head();
        buffer.save_to_scratch(src);
        metrics.copies += 1;
        cursors[winner].pos += 1;

        let dst = out.free.pop().unwrap_or(src);
        if dst != src {
            out.free.push(src);
        }
        buffer.restore_from_scratch(dst);
        metrics.copies += 1;
        out.pending.push_back(dst);
        records_out += 1;

        if out.pending.len() == capacity {
            flush_pending(storage, buffer, writer, &mut out, metrics)?;
        }

        let cursor = &mut cursors[winner];
        if cursor.pos == cursor.page_records {
            if cursor.pages_loaded < cursor.run.pages {
                evacuate_region(storage, buffer, writer, &mut out, cursor.region, metrics)?;
                out.free.retain(|slot| slot.page != cursor.region);
                let header = read_page(
                    storage,
                    cursor.run.first_page + cursor.pages_loaded,
                    buffer.page_mut(cursor.region),
                    metrics,
                )
                .map_err(SortError::Read)?;
                cursor.pages_loaded += 1;
                cursor.page_records = header.record_count as usize;
                cursor.pos = 0;
            } else {
                cursor.done = true;
                active -= 1;
            }
        }
    }

    if !out.pending.is_empty() {
        flush_pending(storage, buffer, writer, &mut out, metrics)?;
    }

    Ok(RunMeta {
        first_page,
        pages: writer.next_page - first_page,
        records: records_out,
    })
}

/// Gather-writes the pending output as one page and frees its slots.
fn flush_pending<S, E>(
    storage: &mut S,
    buffer: &SortBuffer,
    writer: &mut PageWriter,
    out: &mut OutputTracker,
    metrics: &mut SortMetrics,
) -> Result<(), SortError<E>>
where
    S: Write + Seek,
    E: Error,
{
    writer
        .write_gathered(storage, buffer, &out.pending, metrics)
        .map_err(SortError::Write)?;
    while let Some(slot) = out.pending.pop_front() {
        out.free.push(slot);
    }
    Ok(())
}

/// Moves pending output records out of `region` before its page is reloaded.
///
/// If the rest of the buffer cannot take them, the pending output is flushed
/// early as a short page; pages are self-describing, so downstream passes
/// consume short pages anywhere in a run.
fn evacuate_region<S, E>(
    storage: &mut S,
    buffer: &mut SortBuffer,
    writer: &mut PageWriter,
    out: &mut OutputTracker,
    region: usize,
    metrics: &mut SortMetrics,
) -> Result<(), SortError<E>>
where
    S: Write + Seek,
    E: Error,
{
    let stuck = out.pending.iter().filter(|slot| slot.page == region).count();
    if stuck == 0 {
        return Ok(());
    }

    let room = out.free.iter().filter(|slot| slot.page != region).count();
    if room < stuck {
        log::debug!(
            "evacuating region {}: flushing {} pending records early",
            region,
            out.pending.len()
        );
        return flush_pending(storage, buffer, writer, out, metrics);
    }

    let OutputTracker { pending, free } = out;
    for slot in pending.iter_mut() {
        if slot.page != region {
            continue;
        }
        let target = match free.iter().position(|candidate| candidate.page != region) {
            Some(at) => free.swap_remove(at),
            // unreachable: room covers every stuck record
            None => break,
        };
        buffer.copy_record(*slot, target);
        metrics.copies += 1;
        *slot = target;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io;

    use crate::buffer::SortBuffer;
    use crate::config::SortConfig;
    use crate::metrics::SortMetrics;
    use crate::page::{PageHeader, PageWriter};
    use crate::run::generate_runs;
    use crate::source::ReaderSource;

    use super::merge_runs;

    fn config(capacity: usize) -> SortConfig {
        SortConfig {
            key_size: 4,
            value_size: 4,
            page_size: 6 + capacity * 8,
            header_size: 6,
            num_pages: 0,
            last_page_records: 0,
        }
    }

    fn record(key: i32, tag: u8) -> Vec<u8> {
        let mut record = key.to_le_bytes().to_vec();
        record.extend_from_slice(&[tag; 4]);
        record
    }

    fn compare(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a[..4].cmp(&b[..4])
    }

    /// Generates runs with a one-page buffer (one run per page of input),
    /// then merges them with `merge_pages` buffer pages.
    fn generate_and_merge(
        config: &SortConfig,
        records: &[(i32, u8)],
        gen_pages: usize,
        merge_pages: usize,
    ) -> (Vec<(i32, u8)>, SortMetrics, super::RunMeta) {
        let data: Vec<u8> = records.iter().flat_map(|&(key, tag)| record(key, tag)).collect();
        let mut source = ReaderSource::new(io::Cursor::new(data), records.len() as u64);
        let mut storage = io::Cursor::new(Vec::new());
        let mut writer = PageWriter::new(config);
        let mut metrics = SortMetrics::default();

        let mut gen_buffer = SortBuffer::new(config, gen_pages);
        let runs = generate_runs(
            config,
            &mut source,
            &mut storage,
            &mut gen_buffer,
            &mut writer,
            &compare,
            &mut metrics,
        )
        .unwrap();

        let mut merge_buffer = SortBuffer::new(config, merge_pages);
        let run = merge_runs::<_, _, io::Error>(
            config,
            &mut storage,
            &mut merge_buffer,
            &mut writer,
            runs,
            &compare,
            &mut metrics,
        )
        .unwrap();

        let output = storage.into_inner();
        let mut merged = Vec::new();
        let mut page_start = run.first_page as usize * config.page_size;
        while (merged.len() as u64) < run.records {
            let page = &output[page_start..page_start + config.page_size];
            let count = PageHeader::decode(page).record_count as usize;
            for i in 0..count {
                let start = config.header_size + i * config.record_size();
                let key = i32::from_le_bytes(page[start..start + 4].try_into().unwrap());
                merged.push((key, page[start + 4]));
            }
            page_start += config.page_size;
        }
        (merged, metrics, run)
    }

    #[test]
    fn test_two_runs_merge_sorted_with_two_pages() {
        let config = config(4);
        // two single-page runs of four records each
        let records: Vec<(i32, u8)> = vec![
            (1, b'a'), (3, b'a'), (5, b'a'), (7, b'a'),
            (2, b'b'), (4, b'b'), (6, b'b'), (8, b'b'),
        ];

        let (merged, metrics, run) = generate_and_merge(&config, &records, 1, 2);

        let keys: Vec<i32> = merged.iter().map(|&(key, _)| key).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(run.records, 8);
        // each input page read exactly once
        assert_eq!(metrics.reads, 2);
    }

    #[test]
    fn test_ties_go_to_the_earlier_run() {
        let config = config(2);
        let records: Vec<(i32, u8)> = vec![(5, b'a'), (5, b'a'), (5, b'b'), (5, b'b')];

        let (merged, _, _) = generate_and_merge(&config, &records, 1, 2);

        let tags: Vec<u8> = merged.iter().map(|&(_, tag)| tag).collect();
        assert_eq!(tags, vec![b'a', b'a', b'b', b'b']);
    }

    #[test]
    fn test_partial_input_pages_anywhere_in_a_run() {
        let config = config(4);
        // the last of the three runs ends on a partial page
        let records: Vec<(i32, u8)> = (0..11).map(|key| (10 - key, b'x')).collect();

        let (merged, _, run) = generate_and_merge(&config, &records, 1, 2);

        let keys: Vec<i32> = merged.iter().map(|&(key, _)| key).collect();
        assert_eq!(keys, (0..=10).collect::<Vec<i32>>());
        assert_eq!(run.records, 11);
    }

    #[test]
    fn test_more_runs_than_fan_in_takes_multiple_passes() {
        let config = config(4);
        // four single-page runs against a two-page buffer
        let records: Vec<(i32, u8)> = (0..16).map(|key| (((key * 7) % 16) as i32, b'x')).collect();

        let (merged, metrics, run) = generate_and_merge(&config, &records, 1, 2);

        let keys: Vec<i32> = merged.iter().map(|&(key, _)| key).collect();
        assert_eq!(keys, (0..16).collect::<Vec<i32>>());
        assert_eq!(run.records, 16);
        // pass one reads four pages; pass two re-reads the intermediate runs
        assert!(metrics.reads > 4);
    }
}
