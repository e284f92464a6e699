//! In-memory region sort.

use std::cmp::Ordering;

use crate::buffer::SortBuffer;
use crate::metrics::SortMetrics;

/// Sorts the first `len` buffered records ascending by `compare`, in place.
///
/// Records are addressed in logical fill order across page regions. The
/// comparator must be a strict weak ordering; equal records may end up in any
/// order. Every comparator invocation and every record relocation is counted
/// into `metrics`.
pub fn sort_region<F>(buffer: &mut SortBuffer, len: usize, compare: &F, metrics: &mut SortMetrics)
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    let mut order: Vec<u32> = (0..len as u32).collect();
    {
        let buffer = &*buffer;
        order.sort_unstable_by(|&a, &b| {
            metrics.comparisons += 1;
            compare(
                buffer.record(buffer.slot_of(a as usize)),
                buffer.record(buffer.slot_of(b as usize)),
            )
        });
    }

    // Apply the permutation cycle by cycle through the scratch slot, so each
    // record moves at most once plus the scratch save/restore.
    for start in 0..len {
        if order[start] as usize == start {
            continue;
        }

        let slot = buffer.slot_of(start);
        buffer.save_to_scratch(slot);
        metrics.copies += 1;

        let mut hole = start;
        loop {
            let src = order[hole] as usize;
            order[hole] = hole as u32;
            let dst = buffer.slot_of(hole);
            if src == start {
                buffer.restore_from_scratch(dst);
                metrics.copies += 1;
                break;
            }
            let src_slot = buffer.slot_of(src);
            buffer.copy_record(src_slot, dst);
            metrics.copies += 1;
            hole = src;
        }
    }
}
