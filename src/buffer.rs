//! Working-memory arena.

use crate::config::SortConfig;

/// Position of a record slot inside the buffer: a page region and a record
/// index within that region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSlot {
    pub page: usize,
    pub index: usize,
}

/// Caller-owned working memory for one sort invocation.
///
/// One contiguous allocation of `pages * page_size` bytes plus a single
/// record-sized scratch slot. Page regions are laid out as on-storage page
/// images (records start past the header), so a filled region can be written
/// out without reassembly. All addressing goes through explicit page and
/// record indexes; there is no pointer carving.
pub struct SortBuffer {
    arena: Vec<u8>,
    pages: usize,
    page_size: usize,
    header_size: usize,
    record_size: usize,
    capacity: usize,
}

impl SortBuffer {
    /// Allocates a zeroed buffer of `pages` page regions plus the scratch slot.
    pub fn new(config: &SortConfig, pages: usize) -> Self {
        SortBuffer {
            arena: vec![0; pages * config.page_size + config.record_size()],
            pages,
            page_size: config.page_size,
            header_size: config.header_size,
            record_size: config.record_size(),
            capacity: config.page_capacity(),
        }
    }

    /// Number of page regions.
    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// Records per page region.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records the buffer can hold across all page regions.
    pub fn record_capacity(&self) -> usize {
        self.pages * self.capacity
    }

    /// Maps a logical record index (page-major fill order) to its slot.
    pub fn slot_of(&self, logical: usize) -> RecordSlot {
        RecordSlot {
            page: logical / self.capacity,
            index: logical % self.capacity,
        }
    }

    /// A whole page region.
    pub fn page(&self, page: usize) -> &[u8] {
        let start = page * self.page_size;
        &self.arena[start..start + self.page_size]
    }

    /// A whole page region, mutably.
    pub fn page_mut(&mut self, page: usize) -> &mut [u8] {
        let start = page * self.page_size;
        &mut self.arena[start..start + self.page_size]
    }

    fn record_offset(&self, slot: RecordSlot) -> usize {
        slot.page * self.page_size + self.header_size + slot.index * self.record_size
    }

    /// The record stored at `slot`.
    pub fn record(&self, slot: RecordSlot) -> &[u8] {
        let start = self.record_offset(slot);
        &self.arena[start..start + self.record_size]
    }

    /// The record stored at `slot`, mutably.
    pub fn record_mut(&mut self, slot: RecordSlot) -> &mut [u8] {
        let start = self.record_offset(slot);
        &mut self.arena[start..start + self.record_size]
    }

    fn scratch_offset(&self) -> usize {
        self.pages * self.page_size
    }

    /// The scratch ("tuple") slot.
    pub fn scratch(&self) -> &[u8] {
        let start = self.scratch_offset();
        &self.arena[start..start + self.record_size]
    }

    /// Copies the record at `slot` into the scratch slot.
    pub fn save_to_scratch(&mut self, slot: RecordSlot) {
        let src = self.record_offset(slot);
        let dst = self.scratch_offset();
        self.arena.copy_within(src..src + self.record_size, dst);
    }

    /// Copies the scratch slot into the record at `slot`.
    pub fn restore_from_scratch(&mut self, slot: RecordSlot) {
        let src = self.scratch_offset();
        let dst = self.record_offset(slot);
        self.arena.copy_within(src..src + self.record_size, dst);
    }

    /// Copies one record slot to another.
    pub fn copy_record(&mut self, src: RecordSlot, dst: RecordSlot) {
        let src = self.record_offset(src);
        let dst = self.record_offset(dst);
        self.arena.copy_within(src..src + self.record_size, dst);
    }
}

#[cfg(test)]
mod test {
    use crate::config::SortConfig;

    use super::{RecordSlot, SortBuffer};

    fn config() -> SortConfig {
        SortConfig {
            key_size: 4,
            value_size: 4,
            page_size: 38,
            header_size: 6,
            num_pages: 2,
            last_page_records: 4,
        }
    }

    #[test]
    fn test_layout() {
        let buffer = SortBuffer::new(&config(), 2);

        assert_eq!(buffer.page_count(), 2);
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.record_capacity(), 8);
        assert_eq!(buffer.slot_of(0), RecordSlot { page: 0, index: 0 });
        assert_eq!(buffer.slot_of(5), RecordSlot { page: 1, index: 1 });
    }

    #[test]
    fn test_records_are_disjoint() {
        let mut buffer = SortBuffer::new(&config(), 2);

        buffer.record_mut(RecordSlot { page: 0, index: 0 }).fill(1);
        buffer.record_mut(RecordSlot { page: 1, index: 3 }).fill(2);

        assert_eq!(buffer.record(RecordSlot { page: 0, index: 0 }), &[1u8; 8]);
        assert_eq!(buffer.record(RecordSlot { page: 0, index: 1 }), &[0u8; 8]);
        assert_eq!(buffer.record(RecordSlot { page: 1, index: 3 }), &[2u8; 8]);
        // headers are untouched by record writes
        assert_eq!(&buffer.page(0)[..6], &[0u8; 6]);
    }

    #[test]
    fn test_scratch_round_trip() {
        let mut buffer = SortBuffer::new(&config(), 2);
        let a = RecordSlot { page: 0, index: 0 };
        let b = RecordSlot { page: 1, index: 2 };

        buffer.record_mut(a).fill(7);
        buffer.save_to_scratch(a);
        assert_eq!(buffer.scratch(), &[7u8; 8]);

        buffer.restore_from_scratch(b);
        assert_eq!(buffer.record(b), &[7u8; 8]);

        buffer.record_mut(a).fill(9);
        buffer.copy_record(a, b);
        assert_eq!(buffer.record(b), &[9u8; 8]);
    }
}
