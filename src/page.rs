//! On-storage page codec and page I/O.

use std::collections::VecDeque;
use std::io;
use std::io::prelude::*;

use crate::buffer::{RecordSlot, SortBuffer};
use crate::config::SortConfig;
use crate::metrics::SortMetrics;

/// Byte offset of the block id within a page header.
pub const BLOCK_ID_OFFSET: usize = 0;
/// Byte offset of the record count within a page header.
pub const BLOCK_COUNT_OFFSET: usize = 4;
/// Smallest header able to hold the id and count fields.
pub const MIN_HEADER_SIZE: usize = 6;

/// Decoded page header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Monotonically increasing block identifier.
    pub block_id: u32,
    /// Number of records packed into the page.
    pub record_count: u16,
}

impl PageHeader {
    /// Encodes the header fields into the leading bytes of a page.
    pub fn encode(&self, page: &mut [u8]) {
        page[BLOCK_ID_OFFSET..BLOCK_ID_OFFSET + 4].copy_from_slice(&self.block_id.to_le_bytes());
        page[BLOCK_COUNT_OFFSET..BLOCK_COUNT_OFFSET + 2].copy_from_slice(&self.record_count.to_le_bytes());
    }

    /// Decodes the header fields from the leading bytes of a page.
    pub fn decode(page: &[u8]) -> Self {
        let mut id = [0u8; 4];
        id.copy_from_slice(&page[BLOCK_ID_OFFSET..BLOCK_ID_OFFSET + 4]);
        let mut count = [0u8; 2];
        count.copy_from_slice(&page[BLOCK_COUNT_OFFSET..BLOCK_COUNT_OFFSET + 2]);

        PageHeader {
            block_id: u32::from_le_bytes(id),
            record_count: u16::from_le_bytes(count),
        }
    }
}

/// Sequential page writer shared by run generation and merging.
///
/// Pages are appended at increasing page indexes with a single monotonically
/// increasing block id sequence across both phases. Every written page
/// occupies exactly `page_size` bytes.
pub(crate) struct PageWriter {
    page_size: usize,
    header_size: usize,
    record_size: usize,
    header: Vec<u8>,
    /// Page index the next write lands on.
    pub next_page: u32,
    next_block_id: u32,
}

impl PageWriter {
    pub fn new(config: &SortConfig) -> Self {
        PageWriter {
            page_size: config.page_size,
            header_size: config.header_size,
            record_size: config.record_size(),
            header: vec![0; config.header_size],
            next_page: 0,
            next_block_id: 0,
        }
    }

    /// Writes a fully assembled page region from the buffer.
    ///
    /// The header is encoded in place; bytes past the last record are
    /// whatever the region holds (the tail is not semantically defined).
    pub fn write_image<S>(
        &mut self,
        storage: &mut S,
        page: &mut [u8],
        record_count: u16,
        metrics: &mut SortMetrics,
    ) -> io::Result<()>
    where
        S: Write + Seek,
    {
        PageHeader {
            block_id: self.next_block_id,
            record_count,
        }
        .encode(page);

        storage.seek(io::SeekFrom::Start(self.next_page as u64 * self.page_size as u64))?;
        storage.write_all(page)?;

        self.next_page += 1;
        self.next_block_id += 1;
        metrics.writes += 1;
        Ok(())
    }

    /// Writes a page by gathering records from scattered buffer slots in
    /// output order, zero-padding the tail to `page_size`.
    pub fn write_gathered<S>(
        &mut self,
        storage: &mut S,
        buffer: &SortBuffer,
        slots: &VecDeque<RecordSlot>,
        metrics: &mut SortMetrics,
    ) -> io::Result<()>
    where
        S: Write + Seek,
    {
        PageHeader {
            block_id: self.next_block_id,
            record_count: slots.len() as u16,
        }
        .encode(&mut self.header);

        storage.seek(io::SeekFrom::Start(self.next_page as u64 * self.page_size as u64))?;
        storage.write_all(&self.header)?;
        for &slot in slots {
            storage.write_all(buffer.record(slot))?;
        }

        const PAD: [u8; 64] = [0; 64];
        let mut remaining = self.page_size - self.header_size - slots.len() * self.record_size;
        while remaining > 0 {
            let chunk = remaining.min(PAD.len());
            storage.write_all(&PAD[..chunk])?;
            remaining -= chunk;
        }

        self.next_page += 1;
        self.next_block_id += 1;
        metrics.writes += 1;
        Ok(())
    }
}

/// Reads the page at `page_index` into a buffer region and decodes its header.
pub(crate) fn read_page<S>(
    storage: &mut S,
    page_index: u32,
    page: &mut [u8],
    metrics: &mut SortMetrics,
) -> io::Result<PageHeader>
where
    S: Read + Seek,
{
    let page_size = page.len();
    storage.seek(io::SeekFrom::Start(page_index as u64 * page_size as u64))?;
    storage.read_exact(page)?;
    metrics.reads += 1;
    Ok(PageHeader::decode(page))
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::io;

    use crate::buffer::{RecordSlot, SortBuffer};
    use crate::config::SortConfig;
    use crate::metrics::SortMetrics;

    use super::{read_page, PageHeader, PageWriter};

    fn config() -> SortConfig {
        SortConfig {
            key_size: 4,
            value_size: 4,
            page_size: 38,
            header_size: 6,
            num_pages: 1,
            last_page_records: 4,
        }
    }

    #[test]
    fn test_header_codec() {
        let mut page = [0u8; 38];
        let header = PageHeader {
            block_id: 0x0102_0304,
            record_count: 3,
        };
        header.encode(&mut page);

        assert_eq!(&page[..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&page[4..6], &[3, 0]);
        assert_eq!(PageHeader::decode(&page), header);
    }

    #[test]
    fn test_write_image_appends_pages() {
        let config = config();
        let mut buffer = SortBuffer::new(&config, 1);
        let mut storage = io::Cursor::new(Vec::new());
        let mut metrics = SortMetrics::default();
        let mut writer = PageWriter::new(&config);

        for _ in 0..2 {
            writer
                .write_image(&mut storage, buffer.page_mut(0), 4, &mut metrics)
                .unwrap();
        }

        assert_eq!(storage.get_ref().len(), 2 * config.page_size);
        assert_eq!(metrics.writes, 2);

        let mut page = vec![0; config.page_size];
        let first = read_page(&mut storage, 0, &mut page, &mut metrics).unwrap();
        let second = read_page(&mut storage, 1, &mut page, &mut metrics).unwrap();
        assert_eq!((first.block_id, second.block_id), (0, 1));
        assert_eq!(metrics.reads, 2);
    }

    #[test]
    fn test_write_gathered_partial_page() {
        let config = config();
        let mut buffer = SortBuffer::new(&config, 1);
        let slots: Vec<RecordSlot> = (0..3).map(|i| RecordSlot { page: 0, index: i }).collect();
        for (i, &slot) in slots.iter().enumerate() {
            buffer.record_mut(slot).fill(i as u8 + 1);
        }

        let mut storage = io::Cursor::new(Vec::new());
        let mut metrics = SortMetrics::default();
        let mut writer = PageWriter::new(&config);
        let pending: VecDeque<RecordSlot> = slots.into_iter().collect();
        writer
            .write_gathered(&mut storage, &buffer, &pending, &mut metrics)
            .unwrap();

        let written = storage.get_ref();
        assert_eq!(written.len(), config.page_size);
        assert_eq!(PageHeader::decode(written).record_count, 3);
        assert_eq!(&written[6..14], &[1u8; 8]);
        assert_eq!(&written[14..22], &[2u8; 8]);
        // unused tail is zero-padded
        assert_eq!(&written[30..], &[0u8; 8]);
    }
}
