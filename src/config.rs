//! Sort configuration.

use serde::{Deserialize, Serialize};

/// Immutable per-invocation sort configuration.
///
/// Describes the record layout, the on-storage page geometry and the shape of
/// the input dataset. The comparator and the record source are injected
/// separately by the caller, so the configuration stays plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    /// Size of the comparable key prefix of a record in bytes.
    pub key_size: usize,
    /// Size of the uninterpreted value suffix of a record in bytes.
    pub value_size: usize,
    /// Size of an on-storage page in bytes.
    pub page_size: usize,
    /// Size of the page header in bytes (block id and record count live in
    /// its first six bytes).
    pub header_size: usize,
    /// Number of pages the input dataset occupies.
    pub num_pages: u32,
    /// Number of records on the input's final page.
    pub last_page_records: u16,
}

impl SortConfig {
    /// Record size in bytes: key prefix plus value suffix.
    pub fn record_size(&self) -> usize {
        self.key_size + self.value_size
    }

    /// Number of records a page can hold.
    pub fn page_capacity(&self) -> usize {
        (self.page_size - self.header_size) / self.record_size()
    }

    /// Total number of records in the input dataset.
    pub fn total_records(&self) -> u64 {
        if self.num_pages == 0 {
            0
        } else {
            (self.num_pages as u64 - 1) * self.page_capacity() as u64 + self.last_page_records as u64
        }
    }

    /// The comparable key prefix of a record.
    pub fn key_of<'a>(&self, record: &'a [u8]) -> &'a [u8] {
        &record[..self.key_size]
    }
}
