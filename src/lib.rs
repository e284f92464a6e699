//! `emsort` is an external merge sort engine for embedded record stores.
//!
//! External sorting is required when the records being sorted do not fit into
//! the main memory of the device and instead reside in slower page-granular
//! storage. Sorting is achieved in two phases. Phase one fills the working
//! buffer from the record source, sorts it in place and writes it out as a
//! sorted run; phase two merges the runs, pass by pass, down to a single run.
//! For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `emsort` supports the following features:
//!
//! * **Record agnostic:**
//!   records are opaque fixed-size byte strings ordered by a caller-supplied
//!   comparator; the engine never interprets keys or values itself.
//! * **Bounded memory:**
//!   the whole sort runs inside a caller-owned buffer of `B` page regions
//!   plus one record-sized scratch slot. The merge phase allocates no output
//!   buffer: merged records are assembled in the slots its inputs vacate.
//! * **Storage agnostic:**
//!   any `Read + Write + Seek` handle serves as run storage, from an
//!   in-memory cursor in tests to a raw device file.
//! * **Cost accounting:**
//!   page reads and writes, record copies and comparator invocations are
//!   tallied into a [`SortMetrics`], so buffer-size trade-offs can be
//!   measured rather than guessed.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//!
//! use emsort::{ExternalSorter, ReaderSource, SortBuffer, SortConfig, SortMetrics};
//!
//! fn main() {
//!     let config = SortConfig {
//!         key_size: 4,
//!         value_size: 12,
//!         page_size: 512,
//!         header_size: 6,
//!         num_pages: 100,
//!         last_page_records: 31,
//!     };
//!
//!     let input = io::BufReader::new(fs::File::open("records.dat").unwrap());
//!     let mut source = ReaderSource::from_config(input, &config);
//!     let mut storage = fs::OpenOptions::new()
//!         .read(true)
//!         .write(true)
//!         .create(true)
//!         .open("scratch.dat")
//!         .unwrap();
//!
//!     let mut buffer = SortBuffer::new(&config, 4);
//!     let mut metrics = SortMetrics::default();
//!
//!     let sorter = ExternalSorter::new(config);
//!     let offset = sorter
//!         .sort(&mut source, &mut storage, &mut buffer, &mut metrics, |a, b| {
//!             a[..4].cmp(&b[..4])
//!         })
//!         .unwrap();
//!
//!     println!("sorted run starts at byte {}, {} page I/Os", offset, metrics.io_total());
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod metrics;
pub mod page;
pub mod run;
pub mod sort;
pub mod source;
pub mod sorter;

mod merge;

pub use buffer::{RecordSlot, SortBuffer};
pub use config::SortConfig;
pub use metrics::SortMetrics;
pub use page::PageHeader;
pub use run::RunMeta;
pub use sort::{ExternalSorter, SortError};
pub use sorter::sort_region;
pub use source::{ReaderSource, RecordSource};
