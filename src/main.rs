use std::fs;
use std::io;
use std::io::prelude::*;
use std::process;

use clap::ArgEnum;
use env_logger;
use log;
use rand::prelude::*;

use emsort::{ExternalSorter, PageHeader, ReaderSource, SortBuffer, SortConfig, SortMetrics};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let records: u64 = arg_parser.value_of_t_or_exit("records");
    let pages: usize = arg_parser.value_of_t_or_exit("buffer_pages");
    let key_size: usize = arg_parser.value_of_t_or_exit("key_size");
    let value_size: usize = arg_parser.value_of_t_or_exit("value_size");
    let page_size: usize = arg_parser.value_of_t_or_exit("page_size");
    let seed: u64 = arg_parser.value_of_t_or_exit("seed");
    let generation_only = arg_parser.is_present("gen_only");

    let config = match build_config(records, key_size, value_size, page_size) {
        Ok(config) => config,
        Err(err) => {
            log::error!("invalid geometry: {}", err);
            process::exit(1);
        }
    };

    let input = match generate_input(&config, records, seed) {
        Ok(file) => file,
        Err(err) => {
            log::error!("input data generation error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let mut storage = match fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
    {
        Ok(file) => file,
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let mut source = ReaderSource::from_config(io::BufReader::new(input), &config);
    let mut buffer = SortBuffer::new(&config, pages);
    let mut metrics = SortMetrics::default();

    let sorter = ExternalSorter::new(config.clone());
    let compare = move |a: &[u8], b: &[u8]| a[..key_size].cmp(&b[..key_size]);
    let result = if generation_only {
        sorter.generate_runs(&mut source, &mut storage, &mut buffer, &mut metrics, compare)
    } else {
        sorter.sort(&mut source, &mut storage, &mut buffer, &mut metrics, compare)
    };

    let offset = match result {
        Ok(offset) => offset,
        Err(err) => {
            log::error!("sorting error: {}", err);
            process::exit(1);
        }
    };

    if !generation_only {
        if let Err(err) = verify_output(&mut storage, offset, &config) {
            log::error!("output verification error: {}", err);
            process::exit(1);
        }
        log::info!("output verified: {} records in order", records);
    }

    println!("final run offset:  {}", offset);
    println!("runs generated:    {}", metrics.runs);
    println!("page reads:        {}", metrics.reads);
    println!("page writes:       {}", metrics.writes);
    println!("record copies:     {}", metrics.copies);
    println!("comparisons:       {}", metrics.comparisons);
    println!("generation time:   {:?}", metrics.run_generation_elapsed);
    println!("total time:        {:?}", metrics.elapsed);
}

fn build_config(
    records: u64,
    key_size: usize,
    value_size: usize,
    page_size: usize,
) -> Result<SortConfig, String> {
    let mut config = SortConfig {
        key_size,
        value_size,
        page_size,
        header_size: 6,
        num_pages: 0,
        last_page_records: 0,
    };

    let capacity = config.page_capacity() as u64;
    if capacity == 0 {
        return Err(format!(
            "page size {} cannot fit a {}-byte record past the header",
            page_size,
            config.record_size()
        ));
    }

    config.num_pages = ((records + capacity - 1) / capacity) as u32;
    config.last_page_records = match records % capacity {
        0 if records > 0 => capacity as u16,
        tail => tail as u16,
    };
    Ok(config)
}

/// Writes `records` random records (uniform little-endian integer key, zeroed
/// value) to an unlinked temporary file and rewinds it.
fn generate_input(config: &SortConfig, records: u64, seed: u64) -> io::Result<fs::File> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut file = tempfile::tempfile()?;
    let mut writer = io::BufWriter::new(file);

    let mut record = vec![0u8; config.record_size()];
    for _ in 0..records {
        let key: u32 = rng.gen();
        let key_bytes = key.to_le_bytes();
        let used = config.key_size.min(key_bytes.len());
        record[..used].copy_from_slice(&key_bytes[..used]);
        writer.write_all(&record)?;
    }

    file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.rewind()?;
    Ok(file)
}

/// Walks the final run page by page and checks record count and ordering.
fn verify_output(storage: &mut fs::File, offset: u64, config: &SortConfig) -> io::Result<()> {
    storage.seek(io::SeekFrom::Start(offset))?;

    let total = config.total_records();
    let mut page = vec![0u8; config.page_size];
    let mut previous: Option<Vec<u8>> = None;
    let mut seen = 0u64;

    while seen < total {
        storage.read_exact(&mut page)?;
        let header = PageHeader::decode(&page);
        for index in 0..header.record_count as usize {
            let start = config.header_size + index * config.record_size();
            let key = &page[start..start + config.key_size];
            if let Some(previous) = &previous {
                if previous.as_slice() > key {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("record {} out of order", seen),
                    ));
                }
            }
            previous = Some(key.to_vec());
            seen += 1;
        }
    }
    Ok(())
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("emsort")
        .about("external merge sort benchmark driver")
        .arg(
            clap::Arg::new("records")
                .short('n')
                .long("records")
                .help("number of random records to generate and sort")
                .required(true)
                .takes_value(true)
                .validator(validate::<u64>),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("run storage file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("buffer_pages")
                .short('b')
                .long("buffer-pages")
                .help("working buffer size in pages")
                .takes_value(true)
                .default_value("4")
                .validator(validate::<usize>),
        )
        .arg(
            clap::Arg::new("key_size")
                .short('k')
                .long("key-size")
                .help("record key size in bytes")
                .takes_value(true)
                .default_value("4")
                .validator(validate::<usize>),
        )
        .arg(
            clap::Arg::new("value_size")
                .short('v')
                .long("value-size")
                .help("record value size in bytes")
                .takes_value(true)
                .default_value("12")
                .validator(validate::<usize>),
        )
        .arg(
            clap::Arg::new("page_size")
                .short('p')
                .long("page-size")
                .help("storage page size in bytes")
                .takes_value(true)
                .default_value("512")
                .validator(validate::<usize>),
        )
        .arg(
            clap::Arg::new("gen_only")
                .short('g')
                .long("gen-only")
                .help("stop after run generation, skipping the merge phase")
                .takes_value(false),
        )
        .arg(
            clap::Arg::new("seed")
                .long("seed")
                .help("random generator seed")
                .takes_value(true)
                .default_value("0")
                .validator(validate::<u64>),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn validate<T: std::str::FromStr>(value: &str) -> Result<(), String>
where
    T::Err: std::fmt::Display,
{
    match value.parse::<T>() {
        Ok(_) => Ok(()),
        Err(err) => Err(format!("value format incorrect: {}", err)),
    }
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
