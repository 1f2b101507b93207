use std::fs;
use std::io;
use std::path;
use std::process;
use std::time::Duration;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use net_sort::buffer::records_limit;
use net_sort::{RetryPolicy, SortNodeBuilder, Topology};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let server_id: usize = arg_parser.value_of_t_or_exit("server_id");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let retry_limit: Option<usize> = arg_parser
        .is_present("retry_limit")
        .then(|| arg_parser.value_of_t_or_exit("retry_limit"));
    let retry_delay: u64 = arg_parser.value_of_t_or_exit("retry_delay");
    let startup_delay: u64 = arg_parser.value_of_t_or_exit("startup_delay");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let chunk_size: Option<&str> = arg_parser.value_of("chunk_size");

    let config = arg_parser.value_of("config").expect("value is required");
    let topology = match Topology::load(path::Path::new(config)) {
        Ok(topology) => topology,
        Err(err) => {
            log::error!("topology loading error: {}", err);
            process::exit(1);
        }
    };

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = match fs::File::open(input) {
        Ok(file) => io::BufReader::new(file),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let output_stream = match fs::File::create(output) {
        Ok(file) => file,
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let mut node_builder = SortNodeBuilder::new()
        .with_retry_policy(RetryPolicy::new(Duration::from_millis(retry_delay), retry_limit))
        .with_startup_delay(Duration::from_millis(startup_delay))
        .with_eager_connect(arg_parser.is_present("eager_connect"));

    if let Some(threads) = threads {
        node_builder = node_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        node_builder = node_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if let Some(chunk_size) = chunk_size {
        let chunk_size = chunk_size.parse::<ByteSize>().expect("value is pre-validated");
        node_builder = node_builder.with_buffer_limit(records_limit(chunk_size.as_u64()));
    }

    let node = match node_builder.build(server_id, topology) {
        Ok(node) => node,
        Err(err) => {
            log::error!("node initialization error: {}", err);
            process::exit(1);
        }
    };

    match node.run(input_stream, output_stream) {
        Ok(stats) => log::info!(
            "records read: {}, kept: {}, sent: {:?}, received: {}, written: {}",
            stats.read,
            stats.kept,
            stats.sent,
            stats.received,
            stats.written
        ),
        Err(err) => {
            log::error!("distributed sorting error: {}", err);
            process::exit(1);
        }
    }
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
    clap::App::new("net-sort")
        .about("distributed external sorter")
        .arg(
            clap::Arg::new("server_id")
                .index(1)
                .help("id of this server in the topology")
                .required(true)
                .takes_value(true)
                .validator(|v| match v.parse::<usize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Server id format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("input")
                .index(2)
                .help("input shard file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .index(3)
                .help("output shard file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("config")
                .index(4)
                .help("cluster topology file (yaml)")
                .required(true)
                .takes_value(true),
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
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunk_size")
                .short('c')
                .long("chunk-size")
                .help("in-memory run size, sorted runs are spilled to disk beyond it")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("retry_delay")
                .long("retry-delay")
                .help("pause between peer dialing attempts (ms)")
                .takes_value(true)
                .default_value("250"),
        )
        .arg(
            clap::Arg::new("retry_limit")
                .long("retry-limit")
                .help("maximum number of peer dialing attempts, unlimited by default")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("startup_delay")
                .long("startup-delay")
                .help("pause before dispatching, giving peers time to start listening (ms)")
                .takes_value(true)
                .default_value("1000"),
        )
        .arg(
            clap::Arg::new("eager_connect")
                .long("eager-connect")
                .help("connect to every peer before dispatching"),
        )
        .get_matches()
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
