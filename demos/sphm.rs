use clap::{Parser, Subcommand};
use serde_json::Value;
use sphm::{FileHeader, StaticPerfectHashMap, StaticPerfectHashMapBuilder};
use std::fs::File;
use std::io::{BufReader, Error, ErrorKind, Result};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Info(args) => run_info(args),
        Command::Convert(args) => run_convert(args),
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "sphm utility for inspecting and creating static perfect hash tables",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect a table file and print its header
    Info(InfoArgs),
    /// Convert a JSON file of u64 pairs into a map file
    Convert(ConvertArgs),
}

#[derive(clap::Args)]
struct InfoArgs {
    /// Path to the table file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Optional u64 key to look up in a u64 -> u64 map
    #[arg(short, long)]
    key: Option<u64>,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Path to the source JSON file containing key-value pairs
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Path to the table file to produce
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Average number of keys per bucket
    #[arg(long, value_name = "RATIO", default_value_t = 2.0)]
    keys_per_bucket: f64,

    /// Attempts after the first failed one
    #[arg(long, value_name = "COUNT", default_value_t = 64)]
    max_retries: u32,

    /// Writer buffer size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = 16 << 20)]
    buffer_size: usize,
}

fn run_info(args: InfoArgs) -> Result<()> {
    let data = std::fs::read(&args.input)?;
    let header = FileHeader::parse(&data)?;

    let json = serde_json::to_string_pretty(&header)
        .map_err(|e| Error::other(format!("Failed to format JSON: {e}")))?;
    println!("{}", json);

    if let Some(key) = args.key {
        let map = StaticPerfectHashMap::<u64, u64>::from_bytes(&data)?;
        println!("{}: {:?}", key, map.get(&key));
    }

    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let entries = load_entries_from_json(&args.input)?;

    let mut builder = StaticPerfectHashMapBuilder::<u64, u64>::new()
        .with_keys_per_bucket(args.keys_per_bucket)
        .with_max_retries(args.max_retries)
        .with_writer_buffer_size(args.buffer_size);
    for (index, (key, value)) in entries.into_iter().enumerate() {
        if !builder.add(key, value) {
            return Err(invalid_json(format!("entry {index} duplicates key {key}")));
        }
    }

    let result = builder.build().map(|_| ());
    let json = serde_json::to_string_pretty(builder.stats())
        .map_err(|e| Error::other(format!("Failed to format JSON: {e}")))?;
    println!("{}", json);
    result?;

    builder.save_to_file(&args.output)?;
    Ok(())
}

fn load_entries_from_json(path: &Path) -> Result<Vec<(u64, u64)>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let value: Value = serde_json::from_reader(reader)
        .map_err(|e| invalid_json(format!("Failed to parse JSON input: {e}")))?;
    extract_entries(value)
}

fn extract_entries(value: Value) -> Result<Vec<(u64, u64)>> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .enumerate()
            .map(|(index, (key, value))| {
                let key = key.parse::<u64>().map_err(|e| {
                    invalid_json(format!("entry {index} key {key:?} is not a u64: {e}"))
                })?;
                Ok((key, expect_u64(value, index)?))
            })
            .collect(),
        Value::Array(items) => {
            let mut entries = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(mut obj) => {
                        let key = obj.remove("key").ok_or_else(|| {
                            invalid_json(format!("entry {index} missing 'key' field"))
                        })?;
                        let value = obj.remove("value").ok_or_else(|| {
                            invalid_json(format!("entry {index} missing 'value' field"))
                        })?;
                        entries.push((expect_u64(key, index)?, expect_u64(value, index)?));
                    }
                    Value::Array(pair) => {
                        let [key, value] = <[Value; 2]>::try_from(pair).map_err(|_| {
                            invalid_json(format!("entry {index} expected array of length 2"))
                        })?;
                        entries.push((expect_u64(key, index)?, expect_u64(value, index)?));
                    }
                    other => {
                        return Err(invalid_json(format!(
                            "unsupported entry format at index {index}: {other}"
                        )));
                    }
                }
            }
            Ok(entries)
        }
        other => Err(invalid_json(format!(
            "unsupported JSON top-level type: {other}"
        ))),
    }
}

fn expect_u64(value: Value, index: usize) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        invalid_json(format!("entry {index} expects u64, found {value}"))
    })
}

fn invalid_json(message: String) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}
