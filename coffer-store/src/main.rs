use std::env;
use std::fs::{metadata, File};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use coffer::collection::{Collection, CollectionConfig, CollectionHeader};
use coffer::io::pool::FilePool;
use coffer::io::writer::CollectionWriter;
use coffer::value::wkb::convert_wkb_to_wkt;
use coffer::value::{self, PropertyValueType, StoredBinaryValue, MAX_DOUBLE_DECIMAL_PLACES};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use strum::EnumString;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store location
    store: String,

    /// Create a new store from a source file of `<type> <value>` lines (will overwrite existing
    /// file)
    #[arg(short, long)]
    create: Option<PathBuf>,

    /// Bytes of the store to load into memory
    #[arg(short, long, default_value_t = 0)]
    loaded: u32,

    /// Records to cache, 0 to read every record from the file
    #[arg(long, default_value_t = 0)]
    capacity: u32,

    /// Concurrent readers
    #[arg(long, default_value_t = 1)]
    concurrency: u16,

    #[command(subcommand)]
    parameter: Option<Parameter>,
}

#[derive(Debug, EnumString, Subcommand)]
#[strum(ascii_case_insensitive)]
enum Parameter {
    /// Compare the value at this offset with text
    Compare {
        offset: u32,
        value_type: PropertyValueType,
        target: String,
    },
    /// Get the value at this offset
    Get {
        offset: u32,
        value_type: PropertyValueType,
        /// Decimal places for numbers and geometries
        places: Option<u8>,
    },
    /// Interactive Help
    Help,
    /// Display store details
    Info,
    /// List store records, all read as one type
    Records { value_type: PropertyValueType },
    /// Convert hex encoded WKB to WKT
    Wkt {
        wkb: String,
        /// Decimal places
        places: Option<u8>,
    },
}

fn get_history_file() -> Option<PathBuf> {
    dirs::preference_dir()
        .and_then(|mut base| {
            base.push("coffer");
            // Note: Not create_dir_all(), because we don't want to create preference
            // dirs if they don't exist.
            if metadata(base.clone()).ok().is_none() {
                std::fs::create_dir(base.clone()).ok()?
            }
            Some(base)
        })
        .map(|mut base| {
            base.push("history.txt");
            base
        })
}

fn create_store(store: &str, source: &Path) -> Result<()> {
    let text = std::fs::read_to_string(source)
        .with_context(|| format!("reading source: {}", source.display()))?;
    let mut writer = CollectionWriter::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (value_type, value) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let value_type = PropertyValueType::from_str(value_type)
            .with_context(|| format!("line {}: unknown type: {value_type}", number + 1))?;
        let offset = write_value(&mut writer, value_type, value.trim())
            .with_context(|| format!("line {}", number + 1))?;
        println!("{offset}: {value_type}");
    }
    let count = writer.count();
    std::fs::write(store, writer.finish_with_length()?)?;
    tracing::info!("created store: {store} with {count} records");
    Ok(())
}

fn write_value(
    writer: &mut CollectionWriter,
    value_type: PropertyValueType,
    value: &str,
) -> Result<u32> {
    use PropertyValueType::*;
    match value_type {
        String | Double | Boolean | JavaScript => writer.write_string(value),
        Integer => writer.write_integer(value.parse()?),
        SinglePrecisionFloat => writer.write_float(value.parse()?),
        SingleByte => writer.write_byte(value.parse()?),
        Azimuth => writer.write_azimuth(value.parse()?),
        Declination => writer.write_declination(value.parse()?),
        IpAddress => writer.write_ip_address(value.parse::<IpAddr>()?),
        Wkb => writer.write_byte_array(&hex::decode(value)?),
        Coordinate | Object => bail!("{value_type} values can't be stored"),
    }
}

fn open_store(cli: &Cli) -> Result<Collection> {
    let config = CollectionConfig {
        loaded: cli.loaded,
        capacity: cli.capacity,
        concurrency: cli.concurrency,
    };
    let pool = Arc::new(FilePool::try_new(&cli.store, cli.concurrency.max(1))?);
    let mut file = File::open(&cli.store).with_context(|| format!("opening store: {}", cli.store))?;
    let header = CollectionHeader::from_file(&mut file, 0, false)?;
    Ok(Collection::from_file(&mut file, &pool, &config, header)?)
}

fn get_value(
    store: &Collection,
    offset: u32,
    value_type: PropertyValueType,
    places: u8,
) -> Result<String> {
    let item = value::get(store, offset, value_type)?.ok_or_else(|| anyhow!("cache is exhausted"))?;
    Ok(StoredBinaryValue::decode(&item, value_type)?.to_text(places)?)
}

// EnumString doesn't deal with variant parameters, so fill them in from the rest of the line
fn parse_words(words: &[&str]) -> Result<Option<Parameter>> {
    let Some(first) = words.first() else {
        return Ok(None);
    };
    let parameter = Parameter::from_str(first)?;
    let parameter = match parameter {
        Parameter::Compare { .. } => {
            let [_, offset, value_type, target @ ..] = words else {
                bail!("usage: compare <offset> <type> <text>");
            };
            Parameter::Compare {
                offset: offset.parse()?,
                value_type: value_type.parse()?,
                target: target.join(" "),
            }
        }
        Parameter::Get { .. } => match words {
            [_, offset, value_type] => Parameter::Get {
                offset: offset.parse()?,
                value_type: value_type.parse()?,
                places: None,
            },
            [_, offset, value_type, places] => Parameter::Get {
                offset: offset.parse()?,
                value_type: value_type.parse()?,
                places: Some(places.parse()?),
            },
            _ => bail!("usage: get <offset> <type> [<places>]"),
        },
        Parameter::Records { .. } => match words {
            [_, value_type] => Parameter::Records {
                value_type: value_type.parse()?,
            },
            _ => bail!("usage: records <type>"),
        },
        Parameter::Wkt { .. } => match words {
            [_, wkb] => Parameter::Wkt {
                wkb: wkb.to_string(),
                places: None,
            },
            [_, wkb, places] => Parameter::Wkt {
                wkb: wkb.to_string(),
                places: Some(places.parse()?),
            },
            _ => bail!("usage: wkt <hex> [<places>]"),
        },
        p => p,
    };
    Ok(Some(parameter))
}

fn interactive(store: &Collection) -> Result<()> {
    // `()` can be used when no completer is required
    let mut rl = DefaultEditor::new()?;
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.load_history(&file_location) {
            println!("error loading history: {e}");
        }
    }
    println!("terminate with ctrl-c or ctrl-d");
    loop {
        let readline = rl.readline("coffer: ");
        match readline {
            Ok(line) => {
                let words = line.split_whitespace().collect::<Vec<&str>>();
                match parse_words(&words) {
                    Ok(Some(parameter)) => {
                        if let Err(e) = process_parameter(store, &parameter) {
                            println!("error: {e}");
                        }
                        rl.add_history_entry(line.as_str())?;
                    }
                    Ok(None) => continue,
                    Err(e) => println!("error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("terminating...");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("terminating...");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.save_history(&file_location) {
            println!("error saving history: {e}");
        }
    }
    Ok(())
}

fn process_parameter(store: &Collection, parameter: &Parameter) -> Result<()> {
    match parameter {
        Parameter::Compare {
            offset,
            value_type,
            target,
        } => {
            let item = value::get(store, *offset, *value_type)?
                .ok_or_else(|| anyhow!("cache is exhausted"))?;
            let result =
                StoredBinaryValue::decode(&item, *value_type)?.compare_with_string(target)?;
            println!("{result}");
        }
        Parameter::Get {
            offset,
            value_type,
            places,
        } => {
            let places = places.unwrap_or(MAX_DOUBLE_DECIMAL_PLACES);
            println!("{}", get_value(store, *offset, *value_type, places)?);
        }
        Parameter::Help => {
            let help = Cli::command().render_help().to_string();

            let mut print_it = false;

            for line in help.lines() {
                if line.starts_with("Arguments:") {
                    print_it = false;
                }
                if print_it && !line.is_empty() {
                    println!("{}", line);
                }
                if line.starts_with("Commands:") {
                    print_it = true;
                }
            }
        }
        Parameter::Info => {
            println!("kind: {}", store.kind());
            println!("count: {}", store.count());
            println!("size: {}", store.size());
            let mut tier = store.next();
            while let Some(next) = tier {
                println!("then: {}", next.kind());
                tier = next.next();
            }
            if let Some(stats) = store.cache_stats() {
                println!(
                    "cache: {} of {} resident, {} hits, {} misses, concurrency {}",
                    stats.resident, stats.capacity, stats.hits, stats.misses, stats.concurrency
                );
            }
        }
        Parameter::Records { value_type } => {
            let mut records = store.records(value_type.key_type()?);
            for record in records.by_ref() {
                let (offset, item) = record?;
                let text = StoredBinaryValue::decode(&item, *value_type)?
                    .to_text(MAX_DOUBLE_DECIMAL_PLACES)?;
                println!("{offset}: {text}");
            }
            if records.exhausted() {
                println!("stopped: cache is exhausted");
            }
        }
        Parameter::Wkt { wkb, places } => {
            let wkb = hex::decode(wkb)?;
            let places = places.unwrap_or(MAX_DOUBLE_DECIMAL_PLACES);
            let mut buffer = vec![0u8; value::REASONABLE_WKT_STRING_LENGTH];
            let mut result = convert_wkb_to_wkt(&wkb, &mut buffer, places)?;
            if result.buffer_too_small {
                buffer = vec![0u8; result.written];
                result = convert_wkb_to_wkt(&wkb, &mut buffer, places)?;
            }
            // Drop the terminator
            let text = &buffer[..result.written.saturating_sub(1)];
            println!("{}", String::from_utf8_lossy(text));
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match env::var("TMPDIR") {
        Ok(d) => d,
        Err(_e) => ".".to_string(),
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "coffer.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt().with_writer(non_blocking).init();

    if let Some(source) = &cli.create {
        create_store(&cli.store, source)?;
    }

    let store = open_store(&cli)?;

    match &cli.parameter {
        Some(parameter) => process_parameter(&store, parameter)?,
        None => interactive(&store)?,
    }
    Ok(())
}
