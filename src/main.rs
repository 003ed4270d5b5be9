use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use jevt::{fields_json, ExtractionContext, ExtractorConfig, FieldRequest};

/// Printed in place of a field that has no value for an event
const NOT_AVAILABLE: &str = "<NA>";

#[derive(Parser)]
#[command(name = "jevt")]
#[command(about = "Extract fields from JSON events, one event per line")]
#[command(version)]
#[command(after_help = "Values are written tab-separated, one line per event. Backslashes, \
tabs, newlines and carriage returns inside a value are escaped as \\\\, \\t, \\n and \\r, \
so a multi-line jevt.json value stays on its event's line.")]
struct Args {
    /// Fields to extract, e.g. 'jevt.value[/proc/name]' or 'jevt.json'
    #[arg(value_name = "FIELD")]
    fields: Vec<String>,

    /// Input file (default: stdin)
    #[arg(short = 'i', long = "input")]
    input_file: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "output")]
    output_file: Option<PathBuf>,

    /// Output buffer capacity in bytes, terminator included
    #[arg(long, default_value = "65535")]
    buffer_size: usize,

    /// Print the field schema as JSON and exit
    #[arg(long)]
    list_fields: bool,

    /// Debug mode - log extraction details and final statistics
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn validate(&self) -> Result<(), String> {
        if !self.list_fields && self.fields.is_empty() {
            return Err("Must provide at least one FIELD (see --list-fields)".to_string());
        }
        Ok(())
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_tracing(args.debug);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut output: Box<dyn Write> = if let Some(output_path) = &args.output_file {
        let file = File::create(output_path).with_context(|| {
            format!("Failed to create output file '{}'", output_path.display())
        })?;
        Box::new(io::BufWriter::new(file))
    } else {
        Box::new(io::BufWriter::new(io::stdout()))
    };

    if args.list_fields {
        writeln!(output, "{}", fields_json()?)?;
        output.flush()?;
        return Ok(());
    }

    let requests = args
        .fields
        .iter()
        .map(|spec| spec.parse::<FieldRequest>())
        .collect::<Result<Vec<_>, _>>()?;

    let config = ExtractorConfig::default().with_output_buffer_size(args.buffer_size);
    let mut context = ExtractionContext::new(config)?;

    let input: Box<dyn BufRead> = if let Some(input_path) = &args.input_file {
        let file = File::open(input_path).with_context(|| {
            format!("Failed to open input file '{}'", input_path.display())
        })?;
        Box::new(BufReader::new(file))
    } else {
        Box::new(BufReader::new(io::stdin()))
    };

    let mut event_id: u64 = 0;
    for (line_number, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        event_id += 1;

        for (i, request) in requests.iter().enumerate() {
            if i > 0 {
                output.write_all(b"\t")?;
            }
            match context.extract_request(event_id, request, line.as_bytes()) {
                Some(handle) => write_escaped(&mut output, handle.as_bytes())?,
                None => output.write_all(NOT_AVAILABLE.as_bytes())?,
            }
        }
        output.write_all(b"\n")?;
    }

    output.flush()?;

    if args.debug {
        let stats = context.stats();
        eprintln!("Final statistics:");
        eprintln!("  Events: {}", event_id);
        eprintln!("  Extractions: {}", stats.extractions);
        eprintln!("  Parses: {}", stats.parses);
        eprintln!("  Cache hits: {}", stats.cache_hits);
        eprintln!("  Parse failures: {}", stats.parse_failures);
        eprintln!("  Absent: {}", stats.absent);
        if let Some(err) = context.last_error() {
            eprintln!("  Last error: {}", err);
        }
    }

    Ok(())
}

/// Write a value so it cannot break out of its tab-separated column.
fn write_escaped<W: Write>(out: &mut W, value: &[u8]) -> io::Result<()> {
    let mut start = 0;
    for (i, &byte) in value.iter().enumerate() {
        let escape: &[u8] = match byte {
            b'\\' => b"\\\\",
            b'\t' => b"\\t",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            _ => continue,
        };
        out.write_all(&value[start..i])?;
        out.write_all(escape)?;
        start = i + 1;
    }
    out.write_all(&value[start..])
}
