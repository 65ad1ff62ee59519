use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use protoflat::{
    compile_schema_file, describe_schema, CsvSink, Framing, PipelineError, PipelineOptions, SchemaError,
    StreamPipeline,
};

#[derive(Parser, Debug)]
#[command(name = "protoflat", version)]
#[command(about = "Convert streams of protobuf messages to CSV using a .proto schema", long_about = None)]
struct Cli {
    /// Log every decoded record (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a binary message stream into a CSV file
    Convert(ConvertArgs),

    /// Print a parsed `.proto` schema as JSON
    Schema {
        /// Input `.proto` file
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Binary input file
    #[arg(short, long)]
    input: PathBuf,

    /// `.proto` schema describing the records
    #[arg(short, long)]
    schema: PathBuf,

    /// Output file; must not exist yet
    #[arg(short, long)]
    output: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "csv")]
    output_format: OutputFormat,

    /// Message to decode records as (defaults to the first message in the schema)
    #[arg(short, long)]
    message: Option<String>,

    /// How records are separated in the input. `concatenated` starts a new record
    /// where field numbers stop ascending, so records can run together when a
    /// proto3 writer omits default-valued fields; use `delimited` for streams
    /// written with length prefixes
    #[arg(long, value_enum, default_value = "concatenated")]
    framing: CliFraming,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum CliFraming {
    /// Messages back to back with no length prefix
    Concatenated,
    /// Every message prefixed with its varint length
    Delimited,
}

impl From<CliFraming> for Framing {
    fn from(framing: CliFraming) -> Self {
        match framing {
            CliFraming::Concatenated => Framing::Concatenated,
            CliFraming::Delimited => Framing::Delimited,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("input file {} does not exist", .0.display())]
    MissingInput(PathBuf),

    #[error("schema file {} does not exist", .0.display())]
    MissingSchema(PathBuf),

    #[error("output file {} already exists", .0.display())]
    OutputExists(PathBuf),

    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// `RUST_LOG` wins when set, otherwise `--debug` picks the level.
fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn check_paths(args: &ConvertArgs) -> Result<(), CliError> {
    if !args.input.exists() {
        return Err(CliError::MissingInput(args.input.clone()));
    }
    if !args.schema.exists() {
        return Err(CliError::MissingSchema(args.schema.clone()));
    }
    if args.output.exists() {
        return Err(CliError::OutputExists(args.output.clone()));
    }
    Ok(())
}

fn open_error(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::Open {
        path: path.to_path_buf(),
        source,
    }
}

fn run_convert(args: &ConvertArgs) -> Result<usize, CliError> {
    check_paths(args)?;

    let schema = compile_schema_file(&args.schema)?;
    let options = PipelineOptions {
        framing: args.framing.into(),
        message: args.message.clone(),
    };
    let mut pipeline = StreamPipeline::new(&schema, &options)?;

    let input = File::open(&args.input).map_err(open_error(&args.input))?;
    // create_new refuses a file that appeared after the existence check.
    let output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&args.output)
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => CliError::OutputExists(args.output.clone()),
            _ => open_error(&args.output)(err),
        })?;

    let records = match args.output_format {
        OutputFormat::Csv => {
            let mut sink = CsvSink::new(BufWriter::new(output));
            pipeline.run(BufReader::new(input), &mut sink)?
        }
    };

    info!(records, output = %args.output.display(), "wrote CSV");
    Ok(records)
}

fn run_schema(input: &Path) -> Result<String, CliError> {
    let text = fs::read_to_string(input).map_err(open_error(input))?;
    Ok(describe_schema(&text)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let result = match cli.command {
        Commands::Convert(ref args) => run_convert(args).map(|_| ()),
        Commands::Schema { ref input } => run_schema(input).map(|json| println!("{}", json)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
