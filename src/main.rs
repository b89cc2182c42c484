use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use scunpack::charmap::CharacterizationMap;
use scunpack::expand::{expand, ExpandOptions, Mode};
use scunpack::resolve::DEFAULT_WEIGHT_FIELD;
use scunpack::table::{write::write_table, SupplyCurveTable};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "scunpack", version)]
#[command(about = "Expand supply-curve characterization payloads into flat columns")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unpack the characterization column of a supply-curve table
    Unpack(UnpackArgs),
}

#[derive(Args)]
struct UnpackArgs {
    /// Characterization map file (JSON; YAML by extension)
    #[arg(long, short = 'm')]
    map: PathBuf,

    /// Input supply-curve table (CSV with a header row)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Name of the column holding the embedded JSON payload
    #[arg(long, short = 'c')]
    column: String,

    /// Output path; a `.parquet` extension selects Parquet, anything else CSV
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Abort on the first row-level failure instead of recording it
    #[arg(long)]
    strict: bool,

    /// Sub-cell field holding the aggregation weight
    #[arg(long, default_value = DEFAULT_WEIGHT_FIELD)]
    weight_field: String,

    /// Also write the failure report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Unpack(args) => unpack(args),
    }
}

fn unpack(args: UnpackArgs) -> Result<()> {
    let map = CharacterizationMap::load(&args.map)?;
    info!(entries = map.len(), "characterization map loaded");

    let table = SupplyCurveTable::read_csv(&args.input)?;

    let options = ExpandOptions {
        mode: if args.strict {
            Mode::Strict
        } else {
            Mode::Lenient
        },
        weight_field: args.weight_field,
    };
    let (expanded, report) = expand(&table, &args.column, &map, &options)?;

    write_table(&expanded, &args.output)?;
    info!(path = %args.output.display(), "wrote expanded table");

    if report.is_clean() {
        info!("clean run: no row failures");
    } else {
        warn!("{report}");
    }
    if let Some(report_path) = &args.report {
        report.write_json(report_path)?;
        info!(path = %report_path.display(), "wrote failure report");
    }
    Ok(())
}
