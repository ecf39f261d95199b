use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use card_sheet_extract::{
    DEFAULT_DPI, ExtractError, ExtractOptions, ExtractionReport, PageSelection, extract_cards,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "cardsplit",
    version,
    about = "Split printed card sheets into one image and JSON record per card"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract every card of a sheet PDF into an output directory.
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Input PDF path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory. Removed and recreated on every run.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Render resolution in dots per inch.
    #[arg(long, default_value_t = DEFAULT_DPI)]
    dpi: u32,

    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,

    /// Save page overlays with the detected grid under _debug/.
    #[arg(long)]
    debug: bool,

    /// List every warning, not just the count.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_options(args: &ExtractArgs) -> Result<ExtractOptions> {
    let pages = args
        .pages
        .as_deref()
        .map(PageSelection::from_str)
        .transpose()
        .map_err(ExtractError::InvalidPageSelection)
        .context("failed to parse --pages")?;

    let options = ExtractOptions {
        pages,
        dpi: args.dpi,
        debug: args.debug,
    };
    options.validate().context("invalid --dpi")?;
    Ok(options)
}

fn log_report(report: &ExtractionReport, verbose: bool) {
    let summary = &report.summary;
    eprintln!("total: {} card(s)", summary.total);
    eprintln!("  origine:  {}", summary.origin);
    eprintln!("  comunità: {}", summary.community);
    for (title, counts) in [("classi", &summary.classes), ("abilita", &summary.abilities)] {
        if counts.is_empty() {
            continue;
        }
        eprintln!("  {title} per dominio:");
        for (domain, count) in counts {
            eprintln!("    {domain:<12} {count}");
        }
    }

    if report.warnings.is_empty() {
        return;
    }
    eprintln!("warning: {} issue(s) detected", report.warnings.len());
    if verbose {
        for warning in &report.warnings {
            eprintln!(
                "  - {:?} page={:?} cell={:?}: {}",
                warning.code, warning.page, warning.cell, warning.message
            );
        }
    }
}

fn run_extract(args: &ExtractArgs) -> Result<ExtractionReport> {
    let options = parse_options(args)?;
    extract_cards(&args.input, &args.output, &options)
        .with_context(|| format!("failed to extract cards from '{}'", args.input.display()))
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("card_sheet_extract=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract(args) => match run_extract(&args) {
            Ok(report) => {
                log_report(&report, args.verbose);
                if report.card_count() > 0 {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                }
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                ExitCode::from(1)
            }
        },
    }
}
