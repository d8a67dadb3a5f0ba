//! Drupal Audit CLI - Audit a Drupal installation's core, modules and themes

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use drupal_audit::{
    DrupalCms, PristineDirChecker, Scanner,
    output::{OutputConfig, OutputFormat, OutputSort, output_scan},
};

/// Drupal security auditor - detects outdated, vulnerable and altered add-ons
#[derive(Parser, Debug)]
#[command(name = "drupal-audit")]
#[command(version, about, long_about = None)]
struct Args {
    /// Root directory of the Drupal installation
    path: PathBuf,

    /// Modules directory, relative to the installation root
    #[arg(long = "plugins-dir", default_value = "modules")]
    plugins_dir: PathBuf,

    /// Themes directory, relative to the installation root
    #[arg(long = "themes-dir", default_value = "themes")]
    themes_dir: PathBuf,

    /// Directory of pristine add-on copies (`<dir>/<name>/`) to detect altered files
    #[arg(long = "pristine-dir")]
    pristine_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long = "output", default_value = "human", value_enum)]
    output_format: OutputFormatArg,

    /// Sort order for output
    #[arg(long = "sort", default_value = "type", value_enum)]
    sort: OutputSortArg,

    /// Timeout for each request to drupal.org, in seconds
    #[arg(long = "timeout", default_value_t = 30)]
    timeout: u64,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Output format argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
    None,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::None => OutputFormat::None,
        }
    }
}

/// Output sort argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputSortArg {
    /// Sort by type (Core, Plugin, Theme), then by name (default)
    Type,
    /// Sort alphabetically by name only
    Name,
    /// Sort by status, then by type, then by name
    Status,
}

impl From<OutputSortArg> for OutputSort {
    fn from(arg: OutputSortArg) -> Self {
        match arg {
            OutputSortArg::Type => OutputSort::Type,
            OutputSortArg::Name => OutputSort::Name,
            OutputSortArg::Status => OutputSort::Status,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    // Print banner for human output
    if matches!(args.output_format, OutputFormatArg::Human) {
        print_banner();
    }

    let output_config = OutputConfig::new(args.output_format.into(), args.sort.into());

    match run_scan(&args, &output_config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so JSON on stdout stays parseable
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "drupal_audit=info",
        1 => "drupal_audit=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_scan(args: &Args, output_config: &OutputConfig) -> drupal_audit::Result<()> {
    let cms = DrupalCms::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let mut builder = Scanner::builder(&args.path)
        .plugins_dir(&args.plugins_dir)
        .themes_dir(&args.themes_dir)
        .cms(cms);
    if let Some(dir) = &args.pristine_dir {
        builder = builder.alteration(PristineDirChecker::new(dir));
    }

    let scan_result = builder.build()?.scan().await?;

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    output_scan(&scan_result, output_config, &mut writer)?;

    Ok(())
}

fn print_banner() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    println!("Drupal Audit v{}", VERSION);
    println!();
}
