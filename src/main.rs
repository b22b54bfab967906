use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod batch;
mod cmd;
mod command;
mod document;
mod error;
mod extract;
mod prelude;
mod raster;
mod recognize;
mod segment;
mod split;
mod ui;

/// Batch-recognize scanned transit-permit documents and split them into
/// per-card PDFs.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
External tools:
  - poppler-utils (pdfinfo, pdftocairo, pdfseparate) must be on PATH.
  - tesseract must be on PATH.

Environment variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Recognize every page of a scanned PDF, printing one JSON record per
    /// page.
    Process(cmd::process::ProcessOpts),
    /// Recognize a scanned PDF and split it into one file per page, named
    /// by the recovered identifier codes.
    Split(cmd::split::SplitOpts),
    /// Print schemas for our output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Process(opts) => opts.output.is_none(),
            Cmd::Split(opts) => opts.output.is_none(),
            Cmd::Schema(opts) => opts.output.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Process(opts) => {
            cmd::process::cmd_process(ui, opts).await?;
        }
        Cmd::Split(opts) => {
            cmd::split::cmd_split(ui, opts).await?;
        }
        Cmd::Schema(opts) => {
            cmd::schema::cmd_schema(opts).await?;
        }
    }
    Ok(())
}
