//! The `process` subcommand.

use std::{fs::File, io::Write as _};

use clap::Args;

use super::{display_batch_counts, run_batch};
use crate::{batch::BatchResult, prelude::*, raster::RasterOptions, ui::Ui};

/// Options for the `process` subcommand.
#[derive(Args, Debug)]
pub struct ProcessOpts {
    /// The scanned PDF to process.
    pub input: PathBuf,

    /// Write per-page JSON records here instead of to standard output.
    #[clap(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[clap(flatten)]
    pub raster: RasterOptions,
}

/// Run the batch pipeline and emit one JSON record per page.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_process(ui: Ui, opts: &ProcessOpts) -> Result<()> {
    let batch = run_batch(&ui, &opts.input, &opts.raster).await?;
    write_page_records(opts.output.as_deref(), &batch)?;
    display_batch_counts(&ui, &batch);
    Ok(())
}

/// Write the per-page results as JSON Lines.
fn write_page_records(path: Option<&Path>, batch: &BatchResult) -> Result<()> {
    let mut out: Box<dyn std::io::Write> = match path {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("failed to create {:?}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    for page_result in &batch.pages {
        serde_json::to_writer(&mut out, page_result)
            .context("failed to serialize page result")?;
        out.write_all(b"\n")?;
    }
    Ok(())
}
