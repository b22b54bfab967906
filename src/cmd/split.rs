//! The `split` subcommand.

use clap::Args;

use super::{display_batch_counts, run_batch};
use crate::{prelude::*, raster::RasterOptions, split::split_document, ui::Ui};

/// Options for the `split` subcommand.
#[derive(Args, Debug)]
pub struct SplitOpts {
    /// The scanned PDF to process and split.
    pub input: PathBuf,

    /// The directory to write the per-page files into.
    #[clap(long)]
    pub dest: PathBuf,

    /// Write the split outcome as JSON here instead of to standard output.
    #[clap(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[clap(flatten)]
    pub raster: RasterOptions,
}

/// Run the batch pipeline, then split the source into per-card files.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_split(ui: Ui, opts: &SplitOpts) -> Result<()> {
    let mut batch = run_batch(&ui, &opts.input, &opts.raster).await?;
    display_batch_counts(&ui, &batch);

    let outcome = split_document(&opts.input, &mut batch, &opts.dest).await?;
    let json = serde_json::to_string_pretty(&outcome)
        .context("failed to serialize split outcome")?;
    match &opts.output {
        Some(path) => tokio::fs::write(path, json + "\n")
            .await
            .with_context(|| format!("failed to write {:?}", path.display()))?,
        None => println!("{json}"),
    }

    ui.display_message(
        "💾",
        &format!(
            "{} of {} pages written to {:?}",
            outcome.created.len(),
            outcome.total_pages,
            outcome.dest_dir.display()
        ),
    );
    if !outcome.failed.is_empty() {
        ui.display_message(
            "❌",
            &format!("{} pages could not be written", outcome.failed.len()),
        );
    }
    Ok(())
}
