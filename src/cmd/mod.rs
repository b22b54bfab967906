//! CLI subcommands.

pub mod process;
pub mod schema;
pub mod split;

use crate::{
    batch::{BatchProcessor, BatchResult, CancelFlag},
    prelude::*,
    raster::RasterOptions,
    ui::Ui,
};

/// Run the batch pipeline over one document, wired to a page-progress bar
/// and a Ctrl-C cancellation flag.
pub async fn run_batch(ui: &Ui, input: &Path, raster: &RasterOptions) -> Result<BatchResult> {
    // The page count is only known once the document is open, so the bar
    // learns its length from the first progress callback.
    let pb = ui.new_page_bar(0);
    let pb_clone = pb.clone();

    let mut processor = BatchProcessor::new(raster.clone());
    processor.set_progress_callback(move |_page, total, _result| {
        pb_clone.set_length(u64::from(total));
        pb_clone.inc(1);
    });

    // Cancellation is cooperative: Ctrl-C lets an in-flight recognition
    // call finish, then the run stops at its next check point.
    let cancel = CancelFlag::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, stopping after the current operation");
            cancel_clone.cancel();
        }
    });
    processor.set_cancel_flag(cancel);

    let batch = processor.process(input).await;
    pb.finish_and_clear();
    debug!(state = ?processor.state(), "batch run finished");
    batch
}

/// Show per-page success/failure counts after a batch.
pub fn display_batch_counts(ui: &Ui, batch: &BatchResult) {
    let ok = batch.pages.iter().filter(|p| p.success).count();
    let failed = batch.pages.len() - ok;
    let codes = batch.pages.iter().filter(|p| p.code.is_some()).count();
    let plates = batch.pages.iter().filter(|p| p.plate.is_some()).count();

    ui.display_message("✅", &format!("{ok} pages recognized"));
    ui.display_message(
        "🔖",
        &format!("{codes} identifier codes and {plates} plates recovered"),
    );
    if failed > 0 {
        ui.display_message("❌", &format!("{failed} pages could not be processed"));
    }
}
