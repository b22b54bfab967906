//! The batch orchestrator.
//!
//! One run processes every page of one document, strictly in page order,
//! with no parallel fan-out: the rasterizer and the recognition engine are
//! single-instance, stateful resources, and nothing may call into either
//! concurrently within a run. Page results carry only structured fields —
//! raw recognized text lives exactly as long as its page is being processed.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use schemars::JsonSchema;

use crate::{
    document::Document,
    error::PipelineError,
    extract::{CodeExtractor, PlateExtractor},
    prelude::*,
    raster::{RasterOptions, render_page},
    recognize::{Charset, Segmentation, recognize},
    segment::PageRegions,
};

/// A cooperative cancellation flag.
///
/// Cancellation is advisory: the flag is only checked at the coarse
/// suspension points (before a render, before a recognition call), so an
/// in-flight recognition call may complete before the run halts.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at its next check point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The result of processing one page.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PageResult {
    /// The 1-based page number.
    pub page: u32,

    /// The recovered permit identifier code, if any strategy succeeded.
    pub code: Option<String>,

    /// The recovered vehicle plate, if present on the page.
    pub plate: Option<String>,

    /// Did the page process without errors? Missing fields alone do not
    /// make a page unsuccessful.
    pub success: bool,

    /// The page-level error, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Where the splitter wrote this page, once a split has succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl PageResult {
    /// A result for a page that failed outright.
    fn new_failed(page: u32, error: String) -> Self {
        Self {
            page,
            code: None,
            plate: None,
            success: false,
            error: Some(error),
            output_path: None,
        }
    }
}

/// The result of one batch run: one entry per page, in page order.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchResult {
    /// The source document.
    pub source: PathBuf,

    /// Per-page results, pages `1..=N` in strictly increasing order.
    pub pages: Vec<PageResult>,
}

/// A caller-supplied progress callback: `(page, total_pages, page_result)`.
/// Invoked synchronously, exactly once per page, in page order.
pub type ProgressFn = dyn Fn(u32, u32, &PageResult) + Send + Sync;

/// Where a run currently stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchState {
    Idle,
    Loading,
    ProcessingPage(u32),
    Cleanup,
    Done,
    Error,
}

/// Drives one document through the pipeline, page by page.
///
/// A processor holds no state from previous runs; the document handle and
/// every bitmap are owned by the run that created them and are released
/// during `Cleanup`, which runs whether or not the run failed.
pub struct BatchProcessor {
    raster: RasterOptions,
    code_extractor: CodeExtractor,
    plate_extractor: PlateExtractor,
    progress: Option<Box<ProgressFn>>,
    cancel: Option<CancelFlag>,
    state: BatchState,
}

impl BatchProcessor {
    pub fn new(raster: RasterOptions) -> Self {
        Self {
            raster,
            code_extractor: CodeExtractor::new(),
            plate_extractor: PlateExtractor::new(),
            progress: None,
            cancel: None,
            state: BatchState::Idle,
        }
    }

    /// Register a progress callback. It must tolerate being invoked up to
    /// `total_pages` times synchronously within one run.
    pub fn set_progress_callback(
        &mut self,
        callback: impl Fn(u32, u32, &PageResult) + Send + Sync + 'static,
    ) {
        self.progress = Some(Box::new(callback));
    }

    /// Register a cooperative cancellation flag for this processor's runs.
    pub fn set_cancel_flag(&mut self, flag: CancelFlag) {
        self.cancel = Some(flag);
    }

    /// The state of the current (or last) run.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Process every page of the document at `path`.
    ///
    /// A page-level failure is recorded in that page's result and does not
    /// abort the batch; a failure opening the document is fatal. Either way
    /// the run passes through `Cleanup` before returning.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub async fn process(&mut self, path: &Path) -> Result<BatchResult> {
        self.state = BatchState::Loading;
        let doc = match Document::open(path).await {
            Ok(doc) => doc,
            Err(err) => {
                // Nothing was opened, but the error path still passes
                // through Cleanup.
                self.state = BatchState::Cleanup;
                self.state = BatchState::Error;
                return Err(err);
            }
        };

        let outcome = self.run_pages(&doc).await;

        // Unconditional cleanup: the document handle and the run's render
        // artifacts are released before any result or error is surfaced.
        self.state = BatchState::Cleanup;
        drop(doc);

        match outcome {
            Ok(pages) => {
                self.state = BatchState::Done;
                Ok(BatchResult {
                    source: path.to_owned(),
                    pages,
                })
            }
            Err(err) => {
                self.state = BatchState::Error;
                Err(err)
            }
        }
    }

    /// The page loop.
    async fn run_pages(&mut self, doc: &Document) -> Result<Vec<PageResult>> {
        let total = doc.page_count();
        let mut pages = Vec::with_capacity(total as usize);
        for page in 1..=total {
            self.state = BatchState::ProcessingPage(page);
            self.check_cancelled(page)?;

            let page_result = match self.process_page(doc, page).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(page, "page failed: {err:#}");
                    PageResult::new_failed(page, format!("{err:#}"))
                }
            };

            if let Some(progress) = &self.progress {
                progress(page, total, &page_result);
            }
            pages.push(page_result);
        }
        Ok(pages)
    }

    /// Run one page through render → recognize → segment → extract.
    #[instrument(level = "debug", skip(self, doc))]
    async fn process_page(&self, doc: &Document, page: u32) -> Result<PageResult> {
        let bitmap = render_page(doc, page, &self.raster).await?;
        self.check_cancelled(page)?;
        let recognition = recognize(&bitmap, Charset::Full, Segmentation::Auto).await?;
        // The bitmap is multi-megabyte at this scale; let it go before the
        // extractors run (they may render their own crop).
        drop(bitmap);
        debug!(page, confidence = recognition.confidence, "page recognized");

        let regions = PageRegions::segment(&recognition.text);
        drop(recognition);
        debug!(page, regions = regions.regions().len(), "page segmented");

        let code = self
            .code_extractor
            .extract(doc, page, self.raster.scale, &regions)
            .await?;
        let plate = self.plate_extractor.extract(&regions);

        Ok(PageResult {
            page,
            code,
            plate,
            success: true,
            error: None,
            output_path: None,
        })
    }

    /// Stop between operations if the caller asked us to.
    fn check_cancelled(&self, page: u32) -> Result<(), PipelineError> {
        if let Some(cancel) = &self.cancel
            && cancel.is_cancelled()
        {
            Err(PipelineError::BatchAborted(format!(
                "cancelled while processing page {page}"
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_PDF_PATH: &str = "tests/fixtures/two_pages.pdf";

    #[test]
    fn cancel_flag_is_sticky_and_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn page_results_serialize_without_raw_text() {
        let result = PageResult {
            page: 1,
            code: Some("1234".to_string()),
            plate: None,
            success: true,
            error: None,
            output_path: None,
        };
        let json = serde_json::to_value(&result).expect("serializes");
        assert_eq!(
            json,
            serde_json::json!({
                "page": 1,
                "code": "1234",
                "plate": null,
                "success": true,
            })
        );
    }

    #[tokio::test]
    async fn open_failure_is_fatal_and_passes_through_cleanup() {
        let mut processor = BatchProcessor::new(RasterOptions::default());
        assert_eq!(processor.state(), BatchState::Idle);
        let result = processor.process(Path::new("does/not/exist.pdf")).await;
        assert!(result.is_err());
        assert_eq!(processor.state(), BatchState::Error);
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils and tesseract to be installed"]
    async fn pages_come_back_in_strictly_increasing_order() -> Result<()> {
        let mut processor = BatchProcessor::new(RasterOptions::default());
        let batch = processor.process(Path::new(TEST_PDF_PATH)).await?;
        assert_eq!(batch.pages.len(), 2);
        for (i, page_result) in batch.pages.iter().enumerate() {
            assert_eq!(page_result.page, i as u32 + 1);
        }
        assert_eq!(processor.state(), BatchState::Done);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils and tesseract to be installed"]
    async fn progress_fires_once_per_page_in_order() -> Result<()> {
        use std::sync::Mutex;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let mut processor = BatchProcessor::new(RasterOptions::default());
        processor.set_progress_callback(move |page, total, _result| {
            seen_clone.lock().expect("lock poisoned").push((page, total));
        });
        processor.process(Path::new(TEST_PDF_PATH)).await?;

        let seen = seen.lock().expect("lock poisoned");
        assert_eq!(*seen, vec![(1, 2), (2, 2)]);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn pre_cancelled_run_aborts_through_cleanup() {
        let flag = CancelFlag::new();
        flag.cancel();
        let mut processor = BatchProcessor::new(RasterOptions::default());
        processor.set_cancel_flag(flag);
        let result = processor.process(Path::new(TEST_PDF_PATH)).await;
        assert!(result.is_err());
        assert_eq!(processor.state(), BatchState::Error);
    }
}
