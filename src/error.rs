//! Pipeline error taxonomy.
//!
//! Note that an extractor exhausting all of its strategies is _not_ an error:
//! it yields a `None` field in the page result. Errors here are reserved for
//! conditions the caller must react to.

use thiserror::Error;

/// Errors produced by the recognition and splitting pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A page index outside `1..=total` was requested.
    #[error("page {page} not found in document with {total} pages")]
    PageNotFound {
        /// The requested 1-based page number.
        page: u32,
        /// The number of pages in the document.
        total: u32,
    },

    /// The recognition engine failed or returned no usable text.
    #[error("recognition produced no usable text: {0}")]
    RecognitionFailure(String),

    /// Writing one page during a split failed. Recorded per page; never
    /// aborts the remaining pages.
    #[error("failed to write page {page} during split: {message}")]
    SplitWriteFailure {
        /// The 1-based page number that failed.
        page: u32,
        /// What went wrong.
        message: String,
    },

    /// The batch run was stopped before completing all pages.
    #[error("batch aborted: {0}")]
    BatchAborted(String),
}
