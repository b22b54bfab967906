//! Loaded source documents.
//!
//! A [`Document`] is owned exclusively by one batch run. It holds the page
//! count probed up front, plus a temporary directory that collects every
//! render artifact produced for the run. Dropping the document reclaims all
//! of them.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use tokio::process::Command;

use crate::{command::run_command, error::PipelineError, prelude::*};

/// Matches the per-page size lines printed by `pdfinfo -f/-l`, e.g.
/// `Page    3 size: 612 x 792 pts (letter)`.
static PAGE_SIZE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Page\s+(\d+)\s+size:\s+([0-9.]+)\s+x\s+([0-9.]+)\s+pts")
        .expect("failed to compile regex")
});

/// The size of one page, in PDF points (1/72 inch).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSizePts {
    pub width: f32,
    pub height: f32,
}

/// An open multi-page source document.
///
/// Never shared or reused across runs: the batch orchestrator opens one,
/// drives every page through the pipeline, and drops it.
pub struct Document {
    /// The path to the source PDF.
    path: PathBuf,

    /// The total number of pages.
    page_count: u32,

    /// Scratch space for rendered pages and crops. Released by [`Drop`].
    tmpdir: tempfile::TempDir,
}

impl Document {
    /// Open a document, verifying it is a PDF and probing its page count.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        let mime_type = infer::get_from_path(path)
            .with_context(|| format!("failed to read {:?}", path.display()))?
            .ok_or_else(|| anyhow!("unknown file type for {:?}", path.display()))?
            .mime_type();
        if mime_type != "application/pdf" {
            return Err(anyhow!(
                "{:?} has type {}, but only PDF input is supported",
                path.display(),
                mime_type
            ));
        }

        let page_count = pdf_page_count(path).await?;
        let tmpdir = tempfile::TempDir::with_prefix("permit-split")?;
        Ok(Self {
            path: path.to_owned(),
            page_count,
            tmpdir,
        })
    }

    /// The path this document was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The total number of pages.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Scratch directory for render artifacts belonging to this run.
    pub fn scratch_dir(&self) -> &Path {
        self.tmpdir.path()
    }

    /// Check that `page` is a valid 1-based page number.
    pub fn check_page(&self, page: u32) -> Result<(), PipelineError> {
        if page == 0 || page > self.page_count {
            Err(PipelineError::PageNotFound {
                page,
                total: self.page_count,
            })
        } else {
            Ok(())
        }
    }

    /// Get the media size of one page, in points.
    #[instrument(level = "debug", skip(self))]
    pub async fn page_size(&self, page: u32) -> Result<PageSizePts> {
        self.check_page(page)?;
        let mut cmd = Command::new("pdfinfo");
        cmd.arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg(&self.path);
        let output = run_command("pdfinfo", &mut cmd).await?;
        let output =
            String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
        for line in output.lines() {
            if let Some(captures) = PAGE_SIZE_REGEX.captures(line) {
                let width = captures[2].parse::<f32>().context("bad page width")?;
                let height = captures[3].parse::<f32>().context("bad page height")?;
                return Ok(PageSizePts { width, height });
            }
        }
        Err(anyhow!(
            "failed to find size of page {} in pdfinfo output",
            page
        ))
    }
}

/// Get the number of pages in a PDF file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn pdf_page_count(path: &Path) -> Result<u32> {
    let mut cmd = Command::new("pdfinfo");
    cmd.arg(path);
    let output = run_command("pdfinfo", &mut cmd).await?;

    // Parse the output of pdfinfo into properties.
    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key.to_string(), value.to_string());
    }

    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str.parse::<u32>().with_context(|| {
        format!(
            "failed to parse page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}
