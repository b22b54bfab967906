//! Re-emitting a processed document as one file per page.
//!
//! Each page is copied into a fresh single-page PDF named by the recovered
//! identifier (or a fallback), using poppler's `pdfseparate`. A failure on
//! one page is recorded and the splitter moves on: the caller gets a
//! combined success/error list and can act on the pages that worked.

use std::collections::HashSet;

use schemars::JsonSchema;
use tokio::process::Command;

use crate::{
    batch::{BatchResult, PageResult},
    command::run_command,
    error::PipelineError,
    prelude::*,
};

/// A page successfully written to its own file.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SplitEntry {
    /// The 1-based page number in the source document.
    pub page: u32,

    /// The identifier code the file is named after, if one was recovered.
    pub code: Option<String>,

    /// The vehicle plate recovered for this page, if any.
    pub plate: Option<String>,

    /// The output file name.
    pub file_name: String,

    /// The full output path.
    pub path: PathBuf,
}

/// A page that could not be written.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SplitFailure {
    /// The 1-based page number in the source document.
    pub page: u32,

    /// The identifier code recovered for this page, if any.
    pub code: Option<String>,

    /// What went wrong.
    pub error: String,
}

/// The combined result of one split invocation.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SplitOutcome {
    /// Where the files were written.
    pub dest_dir: PathBuf,

    /// How many pages the source document has.
    pub total_pages: u32,

    /// Files created, in page order.
    pub created: Vec<SplitEntry>,

    /// Pages that failed, in page order.
    pub failed: Vec<SplitFailure>,
}

/// Pick the output name for a page: the identifier code, else the plate,
/// else a positional fallback.
pub fn choose_output_name(result: &PageResult) -> String {
    if let Some(code) = &result.code {
        code.clone()
    } else if let Some(plate) = &result.plate {
        plate.clone()
    } else {
        format!("PAGE_{}", result.page)
    }
}

/// Resolve a name collision within one split by appending the page number.
fn unique_name(base: String, page: u32, used: &mut HashSet<String>) -> String {
    let name = if used.contains(&base.to_uppercase()) {
        format!("{base}_{page}")
    } else {
        base
    };
    used.insert(name.to_uppercase());
    name
}

/// Split `source` into one single-page PDF per page under `dest_dir`.
///
/// Attempts every page regardless of individual failures. On success each
/// page's `output_path` in `batch` is updated in place, so the caller can
/// act on the split files without re-reading the filesystem.
#[instrument(level = "debug", skip(batch), fields(source = %source.display()))]
pub async fn split_document(
    source: &Path,
    batch: &mut BatchResult,
    dest_dir: &Path,
) -> Result<SplitOutcome> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("failed to create {:?}", dest_dir.display()))?;
    let tmpdir = tempfile::TempDir::with_prefix("split")?;

    let total_pages = batch.pages.len() as u32;
    let mut created = Vec::new();
    let mut failed = Vec::new();
    let mut used_names = HashSet::new();

    for page_result in &mut batch.pages {
        let page = page_result.page;
        let base = choose_output_name(page_result);
        let name = unique_name(base, page, &mut used_names);
        let file_name = format!("{name}.pdf");
        let dest_path = dest_dir.join(&file_name);

        match write_single_page(source, page, tmpdir.path(), &dest_path).await {
            Ok(()) => {
                page_result.output_path = Some(dest_path.clone());
                created.push(SplitEntry {
                    page,
                    code: page_result.code.clone(),
                    plate: page_result.plate.clone(),
                    file_name,
                    path: dest_path,
                });
            }
            Err(err) => {
                let err = PipelineError::SplitWriteFailure {
                    page,
                    message: format!("{err:#}"),
                };
                warn!("{err}");
                failed.push(SplitFailure {
                    page,
                    code: page_result.code.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        created = created.len(),
        failed = failed.len(),
        "split {:?} into {:?}",
        source,
        dest_dir
    );
    Ok(SplitOutcome {
        dest_dir: dest_dir.to_owned(),
        total_pages,
        created,
        failed,
    })
}

/// Copy exactly one page of `source` to `dest_path`.
async fn write_single_page(
    source: &Path,
    page: u32,
    scratch: &Path,
    dest_path: &Path,
) -> Result<()> {
    let extracted = scratch.join(format!("page-{page:05}.pdf"));
    let mut cmd = Command::new("pdfseparate");
    cmd.arg("-f")
        .arg(page.to_string())
        .arg("-l")
        .arg(page.to_string())
        .arg(source)
        .arg(&extracted);
    run_command("pdfseparate", &mut cmd).await?;

    tokio::fs::copy(&extracted, dest_path)
        .await
        .with_context(|| format!("failed to write {:?}", dest_path.display()))?;
    // Reclaim the intermediate file right away; large batches would
    // otherwise hold every page twice until the tempdir drops.
    tokio::fs::remove_file(&extracted)
        .await
        .with_context(|| format!("failed to delete {:?}", extracted.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PageResult;

    fn page_result(page: u32, code: Option<&str>, plate: Option<&str>) -> PageResult {
        PageResult {
            page,
            code: code.map(String::from),
            plate: plate.map(String::from),
            success: true,
            error: None,
            output_path: None,
        }
    }

    #[test]
    fn output_name_prefers_code_then_plate_then_fallback() {
        assert_eq!(
            choose_output_name(&page_result(1, Some("1234"), Some("AAW207"))),
            "1234"
        );
        assert_eq!(
            choose_output_name(&page_result(1, None, Some("AAW207"))),
            "AAW207"
        );
        assert_eq!(choose_output_name(&page_result(2, None, None)), "PAGE_2");
    }

    #[test]
    fn colliding_names_get_the_page_number_appended() {
        let mut used = HashSet::new();
        assert_eq!(unique_name("1234".to_string(), 1, &mut used), "1234");
        assert_eq!(unique_name("1234".to_string(), 3, &mut used), "1234_3");
        assert_eq!(unique_name("5678".to_string(), 4, &mut used), "5678");
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn splits_every_page_with_fallback_names() -> Result<()> {
        let source = Path::new("tests/fixtures/two_pages.pdf");
        let dest = tempfile::TempDir::with_prefix("split-test")?;
        let mut batch = BatchResult {
            source: source.to_owned(),
            pages: vec![
                page_result(1, Some("1234"), None),
                page_result(2, None, None),
            ],
        };

        let outcome = split_document(source, &mut batch, dest.path()).await?;
        assert_eq!(outcome.total_pages, 2);
        assert_eq!(outcome.failed.len(), 0);
        let names: Vec<&str> = outcome
            .created
            .iter()
            .map(|e| e.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["1234.pdf", "PAGE_2.pdf"]);
        // The batch records were annotated in place.
        assert!(batch.pages[0].output_path.is_some());
        assert!(dest.path().join("1234.pdf").exists());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn one_bad_page_does_not_abort_the_rest() -> Result<()> {
        let source = Path::new("tests/fixtures/two_pages.pdf");
        let dest = tempfile::TempDir::with_prefix("split-test")?;
        // Page 3 does not exist in the fixture; pdfseparate will fail on it.
        let mut batch = BatchResult {
            source: source.to_owned(),
            pages: vec![
                page_result(1, Some("1234"), None),
                page_result(3, Some("5678"), None),
            ],
        };

        let outcome = split_document(source, &mut batch, dest.path()).await?;
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].page, 3);
        Ok(())
    }
}
