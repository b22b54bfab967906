//! Text recognition, wrapping the `tesseract` CLI tool.
//!
//! Recognized text passes through [`normalize_text`] before anything
//! downstream sees it, so the segmenter and the extractors can assume the
//! common recognition artifacts are already repaired.

use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

use crate::{command::run_command, error::PipelineError, prelude::*, raster::PageBitmap};

/// The character set the engine is allowed to produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Charset {
    /// Full alphanumeric output, for general page text.
    Full,
    /// Digits only, for code-hunting passes over cropped regions.
    Digits,
}

/// The page-segmentation hint passed to the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Segmentation {
    /// Automatic layout analysis, for whole pages.
    Auto,
    /// Treat the bitmap as a single uniform block, for crops.
    SingleBlock,
}

impl Segmentation {
    /// The tesseract `--psm` value for this mode.
    fn psm(self) -> &'static str {
        match self {
            Segmentation::Auto => "3",
            Segmentation::SingleBlock => "6",
        }
    }
}

/// The result of one recognition pass.
#[derive(Clone, Debug)]
pub struct Recognition {
    /// The recognized text, already passed through [`normalize_text`].
    pub text: String,

    /// Mean word confidence, 0-100.
    pub confidence: f32,
}

/// Recognize the text in a bitmap.
#[instrument(level = "debug", skip_all, fields(charset = ?charset, segmentation = ?segmentation))]
pub async fn recognize(
    bitmap: &PageBitmap,
    charset: Charset,
    segmentation: Segmentation,
) -> Result<Recognition> {
    // Run tesseract against the bitmap's backing PNG, collecting both the
    // plain text and the TSV output (for word confidences).
    let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
    let out_base = tmpdir.path().join("output");
    let mut cmd = Command::new("tesseract");
    cmd.arg(&bitmap.png_path)
        .arg(&out_base)
        .arg("--psm")
        .arg(segmentation.psm());
    if charset == Charset::Digits {
        cmd.arg("-c").arg("tessedit_char_whitelist=0123456789");
    }
    cmd.arg("txt").arg("tsv");
    run_command("tesseract", &mut cmd).await?;

    let text = tokio::fs::read_to_string(out_base.with_extension("txt"))
        .await
        .context("cannot read tesseract text output")?;
    let tsv = tokio::fs::read_to_string(out_base.with_extension("tsv"))
        .await
        .context("cannot read tesseract tsv output")?;

    let text = normalize_text(&text);
    if text.trim().is_empty() {
        return Err(PipelineError::RecognitionFailure(format!(
            "tesseract returned no text for {:?}",
            bitmap.png_path.display()
        ))
        .into());
    }

    Ok(Recognition {
        text,
        confidence: mean_word_confidence(&tsv),
    })
}

/// Mean confidence of the word rows in tesseract's TSV output.
///
/// Word rows have level 5; rows with a negative confidence are layout
/// artifacts, not words.
fn mean_word_confidence(tsv: &str) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let (Ok(level), Ok(conf)) = (fields[0].parse::<u32>(), fields[10].parse::<f32>())
        else {
            continue;
        };
        if level == 5 && conf >= 0.0 {
            sum += conf;
            count += 1;
        }
    }
    if count > 0 { sum / count as f32 } else { 0.0 }
}

/// Number-sign glyph variants the engine produces for the "No." marker.
static NUMBER_SIGN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"№|N[°º]\.?|N0\.").expect("failed to compile regex"));

/// A pair of digits split by one or two stray spaces.
static SPLIT_DIGITS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)[ \t]{1,2}(\d)").expect("failed to compile regex"));

/// A run of 3+ spaces: almost always a flattened table column boundary.
static COLUMN_GAP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{3,}").expect("failed to compile regex"));

/// Any remaining run of 2+ spaces.
static EXTRA_SPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("failed to compile regex"));

/// Known letter/digit confusions in the fixed document vocabulary.
const MISRECOGNITIONS: &[(&str, &str)] = &[
    ("PERM1T", "PERMIT"),
    ("PERMLT", "PERMIT"),
    ("VEH1CLE", "VEHICLE"),
    ("VEHlCLE", "VEHICLE"),
    ("PLA7E", "PLATE"),
    ("REG1STRATION", "REGISTRATION"),
];

/// Clean up recognized text.
///
/// This is a pure text-to-text transform, and it is idempotent: applying it
/// twice yields the same result as applying it once.
pub fn normalize_text(text: &str) -> String {
    // Canonicalize the number-sign marker first, so "N0." never survives to
    // look like a digit sequence.
    let mut text = NUMBER_SIGN_REGEX.replace_all(text, "No.").into_owned();

    // Rejoin digit runs split by stray whitespace ("8 0 3" -> "803"). A
    // single pass leaves alternating gaps behind, so iterate to a fixed
    // point.
    loop {
        let collapsed = SPLIT_DIGITS_REGEX.replace_all(&text, "$1$2");
        if collapsed == text {
            break;
        }
        text = collapsed.into_owned();
    }

    // Wide gaps are table columns the engine flattened; narrow ones are
    // noise.
    let text = COLUMN_GAP_REGEX.replace_all(&text, "\n");
    let mut text = EXTRA_SPACE_REGEX.replace_all(&text, " ").into_owned();

    for (wrong, right) in MISRECOGNITIONS {
        text = text.replace(wrong, right);
    }
    text
}
