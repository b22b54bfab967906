//! Identifier-code extraction.
//!
//! The permit identifier is a 4-digit code, frequently stamped in the lower
//! left corner of the page where general-layout recognition does poorly. The
//! text strategies run first, in a strict priority order; only when all of
//! them come up empty do we pay for a second, cropped recognition pass.

use std::sync::LazyLock;

use regex::Regex;

use super::{
    FieldStrategy,
    validate::{four_digit_runs, has_context_keyword, is_valid_code},
};
use crate::{
    document::Document,
    prelude::*,
    raster::{CropRect, render_crop},
    recognize::{Charset, Recognition, Segmentation, recognize},
    segment::{PageRegions, RegionKind},
};

/// The stamped code usually sits in the bottom-left quadrant of the page.
const CODE_STAMP_REGION: CropRect = CropRect {
    x: 0.0,
    y: 0.70,
    width: 0.35,
    height: 0.30,
};

/// Identifier-heading-like lines, tolerating misspellings the cleanup table
/// does not cover.
static HEADING_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:permit|perm[i1l!|][t7]|p[ef]rm[i1l!|]t|card)\s*n[o0]")
        .expect("failed to compile regex")
});

/// A line containing a number marker, used to find "marker, code on the next
/// line" layouts inside the identifier region.
static NUMBER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bno\.?(?:\s|$)").expect("failed to compile regex"));

/// How many lines below a heading-like line we search for the code.
const HEADING_SCAN_WINDOW: usize = 8;

/// The ordered strategy chain for the identifier code.
pub fn strategies() -> Vec<Box<dyn FieldStrategy>> {
    vec![
        Box::new(IdentifierRegion),
        Box::new(HeadingProximity),
        Box::new(IsolatedLine),
        Box::new(IsolatedToken),
    ]
}

/// Strategy 1: look inside the identifier region.
struct IdentifierRegion;

impl FieldStrategy for IdentifierRegion {
    fn name(&self) -> &'static str {
        "identifier-region"
    }

    fn try_extract(&self, regions: &PageRegions) -> Option<String> {
        let region = regions.get(RegionKind::Identifier)?;

        // A line that is nothing but the code.
        for line in &region.lines {
            let token = line.trim();
            if is_valid_code(token) {
                return Some(token.to_string());
            }
        }

        // A number marker with the code on the following line.
        for pair in region.lines.windows(2) {
            if NUMBER_MARKER.is_match(&pair[0]) {
                let token = pair[1].trim();
                if is_valid_code(token) {
                    return Some(token.to_string());
                }
            }
        }
        None
    }
}

/// Strategy 2: scan the full text for a heading-like line, then search the
/// lines just below it. Catches pages where heading noise defeated the
/// segmenter.
struct HeadingProximity;

impl FieldStrategy for HeadingProximity {
    fn name(&self) -> &'static str {
        "heading-proximity"
    }

    fn try_extract(&self, regions: &PageRegions) -> Option<String> {
        let lines: Vec<&str> = regions.full_text().lines().collect();
        for (i, line) in lines.iter().enumerate() {
            if !HEADING_LIKE.is_match(line) {
                continue;
            }
            for candidate in lines.iter().skip(i + 1).take(HEADING_SCAN_WINDOW) {
                for token in four_digit_runs(candidate) {
                    if is_valid_code(token) {
                        return Some(token.to_string());
                    }
                }
            }
        }
        None
    }
}

/// Strategy 3: a full-text line that is only the code.
struct IsolatedLine;

impl FieldStrategy for IsolatedLine {
    fn name(&self) -> &'static str {
        "isolated-line"
    }

    fn try_extract(&self, regions: &PageRegions) -> Option<String> {
        for line in regions.full_text().lines() {
            let token = line.trim();
            if is_valid_code(token) {
                return Some(token.to_string());
            }
        }
        None
    }
}

/// Strategy 4: any isolated 4-digit token in the full text, skipping lines
/// whose digits belong to an organization. Whole-line candidates win over
/// embedded ones.
struct IsolatedToken;

impl FieldStrategy for IsolatedToken {
    fn name(&self) -> &'static str {
        "isolated-token"
    }

    fn try_extract(&self, regions: &PageRegions) -> Option<String> {
        let mut embedded: Option<String> = None;
        for line in regions.full_text().lines() {
            if has_context_keyword(line) {
                continue;
            }
            for token in four_digit_runs(line) {
                if !is_valid_code(token) {
                    continue;
                }
                if line.trim() == token {
                    return Some(token.to_string());
                }
                embedded.get_or_insert_with(|| token.to_string());
            }
        }
        embedded
    }
}

/// The identifier-code extractor: the text strategy chain, then the cropped
/// re-recognition fallback.
pub struct CodeExtractor {
    strategies: Vec<Box<dyn FieldStrategy>>,
}

impl CodeExtractor {
    pub fn new() -> Self {
        Self {
            strategies: strategies(),
        }
    }

    /// Run the text strategies in order, stopping at the first validated
    /// value.
    pub fn extract_from_text(&self, regions: &PageRegions) -> Option<String> {
        for strategy in &self.strategies {
            if let Some(code) = strategy.try_extract(regions) {
                debug!(strategy = strategy.name(), code = %code, "extracted code");
                return Some(code);
            }
        }
        None
    }

    /// Run the full chain, including the cropped recognition pass.
    #[instrument(level = "debug", skip(self, doc, regions))]
    pub async fn extract(
        &self,
        doc: &Document,
        page: u32,
        scale: u32,
        regions: &PageRegions,
    ) -> Result<Option<String>> {
        if let Some(code) = self.extract_from_text(regions) {
            return Ok(Some(code));
        }
        code_from_stamp_region(doc, page, scale).await
    }
}

impl Default for CodeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Final fallback: re-render the bottom-left stamp region and recognize it
/// digits-only as a single block.
///
/// A recognition failure here is a null result, not an error: the stamp may
/// simply be absent.
#[instrument(level = "debug", skip(doc))]
async fn code_from_stamp_region(
    doc: &Document,
    page: u32,
    scale: u32,
) -> Result<Option<String>> {
    let bitmap = render_crop(doc, page, CODE_STAMP_REGION, scale).await?;
    let recognition: Result<Recognition> =
        recognize(&bitmap, Charset::Digits, Segmentation::SingleBlock).await;
    let Ok(recognition) = recognition else {
        debug!("stamp-region recognition produced nothing usable");
        return Ok(None);
    };
    Ok(code_from_digit_text(&recognition.text))
}

/// Apply the 4-digit/year rule to the narrow digits-only output.
fn code_from_digit_text(text: &str) -> Option<String> {
    // Prefer a line that is exactly the code.
    for line in text.lines() {
        let token = line.trim();
        if is_valid_code(token) {
            return Some(token.to_string());
        }
    }
    for line in text.lines() {
        for token in four_digit_runs(line) {
            if is_valid_code(token) {
                return Some(token.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmented(text: &str) -> PageRegions {
        PageRegions::segment(text)
    }

    #[test]
    fn region_strategy_finds_isolated_code() {
        let regions = segmented("PERMIT No.\n1234\nother text");
        assert_eq!(
            IdentifierRegion.try_extract(&regions),
            Some("1234".to_string())
        );
    }

    #[test]
    fn region_strategy_finds_code_after_marker_line() {
        let regions = segmented("PERMIT No.\nSERIES B No.\n0803");
        assert_eq!(
            IdentifierRegion.try_extract(&regions),
            Some("0803".to_string())
        );
    }

    #[test]
    fn region_strategy_requires_the_region() {
        let regions = segmented("no headings here\n1234");
        assert_eq!(IdentifierRegion.try_extract(&regions), None);
    }

    #[test]
    fn heading_proximity_scans_a_bounded_window() {
        let mut text = String::from("PFRMIT N0 something\n");
        for _ in 0..8 {
            text.push_str("filler\n");
        }
        text.push_str("1234\n");
        // The code sits 9 lines below the heading: out of range.
        let regions = segmented(&text);
        assert_eq!(HeadingProximity.try_extract(&regions), None);

        let text = "PFRMIT N0 something\nfiller\n1234";
        let regions = segmented(text);
        assert_eq!(
            HeadingProximity.try_extract(&regions),
            Some("1234".to_string())
        );
    }

    #[test]
    fn isolated_line_excludes_years() {
        let regions = segmented("2025");
        assert_eq!(IsolatedLine.try_extract(&regions), None);

        let regions = segmented("1987");
        assert_eq!(IsolatedLine.try_extract(&regions), Some("1987".to_string()));
    }

    #[test]
    fn isolated_token_skips_organizational_lines() {
        let regions = segmented("COMPANY 4711\nexpires 2025");
        assert_eq!(IsolatedToken.try_extract(&regions), None);

        let regions = segmented("stamped 4711 in text");
        assert_eq!(
            IsolatedToken.try_extract(&regions),
            Some("4711".to_string())
        );
    }

    #[test]
    fn isolated_token_prefers_whole_line_candidates() {
        let regions = segmented("note 5678 embedded\n4711");
        assert_eq!(
            IsolatedToken.try_extract(&regions),
            Some("4711".to_string())
        );
    }

    #[test]
    fn chain_stops_at_first_success() {
        let extractor = CodeExtractor::new();
        // Both the region strategy and the isolated-token strategy would
        // match here; the region strategy wins.
        let regions = segmented("PERMIT No.\n1234\nunrelated 5678");
        assert_eq!(
            extractor.extract_from_text(&regions),
            Some("1234".to_string())
        );
    }

    #[test]
    fn chain_returns_none_when_everything_fails() {
        let extractor = CodeExtractor::new();
        let regions = segmented("only years here\n2025\nand words");
        assert_eq!(extractor.extract_from_text(&regions), None);
    }

    #[test]
    fn digit_text_rule_matches_crop_output() {
        assert_eq!(code_from_digit_text("4711\n"), Some("4711".to_string()));
        assert_eq!(code_from_digit_text("2025\n"), None);
        assert_eq!(code_from_digit_text("99 4711"), Some("4711".to_string()));
        assert_eq!(code_from_digit_text(""), None);
    }
}
