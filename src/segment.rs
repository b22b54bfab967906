//! Splitting recognized page text into labeled regions.
//!
//! Permit pages carry a handful of known headings. We scan the cleaned text
//! top to bottom, open a region whenever a heading anchor matches, and close
//! it at the next anchor or after a fixed line cap. Heading detection can
//! fail entirely on noisy scans, so the full page text is always kept as a
//! synthetic fallback region for downstream extractors.

use std::sync::LazyLock;

use regex::Regex;

use crate::prelude::*;

/// A region never captures more than this many lines. Without the cap, a
/// page whose later anchors were mangled by the engine would swallow
/// everything below the first heading.
const MAX_REGION_LINES: usize = 10;

/// Heading anchor for the permit-identifier block.
static IDENTIFIER_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:perm[i1l!|]t|card)\s*no\b").expect("failed to compile regex")
});

/// Heading anchor for the registration-plate block.
static PLATE_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)reg[i1l!|]stra[t7][i1l]on\s*plate|\bplate\s*no\b")
        .expect("failed to compile regex")
});

/// Heading anchor for the vehicle-data table.
static VEHICLE_DATA_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)veh[i1l!|]cle\s*da[t7]a").expect("failed to compile regex")
});

/// The logical sections we know how to label.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegionKind {
    /// The block under the permit-number heading.
    Identifier,
    /// The block under the registration-plate heading.
    Plate,
    /// The vehicle-data table.
    VehicleData,
}

impl RegionKind {
    /// Match a line against the heading anchors, in a fixed priority order.
    fn match_anchor(line: &str) -> Option<RegionKind> {
        if VEHICLE_DATA_ANCHOR.is_match(line) {
            Some(RegionKind::VehicleData)
        } else if PLATE_ANCHOR.is_match(line) {
            Some(RegionKind::Plate)
        } else if IDENTIFIER_ANCHOR.is_match(line) {
            Some(RegionKind::Identifier)
        } else {
            None
        }
    }
}

/// One labeled region: the lines captured under a heading anchor.
#[derive(Clone, Debug)]
pub struct Region {
    /// Which heading opened this region.
    pub kind: RegionKind,

    /// The heading line itself.
    pub heading: String,

    /// The captured lines, in page order. The heading is not included.
    pub lines: Vec<String>,
}

/// The segmented text of one page.
#[derive(Clone, Debug)]
pub struct PageRegions {
    /// Labeled regions, ordered by position in the page text.
    regions: Vec<Region>,

    /// The full page text, always available as a fallback.
    full_text: String,

    /// Lines attributed to no named region (text before the first anchor,
    /// heading lines, and overflow past the line cap).
    unattributed_lines: usize,
}

impl PageRegions {
    /// Segment cleaned page text into labeled regions.
    pub fn segment(text: &str) -> Self {
        let mut regions: Vec<Region> = Vec::new();
        let mut open: Option<Region> = None;
        let mut unattributed_lines = 0;

        for line in text.lines() {
            if let Some(kind) = RegionKind::match_anchor(line) {
                // A new anchor closes whatever was open.
                if let Some(region) = open.take() {
                    regions.push(region);
                }
                unattributed_lines += 1; // the heading line itself
                open = Some(Region {
                    kind,
                    heading: line.to_string(),
                    lines: Vec::new(),
                });
            } else if let Some(region) = open.as_mut() {
                region.lines.push(line.to_string());
                if region.lines.len() >= MAX_REGION_LINES {
                    // Force-close; scan on anchorless until the next heading.
                    regions.push(open.take().expect("region is open"));
                }
            } else {
                unattributed_lines += 1;
            }
        }
        if let Some(region) = open.take() {
            regions.push(region);
        }

        for region in &regions {
            trace!(
                kind = ?region.kind,
                heading = %region.heading,
                lines = region.lines.len(),
                "captured region"
            );
        }
        let result = Self {
            regions,
            full_text: text.to_string(),
            unattributed_lines,
        };
        debug!(
            region_count = result.regions().len(),
            unattributed_lines = result.unattributed_lines(),
            "segmented page text"
        );
        result
    }

    /// Get the first region of the given kind, if any was detected.
    pub fn get(&self, kind: RegionKind) -> Option<&Region> {
        self.regions.iter().find(|r| r.kind == kind)
    }

    /// All labeled regions, in page order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The synthetic full-text region.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Lines attributed to no named region.
    pub fn unattributed_lines(&self) -> usize {
        self.unattributed_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_headings_into_named_regions() {
        let text = "TRANSIT AUTHORITY\nPERMIT No.\n1234\nVEHICLE DATA\nMAKE PLATE\nDACIA AAW-207";
        let regions = PageRegions::segment(text);

        let identifier = regions.get(RegionKind::Identifier).expect("identifier");
        assert_eq!(identifier.lines, vec!["1234"]);

        let vehicle = regions.get(RegionKind::VehicleData).expect("vehicle data");
        assert_eq!(vehicle.lines, vec!["MAKE PLATE", "DACIA AAW-207"]);
    }

    #[test]
    fn tolerates_ocr_noise_in_headings() {
        let text = "PERM|T No\n4711\nVEH1CLE DA7A\nsomething";
        let regions = PageRegions::segment(text);
        assert!(regions.get(RegionKind::Identifier).is_some());
        assert!(regions.get(RegionKind::VehicleData).is_some());
    }

    #[test]
    fn region_closes_after_line_cap() {
        let mut text = String::from("PERMIT No.\n");
        for i in 0..15 {
            text.push_str(&format!("line {i}\n"));
        }
        let regions = PageRegions::segment(&text);
        let identifier = regions.get(RegionKind::Identifier).expect("identifier");
        assert_eq!(identifier.lines.len(), 10);
        // The overflow is not silently attached to any region.
        assert_eq!(regions.unattributed_lines(), 1 + 5);
    }

    #[test]
    fn pre_anchor_text_is_only_in_full_text() {
        let text = "stray header line\nanother one\nPLATE No\nAAW207";
        let regions = PageRegions::segment(text);
        let plate = regions.get(RegionKind::Plate).expect("plate");
        assert_eq!(plate.lines, vec!["AAW207"]);
        assert!(regions.full_text().contains("stray header line"));
    }

    #[test]
    fn no_line_is_counted_twice() {
        let samples = [
            "",
            "no anchors at all\njust text",
            "PERMIT No.\n1234\nPLATE No\nAAW207\ntail",
            "PERMIT No.\nPERMIT No.\n1234",
        ];
        for text in samples {
            let regions = PageRegions::segment(text);
            let named: usize = regions.regions().iter().map(|r| r.lines.len()).sum();
            let total = text.lines().count();
            assert_eq!(
                named + regions.unattributed_lines(),
                total,
                "line accounting mismatch for {text:?}"
            );
        }
    }

    #[test]
    fn page_with_no_anchors_keeps_everything_in_full_text() {
        let text = "completely\nunstructured\npage";
        let regions = PageRegions::segment(text);
        assert!(regions.regions().is_empty());
        assert_eq!(regions.full_text(), text);
        assert_eq!(regions.unattributed_lines(), 3);
    }
}
