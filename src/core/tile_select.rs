use crate::types::{RegionOfInterest, TileDefinition, TileSelection};
use geo::{Area, BooleanOps};

/// Filters the tiling grid down to tiles that overlap the region of interest
pub struct TileSelector {
    min_intersection: f64,
}

impl TileSelector {
    /// `min_intersection` is the minimum fraction (0..=1) of a tile's bounding
    /// box that must fall inside the region of interest.
    pub fn new(min_intersection: f64) -> Self {
        Self { min_intersection }
    }

    /// Clip `tile` to the region of interest. Returns `None` when the overlap is
    /// empty or below the configured fraction.
    pub fn evaluate(&self, tile: &TileDefinition, roi: &RegionOfInterest) -> Option<TileSelection> {
        let tile_area = tile.bbox.area();
        if tile_area <= 0.0 {
            log::warn!("Tile {} has a degenerate bounding box", tile.id);
            return None;
        }

        let intersection = roi.geometry().intersection(&tile.bbox.to_footprint());
        let overlap = intersection.unsigned_area();

        // Disjoint tiles are dropped even with a zero threshold
        if overlap <= 0.0 {
            return None;
        }

        let fraction = (overlap / tile_area).clamp(0.0, 1.0);
        if fraction < self.min_intersection {
            log::debug!(
                "Tile {} overlaps ROI by {:.1}%, below threshold",
                tile.id,
                fraction * 100.0
            );
            return None;
        }

        Some(TileSelection {
            tile: tile.clone(),
            intersection,
            intersection_fraction: fraction,
        })
    }

    /// Select tiles in grid order
    pub fn select(&self, tiles: &[TileDefinition], roi: &RegionOfInterest) -> Vec<TileSelection> {
        let selected: Vec<TileSelection> = tiles
            .iter()
            .filter_map(|tile| self.evaluate(tile, roi))
            .collect();

        log::info!(
            "Selected {} of {} tiles (minimum intersection {:.0}%)",
            selected.len(),
            tiles.len(),
            self.min_intersection * 100.0
        );

        selected
    }
}
