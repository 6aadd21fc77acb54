use crate::types::{CandidateScore, ProductCandidate, SelectedProduct, TileSelection};
use geo::{Area, BooleanOps};

/// Why a candidate was not eligible
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    MissingCloudCover,
    /// Not a percentage in 0..=100
    InvalidCloudCover(f64),
    TooCloudy(f64),
    InsufficientCoverage(f64),
}

/// Picks the best product for a tile-month.
///
/// A candidate is eligible when its cloud cover is a known percentage no greater than
/// `max_cloud_cover`, and its footprint covers at least `min_coverage` of the
/// tile's ROI-clipped area. Among eligible candidates the highest
/// `(1 - cloud/100) * coverage` wins; on equal scores the first one seen is
/// kept.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRanker {
    pub max_cloud_cover: f64,
    pub min_coverage: f64,
}

impl CandidateRanker {
    pub fn new(max_cloud_cover: f64, min_coverage: f64) -> Self {
        Self {
            max_cloud_cover,
            min_coverage,
        }
    }

    /// Fraction of the selection's clipped area covered by `footprint`
    pub fn coverage_fraction(selection: &TileSelection, footprint: &crate::types::Footprint) -> f64 {
        let target_area = selection.intersection.unsigned_area();
        if target_area <= 0.0 {
            return 0.0;
        }

        let covered = selection.intersection.intersection(footprint).unsigned_area();
        (covered / target_area).clamp(0.0, 1.0)
    }

    /// Score a single candidate, or explain why it is not eligible
    pub fn score(
        &self,
        candidate: &ProductCandidate,
        selection: &TileSelection,
    ) -> Result<CandidateScore, Rejection> {
        let cloud_cover = candidate.cloud_cover.ok_or(Rejection::MissingCloudCover)?;
        if !(0.0..=100.0).contains(&cloud_cover) {
            return Err(Rejection::InvalidCloudCover(cloud_cover));
        }
        if cloud_cover > self.max_cloud_cover {
            return Err(Rejection::TooCloudy(cloud_cover));
        }

        let coverage = Self::coverage_fraction(selection, &candidate.footprint);
        if coverage < self.min_coverage {
            return Err(Rejection::InsufficientCoverage(coverage));
        }

        Ok(CandidateScore::new(coverage, cloud_cover))
    }

    /// Return the best eligible candidate, or `None` if nothing qualifies
    pub fn rank(
        &self,
        candidates: &[ProductCandidate],
        selection: &TileSelection,
    ) -> Option<SelectedProduct> {
        let mut best: Option<(usize, CandidateScore)> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let score = match self.score(candidate, selection) {
                Ok(score) => score,
                Err(rejection) => {
                    log::debug!("Rejected {} for tile {}: {:?}", candidate.name, selection.tile_id(), rejection);
                    continue;
                }
            };

            // strict comparison keeps the first of equally scored candidates
            let replace = match &best {
                None => true,
                Some((_, current)) => score.score > current.score,
            };

            if replace {
                best = Some((index, score));
            }
        }

        best.map(|(index, score)| SelectedProduct {
            candidate: candidates[index].clone(),
            score,
        })
    }
}
