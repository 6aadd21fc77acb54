use crate::core::ranking::CandidateRanker;
use crate::io::catalog::{CatalogClient, CatalogQuery};
use crate::types::{DownloadTask, SelectedProduct, TileSelection};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Rough archive size used for the download estimate shown to the user
pub const ESTIMATED_GB_PER_PRODUCT: usize = 1;

/// Result of one (year, month, tile) combination
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Selected(SelectedProduct),
    NoCandidate,
    /// The catalog query failed or returned an unusable response; the
    /// combination is skipped
    QueryFailed(String),
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub year: i32,
    pub month: u32,
    pub tile_id: String,
    pub outcome: PlanOutcome,
}

impl std::fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}, tile={}: ", self.month, self.year, self.tile_id)?;
        match &self.outcome {
            PlanOutcome::Selected(product) => write!(f, "{} {}", product.candidate.name, product.score),
            PlanOutcome::NoCandidate => write!(f, "None"),
            PlanOutcome::QueryFailed(reason) => write!(f, "None (query failed: {})", reason),
        }
    }
}

/// Ordered download plan plus the per-combination report
#[derive(Debug, Clone, Default)]
pub struct AcquisitionPlan {
    pub tasks: Vec<DownloadTask>,
    pub entries: Vec<PlanEntry>,
}

impl AcquisitionPlan {
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn estimated_size_gb(&self) -> usize {
        self.tasks.len() * ESTIMATED_GB_PER_PRODUCT
    }

    pub fn failed_queries(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, PlanOutcome::QueryFailed(_)))
            .count()
    }
}

/// Walks year -> month -> tile, asking the catalog once per combination and
/// keeping the best product of each.
pub struct AcquisitionPlanner<'a, C: CatalogClient> {
    catalog: &'a C,
    min_coverage: f64,
    output_root: PathBuf,
}

impl<'a, C: CatalogClient> AcquisitionPlanner<'a, C> {
    pub fn new(catalog: &'a C, min_coverage: f64, output_root: &Path) -> Self {
        Self {
            catalog,
            min_coverage,
            output_root: output_root.to_path_buf(),
        }
    }

    /// Destination directory `output_root/year/month/tile_id`
    pub fn destination_dir(&self, year: i32, month: u32, tile_id: &str) -> PathBuf {
        self.output_root
            .join(year.to_string())
            .join(month.to_string())
            .join(tile_id)
    }

    pub fn plan(
        &self,
        years: RangeInclusive<i32>,
        months: &BTreeSet<u32>,
        tiles: &[TileSelection],
        max_cloud_cover: f64,
    ) -> AcquisitionPlan {
        let ranker = CandidateRanker::new(max_cloud_cover, self.min_coverage);
        let mut plan = AcquisitionPlan::default();

        for year in years {
            for month in (1..=12u32).filter(|m| months.contains(m)) {
                for selection in tiles {
                    let entry = self.plan_one(&ranker, year, month, selection);
                    log::debug!("{}", entry);

                    if let PlanOutcome::Selected(product) = &entry.outcome {
                        plan.tasks.push(DownloadTask {
                            external_id: product.candidate.external_id.clone(),
                            destination_dir: self.destination_dir(year, month, selection.tile_id()),
                            year,
                            month,
                            tile_id: selection.tile_id().to_string(),
                            product_name: product.candidate.name.clone(),
                        });
                    }

                    plan.entries.push(entry);
                }
            }
        }

        log::info!(
            "Planned {} downloads from {} combinations ({} failed queries)",
            plan.total(),
            plan.entries.len(),
            plan.failed_queries()
        );

        plan
    }

    fn plan_one(
        &self,
        ranker: &CandidateRanker,
        year: i32,
        month: u32,
        selection: &TileSelection,
    ) -> PlanEntry {
        let query = CatalogQuery {
            tile_id: selection.tile_id().to_string(),
            year,
            month,
            max_cloud_cover: ranker.max_cloud_cover,
        };

        let outcome = match self.catalog.search(&query) {
            Ok(candidates) => match ranker.rank(&candidates, selection) {
                Some(product) => PlanOutcome::Selected(product),
                None => PlanOutcome::NoCandidate,
            },
            Err(e) => {
                log::warn!("Skipping {}/{} tile {}: {}", month, year, selection.tile_id(), e);
                PlanOutcome::QueryFailed(e.to_string())
            }
        };

        PlanEntry {
            year,
            month,
            tile_id: selection.tile_id().to_string(),
            outcome,
        }
    }
}
