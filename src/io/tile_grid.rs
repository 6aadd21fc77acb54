use crate::types::{BoundingBox, FetchError, FetchResult, TileDefinition};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// What to do with a grid line that does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedRecordPolicy {
    /// Stop loading and return the error
    #[default]
    Abort,
    /// Log the record and keep going
    Skip,
}

/// Loader for the Sentinel-2 tiling system definition.
///
/// The dataset is whitespace-delimited text with one header line. Field 0 is
/// the tile identifier and fields 5-8 are minLon, maxLon, minLat, maxLat in
/// decimal degrees.
pub struct TileGridLoader {
    policy: MalformedRecordPolicy,
}

impl TileGridLoader {
    const ID_FIELD: usize = 0;
    const BBOX_FIELDS: usize = 5;
    const MIN_FIELD_COUNT: usize = 9;

    pub fn new(policy: MalformedRecordPolicy) -> Self {
        Self { policy }
    }

    /// Load the grid from a file on disk
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> FetchResult<Vec<TileDefinition>> {
        log::info!("Reading tile grid: {}", path.as_ref().display());

        let file = File::open(&path)?;
        self.load(BufReader::new(file))
    }

    /// Parse every record of the grid in file order
    pub fn load<R: BufRead>(&self, source: R) -> FetchResult<Vec<TileDefinition>> {
        let mut tiles = Vec::new();
        let mut skipped = 0usize;

        for (index, line) in source.lines().enumerate() {
            let line = line?;
            if index == 0 || line.trim().is_empty() {
                continue;
            }

            match Self::parse_record(index + 1, &line) {
                Ok(tile) => tiles.push(tile),
                Err(e) => match self.policy {
                    MalformedRecordPolicy::Abort => return Err(e),
                    MalformedRecordPolicy::Skip => {
                        log::warn!("Skipping grid record: {}", e);
                        skipped += 1;
                    }
                },
            }
        }

        log::info!("Loaded {} tiles ({} malformed records skipped)", tiles.len(), skipped);
        Ok(tiles)
    }

    /// Parse a single data line. `line_number` is 1-based and only used for
    /// error reporting.
    pub fn parse_record(line_number: usize, line: &str) -> FetchResult<TileDefinition> {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields.len() < Self::MIN_FIELD_COUNT {
            return Err(FetchError::MalformedGridRecord {
                line: line_number,
                reason: format!(
                    "expected at least {} fields, found {}",
                    Self::MIN_FIELD_COUNT,
                    fields.len()
                ),
            });
        }

        let mut coords = [0.0f64; 4];
        for (i, slot) in coords.iter_mut().enumerate() {
            let raw = fields[Self::BBOX_FIELDS + i];
            *slot = raw.parse().map_err(|_| FetchError::MalformedGridRecord {
                line: line_number,
                reason: format!("field {} is not a number: '{}'", Self::BBOX_FIELDS + i, raw),
            })?;
        }

        let [min_lon, max_lon, min_lat, max_lat] = coords;
        if min_lon > max_lon || min_lat > max_lat {
            return Err(FetchError::MalformedGridRecord {
                line: line_number,
                reason: format!(
                    "inverted bounding box ({}, {}) - ({}, {})",
                    min_lon, min_lat, max_lon, max_lat
                ),
            });
        }

        Ok(TileDefinition {
            id: fields[Self::ID_FIELD].to_string(),
            bbox: BoundingBox {
                min_lon,
                max_lon,
                min_lat,
                max_lat,
            },
        })
    }
}

impl Default for TileGridLoader {
    fn default() -> Self {
        Self::new(MalformedRecordPolicy::Abort)
    }
}
