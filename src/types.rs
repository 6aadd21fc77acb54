use geo::{Area, MultiPolygon, Polygon, Rect, Validation};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use wkt::TryFromWkt;

/// Planar polygonal geometry in geographic degrees (EPSG:4326)
pub type Footprint = MultiPolygon<f64>;

/// Axis-aligned bounding box in geographic degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.min_lon, y: self.min_lat },
            geo::coord! { x: self.max_lon, y: self.max_lat },
        )
    }

    pub fn to_footprint(&self) -> Footprint {
        MultiPolygon::new(vec![self.to_rect().to_polygon()])
    }

    pub fn area(&self) -> f64 {
        (self.max_lon - self.min_lon).abs() * (self.max_lat - self.min_lat).abs()
    }
}

/// Region of interest driving tile and candidate filtering.
///
/// Always a valid polygonal geometry with positive area; the constructor
/// refuses anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    geometry: Footprint,
}

impl RegionOfInterest {
    pub fn new(geometry: Footprint) -> FetchResult<Self> {
        if geometry.0.is_empty() {
            return Err(FetchError::InvalidGeometry(
                "region of interest is empty".to_string(),
            ));
        }

        if !geometry.is_valid() {
            return Err(FetchError::InvalidGeometry(
                "region of interest is not a valid polygon".to_string(),
            ));
        }

        if geometry.unsigned_area() <= 0.0 {
            return Err(FetchError::InvalidGeometry(
                "region of interest has no area".to_string(),
            ));
        }

        Ok(Self { geometry })
    }

    pub fn from_polygon(polygon: Polygon<f64>) -> FetchResult<Self> {
        Self::new(MultiPolygon::new(vec![polygon]))
    }

    /// Parse a `POLYGON` or `MULTIPOLYGON` WKT string
    pub fn from_wkt(text: &str) -> FetchResult<Self> {
        Self::new(parse_polygonal_wkt(text)?)
    }

    pub fn geometry(&self) -> &Footprint {
        &self.geometry
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }
}

/// Parse WKT into polygonal geometry, rejecting points and lines.
pub fn parse_polygonal_wkt(text: &str) -> FetchResult<Footprint> {
    let geometry = geo::Geometry::<f64>::try_from_wkt_str(text.trim())
        .map_err(|e| FetchError::InvalidGeometry(format!("cannot parse WKT: {}", e)))?;

    match geometry {
        geo::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Ok(multi),
        geo::Geometry::Rect(rect) => Ok(MultiPolygon::new(vec![rect.to_polygon()])),
        other => Err(FetchError::InvalidGeometry(format!(
            "expected a polygonal geometry, got {:?}",
            geo_kind(&other)
        ))),
    }
}

fn geo_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "POINT",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "LINESTRING",
        geo::Geometry::MultiPoint(_) => "MULTIPOINT",
        geo::Geometry::MultiLineString(_) => "MULTILINESTRING",
        geo::Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        geo::Geometry::Triangle(_) => "TRIANGLE",
        geo::Geometry::Polygon(_) | geo::Geometry::MultiPolygon(_) | geo::Geometry::Rect(_) => {
            "POLYGON"
        }
    }
}

/// One cell of the Sentinel-2 tiling grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDefinition {
    pub id: String,
    pub bbox: BoundingBox,
}

/// A tile that overlaps the region of interest enough to be queried
#[derive(Debug, Clone)]
pub struct TileSelection {
    pub tile: TileDefinition,
    /// ROI clipped to the tile bounding box
    pub intersection: Footprint,
    /// area(intersection) / area(tile bbox), in [0, 1]
    pub intersection_fraction: f64,
}

impl TileSelection {
    pub fn tile_id(&self) -> &str {
        &self.tile.id
    }
}

/// One remote catalog record for a tile-month
#[derive(Debug, Clone)]
pub struct ProductCandidate {
    pub external_id: String,
    pub name: String,
    pub footprint: Footprint,
    /// Percent in [0, 100]; `None` when the catalog record lacks the attribute
    pub cloud_cover: Option<f64>,
}

/// Score of a candidate against one tile selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub coverage_fraction: f64,
    pub cloud_cover: f64,
    pub score: f64,
}

impl CandidateScore {
    pub fn new(coverage_fraction: f64, cloud_cover: f64) -> Self {
        Self {
            coverage_fraction,
            cloud_cover,
            score: (1.0 - cloud_cover / 100.0) * coverage_fraction,
        }
    }
}

impl std::fmt::Display for CandidateScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "score={:.3} cloud={:.1}% coverage={:.1}%",
            self.score,
            self.cloud_cover,
            self.coverage_fraction * 100.0
        )
    }
}

/// Best candidate for a (year, month, tile)
#[derive(Debug, Clone)]
pub struct SelectedProduct {
    pub candidate: ProductCandidate,
    pub score: CandidateScore,
}

/// A product download scheduled by the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub external_id: String,
    pub destination_dir: PathBuf,
    pub year: i32,
    pub month: u32,
    pub tile_id: String,
    pub product_name: String,
}

impl DownloadTask {
    /// File extension of the archives served by the download endpoint
    pub const ARCHIVE_EXTENSION: &'static str = "zip";

    pub fn target_path(&self) -> PathBuf {
        self.destination_dir
            .join(format!("{}.{}", self.product_name, Self::ARCHIVE_EXTENSION))
    }
}

/// Error types for product selection and retrieval
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed tile grid record on line {line}: {reason}")]
    MalformedGridRecord { line: usize, reason: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Catalog query failed: {0}")]
    CatalogQueryFailed(String),

    #[error("Malformed catalog response: {0}")]
    MalformedCatalogResponse(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Download of product {product_id} failed: {reason}")]
    DownloadFailed { product_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FetchError {
    /// Fatal errors abort the whole run; everything else is local to one
    /// tile-month or one task.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::AuthenticationFailed(_))
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_roi_from_wkt() {
        let roi = RegionOfInterest::from_wkt("POLYGON((0 0, 2 0, 2 2, 0 2, 0 0))").unwrap();
        assert_relative_eq!(roi.area(), 4.0);
    }

    #[test]
    fn test_roi_rejects_degenerate_and_non_polygons() {
        assert!(matches!(
            RegionOfInterest::from_wkt("POINT(1 2)"),
            Err(FetchError::InvalidGeometry(_))
        ));
        assert!(RegionOfInterest::from_wkt("POLYGON((0 0, 1 1, 2 2, 0 0))").is_err());
        // bow-tie
        assert!(RegionOfInterest::from_wkt("POLYGON((0 0, 2 2, 2 0, 0 2, 0 0))").is_err());
        assert!(RegionOfInterest::from_wkt("not wkt at all").is_err());
    }

    #[test]
    fn test_score_formula() {
        let score = CandidateScore::new(0.9, 10.0);
        assert_relative_eq!(score.score, 0.81, epsilon = 1e-12);
    }

    #[test]
    fn test_target_path() {
        let task = DownloadTask {
            external_id: "abc".to_string(),
            destination_dir: PathBuf::from("data/2023/7/T15TVG"),
            year: 2023,
            month: 7,
            tile_id: "T15TVG".to_string(),
            product_name: "S2A_MSIL1C_X".to_string(),
        };
        assert_eq!(
            task.target_path(),
            PathBuf::from("data/2023/7/T15TVG/S2A_MSIL1C_X.zip")
        );
    }

    #[test]
    fn test_only_auth_failures_are_fatal() {
        assert!(FetchError::AuthenticationFailed("x".into()).is_fatal());
        assert!(!FetchError::CatalogQueryFailed("x".into()).is_fatal());
        assert!(!FetchError::DownloadFailed {
            product_id: "x".into(),
            reason: "y".into()
        }
        .is_fatal());
    }
}
