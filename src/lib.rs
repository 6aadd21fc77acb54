//! s2fetch: cloud-aware Sentinel-2 product selection and download
//!
//! Given a region of interest and a date range, the library narrows the
//! Sentinel-2 tiling grid to the tiles that overlap the region, picks the
//! clearest, best-covering product for every tile-month from the Copernicus
//! Data Space catalogue, and downloads the resulting plan under an expiring
//! access token.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CandidateScore, DownloadTask, FetchError, FetchResult, ProductCandidate,
    RegionOfInterest, SelectedProduct, TileDefinition, TileSelection,
};

pub use config::{Credentials, Endpoints, FetchConfig};
pub use crate::core::{AcquisitionPlan, AcquisitionPlanner, CandidateRanker, TileSelector};
pub use io::{DownloadExecutor, SessionManager, TileGridLoader};
