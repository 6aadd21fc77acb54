//! Run configuration, validated before any network traffic happens

use crate::io::auth::DEFAULT_REFRESH_INTERVAL;
use crate::io::tile_grid::MalformedRecordPolicy;
use crate::types::{FetchError, FetchResult, RegionOfInterest};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the Copernicus Data Space user name
pub const USERNAME_VAR: &str = "CDSE_USERNAME";
/// Environment variable holding the Copernicus Data Space password
pub const PASSWORD_VAR: &str = "CDSE_PASSWORD";

/// Iowa, the region the tool was first used for
pub const DEFAULT_LOCATION_WKT: &str = "POLYGON ((-95.734863 40.597271, -96.679687 43.53262, \
    -91.362305 43.500752, -90.043945 42.065607, -91.318359 40.563895, -95.734863 40.597271))";

pub const DEFAULT_TILE_GRID: &str = "S2_TilingSystem2-1.txt";

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read credentials from the environment (after any `.env` file was loaded)
    pub fn from_env() -> FetchResult<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| FetchError::AuthenticationFailed(format!("{} is not set", name)))
        };

        Ok(Self {
            username: read(USERNAME_VAR)?,
            password: read(PASSWORD_VAR)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Remote service locations
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub catalog_url: String,
    pub token_url: String,
    pub client_id: String,
    pub collection: String,
    pub catalog_timeout: Duration,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            catalog_url: "https://catalogue.dataspace.copernicus.eu/odata/v1".to_string(),
            token_url: "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token"
                .to_string(),
            client_id: "cdse-public".to_string(),
            collection: "SENTINEL-2".to_string(),
            catalog_timeout: crate::io::catalog::DEFAULT_TIMEOUT,
        }
    }
}

/// Everything a run needs. Percentages are kept as given on the command line
/// (0..=100); the fraction accessors convert them.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub location_wkt: String,
    pub months: BTreeSet<u32>,
    pub start_year: i32,
    pub end_year: i32,
    pub max_cloud_cover: f64,
    pub min_tile_intersection: f64,
    pub min_coverage: f64,
    pub output_dir: PathBuf,
    pub tile_grid: PathBuf,
    pub grid_policy: MalformedRecordPolicy,
    pub refresh_interval: usize,
    pub verify_archives: bool,
    pub endpoints: Endpoints,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            location_wkt: DEFAULT_LOCATION_WKT.to_string(),
            months: (1..=12).collect(),
            start_year: 2023,
            end_year: 2023,
            max_cloud_cover: 20.0,
            min_tile_intersection: 30.0,
            min_coverage: 80.0,
            output_dir: PathBuf::from("./data"),
            tile_grid: PathBuf::from(DEFAULT_TILE_GRID),
            grid_policy: MalformedRecordPolicy::Abort,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            verify_archives: true,
            endpoints: Endpoints::default(),
        }
    }
}

impl FetchConfig {
    /// Check ranges and parse the region of interest
    pub fn validate(&self) -> FetchResult<RegionOfInterest> {
        if self.start_year > self.end_year {
            return Err(FetchError::Config(format!(
                "start year {} is after end year {}",
                self.start_year, self.end_year
            )));
        }

        if self.months.is_empty() {
            return Err(FetchError::Config("no months selected".to_string()));
        }

        if let Some(month) = self.months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(FetchError::Config(format!("invalid month {}", month)));
        }

        for (name, value) in [
            ("max cloud cover", self.max_cloud_cover),
            ("minimum tile intersection", self.min_tile_intersection),
            ("minimum coverage", self.min_coverage),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(FetchError::Config(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        if self.refresh_interval == 0 {
            return Err(FetchError::Config("refresh interval must be at least 1".to_string()));
        }

        RegionOfInterest::from_wkt(&self.location_wkt)
    }

    pub fn min_tile_intersection_fraction(&self) -> f64 {
        self.min_tile_intersection / 100.0
    }

    pub fn min_coverage_fraction(&self) -> f64 {
        self.min_coverage / 100.0
    }
}
