//! I/O modules for the tile grid, the product catalog, authentication and downloads

pub mod tile_grid;
pub mod catalog;
pub mod auth;
pub mod download;

pub use tile_grid::{MalformedRecordPolicy, TileGridLoader};
pub use catalog::{CatalogClient, CatalogQuery, ODataCatalog};
pub use auth::{AuthSession, PasswordGrantAuth, SessionManager, TokenGrant, TokenProvider};
pub use download::{DownloadExecutor, DownloadOutcome, DownloadSummary, HttpTransport, ProductTransport, TransferReceipt};
