use crate::types::{parse_polygonal_wkt, FetchError, FetchResult, Footprint, ProductCandidate};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Name of the catalog attribute carrying the cloud cover percentage
pub const CLOUD_COVER_ATTRIBUTE: &str = "cloudCover";

/// Name of the catalog attribute carrying the tiling grid identifier
pub const TILE_ATTRIBUTE: &str = "tileId";

/// Maximum page size accepted by the catalog
pub const PAGE_SIZE: usize = 1000;

/// Default catalog request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Search parameters for a single tile-month
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub tile_id: String,
    pub year: i32,
    pub month: u32,
    pub max_cloud_cover: f64,
}

impl CatalogQuery {
    /// Sensing start window `[first day of month, first day of next month)`
    pub fn month_bounds(&self) -> FetchResult<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or_else(|| {
            FetchError::Config(format!("invalid year/month {}/{}", self.month, self.year))
        })?;

        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };

        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1).ok_or_else(|| {
            FetchError::Config(format!("invalid year/month {}/{}", next_month, next_year))
        })?;

        Ok((start, end))
    }

    /// Build the OData `$filter` expression for this query
    pub fn filter_expression(&self, collection: &str) -> FetchResult<String> {
        let (start, end) = self.month_bounds()?;

        Ok(format!(
            "Collection/Name eq '{collection}' \
             and ContentDate/Start ge {start}T00:00:00.000Z \
             and ContentDate/Start lt {end}T00:00:00.000Z \
             and Attributes/OData.CSC.StringAttribute/any(att:att/Name eq '{tile_attr}' \
             and att/OData.CSC.StringAttribute/Value eq '{tile}') \
             and Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq '{cloud_attr}' \
             and att/OData.CSC.DoubleAttribute/Value le {max_cloud})",
            collection = collection,
            start = start.format("%Y-%m-%d"),
            end = end.format("%Y-%m-%d"),
            tile_attr = TILE_ATTRIBUTE,
            tile = self.tile_id,
            cloud_attr = CLOUD_COVER_ATTRIBUTE,
            max_cloud = self.max_cloud_cover,
        ))
    }
}

/// Remote product catalog.
///
/// `search` returns `CatalogQueryFailed` for transport problems and
/// `MalformedCatalogResponse` when the reply lacks the result list; callers
/// treat both as recoverable for the tile-month at hand.
pub trait CatalogClient {
    fn search(&self, query: &CatalogQuery) -> FetchResult<Vec<ProductCandidate>>;
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    value: Option<Vec<RawProduct>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawProduct {
    id: String,
    name: String,
    footprint: Option<String>,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttribute {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl RawProduct {
    fn cloud_cover(&self) -> Option<f64> {
        let attribute = self
            .attributes
            .iter()
            .find(|a| a.name == CLOUD_COVER_ATTRIBUTE)?;

        let value = match &attribute.value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        // "NaN" and "inf" parse as floats but carry no usable reading
        value.filter(|v| v.is_finite())
    }
}

/// Convert a catalog JSON page into product candidates.
///
/// Records whose footprint is missing or unparsable are dropped with a
/// warning, since they can never be scored.
pub fn parse_catalog_response(body: serde_json::Value) -> FetchResult<Vec<ProductCandidate>> {
    let page: CatalogPage = serde_json::from_value(body)
        .map_err(|e| FetchError::MalformedCatalogResponse(format!("unexpected layout: {}", e)))?;

    let records = page.value.ok_or_else(|| {
        FetchError::MalformedCatalogResponse("response has no 'value' field".to_string())
    })?;

    if records.len() >= PAGE_SIZE {
        log::warn!("Catalog returned a full page of {} records, results may be truncated", records.len());
    }

    let mut candidates = Vec::with_capacity(records.len());
    for record in records {
        let footprint = match record.footprint.as_deref().map(parse_footprint) {
            Some(Ok(footprint)) => footprint,
            Some(Err(e)) => {
                log::warn!("Dropping product {}: {}", record.name, e);
                continue;
            }
            None => {
                log::warn!("Dropping product {}: no footprint", record.name);
                continue;
            }
        };

        let cloud_cover = record.cloud_cover();
        candidates.push(ProductCandidate {
            external_id: record.id,
            name: record.name,
            footprint,
            cloud_cover,
        });
    }

    Ok(candidates)
}

/// Parse a footprint such as `geography'SRID=4326;POLYGON ((...))'`
pub fn parse_footprint(raw: &str) -> FetchResult<Footprint> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("geography'")
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(trimmed);

    let wkt = match inner.split_once(';') {
        Some((prefix, rest)) if prefix.trim().to_ascii_uppercase().starts_with("SRID=") => rest,
        _ => inner,
    };

    parse_polygonal_wkt(wkt)
}

/// Client for the Copernicus Data Space OData catalogue
pub struct ODataCatalog {
    client: reqwest::blocking::Client,
    base_url: String,
    collection: String,
}

impl ODataCatalog {
    pub fn new(base_url: &str, collection: &str, timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        })
    }

    pub fn products_url(&self) -> String {
        format!("{}/Products", self.base_url)
    }
}

impl CatalogClient for ODataCatalog {
    fn search(&self, query: &CatalogQuery) -> FetchResult<Vec<ProductCandidate>> {
        let filter = query.filter_expression(&self.collection)?;
        log::debug!("Catalog filter for {} {}/{}: {}", query.tile_id, query.month, query.year, filter);

        let top = PAGE_SIZE.to_string();
        let response = self
            .client
            .get(self.products_url())
            .query(&[
                ("$filter", filter.as_str()),
                ("$top", top.as_str()),
                ("$expand", "Attributes"),
            ])
            .send()
            .map_err(|e| FetchError::CatalogQueryFailed(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FetchError::CatalogQueryFailed(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| FetchError::CatalogQueryFailed(format!("Failed to decode response: {}", e)))?;

        parse_catalog_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;
    use serde_json::json;

    fn query(month: u32) -> CatalogQuery {
        CatalogQuery {
            tile_id: "15TVG".to_string(),
            year: 2024,
            month,
            max_cloud_cover: 20.0,
        }
    }

    #[test]
    fn test_month_bounds_cover_whole_month() {
        let (start, end) = query(2).month_bounds().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let (_, end) = query(12).month_bounds().unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        assert!(query(13).month_bounds().is_err());
    }

    #[test]
    fn test_filter_expression() {
        let filter = query(7).filter_expression("SENTINEL-2").unwrap();
        assert!(filter.starts_with("Collection/Name eq 'SENTINEL-2'"));
        assert!(filter.contains("ContentDate/Start ge 2024-07-01T00:00:00.000Z"));
        assert!(filter.contains("ContentDate/Start lt 2024-08-01T00:00:00.000Z"));
        assert!(filter.contains("att/OData.CSC.StringAttribute/Value eq '15TVG'"));
        assert!(filter.contains("att/OData.CSC.DoubleAttribute/Value le 20"));
    }

    #[test]
    fn test_parse_footprint_strips_srid_prefix() {
        let footprint =
            parse_footprint("geography'SRID=4326;POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))'").unwrap();
        assert!((footprint.unsigned_area() - 1.0).abs() < 1e-12);

        let bare = parse_footprint("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))").unwrap();
        assert!((bare.unsigned_area() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "value": [
                {
                    "Id": "a1",
                    "Name": "S2A_ONE.SAFE",
                    "Footprint": "geography'SRID=4326;POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))'",
                    "Attributes": [
                        {"Name": "tileId", "Value": "15TVG"},
                        {"Name": "cloudCover", "Value": 12.5}
                    ]
                },
                {
                    "Id": "b2",
                    "Name": "S2B_TWO.SAFE",
                    "Footprint": "geography'SRID=4326;POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))'",
                    "Attributes": [{"Name": "cloudCover", "Value": "3.0"}]
                },
                {
                    "Id": "c3",
                    "Name": "S2B_THREE.SAFE",
                    "Footprint": "geography'SRID=4326;POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))'",
                    "Attributes": []
                },
                {
                    "Id": "e5",
                    "Name": "S2B_NAN.SAFE",
                    "Footprint": "geography'SRID=4326;POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))'",
                    "Attributes": [{"Name": "cloudCover", "Value": "NaN"}]
                },
                {
                    "Id": "d4",
                    "Name": "S2B_BROKEN.SAFE",
                    "Footprint": "geography'SRID=4326;POINT (0 0)'"
                }
            ]
        });

        let candidates = parse_catalog_response(body).unwrap();
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].external_id, "a1");
        assert_eq!(candidates[0].cloud_cover, Some(12.5));
        assert_eq!(candidates[1].cloud_cover, Some(3.0));
        assert_eq!(candidates[2].cloud_cover, None);
        assert_eq!(candidates[3].external_id, "e5");
        assert_eq!(candidates[3].cloud_cover, None);
    }

    #[test]
    fn test_missing_value_field_is_malformed() {
        let body = json!({"detail": "Invalid filter"});
        assert!(matches!(
            parse_catalog_response(body),
            Err(FetchError::MalformedCatalogResponse(_))
        ));
    }

    #[test]
    fn test_empty_value_is_not_an_error() {
        let candidates = parse_catalog_response(json!({"value": []})).unwrap();
        assert!(candidates.is_empty());
    }
}
